//! Fixed achievement catalog players can award each other.

use serde::Serialize;

/// A predefined achievement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Achievement {
    /// Stable slug used in requests and storage.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Short flavour text.
    pub description: &'static str,
    /// Praise or shame.
    pub is_positive: bool,
}

const fn praise(id: &'static str, name: &'static str, description: &'static str) -> Achievement {
    Achievement {
        id,
        name,
        description,
        is_positive: true,
    }
}

const fn shame(id: &'static str, name: &'static str, description: &'static str) -> Achievement {
    Achievement {
        id,
        name,
        description,
        is_positive: false,
    }
}

static CATALOG: [Achievement; 15] = [
    praise("pro-player", "Pro Player", "Shows outstanding skill"),
    praise("endboss", "Endboss", "Unbeatable like a final boss"),
    praise("teamplayer", "Teamplayer", "Always puts the team first"),
    praise("mvp", "MVP", "Most valuable player of the round"),
    praise("clutch-king", "Clutch King", "Saves hopeless situations"),
    praise("support-hero", "Support Hero", "Always there when help is needed"),
    praise("stratege", "Stratege", "Plans every move like a chess master"),
    praise("good-sport", "Good Sport", "Loses with dignity, wins with modesty"),
    shame("noob", "Noob", "Still has a lot to learn"),
    shame("camper", "Camper", "Only moves when absolutely necessary"),
    shame("rage-quitter", "Rage Quitter", "Leaves the game when it goes badly"),
    shame("toxic", "Toxic", "Spreads bad vibes"),
    shame("lagger", "Lagger", "Ping is just a number... a very high one"),
    shame("afk-king", "AFK King", "More often AFK than playing"),
    shame(
        "friendly-fire-expert",
        "Friendly Fire Expert",
        "Hits teammates better than enemies",
    ),
];

/// Look up an achievement by slug.
pub fn get(id: &str) -> Option<&'static Achievement> {
    CATALOG.iter().find(|a| a.id == id)
}

/// Whether `id` names a known achievement.
pub fn is_valid(id: &str) -> bool {
    get(id).is_some()
}

/// Every achievement, positives first.
pub fn all() -> &'static [Achievement] {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = all().iter().map(|a| a.id).collect();
        assert_eq!(ids.len(), all().len());
    }

    #[test]
    fn lookup() {
        let mvp = get("mvp").unwrap();
        assert_eq!(mvp.name, "MVP");
        assert!(mvp.is_positive);
        assert!(!get("toxic").unwrap().is_positive);
        assert!(get("nope").is_none());
        assert!(!is_valid(""));
    }

    #[test]
    fn split_between_praise_and_shame() {
        let positive = all().iter().filter(|a| a.is_positive).count();
        assert_eq!(positive, 8);
        assert_eq!(all().len() - positive, 7);
    }
}
