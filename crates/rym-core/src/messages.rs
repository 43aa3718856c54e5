//! Messages pushed to connected clients.
//!
//! Every frame on the wire is a JSON envelope `{ "type": <kind>, "payload": {...} }`.
//! The kind vocabulary is fixed; the payload shape depends on the kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{UserId, VoteId};

/// Discriminator of a pushed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Sent only to the recipient of a vote.
    VoteReceived,
    /// Broadcast to everyone for the shared timeline.
    NewVote,
    /// A player was seen for the first time.
    UserJoined,
    /// An admin changed the credit settings.
    SettingsUpdate,
    /// Something went wrong on the server side.
    Error,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VoteReceived => "vote_received",
            Self::NewVote => "new_vote",
            Self::UserJoined => "user_joined",
            Self::SettingsUpdate => "settings_update",
            Self::Error => "error",
        }
    }
}

/// A message envelope as delivered to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Kind-specific body.
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope from any serializable payload.
    pub fn new<P: Serialize>(kind: MessageKind, payload: &P) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// `new_vote` envelope.
    pub fn new_vote(payload: &VotePayload) -> Result<Self, serde_json::Error> {
        Self::new(MessageKind::NewVote, payload)
    }

    /// `vote_received` envelope.
    pub fn vote_received(payload: &VotePayload) -> Result<Self, serde_json::Error> {
        Self::new(MessageKind::VoteReceived, payload)
    }

    /// `settings_update` envelope.
    pub fn settings_update(payload: &SettingsPayload) -> Result<Self, serde_json::Error> {
        Self::new(MessageKind::SettingsUpdate, payload)
    }

    /// `user_joined` envelope.
    pub fn user_joined(payload: &UserJoinedPayload) -> Result<Self, serde_json::Error> {
        Self::new(MessageKind::UserJoined, payload)
    }

    /// `error` envelope with a human-readable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            payload: serde_json::json!({ "message": message.into() }),
        }
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Vote details carried by `new_vote` and `vote_received`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePayload {
    /// Persisted vote ID.
    pub vote_id: VoteId,
    /// Voter.
    pub from_user_id: UserId,
    /// Voter display name.
    pub from_username: String,
    /// Voter avatar URL.
    pub from_avatar: String,
    /// Recipient.
    pub to_user_id: UserId,
    /// Recipient display name.
    pub to_username: String,
    /// Recipient avatar URL.
    pub to_avatar: String,
    /// Achievement slug.
    pub achievement_id: String,
    /// Achievement display name.
    #[serde(rename = "achievement_name")]
    pub achievement: String,
    /// Praise or shame.
    pub is_positive: bool,
    /// RFC 3339.
    pub created_at: String,
}

/// Credit settings carried by `settings_update`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct SettingsPayload {
    pub credit_interval_minutes: u32,
    pub credit_max: u32,
    pub voting_paused: bool,
}

/// Player details carried by `user_joined`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJoinedPayload {
    /// New player.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Avatar URL.
    pub avatar: String,
}

/// Body of an `error` message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable description.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote() -> VotePayload {
        VotePayload {
            vote_id: VoteId::new(1),
            from_user_id: UserId::new(10),
            from_username: "alice".into(),
            from_avatar: "a.png".into(),
            to_user_id: UserId::new(20),
            to_username: "bob".into(),
            to_avatar: "b.png".into(),
            achievement_id: "mvp".into(),
            achievement: "MVP".into(),
            is_positive: true,
            created_at: "2026-01-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn kind_wire_names() {
        for kind in [
            MessageKind::VoteReceived,
            MessageKind::NewVote,
            MessageKind::UserJoined,
            MessageKind::SettingsUpdate,
            MessageKind::Error,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn envelope_shape() {
        let env = Envelope::new_vote(&vote()).unwrap();
        let parsed: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(parsed["type"], "new_vote");
        assert_eq!(parsed["payload"]["vote_id"], 1);
        assert_eq!(parsed["payload"]["achievement_name"], "MVP");
        assert_eq!(parsed["payload"]["to_user_id"], 20);
    }

    #[test]
    fn error_envelope_carries_message() {
        let env = Envelope::error("boom");
        assert_eq!(env.kind, MessageKind::Error);
        assert_eq!(env.payload["message"], "boom");
    }

    #[test]
    fn error_payload_roundtrips_from_envelope() {
        let env = Envelope::error("nope");
        let body: ErrorPayload = serde_json::from_value(env.payload).unwrap();
        assert_eq!(body.message, "nope");
    }

    #[test]
    fn settings_payload_fields() {
        let env = Envelope::settings_update(&SettingsPayload {
            credit_interval_minutes: 5,
            credit_max: 12,
            voting_paused: true,
        })
        .unwrap();
        assert_eq!(env.kind, MessageKind::SettingsUpdate);
        assert_eq!(env.payload["credit_interval_minutes"], 5);
        assert_eq!(env.payload["voting_paused"], true);
    }
}
