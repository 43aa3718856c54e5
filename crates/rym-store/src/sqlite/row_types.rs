//! Database row types for mapping between `SQLite` rows and Rust structs.

use rym_core::{UserId, VoteId};
use serde::{Deserialize, Serialize};

/// Raw row from the `users` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    /// User ID.
    pub id: UserId,
    /// Steam 64-bit ID as text.
    pub steam_id: String,
    /// Display name.
    pub username: String,
    /// Full-size avatar URL.
    pub avatar_url: String,
    /// Small avatar URL.
    pub avatar_small: String,
    /// Current credit balance.
    pub credits: u32,
    /// Last replenishment instant, unix milliseconds.
    pub last_credit_at: i64,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last update timestamp (RFC 3339).
    pub updated_at: String,
}

/// Profile data for creating or refreshing a user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewUser {
    /// Steam 64-bit ID as text.
    pub steam_id: String,
    /// Display name.
    pub username: String,
    /// Full-size avatar URL.
    pub avatar_url: String,
    /// Small avatar URL.
    pub avatar_small: String,
}

/// A vote joined with both users' display data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDetailsRow {
    /// Vote ID.
    pub id: VoteId,
    /// Voter.
    pub from_user_id: UserId,
    /// Voter display name.
    pub from_username: String,
    /// Voter avatar.
    pub from_avatar: String,
    /// Recipient.
    pub to_user_id: UserId,
    /// Recipient display name.
    pub to_username: String,
    /// Recipient avatar.
    pub to_avatar: String,
    /// Achievement slug.
    pub achievement_id: String,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

/// Votes one user received for one achievement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientTally {
    /// Achievement slug.
    pub achievement_id: String,
    /// The recipient.
    pub user: UserRow,
    /// Votes received for the achievement.
    pub vote_count: u32,
}
