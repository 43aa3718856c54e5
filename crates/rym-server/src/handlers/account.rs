//! The signed-in player's own profile.

use axum::Json;
use axum::extract::State;
use rym_core::UserId;
use rym_store::UserRepo;
use serde::Serialize;
use serde_json::{Value, json};

use crate::auth::AuthUser;
use crate::errors::{ApiError, USER_NOT_FOUND};
use crate::server::AppState;

/// Profile plus credit state, as the client header shows it.
#[derive(Debug, Serialize)]
pub struct CurrentUser {
    /// User ID.
    pub id: UserId,
    /// Steam 64-bit ID.
    pub steam_id: String,
    /// Display name.
    pub username: String,
    /// Full-size avatar.
    pub avatar_url: String,
    /// Small avatar.
    pub avatar_small: String,
    /// Balance after replenishment.
    pub credits: u32,
    /// Seconds until the next credit, `-1` while paused.
    pub seconds_until_credit: i64,
    /// Replenishment interval.
    pub credit_interval_seconds: u64,
    /// Cap in force.
    pub credit_max: u32,
    /// Whether admin routes are open to this player.
    pub is_admin: bool,
}

/// Body of `GET /api/v1/auth/me`.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[allow(missing_docs)]
    pub user: CurrentUser,
}

/// GET /api/v1/auth/me
pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<MeResponse>, ApiError> {
    let status = state.ledger.snapshot(&state.shutdown.token(), user.id).await?;
    let id = user.id;
    let row = state
        .store
        .read(move |conn| UserRepo::get(conn, id))
        .await?
        .ok_or_else(|| ApiError::NotFound(USER_NOT_FOUND.into()))?;
    let policy = state.ledger.policy().get();
    Ok(Json(MeResponse {
        user: CurrentUser {
            is_admin: state.auth.is_admin(&row.steam_id),
            id: row.id,
            steam_id: row.steam_id,
            username: row.username,
            avatar_url: row.avatar_url,
            avatar_small: row.avatar_small,
            credits: status.credits,
            seconds_until_credit: status.next_credit.as_secs(),
            credit_interval_seconds: policy.interval.as_secs(),
            credit_max: status.max,
        },
    }))
}

/// POST /api/v1/auth/logout
///
/// Tokens are stateless; the client drops its copy.
pub async fn logout(_user: AuthUser) -> Json<Value> {
    Json(json!({ "message": "Logged out successfully" }))
}
