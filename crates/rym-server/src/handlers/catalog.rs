//! Read-only lookups the vote form needs: players and achievements.

use axum::Json;
use axum::extract::{Path, State};
use rym_core::UserId;
use rym_core::achievements::{self, Achievement};
use rym_store::{UserRepo, UserRow, VoteDetailsRow, VoteRepo};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::errors::{ApiError, USER_NOT_FOUND};
use crate::server::AppState;

/// Player fields safe to show other players.
#[derive(Debug, Serialize)]
pub struct PublicUser {
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
}

impl From<UserRow> for PublicUser {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            steam_id: row.steam_id,
            username: row.username,
            avatar_url: row.avatar_url,
            avatar_small: row.avatar_small,
        }
    }
}

/// Body of the user list endpoints.
#[derive(Debug, Serialize)]
pub struct UsersResponse {
    #[allow(missing_docs)]
    pub users: Vec<PublicUser>,
}

/// GET /api/v1/users
pub async fn list_users(State(state): State<AppState>, _user: AuthUser) -> Result<Json<UsersResponse>, ApiError> {
    let rows = state.store.read(UserRepo::list).await?;
    Ok(Json(UsersResponse {
        users: rows.into_iter().map(PublicUser::from).collect(),
    }))
}

/// GET /api/v1/users/others
///
/// Everyone but the caller, i.e. the players they can vote for.
pub async fn list_other_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UsersResponse>, ApiError> {
    let rows = state.store.read(UserRepo::list).await?;
    Ok(Json(UsersResponse {
        users: rows
            .into_iter()
            .filter(|row| row.id != user.id)
            .map(PublicUser::from)
            .collect(),
    }))
}

/// Body of `GET /api/v1/users/{id}`.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    #[allow(missing_docs)]
    pub user: PublicUser,
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse::<u64>()
        .map(UserId::new)
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))
}

/// GET /api/v1/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(raw): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_user_id(&raw)?;
    state
        .store
        .read(move |conn| UserRepo::get(conn, id))
        .await?
        .map(|row| Json(UserResponse { user: row.into() }))
        .ok_or_else(|| ApiError::NotFound(USER_NOT_FOUND.into()))
}

/// Body of `GET /api/v1/users/{id}/votes`.
#[derive(Debug, Serialize)]
pub struct ReceivedVotesResponse {
    /// Most recent first.
    pub votes: Vec<VoteDetailsRow>,
}

/// GET /api/v1/users/{id}/votes
///
/// Everything a player has been voted for.
pub async fn received_votes(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(raw): Path<String>,
) -> Result<Json<ReceivedVotesResponse>, ApiError> {
    let id = parse_user_id(&raw)?;
    let votes = state
        .store
        .read(move |conn| {
            if !UserRepo::exists(conn, id)? {
                return Ok(None);
            }
            VoteRepo::received_by(conn, id).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(USER_NOT_FOUND.into()))?;
    Ok(Json(ReceivedVotesResponse { votes }))
}

/// Body of `GET /api/v1/achievements`.
#[derive(Debug, Serialize)]
pub struct AchievementsResponse {
    /// Whole catalog.
    pub achievements: &'static [Achievement],
    /// Praise only.
    pub positive: Vec<&'static Achievement>,
    /// Shame only.
    pub negative: Vec<&'static Achievement>,
}

/// GET /api/v1/achievements
pub async fn list_achievements() -> Json<AchievementsResponse> {
    let all = achievements::all();
    let (positive, negative) = all.iter().partition(|a| a.is_positive);
    Json(AchievementsResponse {
        achievements: all,
        positive,
        negative,
    })
}

/// Body of `GET /api/v1/achievements/{id}`.
#[derive(Debug, Serialize)]
pub struct AchievementResponse {
    #[allow(missing_docs)]
    pub achievement: &'static Achievement,
}

/// GET /api/v1/achievements/{id}
pub async fn get_achievement(Path(id): Path<String>) -> Result<Json<AchievementResponse>, ApiError> {
    achievements::get(&id)
        .map(|achievement| Json(AchievementResponse { achievement }))
        .ok_or_else(|| ApiError::NotFound("Achievement not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn user_id_must_be_numeric() {
        assert_eq!(parse_user_id("42").unwrap(), UserId::new(42));
        assert_matches!(parse_user_id("abc"), Err(ApiError::BadRequest(msg)) if msg == "Invalid user ID");
        assert_matches!(parse_user_id("-1"), Err(ApiError::BadRequest(_)));
    }
}
