//! Caller's credit balance.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::server::AppState;

/// Body of `GET /api/v1/credits`.
#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    /// Balance after replenishment.
    pub credits: u32,
    /// Cap in force.
    pub max_credits: u32,
    /// Seconds until the next credit, `-1` while replenishment is paused.
    pub seconds_until_next: i64,
    /// Whether replenishment is paused.
    pub voting_paused: bool,
}

/// GET /api/v1/credits
pub async fn get_credits(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CreditsResponse>, ApiError> {
    let status = state.ledger.snapshot(&state.shutdown.token(), user.id).await?;
    Ok(Json(CreditsResponse {
        credits: status.credits,
        max_credits: status.max,
        seconds_until_next: status.next_credit.as_secs(),
        voting_paused: state.ledger.policy().get().paused,
    }))
}
