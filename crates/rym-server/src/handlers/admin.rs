//! Credit settings and bulk credit operations.
//!
//! Everything here except `voting_status` requires an [`AdminUser`].

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use rym_core::SettingsPayload;
use rym_ledger::CreditPolicy;
use rym_settings::{CREDIT_INTERVAL_RANGE, CREDIT_MAX_RANGE};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::json_body;
use crate::auth::AdminUser;
use crate::errors::ApiError;
use crate::server::AppState;

/// Body of `GET /api/v1/voting-status`.
#[derive(Debug, Serialize)]
pub struct VotingStatus {
    /// Whether replenishment is paused.
    pub voting_paused: bool,
}

/// GET /api/v1/voting-status
pub async fn voting_status(State(state): State<AppState>) -> Json<VotingStatus> {
    Json(VotingStatus {
        voting_paused: state.ledger.policy().get().paused,
    })
}

/// Partial settings update. Absent fields keep their value.
///
/// Numbers are signed so out-of-range negatives get the range message rather
/// than a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    /// Minutes per credit, `1..=60`.
    pub credit_interval_minutes: Option<i64>,
    /// Balance cap, `1..=100`.
    pub credit_max: Option<i64>,
    /// Pause switch.
    pub voting_paused: Option<bool>,
}

/// GET /api/v1/admin/settings
pub async fn get_settings(State(state): State<AppState>, _admin: AdminUser) -> Json<SettingsPayload> {
    Json(payload(&state.ledger.policy().get()))
}

/// PUT /api/v1/admin/settings
///
/// All fields are validated before any is applied. A request that sets at
/// least one field broadcasts `settings_update`.
pub async fn update_settings(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    body: Result<Json<UpdateSettingsRequest>, JsonRejection>,
) -> Result<Json<SettingsPayload>, ApiError> {
    let req = json_body(body)?;
    let interval = req
        .credit_interval_minutes
        .map(|v| in_range("credit_interval_minutes", v, CREDIT_INTERVAL_RANGE))
        .transpose()?;
    let max = req
        .credit_max
        .map(|v| in_range("credit_max", v, CREDIT_MAX_RANGE))
        .transpose()?;

    let shared = state.ledger.policy();
    let mut policy = shared.get();
    if let Some(minutes) = interval {
        policy.interval = Duration::from_secs(u64::from(minutes) * 60);
        info!(admin = %admin.steam_id, minutes, "credit interval updated");
    }
    if let Some(max) = max {
        policy.max = max;
        info!(admin = %admin.steam_id, max, "credit max updated");
    }
    if let Some(paused) = req.voting_paused {
        policy.paused = paused;
        info!(admin = %admin.steam_id, paused, "voting pause toggled");
    }

    let updated = interval.is_some() || max.is_some() || req.voting_paused.is_some();
    if updated {
        let _ = shared.set(policy);
        let _ = state.hub.broadcast_settings(&payload(&policy)).await;
    }
    Ok(Json(payload(&policy)))
}

/// Body of the bulk credit endpoints.
#[derive(Debug, Serialize)]
pub struct BulkCreditResponse {
    /// Human-readable summary.
    pub message: String,
    /// Users whose balance changed.
    pub users_affected: usize,
}

/// POST /api/v1/admin/credits/reset
pub async fn reset_credits(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<BulkCreditResponse>, ApiError> {
    let users_affected = state.ledger.reset_all(&state.shutdown.token()).await?;
    info!(admin = %admin.steam_id, users_affected, "credits reset");
    Ok(Json(BulkCreditResponse {
        message: "All credits have been reset to 0".into(),
        users_affected,
    }))
}

/// POST /api/v1/admin/credits/give
pub async fn give_credits(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<BulkCreditResponse>, ApiError> {
    let max = state.ledger.policy().get().max;
    let users_affected = state
        .ledger
        .replenish_all(&state.shutdown.token(), max)
        .await?;
    info!(admin = %admin.steam_id, users_affected, "gave everyone a credit");
    Ok(Json(BulkCreditResponse {
        message: "Everyone received 1 credit".into(),
        users_affected,
    }))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn payload(policy: &CreditPolicy) -> SettingsPayload {
    SettingsPayload {
        credit_interval_minutes: (policy.interval.as_secs() / 60) as u32,
        credit_max: policy.max,
        voting_paused: policy.paused,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn in_range(field: &str, value: i64, (min, max): (u32, u32)) -> Result<u32, ApiError> {
    if value < i64::from(min) || value > i64::from(max) {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max}"
        )));
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn range_check_uses_field_name() {
        assert_eq!(in_range("credit_max", 100, CREDIT_MAX_RANGE).unwrap(), 100);
        assert_matches!(
            in_range("credit_max", 0, CREDIT_MAX_RANGE),
            Err(ApiError::BadRequest(msg)) if msg == "credit_max must be between 1 and 100"
        );
        assert_matches!(
            in_range("credit_interval_minutes", -5, CREDIT_INTERVAL_RANGE),
            Err(ApiError::BadRequest(_))
        );
    }

    #[test]
    fn payload_reports_whole_minutes() {
        let policy = CreditPolicy {
            interval: Duration::from_secs(15 * 60),
            max: 7,
            paused: true,
        };
        let p = payload(&policy);
        assert_eq!(p.credit_interval_minutes, 15);
        assert_eq!(p.credit_max, 7);
        assert!(p.voting_paused);
    }
}
