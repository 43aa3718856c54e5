//! Casting votes, the timeline and the leaderboard.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use metrics::counter;
use rym_core::achievements::{self, Achievement};
use rym_core::{UserId, VotePayload};
use rym_ledger::CreditLedger;
use rym_store::{RecipientTally, UserRepo, VoteDetailsRow, VoteRepo};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::catalog::PublicUser;
use super::json_body;
use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::metrics::VOTES_CAST_TOTAL;
use crate::server::AppState;

/// Credits one vote costs.
pub const VOTE_COST: u32 = 1;
/// Timeline length when no `limit` is given.
pub const DEFAULT_TIMELINE_LIMIT: u32 = 100;
/// Longest timeline a client may ask for.
pub const MAX_TIMELINE_LIMIT: u32 = 500;
/// Longest a compensating refund may take.
pub const REFUND_DEADLINE: Duration = Duration::from_secs(5);
/// Leaders shown per achievement.
pub const LEADERBOARD_DEPTH: usize = 3;

/// Body of `POST /api/v1/votes`.
#[derive(Debug, Deserialize)]
pub struct CreateVoteRequest {
    /// Recipient.
    pub to_user_id: UserId,
    /// Achievement slug.
    pub achievement_id: String,
}

/// Response to a successful vote.
#[derive(Debug, Serialize)]
pub struct CreateVoteResponse {
    /// The stored vote.
    pub vote: VoteDetailsRow,
    /// Caller's remaining balance.
    pub credits: u32,
}

/// POST /api/v1/votes
///
/// Validates, spends one credit, stores the vote, then pushes `new_vote` to
/// everyone and `vote_received` to the recipient. A failed insert refunds the
/// credit and pushes an `error` to the voter.
#[instrument(skip_all, fields(from = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<CreateVoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateVoteResponse>), ApiError> {
    let req = json_body(body)?;
    let Some(achievement) = achievements::get(&req.achievement_id) else {
        return Err(ApiError::BadRequest("Invalid achievement ID".into()));
    };
    if req.to_user_id == user.id {
        return Err(ApiError::BadRequest("Cannot vote for yourself".into()));
    }
    let to = req.to_user_id;
    if !state.store.read(move |conn| UserRepo::exists(conn, to)).await? {
        return Err(ApiError::BadRequest("Target user not found".into()));
    }

    let cancel = state.shutdown.token();
    let credits = state.ledger.spend(&cancel, user.id, VOTE_COST).await?;

    let from = user.id;
    let achievement_id = achievement.id;
    let created_at = chrono::Utc::now().to_rfc3339();
    let stored = state
        .store
        .write(&cancel, move |conn| {
            let tx = conn.unchecked_transaction()?;
            let id = VoteRepo::insert(&tx, from, to, achievement_id, &created_at)?;
            let details = VoteRepo::get_details(&tx, id)?;
            tx.commit()?;
            Ok(details)
        })
        .await;

    let vote = match stored {
        Ok(Some(vote)) => vote,
        Ok(None) => return Err(ApiError::Internal("stored vote not readable".into())),
        Err(e) => {
            warn!(error = %e, "vote insert failed, refunding");
            refund_vote_cost(&state.ledger, user.id).await;
            let _ = state.hub.send_error(user.id, "Vote could not be saved").await;
            return Err(e.into());
        }
    };

    let payload = VotePayload {
        vote_id: vote.id,
        from_user_id: vote.from_user_id,
        from_username: vote.from_username.clone(),
        from_avatar: vote.from_avatar.clone(),
        to_user_id: vote.to_user_id,
        to_username: vote.to_username.clone(),
        to_avatar: vote.to_avatar.clone(),
        achievement_id: vote.achievement_id.clone(),
        achievement: achievement.name.to_string(),
        is_positive: achievement.is_positive,
        created_at: vote.created_at.clone(),
    };
    let everyone = state.hub.broadcast_vote(&payload).await;
    let recipient = state.hub.notify_vote_received(&payload).await;
    counter!(VOTES_CAST_TOTAL).increment(1);
    info!(
        vote_id = %vote.id,
        to = %vote.to_user_id,
        achievement = achievement.id,
        delivered = everyone.delivered,
        recipient_online = recipient.delivered > 0,
        "vote cast"
    );

    Ok((StatusCode::CREATED, Json(CreateVoteResponse { vote, credits })))
}

/// Return a spent vote credit after the vote failed to persist.
///
/// Runs on its own token with a deadline: the request's token may be the
/// one whose cancellation aborted the insert.
pub(crate) async fn refund_vote_cost(ledger: &CreditLedger, user: UserId) {
    let cancel = CancellationToken::new();
    match timeout(REFUND_DEADLINE, ledger.refund(&cancel, user, VOTE_COST)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(user_id = %user, error = %e, "refund failed"),
        Err(_) => {
            cancel.cancel();
            warn!(user_id = %user, "refund timed out");
        }
    }
}

/// Query string of `GET /api/v1/votes`.
#[derive(Debug, Default, Deserialize)]
pub struct TimelineParams {
    /// Number of votes, clamped to `1..=MAX_TIMELINE_LIMIT`.
    pub limit: Option<u32>,
}

/// Body of `GET /api/v1/votes`.
#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    /// Most recent first.
    pub votes: Vec<VoteDetailsRow>,
}

/// GET /api/v1/votes
pub async fn timeline(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<TimelineParams>,
) -> Result<Json<TimelineResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TIMELINE_LIMIT)
        .clamp(1, MAX_TIMELINE_LIMIT);
    let votes = state.store.read(move |conn| VoteRepo::recent(conn, limit)).await?;
    Ok(Json(TimelineResponse { votes }))
}

/// One recipient's standing for one achievement.
#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    /// The recipient.
    pub user: PublicUser,
    /// Votes received.
    pub vote_count: u32,
    /// 1-based position.
    pub rank: usize,
}

/// Leaders for one achievement.
#[derive(Debug, Serialize)]
pub struct AchievementLeaderboard {
    #[allow(missing_docs)]
    pub achievement: &'static Achievement,
    /// Most votes first, at most [`LEADERBOARD_DEPTH`].
    pub leaders: Vec<LeaderboardEntry>,
}

/// Body of `GET /api/v1/leaderboard`.
#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    /// One entry per catalog achievement, in catalog order.
    pub leaderboard: Vec<AchievementLeaderboard>,
}

/// GET /api/v1/leaderboard
pub async fn leaderboard(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let tallies = state.store.read(VoteRepo::recipient_tallies).await?;
    Ok(Json(LeaderboardResponse {
        leaderboard: rank(tallies, LEADERBOARD_DEPTH),
    }))
}

/// Group tallies (sorted by achievement, then count descending) into the top
/// `depth` per achievement. Achievements without votes get an empty list.
fn rank(tallies: Vec<RecipientTally>, depth: usize) -> Vec<AchievementLeaderboard> {
    let mut boards: Vec<AchievementLeaderboard> = achievements::all()
        .iter()
        .map(|achievement| AchievementLeaderboard {
            achievement,
            leaders: Vec::new(),
        })
        .collect();
    for tally in tallies {
        let Some(board) = boards
            .iter_mut()
            .find(|b| b.achievement.id == tally.achievement_id)
        else {
            continue;
        };
        if board.leaders.len() < depth {
            let rank = board.leaders.len() + 1;
            board.leaders.push(LeaderboardEntry {
                user: PublicUser::from(tally.user),
                vote_count: tally.vote_count,
                rank,
            });
        }
    }
    boards
}
