//! WebSocket upgrade and connection status.

use axum::Json;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{AuthUser, bearer_token};
use crate::errors::ApiError;
use crate::server::AppState;
use crate::websocket::run_session;

/// Upgrade query string.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Access token.
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /api/v1/ws?token=...
///
/// The token is checked before the upgrade headers, so an unauthenticated
/// client gets 401 whether or not it asked for an upgrade. A player connecting
/// for the first time is stored before the session starts.
pub async fn upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(bearer_token)
        });
    let Some(token) = token else {
        return ApiError::Unauthorized("missing token".into()).into_response();
    };
    let user = match AuthUser::authenticate(&state, token).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(user_id = %user.id, "upgrade rejected");
            return rejection.into_response();
        }
    };

    let hub = state.hub.clone();
    let config = state.session;
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| run_session(socket, hub, user, config))
}

/// Body of `GET /api/v1/ws/status`.
#[derive(Debug, Serialize)]
pub struct WsStatus {
    /// Live sessions.
    pub connected_users: usize,
}

/// GET /api/v1/ws/status
pub async fn status(State(state): State<AppState>) -> Json<WsStatus> {
    Json(WsStatus {
        connected_users: state.hub.connected_count(),
    })
}
