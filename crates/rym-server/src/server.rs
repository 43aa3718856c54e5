//! `RymServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use rym_core::UserJoinedPayload;
use rym_ledger::CreditLedger;
use rym_settings::AuthSettings;
use rym_store::{NewUser, Store, UserRepo, UserRow};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{Claims, DEFAULT_TOKEN_TTL_SECS, TokenKeys};
use crate::config::{ServerConfig, SessionConfig};
use crate::errors::ApiError;
use crate::handlers;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::Hub;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection hub.
    pub hub: Hub,
    /// Credit ledger.
    pub ledger: CreditLedger,
    /// Storage.
    pub store: Store,
    /// Token verifier.
    pub tokens: Arc<TokenKeys>,
    /// Admin list.
    pub auth: Arc<AuthSettings>,
    /// Per-connection settings.
    pub session: SessionConfig,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Record a player seen through the login flow.
    ///
    /// New players get a zero-balance credit record and everyone connected
    /// is told via `user_joined`.
    pub async fn join_player(&self, profile: NewUser) -> Result<(UserRow, bool), ApiError> {
        let (row, created) = self.ledger.ensure_user(&self.shutdown.token(), profile).await?;
        if created {
            let _ = self
                .hub
                .broadcast_user_joined(&UserJoinedPayload {
                    user_id: row.id,
                    username: row.username.clone(),
                    avatar: row.avatar_small.clone(),
                })
                .await;
        }
        Ok((row, created))
    }

    /// The stored player behind verified `claims`, created on first sight.
    ///
    /// Known players cost one read. An unknown Steam ID is stored with the
    /// token's display name and announced like any other join.
    pub async fn resolve_player(&self, claims: &Claims) -> Result<UserRow, ApiError> {
        let steam_id = claims.steam_id.clone();
        if let Some(row) = self
            .store
            .read(move |conn| UserRepo::get_by_steam_id(conn, &steam_id))
            .await?
        {
            return Ok(row);
        }
        let (row, _) = self
            .join_player(NewUser {
                steam_id: claims.steam_id.clone(),
                username: claims.name.clone(),
                ..NewUser::default()
            })
            .await?;
        Ok(row)
    }

    /// Finish a Steam login: store or refresh the profile and issue a token.
    pub async fn complete_login(&self, profile: NewUser) -> Result<(UserRow, String), ApiError> {
        let (row, _) = self.join_player(profile).await?;
        let token = self.tokens.issue(&Claims::new(
            row.id,
            row.steam_id.clone(),
            row.username.clone(),
            DEFAULT_TOKEN_TTL_SECS,
        ))?;
        Ok((row, token))
    }
}

/// The Rate-Your-Mate server.
pub struct RymServer {
    config: ServerConfig,
    state: AppState,
    hub_task: JoinHandle<()>,
}

impl RymServer {
    /// Build the server and spawn the hub. Must be called inside a runtime.
    pub fn new(config: ServerConfig, store: Store, ledger: CreditLedger, auth: AuthSettings) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, hub_task) = Hub::spawn(config.hub_queue, shutdown.token());
        let state = AppState {
            hub,
            ledger,
            store,
            tokens: Arc::new(TokenKeys::new(&auth.jwt_secret)),
            auth: Arc::new(auth),
            session: config.session,
            shutdown,
            start_time: Instant::now(),
            metrics: None,
        };
        Self {
            config,
            state,
            hub_task,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/ws", get(handlers::ws::upgrade))
            .route("/ws/status", get(handlers::ws::status))
            .route("/credits", get(handlers::credits::get_credits))
            .route(
                "/votes",
                post(handlers::votes::create).get(handlers::votes::timeline),
            )
            .route("/auth/me", get(handlers::account::me))
            .route("/auth/logout", post(handlers::account::logout))
            .route("/leaderboard", get(handlers::votes::leaderboard))
            .route("/users", get(handlers::catalog::list_users))
            .route("/users/others", get(handlers::catalog::list_other_users))
            .route("/users/{id}", get(handlers::catalog::get_user))
            .route("/users/{id}/votes", get(handlers::catalog::received_votes))
            .route("/achievements", get(handlers::catalog::list_achievements))
            .route("/achievements/{id}", get(handlers::catalog::get_achievement))
            .route("/voting-status", get(handlers::admin::voting_status))
            .route(
                "/admin/settings",
                get(handlers::admin::get_settings).put(handlers::admin::update_settings),
            )
            .route("/admin/credits/reset", post(handlers::admin::reset_credits))
            .route("/admin/credits/give", post(handlers::admin::give_credits));

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .nest("/api/v1", api)
            .layer(TraceLayer::new_for_http())
            .layer(self.cors())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the shutdown token fires.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server exited with error");
            }
        });
        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Connection hub.
    pub fn hub(&self) -> &Hub {
        &self.state.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Cancel everything and wait for the hub and `serve` to finish.
    pub async fn stop(self, serve: JoinHandle<()>) {
        let shutdown = Arc::clone(&self.state.shutdown);
        shutdown
            .graceful_shutdown(vec![serve, self.hub_task], None)
            .await;
    }

    fn cors(&self) -> CorsLayer {
        let origin = match HeaderValue::from_str(&self.config.frontend_url) {
            Ok(v) => AllowOrigin::exact(v),
            Err(_) => {
                warn!(url = %self.config.frontend_url, "invalid frontend url, allowing any origin");
                AllowOrigin::any()
            }
        };
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state
        .store
        .read(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
        .await
        .is_ok();
    Json(health::health_check(
        state.start_time,
        state.hub.connected_count(),
        database,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use rym_core::UserId;
    use rym_core::retry::RetryPolicy;
    use rym_ledger::SharedPolicy;
    use rym_settings::DatabaseSettings;
    use tower::ServiceExt;

    fn make_server(dir: &tempfile::TempDir) -> RymServer {
        let db = DatabaseSettings {
            path: dir.path().join("rym.db").to_string_lossy().into_owned(),
            ..DatabaseSettings::default()
        };
        let store = Store::open(&db, RetryPolicy::default()).unwrap();
        let ledger = CreditLedger::new(store.clone(), SharedPolicy::default());
        let auth = AuthSettings {
            jwt_secret: "test-secret".into(),
            admin_steam_ids: vec![],
        };
        RymServer::new(ServerConfig::default(), store, ledger, auth)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        let (status, json) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
        assert_eq!(json["database"], true);
    }

    #[tokio::test]
    async fn metrics_absent_without_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        let (status, _) = get_json(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        let (status, _) = get_json(server.router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_status_counts_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        let (status, json) = get_json(server.router(), "/api/v1/ws/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["connected_users"], 0);
    }

    #[tokio::test]
    async fn join_player_reports_creation_once() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        let profile = NewUser {
            steam_id: "7656".into(),
            username: "alice".into(),
            ..NewUser::default()
        };
        let (row, created) = server.state().join_player(profile.clone()).await.unwrap();
        assert!(created);
        assert_eq!(row.credits, 0);
        let (_, created) = server.state().join_player(profile).await.unwrap();
        assert!(!created);
    }

    #[tokio::test]
    async fn resolve_player_stores_unknown_steam_id_once() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        // The uid a login service put in the token does not pick the row.
        let claims = Claims::new(UserId::new(77), "7656", "alice", 60);
        let first = server.state().resolve_player(&claims).await.unwrap();
        assert_eq!(first.steam_id, "7656");
        assert_eq!(first.username, "alice");
        assert_eq!(first.credits, 0);
        let again = server.state().resolve_player(&claims).await.unwrap();
        assert_eq!(again.id, first.id);
    }

    #[tokio::test]
    async fn fresh_token_on_empty_database_reaches_credits() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        let token = server
            .state()
            .tokens
            .issue(&Claims::new(UserId::new(1), "7656", "alice", 60))
            .unwrap();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/credits")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["credits"], 0);
    }

    #[tokio::test]
    async fn complete_login_issues_a_token_for_the_stored_row() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        let profile = NewUser {
            steam_id: "7656".into(),
            username: "alice".into(),
            ..NewUser::default()
        };
        let (row, token) = server.state().complete_login(profile).await.unwrap();
        let claims = server.state().tokens.verify(&token).unwrap();
        assert_eq!(claims.uid, row.id.get());
        assert_eq!(claims.steam_id, "7656");
    }

    #[tokio::test]
    async fn stop_ends_hub_and_listener() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(&dir);
        let (addr, serve) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        let shutdown = Arc::clone(server.shutdown());
        server.stop(serve).await;
        assert!(shutdown.is_shutting_down());
    }
}
