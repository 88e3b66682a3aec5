//! Router assembly and server execution.

use std::{any::Any, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::{
    error::ApiError,
    handler::{
        ask, audit_verify, get_room_detail, get_rooms, health, metrics, room_websocket_handler,
        synthesize_speech, vault_delete, vault_get, vault_put, voice_ask, voice_session,
        websocket_handler,
    },
    middleware::{authenticate, cors, rate_limit, require_owner},
    signal::shutdown_signal,
    state::AppState,
};

/// Largest accepted request body; sized for recorded voice clips
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);
    ApiError::Internal("internal error".to_string()).into_response()
}

/// Build the full application router.
///
/// Public: `/`, `/health`. Everything else passes authentication, then the
/// per-identity rate limit; `/admin/*` and `/vault/*` also require the owner.
pub fn build_router(state: Arc<AppState>) -> Router {
    let owner = Router::new()
        .route("/admin/metrics", get(metrics))
        .route("/admin/audit/verify", get(audit_verify))
        .route(
            "/vault/{key}",
            get(vault_get).put(vault_put).delete(vault_delete),
        )
        .route_layer(from_fn_with_state(state.clone(), require_owner));

    let protected = Router::new()
        // HTTP エンドポイント
        .route("/ask", post(ask))
        .route("/voice", post(voice_ask))
        .route("/voice/session", post(voice_session))
        .route("/voice/token", post(voice_session))
        .route("/voice/tts", post(synthesize_speech))
        .route("/rooms", get(get_rooms))
        .route("/rooms/{name}", get(get_room_detail))
        // WebSocket エンドポイント
        .route("/ws", get(websocket_handler))
        .route("/room/{name}", get(room_websocket_handler))
        .merge(owner)
        .route_layer(from_fn_with_state(state.clone(), rate_limit))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state.clone())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.cors.clone(), cors))
}

/// CONSIA gateway server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(app_state);
/// server.run("127.0.0.1", 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Bind and serve until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let app = build_router(self.state);

        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("CONSIA gateway listening on {}", listener.local_addr()?);
        tracing::info!("Rooms: ws://{}/ws?room=<name>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
