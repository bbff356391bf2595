//! HTTP gateway for deskhand.
//!
//! Serves the v1 API (blocking and streaming chat, schedule management,
//! domain event feed) plus a health check. The [`stream`] module holds the
//! streaming gateway that turns one engine run into ordered frames; the
//! HTTP layer only adapts those frames to Server-Sent Events.
//!
//! Built on Axum.

pub mod api_v1;
pub mod sessions;
pub mod stream;

pub use api_v1::{ApiState, SharedApiState, v1_router};
pub use sessions::SessionStore;
pub use stream::{Frame, FrameStream, StreamingGateway};

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, extract::State, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Request bodies above this size are rejected.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// Layers applied:
/// - CORS limited to local origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _request_parts| is_local_origin(origin),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", v1_router(state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn is_local_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    ["http://localhost", "http://127.0.0.1"].iter().any(|prefix| {
        origin
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: SharedApiState) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub tools: usize,
    pub scheduler: bool,
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: (chrono::Utc::now() - state.start_time).num_seconds(),
        tools: state.engine().tools().len(),
        scheduler: state.scheduler.is_some(),
    })
}
