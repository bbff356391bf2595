//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`                   - run the engine, return the `ExecutionResult`
//! - `POST   /v1/chat/stream`            - run the engine, stream frames over SSE
//! - `GET    /v1/logs`                   - SSE feed of domain events
//! - `GET    /v1/tools`                  - registered skills
//! - `GET    /v1/models`                 - current model routing
//! - `PUT    /v1/models`                 - replace the model routing
//! - `GET    /v1/schedules`              - list scheduled jobs
//! - `POST   /v1/schedules`              - schedule a job
//! - `GET    /v1/schedules/{id}`         - one job
//! - `DELETE /v1/schedules/{id}`         - delete a job
//! - `POST   /v1/schedules/{id}/pause`   - pause a job
//! - `POST   /v1/schedules/{id}/resume`  - resume a job
//! - `POST   /v1/schedules/{id}/run`     - fire a job now
//! - `GET    /v1/schedules/{id}/logs`    - execution log of a job

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{info, warn};

use deskhand_agent::{ExecutionRequest, ExecutionResult, ReactEngine};
use deskhand_config::EngineConfig;
use deskhand_core::context::{EntityType, is_ghost_session};
use deskhand_core::error::{Error, SchedulerError};
use deskhand_core::event::EventBus;
use deskhand_core::provider::ToolDefinition;
use deskhand_core::schedule::{JobScheduler, ScheduleRequest, ScheduledJob};
use deskhand_providers::ModelRouting;
use deskhand_scheduler::{ExecutionLogRecord, SchedulerService};

use crate::sessions::SessionStore;
use crate::stream::StreamingGateway;

// ── State ─────────────────────────────────────────────────────────────────

/// Session id recorded on jobs created over HTTP without one.
const API_SESSION_ID: &str = "api";

const DEFAULT_LOG_LIMIT: usize = 50;

/// Shared state for the v1 API.
pub struct ApiState {
    pub streaming: StreamingGateway,
    pub scheduler: Option<Arc<SchedulerService>>,
    pub event_bus: Arc<EventBus>,
    pub sessions: SessionStore,
    pub defaults: EngineConfig,
    pub start_time: DateTime<Utc>,
}

impl ApiState {
    pub fn new(engine: Arc<ReactEngine>, event_bus: Arc<EventBus>) -> Self {
        Self {
            streaming: StreamingGateway::new(engine),
            scheduler: None,
            event_bus,
            sessions: SessionStore::new(256, 40),
            defaults: EngineConfig::default(),
            start_time: Utc::now(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<SchedulerService>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_sessions(mut self, max_sessions: usize, history_limit: usize) -> Self {
        self.sessions = SessionStore::new(max_sessions, history_limit);
        self
    }

    pub fn with_defaults(mut self, defaults: EngineConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn engine(&self) -> &Arc<ReactEngine> {
        self.streaming.engine()
    }

    fn scheduler(&self) -> Result<&Arc<SchedulerService>, ApiError> {
        self.scheduler.as_ref().ok_or_else(|| {
            api_error(StatusCode::SERVICE_UNAVAILABLE, "Scheduler is not enabled")
        })
    }
}

pub type SharedApiState = Arc<ApiState>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/logs", get(log_stream_handler))
        .route("/tools", get(list_tools_handler))
        .route("/models", get(get_models_handler).put(update_models_handler))
        .route(
            "/schedules",
            get(list_schedules_handler).post(create_schedule_handler),
        )
        .route(
            "/schedules/{id}",
            get(get_schedule_handler).delete(delete_schedule_handler),
        )
        .route("/schedules/{id}/pause", post(pause_schedule_handler))
        .route("/schedules/{id}/resume", post(resume_schedule_handler))
        .route("/schedules/{id}/run", post(run_schedule_handler))
        .route("/schedules/{id}/logs", get(schedule_logs_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default = "default_true")]
    pub use_tools: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// The failed run, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            result: None,
        }),
    )
}

/// Map a domain error onto a status code.
fn domain_error(err: Error) -> ApiError {
    let status = if err.is_configuration() {
        StatusCode::BAD_REQUEST
    } else if matches!(err, Error::Scheduler(SchedulerError::JobNotFound(_))) {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    api_error(status, err.to_string())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDefinition>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub provider: String,
    pub routing: ModelRouting,
    pub emergency_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<ScheduledJob>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduledResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobStateResponse {
    pub job_id: String,
    pub paused: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobLogResponse {
    pub job_id: String,
    pub records: Vec<ExecutionLogRecord>,
}

/// Turn a chat payload into an engine request for the caller's session.
fn chat_request(state: &ApiState, payload: ChatRequest) -> Result<ExecutionRequest, ApiError> {
    let session_id = payload
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if is_ghost_session(&session_id) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Session id '{session_id}' is reserved for scheduled runs"),
        ));
    }

    let entity_type = payload.entity_type.unwrap_or(EntityType::Human);
    if entity_type == EntityType::Scheduler {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "entity_type 'scheduler' cannot be requested by a client",
        ));
    }

    let mut request = ExecutionRequest::new(payload.message)
        .with_budget(
            payload.max_iterations.unwrap_or(state.defaults.max_iterations),
            payload
                .timeout_seconds
                .unwrap_or(state.defaults.timeout_seconds),
        )
        .with_history(state.sessions.history(&session_id))
        .with_tools_enabled(payload.use_tools);
    request.entity_type = entity_type;
    request.session_id = session_id;
    Ok(request)
}

// ── Chat ──────────────────────────────────────────────────────────────────

/// `POST /v1/chat` - blocking run.
async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let request = chat_request(&state, payload)?;
    info!(session_id = %request.session_id, "v1/chat request");

    let prompt = request.prompt.clone();
    let result = state
        .engine()
        .execute(request)
        .await
        .map_err(domain_error)?;

    if result.termination_reason.is_failure() {
        warn!(session_id = %result.session_id, "v1/chat run failed");
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "engine failure".into()),
                result: Some(result),
            }),
        ));
    }

    state
        .sessions
        .record_turn(&result.session_id, &prompt, &result.response);
    Ok(Json(result))
}

/// `POST /v1/chat/stream` - the same run, delivered as SSE frames.
///
/// Each SSE event is named after the frame type and carries the whole
/// frame as JSON.
async fn chat_stream_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let request = chat_request(&state, payload)?;
    info!(session_id = %request.session_id, "v1/chat/stream SSE request");

    let prompt = request.prompt.clone();
    let stream = state.streaming.stream(request);

    let history_state = Arc::clone(&state);
    let outcome = stream.outcome;
    tokio::spawn(async move {
        if let Ok(Some(result)) = outcome.await {
            if !result.termination_reason.is_failure() {
                history_state
                    .sessions
                    .record_turn(&result.session_id, &prompt, &result.response);
            }
        }
    });

    let events = ReceiverStream::new(stream.frames).map(|frame| {
        let data = serde_json::to_string(&frame).unwrap_or_default();
        Ok(SseEvent::default().event(frame.frame_type).data(data))
    });

    Ok(Sse::new(events))
}

// ── SSE Log Stream ────────────────────────────────────────────────────────

/// `GET /v1/logs` - SSE stream of domain events.
async fn log_stream_handler(
    State(state): State<SharedApiState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.event_bus.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.event_type()).data(data))
        });

    Sse::new(stream)
}

// ── Tools & Models ────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolListResponse> {
    let tools = state.engine().tools().definitions();
    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}

async fn get_models_handler(State(state): State<SharedApiState>) -> Json<ModelsResponse> {
    let gateway = state.engine().gateway();
    Json(ModelsResponse {
        provider: gateway.provider_name().to_string(),
        routing: gateway.routing(),
        emergency_active: gateway.emergency_active(),
    })
}

/// `PUT /v1/models` - runs already in flight keep their selection.
async fn update_models_handler(
    State(state): State<SharedApiState>,
    Json(routing): Json<ModelRouting>,
) -> Result<Json<ModelsResponse>, ApiError> {
    if routing.primary.trim().is_empty() || routing.fast.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "primary and fast model ids must not be empty",
        ));
    }
    if !(0.0..=2.0).contains(&routing.temperature) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("temperature must be within 0..=2, got {}", routing.temperature),
        ));
    }

    let gateway = state.engine().gateway();
    gateway.set_routing(routing);
    Ok(Json(ModelsResponse {
        provider: gateway.provider_name().to_string(),
        routing: gateway.routing(),
        emergency_active: gateway.emergency_active(),
    }))
}

// ── Schedules ─────────────────────────────────────────────────────────────

async fn list_schedules_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<JobListResponse>, ApiError> {
    let jobs = state.scheduler()?.list().await.map_err(domain_error)?;
    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}

async fn create_schedule_handler(
    State(state): State<SharedApiState>,
    Json(mut request): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledResponse>), ApiError> {
    let scheduler = state.scheduler()?;
    if request.session_id.trim().is_empty() {
        request.session_id = API_SESSION_ID.into();
    }
    if is_ghost_session(&request.session_id) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Session id '{}' is reserved for scheduled runs", request.session_id),
        ));
    }

    let job_id = scheduler.schedule(request).await.map_err(domain_error)?;
    info!(job_id = %job_id, "Job scheduled over HTTP");
    Ok((StatusCode::CREATED, Json(ScheduledResponse { job_id })))
}

async fn get_schedule_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<ScheduledJob>, ApiError> {
    state
        .scheduler()?
        .get(&id)
        .await
        .map_err(domain_error)?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Job not found: {id}")))
}

async fn delete_schedule_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .scheduler()?
        .delete(&id)
        .await
        .map_err(domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn pause_schedule_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<JobStateResponse>, ApiError> {
    state.scheduler()?.pause(&id).await.map_err(domain_error)?;
    Ok(Json(JobStateResponse {
        job_id: id,
        paused: true,
    }))
}

async fn resume_schedule_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<JobStateResponse>, ApiError> {
    state.scheduler()?.resume(&id).await.map_err(domain_error)?;
    Ok(Json(JobStateResponse {
        job_id: id,
        paused: false,
    }))
}

/// `POST /v1/schedules/{id}/run` - fire now and wait for the ghost run.
async fn run_schedule_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionLogRecord>, ApiError> {
    let scheduler = state.scheduler()?;
    let record = scheduler
        .on_fire(&id, Arc::clone(state.engine()))
        .await
        .map_err(domain_error)?;
    Ok(Json(record))
}

async fn schedule_logs_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<JobLogResponse>, ApiError> {
    let scheduler = state.scheduler()?;
    let records = scheduler
        .log()
        .for_job(&id, query.limit.unwrap_or(DEFAULT_LOG_LIMIT));

    // A deleted job keeps its history; only a job never seen is unknown.
    if records.is_empty() && scheduler.get(&id).await.map_err(domain_error)?.is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Job not found: {id}"),
        ));
    }
    Ok(Json(JobLogResponse {
        job_id: id,
        records,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────
