use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use triage_flow::{
    Collaborators, DispatchController, FlowError, FlowRunner, InMemorySessionStorage,
    PipelineConfig, SessionStorage, SubFlowInput, SubFlowOutcome, SubmissionReport,
    config::SessionConfig,
    subflows::{
        emergency::EMERGENCY, narration::NARRATION, nutrition::NUTRITION, purchase::PURCHASES,
    },
};
use uuid::Uuid;

use crate::models::{AssessmentRequest, AssessmentResponse, SessionResponse};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn conflict_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn upstream_error(message: &str) -> ApiError {
    (StatusCode::BAD_GATEWAY, Json(json!({ "error": message })))
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn flow_error(err: FlowError, session_id: &str) -> ApiError {
    match &err {
        FlowError::Validation(message) => bad_request_error(message),
        FlowError::SessionNotFound(_) => not_found_error("Session not found", session_id),
        FlowError::SubFlowNotFound(id) => not_found_error(&format!("Unknown sub-flow: {id}"), session_id),
        FlowError::SubFlowUnavailable { .. } => {
            conflict_error("Action not available for this session", &err.to_string())
        }
        FlowError::Generation(generation) => upstream_error(&generation.to_string()),
        _ => {
            error!(session_id = %session_id, error = %err, "Request failed");
            internal_error("Request failed", &err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub flow_runner: FlowRunner,
}

impl AppState {
    pub fn new(collaborators: Collaborators, config: &PipelineConfig) -> triage_flow::Result<Self> {
        Self::with_storage(collaborators, config, Arc::new(InMemorySessionStorage::new()))
    }

    pub fn with_storage(
        collaborators: Collaborators,
        config: &PipelineConfig,
        storage: Arc<dyn SessionStorage>,
    ) -> triage_flow::Result<Self> {
        let controller = DispatchController::standard(collaborators, config)?;
        let flow_runner = FlowRunner::new(Arc::new(controller), storage);
        Ok(Self { flow_runner })
    }

    /// Periodically drop sessions idle for longer than the configured ttl
    pub fn spawn_session_sweeper(&self, config: &SessionConfig) -> tokio::task::JoinHandle<()> {
        let runner = self.flow_runner.clone();
        let idle_ttl = config.idle_ttl();
        let mut interval = tokio::time::interval(config.sweep_interval());
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                if let Err(e) = runner.evict_idle(idle_ttl).await {
                    error!(error = %e, "Session sweep failed");
                }
            }
        })
    }
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/assessments", post(create_assessment))
        .route("/sessions", post(create_session))
        .route("/sessions/{session_id}", get(get_session_status))
        .route("/sessions/{session_id}/submit", post(submit_assessment))
        .route("/sessions/{session_id}/narration", post(run_narration))
        .route("/sessions/{session_id}/nutrition", post(run_nutrition))
        .route("/sessions/{session_id}/purchases", post(run_purchases))
        .route("/sessions/{session_id}/emergency", post(run_emergency))
        .route("/sessions/{session_id}/nutrition.pdf", get(export_nutrition_plan))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "AI Health Assistant",
        "version": "1.0.0",
        "description": "Symptom assessment with urgency triage, medication guidance, emergency help and nutrition recommendations",
        "endpoints": {
            "POST /assessments": "Create a session and submit symptoms",
            "POST /sessions": "Create an empty session",
            "GET /sessions/{session_id}": "Get session status and results",
            "POST /sessions/{session_id}/submit": "Submit new symptoms within a session",
            "POST /sessions/{session_id}/narration": "Listen to the assessment",
            "POST /sessions/{session_id}/nutrition": "Generate a personalized nutrition plan",
            "POST /sessions/{session_id}/purchases": "Find where to buy recommended medications",
            "POST /sessions/{session_id}/emergency": "Find nearby medical facilities (emergency assessments only)",
            "GET /sessions/{session_id}/nutrition.pdf": "Download the nutrition plan",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_session(State(state): State<AppState>) -> ApiResult<Value> {
    let session_id = state
        .flow_runner
        .create_session()
        .await
        .map_err(|e| flow_error(e, ""))?;

    Ok(Json(json!({
        "session_id": session_id,
        "status": "created"
    })))
}

async fn create_assessment(
    State(state): State<AppState>,
    Json(request): Json<AssessmentRequest>,
) -> ApiResult<AssessmentResponse> {
    let submit = request
        .into_submit_request()
        .map_err(|message| bad_request_error(&message))?;
    info!("Starting health assessment");

    let (session_id, report) = state
        .flow_runner
        .start(submit)
        .await
        .map_err(|e| flow_error(e, ""))?;

    assessment_response(&state, session_id, report).await
}

async fn submit_assessment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AssessmentRequest>,
) -> ApiResult<AssessmentResponse> {
    let submit = request
        .into_submit_request()
        .map_err(|message| bad_request_error(&message))?;
    info!(session_id = %session_id, "Resubmitting health assessment");

    submit_to_session(&state, &session_id, submit).await
}

async fn submit_to_session(
    state: &AppState,
    session_id: &str,
    submit: triage_flow::SubmitRequest,
) -> ApiResult<AssessmentResponse> {
    let report = state
        .flow_runner
        .submit(session_id, submit)
        .await
        .map_err(|e| flow_error(e, session_id))?;

    assessment_response(state, session_id.to_string(), report).await
}

async fn assessment_response(
    state: &AppState,
    session_id: String,
    report: SubmissionReport,
) -> ApiResult<AssessmentResponse> {
    let session = session_response(state, &session_id).await?;
    Ok(Json(AssessmentResponse {
        session_id,
        report,
        session,
    }))
}

async fn session_response(state: &AppState, session_id: &str) -> Result<SessionResponse, ApiError> {
    let session = state
        .flow_runner
        .session(session_id)
        .await
        .map_err(|e| flow_error(e, session_id))?;

    let available = state
        .flow_runner
        .controller()
        .available_sub_flows(&session.state)
        .into_iter()
        .map(str::to_string)
        .collect();
    Ok(SessionResponse::new(&session, available))
}

async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    info!(session_id = %session_id, "Getting session status");
    Ok(Json(session_response(&state, &session_id).await?))
}

async fn run_sub_flow(
    state: &AppState,
    session_id: &str,
    sub_flow: &str,
    input: Option<Json<SubFlowInput>>,
) -> ApiResult<SubFlowOutcome> {
    let input = input.map(|Json(input)| input).unwrap_or_default();

    let outcome = state
        .flow_runner
        .run_sub_flow(session_id, sub_flow, &input)
        .await
        .map_err(|e| {
            warn!(session_id = %session_id, sub_flow = %sub_flow, error = %e, "Sub-flow failed");
            flow_error(e, session_id)
        })?;
    Ok(Json(outcome))
}

async fn run_narration(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    input: Option<Json<SubFlowInput>>,
) -> ApiResult<SubFlowOutcome> {
    run_sub_flow(&state, &session_id, NARRATION, input).await
}

async fn run_nutrition(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    input: Option<Json<SubFlowInput>>,
) -> ApiResult<SubFlowOutcome> {
    run_sub_flow(&state, &session_id, NUTRITION, input).await
}

async fn run_purchases(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    input: Option<Json<SubFlowInput>>,
) -> ApiResult<SubFlowOutcome> {
    run_sub_flow(&state, &session_id, PURCHASES, input).await
}

async fn run_emergency(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    input: Option<Json<SubFlowInput>>,
) -> ApiResult<SubFlowOutcome> {
    run_sub_flow(&state, &session_id, EMERGENCY, input).await
}

async fn export_nutrition_plan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state
        .flow_runner
        .export_nutrition_plan(&session_id)
        .await
        .map_err(|e| flow_error(e, &session_id))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"personalized_nutrition_plan.pdf\"",
            ),
        ],
        bytes,
    )
        .into_response())
}
