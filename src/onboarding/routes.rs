//! REST endpoints for starting, advancing, and resuming onboarding.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::OnboardingError;

use super::flow_router;
use super::manager::{OnboardingManager, ResumePoint};
use super::model::{OnboardingProgress, SessionContext, StepId};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
}

#[derive(Debug, Deserialize)]
struct CompleteStepRequest {
    step: String,
}

fn status_for(err: &OnboardingError) -> StatusCode {
    match err {
        e if e.is_role_error() => StatusCode::UNPROCESSABLE_ENTITY,
        OnboardingError::InvalidStageTransition { .. } => StatusCode::CONFLICT,
        OnboardingError::NotStarted { .. } => StatusCode::NOT_FOUND,
        OnboardingError::PersistenceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: OnboardingError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, "Onboarding request failed");
    }
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

fn with_step(progress: OnboardingProgress) -> Response {
    match flow_router::route(&progress) {
        Ok(step) => Json(ResumePoint { progress, step }).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/onboarding/{user_id}
///
/// The user's record and the step to render, or 404 if not started.
async fn resume(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.manager.resume(&SessionContext::new(user_id)).await {
        Ok(point) => Json(point).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/onboarding/{user_id}/start
async fn start(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.manager.begin(&SessionContext::new(user_id)).await {
        Ok(progress) => with_step(progress),
        Err(e) => error_response(e),
    }
}

/// POST /api/onboarding/{user_id}/steps
///
/// Body: `{"step": "<step id>"}`. Unknown step ids are 400.
async fn complete_step(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(body): Json<CompleteStepRequest>,
) -> Response {
    let step: StepId = match body.step.parse() {
        Ok(step) => step,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e})),
            )
                .into_response();
        }
    };

    match state
        .manager
        .complete_step(&SessionContext::new(user_id), step)
        .await
    {
        Ok(progress) => with_step(progress),
        Err(e) => error_response(e),
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/{user_id}", get(resume))
        .route("/api/onboarding/{user_id}/start", post(start))
        .route("/api/onboarding/{user_id}/steps", post(complete_step))
        .with_state(state)
}
