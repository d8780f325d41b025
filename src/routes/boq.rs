//! BOQ generation routes
//!
//! Run creation is synchronous: the handler drives the full workflow and
//! returns the outcome, success or not, with the persisted run id.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::pagination::{PaginationParams, Paginated};
use crate::api::response::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::domain::boq::{BoqRun, WorkflowOptions};
use crate::domain::parameters::CalculationType;
use crate::domain::snapshot::DesignSnapshot;
use crate::error::ApiError;
use crate::export;
use crate::services::completion::ProviderKind;
use crate::store::RunStore;

fn default_max_retries() -> u32 {
    3
}

fn default_max_tokens() -> u32 {
    4000
}

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub calculation_type: CalculationType,
    pub snapshot: DesignSnapshot,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// POST /projects/:project_id/boq/runs
///
/// Generate a BOQ from a design snapshot.
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    axum::Json(request): axum::Json<CreateRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let options = WorkflowOptions {
        calculation_type: request.calculation_type,
        project_id,
        user_id: request.user_id.unwrap_or_else(Uuid::nil),
        provider: request.provider,
        max_retries: request.max_retries,
        max_tokens: request.max_tokens,
    };

    let result = state
        .engine
        .run_boq_workflow(options, &request.snapshot)
        .await;

    Ok(DataResponse::new(result))
}

fn require_store(state: &AppState) -> Result<&Arc<dyn RunStore>, ApiError> {
    state.run_store.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Run history requires a configured database".to_string())
    })
}

/// GET /boq/runs/:run_id
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let store = require_store(&state)?;
    let run = store
        .get(run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {run_id} not found")))?;
    Ok(DataResponse::new(run))
}

/// GET /projects/:project_id/boq/runs
///
/// List runs for a project, newest first.
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let store = require_store(&state)?;
    let (runs, total) = store
        .list_for_project(project_id, pagination.limit(), pagination.offset())
        .await?;

    Ok(Paginated::<BoqRun>::new(runs, &pagination, total))
}

#[derive(Debug, Deserialize)]
pub struct ExtractSessionRequest {
    pub calculation_type: CalculationType,
    pub snapshot: DesignSnapshot,
}

/// POST /boq/sessions
///
/// Extract parameters from a snapshot without running a generation, so a
/// caller can inspect what the prompt would be built from. The session stays
/// registered until deleted.
pub async fn extract_session(
    State(state): State<Arc<AppState>>,
    axum::Json(request): axum::Json<ExtractSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.sessions.create();
    let parameters = state
        .sessions
        .with_session(&session_id, |session| {
            session.extract_all(&request.snapshot, request.calculation_type)?;
            session.complete(request.calculation_type)
        })
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("session {session_id} vanished")))?
        .map_err(|e| {
            state.sessions.remove(&session_id);
            ApiError::BadRequest(e.to_string())
        })?;

    Ok(DataResponse::new(parameters))
}

/// DELETE /boq/sessions/:session_id
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.sessions.remove(&session_id) {
        Ok(MessageResponse::new(format!("Session {session_id} removed")))
    } else {
        Err(ApiError::NotFound(format!(
            "Session {session_id} not found"
        )))
    }
}

/// GET /boq/runs/:run_id/export.csv
pub async fn export_run_csv(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let store = require_store(&state)?;
    let run = store
        .get(run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {run_id} not found")))?;

    let rows = run.parsed_rows.ok_or_else(|| {
        ApiError::BadRequest(format!("Run {run_id} has no parsed rows to export"))
    })?;
    let csv = export::to_csv(&rows)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("CSV export failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"boq_run_{run_id}.csv\""),
            ),
        ],
        csv,
    ))
}
