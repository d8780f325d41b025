pub mod boq;
pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Generation runs (nested under projects)
        .route("/projects/:project_id/boq/runs", post(boq::create_run))
        .route("/projects/:project_id/boq/runs", get(boq::list_runs))
        // Run lookup and export
        .route("/boq/runs/:run_id", get(boq::get_run))
        .route("/boq/runs/:run_id/export.csv", get(boq::export_run_csv))
        // Extraction sessions (parameter preview without a generation run)
        .route("/boq/sessions", post(boq::extract_session))
        .route("/boq/sessions/:session_id", delete(boq::delete_session))
}
