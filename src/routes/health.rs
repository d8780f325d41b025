use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub openai: String,
    pub gemini: String,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    // Without a configured database runs are kept in memory only; that is a
    // degraded deployment, not an unhealthy one.
    let db_status = match &state.db {
        Some(pool) => {
            if crate::db::health_check(pool).await {
                "ok"
            } else {
                "error"
            }
        }
        None => "disabled",
    };

    let openai_status = if state.settings.openai_api_key.is_some() {
        "configured"
    } else {
        "mock"
    };
    let gemini_status = if state.settings.gemini_api_key.is_some() {
        "configured"
    } else {
        "mock"
    };

    let status = match db_status {
        "ok" => "healthy",
        "disabled" => "degraded",
        _ => "unhealthy",
    };

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: db_status.to_string(),
                openai: openai_status.to_string(),
                gemini: gemini_status.to_string(),
            },
        }),
    )
}
