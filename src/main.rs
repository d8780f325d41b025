mod api;
mod app;
mod config;
mod db;
mod domain;
mod error;
mod export;
mod extract;
mod logging;
mod middleware;
mod parser;
mod prompt;
mod routes;
mod services;
mod store;
mod workflow;

use anyhow::Result;
use std::sync::Arc;

use services::CompletionGateway;
use store::{PgRunStore, RunStore};
use workflow::WorkflowEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting BOQ generation backend"
    );

    // Create database pool when configured; without one, runs are served
    // but their history is not persisted.
    let pool = match &settings.database_url {
        Some(url) => {
            let pool = db::create_pool(url, settings.database_max_connections).await?;
            db::run_migrations(&pool).await?;
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, run history disabled");
            None
        }
    };

    let run_store: Option<Arc<dyn RunStore>> = pool
        .clone()
        .map(|pool| Arc::new(PgRunStore::new(pool)) as Arc<dyn RunStore>);

    // Completion gateway for the configured providers
    let gateway = CompletionGateway::new(
        settings.openai_api_key.clone(),
        settings.gemini_api_key.clone(),
        settings.completion_timeout_seconds,
    )?;

    let engine = WorkflowEngine::new(Arc::new(gateway), run_store.clone());

    // Create application state
    let state = app::AppState::new(pool, settings.clone(), engine, run_store);

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
