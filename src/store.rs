//! Run persistence.
//!
//! Every generation attempt is recorded as a `boq_runs` row so a failed or
//! suspicious BOQ can be audited later: the exact prompt, the raw model
//! response, the parsed rows and every warning raised along the way.
//!
//! The workflow talks to a `RunStore` trait object. Production uses the
//! Postgres store; tests and database-less deployments use the in-memory
//! store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::boq::{BoqRow, BoqRun, RunStatus};
use crate::domain::parameters::CalculationType;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("run {0} not found")]
    NotFound(Uuid),
    #[error("failed to encode parsed rows: {0}")]
    Encoding(#[from] serde_json::Error),
}

// =============================================================================
// Trait surface
// =============================================================================

/// Everything known about a run at the moment it is first persisted, before
/// any provider call has been made.
#[derive(Debug, Clone)]
pub struct RunDraft {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub calculation_type: CalculationType,
    pub prompt_text: String,
    pub inputs_block: String,
    pub token_estimate: i32,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i32,
}

/// Partial update applied when a run reaches a terminal state (or is marked
/// cancelled). `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub retry_count: Option<i32>,
    pub raw_response: Option<String>,
    pub parsed_rows: Option<Vec<BoqRow>>,
    pub validation_warnings: Option<Vec<String>>,
    pub model: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_tokens_used: Option<i64>,
    pub processing_time_ms: Option<i64>,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_draft(&self, draft: RunDraft) -> Result<Uuid, StoreError>;
    async fn update(&self, id: Uuid, patch: RunPatch) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<BoqRun>, StoreError>;
    /// Returns one page of runs for a project, newest first, plus the total
    /// run count for the project.
    async fn list_for_project(
        &self,
        project_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BoqRun>, u64), StoreError>;
}

// =============================================================================
// Postgres store
// =============================================================================

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row for a BOQ run
#[derive(Debug, sqlx::FromRow)]
struct BoqRunRow {
    id: Uuid,
    project_id: Uuid,
    user_id: Uuid,
    calculation_type: String,
    prompt_text: String,
    inputs_block: String,
    token_estimate: i32,
    model: String,
    temperature: f64,
    max_tokens: i32,
    status: String,
    retry_count: i32,
    raw_response: Option<String>,
    parsed_rows: Option<serde_json::Value>,
    validation_warnings: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    total_tokens_used: Option<i64>,
    processing_time_ms: Option<i64>,
}

impl From<BoqRunRow> for BoqRun {
    fn from(row: BoqRunRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            user_id: row.user_id,
            calculation_type: match row.calculation_type.as_str() {
                "HV_String" => CalculationType::HvString,
                "HV_Central" => CalculationType::HvCentral,
                _ => CalculationType::Lv,
            },
            prompt_text: row.prompt_text,
            inputs_block: row.inputs_block,
            token_estimate: row.token_estimate,
            model: row.model,
            temperature: row.temperature,
            max_tokens: row.max_tokens,
            status: row.status.parse().unwrap_or(RunStatus::Pending),
            retry_count: row.retry_count,
            raw_response: row.raw_response,
            parsed_rows: row
                .parsed_rows
                .and_then(|v| serde_json::from_value(v).ok()),
            validation_warnings: row.validation_warnings,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            total_tokens_used: row.total_tokens_used,
            processing_time_ms: row.processing_time_ms,
        }
    }
}

const SELECT_COLUMNS: &str = "\
    id, project_id, user_id, calculation_type, prompt_text, inputs_block, \
    token_estimate, model, temperature, max_tokens, status, retry_count, \
    raw_response, parsed_rows, validation_warnings, created_at, updated_at, \
    completed_at, total_tokens_used, processing_time_ms";

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_draft(&self, draft: RunDraft) -> Result<Uuid, StoreError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO boq_runs
                (project_id, user_id, calculation_type, prompt_text, inputs_block,
                 token_estimate, model, temperature, max_tokens, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
            RETURNING id
            "#,
        )
        .bind(draft.project_id)
        .bind(draft.user_id)
        .bind(draft.calculation_type.as_str())
        .bind(&draft.prompt_text)
        .bind(&draft.inputs_block)
        .bind(draft.token_estimate)
        .bind(&draft.model)
        .bind(draft.temperature)
        .bind(draft.max_tokens)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update(&self, id: Uuid, patch: RunPatch) -> Result<(), StoreError> {
        let parsed_rows = patch
            .parsed_rows
            .map(serde_json::to_value)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE boq_runs SET
                status = COALESCE($2, status),
                retry_count = COALESCE($3, retry_count),
                raw_response = COALESCE($4, raw_response),
                parsed_rows = COALESCE($5, parsed_rows),
                validation_warnings = COALESCE($6, validation_warnings),
                model = COALESCE($7, model),
                completed_at = COALESCE($8, completed_at),
                total_tokens_used = COALESCE($9, total_tokens_used),
                processing_time_ms = COALESCE($10, processing_time_ms),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.retry_count)
        .bind(patch.raw_response)
        .bind(parsed_rows)
        .bind(patch.validation_warnings)
        .bind(patch.model)
        .bind(patch.completed_at)
        .bind(patch.total_tokens_used)
        .bind(patch.processing_time_ms)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BoqRun>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM boq_runs WHERE id = $1");
        let row = sqlx::query_as::<_, BoqRunRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn list_for_project(
        &self,
        project_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BoqRun>, u64), StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM boq_runs WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM boq_runs \
             WHERE project_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, BoqRunRow>(&sql)
            .bind(project_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total as u64))
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Keeps runs in a map. Backs tests and deployments without a database; run
/// history is lost on restart.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<HashMap<Uuid, BoqRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_draft(&self, draft: RunDraft) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let run = BoqRun {
            id,
            project_id: draft.project_id,
            user_id: draft.user_id,
            calculation_type: draft.calculation_type,
            prompt_text: draft.prompt_text,
            inputs_block: draft.inputs_block,
            token_estimate: draft.token_estimate,
            model: draft.model,
            temperature: draft.temperature,
            max_tokens: draft.max_tokens,
            status: RunStatus::Pending,
            retry_count: 0,
            raw_response: None,
            parsed_rows: None,
            validation_warnings: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            total_tokens_used: None,
            processing_time_ms: None,
        };
        self.runs.lock().insert(id, run);
        Ok(id)
    }

    async fn update(&self, id: Uuid, patch: RunPatch) -> Result<(), StoreError> {
        let mut runs = self.runs.lock();
        let run = runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(status) = patch.status {
            run.status = status;
        }
        if let Some(retry_count) = patch.retry_count {
            run.retry_count = retry_count;
        }
        if let Some(raw_response) = patch.raw_response {
            run.raw_response = Some(raw_response);
        }
        if let Some(parsed_rows) = patch.parsed_rows {
            run.parsed_rows = Some(parsed_rows);
        }
        if let Some(warnings) = patch.validation_warnings {
            run.validation_warnings = warnings;
        }
        if let Some(model) = patch.model {
            run.model = model;
        }
        if let Some(completed_at) = patch.completed_at {
            run.completed_at = Some(completed_at);
        }
        if let Some(total) = patch.total_tokens_used {
            run.total_tokens_used = Some(total);
        }
        if let Some(elapsed) = patch.processing_time_ms {
            run.processing_time_ms = Some(elapsed);
        }
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BoqRun>, StoreError> {
        Ok(self.runs.lock().get(&id).cloned())
    }

    async fn list_for_project(
        &self,
        project_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BoqRun>, u64), StoreError> {
        let runs = self.runs.lock();
        let mut matching: Vec<BoqRun> = runs
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::boq::Unit;

    fn draft(project_id: Uuid) -> RunDraft {
        RunDraft {
            project_id,
            user_id: Uuid::new_v4(),
            calculation_type: CalculationType::Lv,
            prompt_text: "prompt".into(),
            inputs_block: "inputs".into(),
            token_estimate: 100,
            model: "OpenAI GPT-4".into(),
            temperature: 0.0,
            max_tokens: 4000,
        }
    }

    #[tokio::test]
    async fn draft_starts_pending_and_patch_completes_it() {
        let store = InMemoryRunStore::new();
        let project = Uuid::new_v4();
        let id = store.create_draft(draft(project)).await.unwrap();

        let run = store.get(id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.parsed_rows.is_none());

        store
            .update(
                id,
                RunPatch {
                    status: Some(RunStatus::Completed),
                    retry_count: Some(1),
                    parsed_rows: Some(vec![BoqRow {
                        description: "Earth Pit".into(),
                        specifications: "3m rod".into(),
                        quantity: 2.0,
                        unit: Unit::Nos,
                    }]),
                    completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let run = store.get(id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.retry_count, 1);
        assert_eq!(run.parsed_rows.unwrap().len(), 1);
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn patching_a_missing_run_is_not_found() {
        let store = InMemoryRunStore::new();
        let err = store
            .update(Uuid::new_v4(), RunPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_pages_newest_first_per_project() {
        let store = InMemoryRunStore::new();
        let project = Uuid::new_v4();
        for _ in 0..3 {
            store.create_draft(draft(project)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        store.create_draft(draft(Uuid::new_v4())).await.unwrap();

        let (page, total) = store.list_for_project(project, 2, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at >= page[1].created_at);

        let (rest, _) = store.list_for_project(project, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
    }
}
