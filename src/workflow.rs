//! End-to-end BOQ generation workflow.
//!
//! One call takes a design snapshot through extraction, prompt assembly, the
//! completion provider, table parsing and persistence. Provider failures and
//! non-compliant responses are retried a bounded number of times; every
//! outcome, including abandonment mid-flight, lands in the run store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::boq::{
    BoqRow, RunStatus, WorkflowMetadata, WorkflowOptions, WorkflowResult,
};
use crate::domain::snapshot::DesignSnapshot;
use crate::extract::ExtractionSession;
use crate::parser::{self, ParseError};
use crate::prompt;
use crate::services::completion::{CompletionResponse, FallbackReason, TextCompletion};
use crate::store::{RunDraft, RunPatch, RunStore};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// Attempt policy
// =============================================================================

/// Decides how the prompt is adjusted between attempts.
pub trait AttemptPolicy: Send + Sync {
    fn prompt_for_attempt(&self, base: &str, attempt: u32) -> String;
}

const COMPLIANCE_PREFIX: &str = "IMPORTANT: Output must be ONLY the table with header \"Description | Specifications | Qty\". No extra text.\n\n";

/// Default policy: the first attempt sends the prompt as assembled, every
/// retry prefixes a format reminder.
pub struct ComplianceReminder;

impl AttemptPolicy for ComplianceReminder {
    fn prompt_for_attempt(&self, base: &str, attempt: u32) -> String {
        if attempt == 0 {
            base.to_string()
        } else {
            format!("{COMPLIANCE_PREFIX}{base}")
        }
    }
}

// =============================================================================
// Draft guard
// =============================================================================

/// Marks the draft row cancelled if the workflow future is dropped before it
/// reaches a terminal state.
struct DraftGuard {
    store: Option<Arc<dyn RunStore>>,
    run_id: Option<Uuid>,
}

impl DraftGuard {
    fn disarm(&mut self) {
        self.run_id = None;
    }
}

impl Drop for DraftGuard {
    fn drop(&mut self) {
        if let (Some(store), Some(id)) = (self.store.take(), self.run_id.take()) {
            tokio::spawn(async move {
                let patch = RunPatch {
                    status: Some(RunStatus::Cancelled),
                    ..Default::default()
                };
                if let Err(e) = store.update(id, patch).await {
                    warn!(run_id = %id, error = %e, "failed to mark abandoned run cancelled");
                }
            });
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

enum AttemptFailure {
    Provider(String),
    Parse {
        error: ParseError,
        response: CompletionResponse,
    },
}

pub struct WorkflowEngine {
    completion: Arc<dyn TextCompletion>,
    store: Option<Arc<dyn RunStore>>,
    policy: Arc<dyn AttemptPolicy>,
    retry_delay: Duration,
}

impl WorkflowEngine {
    pub fn new(completion: Arc<dyn TextCompletion>, store: Option<Arc<dyn RunStore>>) -> Self {
        Self {
            completion,
            store,
            policy: Arc::new(ComplianceReminder),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AttemptPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Runs the full pipeline for one snapshot. Never returns `Err`; every
    /// failure mode is folded into the result so callers get a run id and an
    /// explanation either way.
    #[instrument(skip(self, snapshot), fields(calculation_type = %options.calculation_type))]
    pub async fn run_boq_workflow(
        &self,
        options: WorkflowOptions,
        snapshot: &DesignSnapshot,
    ) -> WorkflowResult {
        let started = Instant::now();
        let provider = options.provider;

        // Extraction failures are terminal before anything is persisted.
        let mut session = ExtractionSession::new();
        let params = match session
            .extract_all(snapshot, options.calculation_type)
            .and_then(|_| session.complete(options.calculation_type))
        {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "parameter extraction failed");
                return self.failure_result(&options, None, started, 0, 0, e.to_string());
            }
        };

        let document = prompt::assemble(&params);
        let inputs_block = prompt::format_inputs_block(&params);
        let token_estimate = prompt::estimate_tokens(document.as_str());

        let mut warnings = Vec::new();
        let soft_limit = prompt::soft_token_limit(provider);
        if token_estimate > soft_limit {
            warnings.push(format!(
                "prompt estimate {token_estimate} tokens exceeds the {soft_limit} soft limit for {provider}"
            ));
        }

        // Persistence is best-effort; generation proceeds without it.
        let run_id = self.persist_draft(&options, &document, &inputs_block, token_estimate).await;
        let mut guard = DraftGuard {
            store: self.store.clone(),
            run_id,
        };

        let mut attempt: u32 = 0;
        let mut last_failure: Option<AttemptFailure> = None;
        let outcome = loop {
            let attempt_prompt = self.policy.prompt_for_attempt(document.as_str(), attempt);
            match self
                .completion
                .complete(provider, &attempt_prompt, options.max_tokens)
                .await
            {
                Ok(response) => match parser::parse_table(&response.text) {
                    Ok(table) => break Some((response, table)),
                    Err(error) => {
                        warn!(attempt, error = %error, "response failed table parse");
                        last_failure = Some(AttemptFailure::Parse { error, response });
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "completion attempt failed");
                    last_failure = Some(AttemptFailure::Provider(e.to_string()));
                }
            }

            if attempt >= options.max_retries {
                break None;
            }
            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        };

        match outcome {
            Some((response, table)) => {
                let raw_row_count = table.raw_row_count;
                warnings.extend(table.warnings);

                // Zero quantities carry no information; drop them but keep
                // the pre-filter count for audit.
                let rows: Vec<BoqRow> =
                    table.rows.into_iter().filter(|r| r.quantity > 0.0).collect();
                if rows.is_empty() {
                    let message = "every parsed row had zero quantity".to_string();
                    self.persist_terminal(
                        run_id,
                        RunStatus::FailedParsing,
                        attempt,
                        Some(response.text),
                        None,
                        warnings.clone(),
                        Some(response.model.clone()),
                        started,
                        response.total_tokens,
                    )
                    .await;
                    guard.disarm();
                    return self.failure_result(
                        &options,
                        run_id,
                        started,
                        attempt,
                        token_estimate,
                        message,
                    );
                }

                if let Some(reason) = response.fallback_reason {
                    warnings.push(match reason {
                        FallbackReason::MissingCredentials => {
                            "no API credentials configured, table is canned sample data".to_string()
                        }
                        FallbackReason::Transport => {
                            "provider unreachable, table is canned sample data".to_string()
                        }
                    });
                }
                warnings.extend(parser::validate_complete(&rows));

                self.persist_terminal(
                    run_id,
                    RunStatus::Completed,
                    attempt,
                    Some(response.text.clone()),
                    Some(rows.clone()),
                    warnings.clone(),
                    Some(response.model.clone()),
                    started,
                    response.total_tokens,
                )
                .await;
                guard.disarm();

                info!(
                    rows = rows.len(),
                    retry_count = attempt,
                    model = %response.model,
                    "BOQ workflow completed"
                );

                WorkflowResult {
                    success: true,
                    run_id: run_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(local_run_id),
                    metadata: WorkflowMetadata {
                        calculation_type: options.calculation_type,
                        model_name: response.model,
                        total_items: rows.len(),
                        raw_row_count,
                        retry_count: attempt,
                        processing_time_ms: started.elapsed().as_millis(),
                        token_estimate,
                        total_tokens_used: response.total_tokens,
                    },
                    rows,
                    error: None,
                    warnings,
                }
            }
            None => {
                let (status, message, raw_response, model) = match last_failure {
                    Some(AttemptFailure::Provider(message)) => (
                        RunStatus::FailedNetwork,
                        format!("completion provider exhausted retries: {message}"),
                        None,
                        None,
                    ),
                    Some(AttemptFailure::Parse { error, response }) => {
                        let status = match (&error, response.fallback_reason) {
                            // A canned table that still fails to parse means
                            // the real problem was the transport.
                            (_, Some(FallbackReason::Transport)) => RunStatus::FailedNetwork,
                            (ParseError::EmptyTable, _) => RunStatus::FailedParsing,
                            (_, _) => RunStatus::FailedLlmNonCompliant,
                        };
                        (
                            status,
                            error.to_string(),
                            Some(response.text),
                            Some(response.model),
                        )
                    }
                    None => (
                        RunStatus::FailedNetwork,
                        "no completion attempt was made".to_string(),
                        None,
                        None,
                    ),
                };

                self.persist_terminal(
                    run_id,
                    status,
                    attempt,
                    raw_response,
                    None,
                    warnings.clone(),
                    model,
                    started,
                    None,
                )
                .await;
                guard.disarm();

                let mut result =
                    self.failure_result(&options, run_id, started, attempt, token_estimate, message);
                result.warnings = warnings;
                result
            }
        }
    }

    async fn persist_draft(
        &self,
        options: &WorkflowOptions,
        document: &prompt::PromptDocument,
        inputs_block: &str,
        token_estimate: usize,
    ) -> Option<Uuid> {
        let store = self.store.as_ref()?;
        let draft = RunDraft {
            project_id: options.project_id,
            user_id: options.user_id,
            calculation_type: options.calculation_type,
            prompt_text: document.as_str().to_string(),
            inputs_block: inputs_block.to_string(),
            token_estimate: token_estimate as i32,
            model: options.provider.display_name().to_string(),
            temperature: 0.0,
            max_tokens: options.max_tokens as i32,
        };
        match store.create_draft(draft).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to persist draft run, continuing without audit");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_terminal(
        &self,
        run_id: Option<Uuid>,
        status: RunStatus,
        retry_count: u32,
        raw_response: Option<String>,
        parsed_rows: Option<Vec<BoqRow>>,
        warnings: Vec<String>,
        model: Option<String>,
        started: Instant,
        total_tokens: Option<u32>,
    ) {
        let (Some(store), Some(id)) = (self.store.as_ref(), run_id) else {
            return;
        };
        let patch = RunPatch {
            status: Some(status),
            retry_count: Some(retry_count as i32),
            raw_response,
            parsed_rows,
            validation_warnings: Some(warnings),
            model,
            completed_at: (status == RunStatus::Completed).then(Utc::now),
            total_tokens_used: total_tokens.map(i64::from),
            processing_time_ms: Some(started.elapsed().as_millis() as i64),
        };
        if let Err(e) = store.update(id, patch).await {
            warn!(run_id = %id, error = %e, "failed to persist terminal run state");
        }
    }

    fn failure_result(
        &self,
        options: &WorkflowOptions,
        run_id: Option<Uuid>,
        started: Instant,
        retry_count: u32,
        token_estimate: usize,
        error: String,
    ) -> WorkflowResult {
        WorkflowResult {
            success: false,
            run_id: run_id
                .map(|id| id.to_string())
                .unwrap_or_else(local_run_id),
            rows: Vec::new(),
            metadata: WorkflowMetadata {
                calculation_type: options.calculation_type,
                model_name: options.provider.display_name().to_string(),
                total_items: 0,
                raw_row_count: 0,
                retry_count,
                processing_time_ms: started.elapsed().as_millis(),
                token_estimate,
                total_tokens_used: None,
            },
            error: Some(error),
            warnings: Vec::new(),
        }
    }
}

/// Run id handed out when the draft could not be persisted.
fn local_run_id() -> String {
    format!("local_{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parameters::CalculationType;
    use crate::services::completion::{CompletionError, CompletionResponse, ProviderKind};
    use crate::store::InMemoryRunStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const VALID_TABLE: &str = "\
Description | Specifications | Qty
DC Earth Pits | 3m × Ø16mm rod | 2 Nos
Earth Grid Strip | 50×6mm Cu | 120 m
Earthing Compound | 25kg bags | 7 Bags";

    enum Scripted {
        Text(&'static str),
        Error,
    }

    struct ScriptedCompletion {
        script: Mutex<Vec<Scripted>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompletion {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextCompletion for ScriptedCompletion {
        async fn complete(
            &self,
            provider: ProviderKind,
            prompt: &str,
            _max_tokens: u32,
        ) -> Result<CompletionResponse, CompletionError> {
            self.prompts.lock().push(prompt.to_string());
            let mut script = self.script.lock();
            match script.remove(0) {
                Scripted::Text(text) => Ok(CompletionResponse {
                    text: text.to_string(),
                    model: provider.display_name().to_string(),
                    total_tokens: Some(1200),
                    fallback_reason: None,
                }),
                Scripted::Error => Err(CompletionError::Transport("connection refused".into())),
            }
        }
    }

    fn options() -> WorkflowOptions {
        WorkflowOptions {
            calculation_type: CalculationType::HvString,
            project_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider: ProviderKind::OpenAi,
            max_retries: 3,
            max_tokens: 4000,
        }
    }

    fn snapshot() -> DesignSnapshot {
        DesignSnapshot {
            manual_inverter_count: Some(8),
            ..Default::default()
        }
    }

    fn engine(
        completion: Arc<ScriptedCompletion>,
        store: Arc<InMemoryRunStore>,
    ) -> WorkflowEngine {
        WorkflowEngine::new(completion, Some(store)).with_retry_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn retries_non_compliant_responses_with_a_reminder() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Scripted::Text("Here is your BOQ, let me explain first."),
            Scripted::Text("Of course! The table follows."),
            Scripted::Text(VALID_TABLE),
        ]));
        let store = Arc::new(InMemoryRunStore::new());
        let result = engine(completion.clone(), store.clone())
            .run_boq_workflow(options(), &snapshot())
            .await;

        assert!(result.success);
        assert_eq!(result.metadata.retry_count, 2);
        assert_eq!(result.rows.len(), 3);

        let prompts = completion.prompts.lock();
        assert!(!prompts[0].starts_with(COMPLIANCE_PREFIX));
        assert!(prompts[1].starts_with(COMPLIANCE_PREFIX));
        assert!(prompts[2].starts_with(COMPLIANCE_PREFIX));

        let run_id: Uuid = result.run_id.parse().unwrap();
        let run = store.get(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.retry_count, 2);
        assert!(run.completed_at.is_some());
        assert_eq!(run.raw_response.as_deref(), Some(VALID_TABLE));
    }

    #[tokio::test]
    async fn zero_quantity_rows_are_filtered_but_counted() {
        let table = "\
Description | Specifications | Qty
DC Earth Pits | 3m rod | 2 Nos
Spare Earth Pits | 3m rod | 0 Nos";
        let completion = Arc::new(ScriptedCompletion::new(vec![Scripted::Text(
            Box::leak(table.to_string().into_boxed_str()),
        )]));
        let store = Arc::new(InMemoryRunStore::new());
        let result = engine(completion, store)
            .run_boq_workflow(options(), &snapshot())
            .await;

        assert!(result.success);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.metadata.raw_row_count, 2);
    }

    #[tokio::test]
    async fn exhausted_non_compliance_fails_the_run_as_non_compliant() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Scripted::Text("no table here"),
            Scripted::Text("still no table"),
            Scripted::Text("nope"),
            Scripted::Text("sorry"),
        ]));
        let store = Arc::new(InMemoryRunStore::new());
        let result = engine(completion, store.clone())
            .run_boq_workflow(options(), &snapshot())
            .await;

        assert!(!result.success);
        assert_eq!(result.metadata.retry_count, 3);
        assert!(result.error.is_some());

        let run_id: Uuid = result.run_id.parse().unwrap();
        let run = store.get(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::FailedLlmNonCompliant);
    }

    #[tokio::test]
    async fn exhausted_transport_errors_fail_as_network() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Scripted::Error,
            Scripted::Error,
            Scripted::Error,
            Scripted::Error,
        ]));
        let store = Arc::new(InMemoryRunStore::new());
        let result = engine(completion, store.clone())
            .run_boq_workflow(options(), &snapshot())
            .await;

        assert!(!result.success);
        let run_id: Uuid = result.run_id.parse().unwrap();
        let run = store.get(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::FailedNetwork);
    }

    #[tokio::test]
    async fn extraction_failure_short_circuits_without_a_draft() {
        let completion = Arc::new(ScriptedCompletion::new(vec![]));
        let store = Arc::new(InMemoryRunStore::new());
        let mut opts = options();
        opts.calculation_type = CalculationType::Lv;
        // An empty snapshot has no AC configuration, so strict LV extraction
        // cannot succeed.
        let result = engine(completion.clone(), store.clone())
            .run_boq_workflow(opts.clone(), &DesignSnapshot::default())
            .await;

        assert!(!result.success);
        assert!(result.run_id.starts_with("local_"));
        assert!(completion.prompts.lock().is_empty());
        let (runs, total) = store.list_for_project(opts.project_id, 10, 0).await.unwrap();
        assert!(runs.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn workflow_without_a_store_still_completes() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Scripted::Text(VALID_TABLE)]));
        let result = WorkflowEngine::new(completion, None)
            .with_retry_delay(Duration::ZERO)
            .run_boq_workflow(options(), &snapshot())
            .await;

        assert!(result.success);
        assert!(result.run_id.starts_with("local_"));
        assert_eq!(result.rows.len(), 3);
    }
}
