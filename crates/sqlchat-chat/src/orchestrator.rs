//! Query orchestrator.
//!
//! Drives a question through stage confirmation, the two remote phases and
//! presentation, appending messages to the session the question was asked
//! in. All state sits behind one mutex that is never held across an await;
//! every run carries its own cancellation token and id, and a run only
//! mutates state while it is still the active run.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sqlchat_core::config::ChatConfig;
use sqlchat_core::{KeyValueStore, Region, StageBucket, StageOption};

use crate::backend::{ApproveRequest, BackendError, IntentRequest, QueryBackend, SqlRequest, SqlResponse};
use crate::context::{ContextSettings, QueryContext};
use crate::error::ChatError;
use crate::export::to_csv;
use crate::kpi::KpiDisplay;
use crate::narrative;
use crate::prefs::{RecentQuestions, TableScope};
use crate::presentation::{choose_presentation, presentation_hint, Presentation};
use crate::response::{compose_message, summarize_rows, validate_sql};
use crate::session::SessionStore;
use crate::state::{validate_transition, PipelinePhase, RunStatus};
use crate::types::{ChatSession, Message, SessionSummary, TableData};

/// Characters of the final answer quoted in approval notes.
const APPROVE_NOTES_CHARS: usize = 300;

// =============================================================================
// Public result types
// =============================================================================

/// A question accepted and waiting for a stage choice.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub session_id: Uuid,
    pub prompt_id: Uuid,
    pub options: Vec<StageOption>,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        kind: Presentation,
        answer: String,
        elapsed_ms: u64,
        lint: Vec<String>,
    },
    Failed {
        message: String,
    },
    /// Aborted by [`QueryOrchestrator::cancel`].
    Cancelled,
    /// Replaced by a newer question before it finished.
    Superseded,
}

/// Result of approving the latest run as an example.
#[derive(Debug, Clone, PartialEq)]
pub enum ApproveOutcome {
    Saved { id: Value },
    NothingToApprove,
}

/// Scope sent alongside a question, recorded for debugging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiScope {
    pub scope_tables: Vec<String>,
    #[serde(flatten)]
    pub context: QueryContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPayload {
    pub query: String,
    pub ui: UiScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Value>,
}

/// Snapshot of the most recent run that got a response. Memory only.
#[derive(Debug, Clone, PartialEq)]
pub struct LastResponse {
    pub ok: bool,
    pub status: u16,
    pub data: Value,
    pub payload: RunPayload,
    pub at: DateTime<Utc>,
    /// Final answer text of a successful run.
    pub answer: Option<String>,
    pub sql: Option<String>,
    pub route_used: Option<String>,
    pub table: Option<TableData>,
}

// =============================================================================
// Internal state
// =============================================================================

struct PendingQuery {
    question: String,
    session_id: Uuid,
    prompt_id: Uuid,
}

struct ActiveRun {
    id: u64,
    token: CancellationToken,
}

/// Everything a run needs once it leaves the lock.
struct RunTicket {
    id: u64,
    token: CancellationToken,
    session_id: Uuid,
    question: String,
    context: QueryContext,
    payload: RunPayload,
    started: Instant,
}

#[derive(Clone, Copy)]
enum Step {
    Intent,
    Query,
}

impl Step {
    fn fallback_message(self) -> &'static str {
        match self {
            Step::Intent => "Intent step failed",
            Step::Query => "Error",
        }
    }
}

struct Inner {
    sessions: SessionStore,
    context: ContextSettings,
    recents: RecentQuestions,
    scope: TableScope,
    phase: PipelinePhase,
    status: RunStatus,
    pending: Option<PendingQuery>,
    active_run: Option<ActiveRun>,
    /// Run most recently aborted through `cancel`.
    user_cancelled: Option<u64>,
    next_run_id: u64,
    last_response: Option<LastResponse>,
}

impl Inner {
    fn transition(&mut self, to: PipelinePhase) -> Result<(), ChatError> {
        validate_transition(self.phase, to)?;
        debug!(from = %self.phase, to = %to, "Pipeline transition");
        self.phase = to;
        Ok(())
    }

    fn reset_to_idle(&mut self) {
        if self.phase != PipelinePhase::Idle {
            debug!(from = %self.phase, "Pipeline reset to idle");
            self.phase = PipelinePhase::Idle;
        }
    }

    fn is_current(&self, run_id: u64) -> bool {
        self.active_run.as_ref().is_some_and(|r| r.id == run_id)
    }

    /// Outcome for a run that lost its slot while suspended.
    fn stale_outcome(&self, run_id: u64) -> RunOutcome {
        if self.user_cancelled == Some(run_id) {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Superseded
        }
    }

    /// Invalidate the in-flight run, if any, before a new question takes
    /// its place.
    fn supersede_active(&mut self) {
        if let Some(run) = self.active_run.take() {
            run.token.cancel();
            info!(run_id = run.id, "Run superseded");
            self.reset_to_idle();
        }
    }

    /// Drop a question still waiting for its stage, removing its prompt.
    fn drop_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            if let Err(e) = self
                .sessions
                .remove_stage_prompt(pending.session_id, pending.prompt_id)
            {
                debug!(error = %e, "Stage prompt already gone");
            }
        }
    }

    fn append(&mut self, session_id: Uuid, message: Message) {
        if let Err(e) = self.sessions.push_message(session_id, message) {
            warn!(session_id = %session_id, error = %e, "Failed to append message");
        }
    }

    fn finish(&mut self, status: RunStatus) {
        self.active_run = None;
        self.reset_to_idle();
        self.status = status;
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct QueryOrchestrator {
    backend: Arc<dyn QueryBackend>,
    config: ChatConfig,
    inner: Mutex<Inner>,
}

impl QueryOrchestrator {
    /// Load persisted sessions and settings from `store`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn QueryBackend>,
        config: ChatConfig,
    ) -> Result<Self, ChatError> {
        let inner = Inner {
            sessions: SessionStore::load(store.clone())?,
            context: ContextSettings::load(store.clone()),
            recents: RecentQuestions::load(store.clone()),
            scope: TableScope::load(store),
            phase: PipelinePhase::Idle,
            status: RunStatus::Ready,
            pending: None,
            active_run: None,
            user_cancelled: None,
            next_run_id: 1,
            last_response: None,
        };
        Ok(Self {
            backend,
            config,
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ChatError> {
        self.inner
            .lock()
            .map_err(|e| ChatError::Storage(format!("orchestrator lock poisoned: {}", e)))
    }

    // ---- Question flow ----

    /// Accept a question and ask which stage scope to use.
    ///
    /// Never issues a remote call. Any in-flight run is cancelled and any
    /// question still waiting for a stage is replaced, its prompt removed.
    pub fn submit(&self, question: &str) -> Result<Submission, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        if question.chars().count() > self.config.max_question_length {
            return Err(ChatError::QuestionTooLong(self.config.max_question_length));
        }

        let mut inner = self.lock()?;
        inner.supersede_active();
        inner.drop_pending();

        let session_id = inner.sessions.ensure_active()?;
        inner.sessions.push_message(session_id, Message::user(question))?;
        inner.recents.add(question)?;

        let prompt = Message::stage_prompt();
        let options = StageBucket::options();
        let prompt_id = inner.sessions.push_message(session_id, prompt)?;

        inner.transition(PipelinePhase::AwaitingStageConfirmation)?;
        inner.pending = Some(PendingQuery {
            question: question.to_string(),
            session_id,
            prompt_id,
        });
        inner.status = RunStatus::AwaitingStage;
        debug!(session_id = %session_id, "Question awaiting stage selection");

        Ok(Submission {
            session_id,
            prompt_id,
            options,
        })
    }

    /// Record the chosen stage and run the pending question.
    pub async fn resolve_stage(&self, stage: StageBucket) -> Result<RunOutcome, ChatError> {
        let ticket = self.begin_run(stage)?;
        Ok(self.run_pipeline(ticket).await)
    }

    /// Like [`resolve_stage`](Self::resolve_stage) for an external string;
    /// unknown values are coerced to the default stage.
    pub async fn resolve_stage_raw(&self, raw: &str) -> Result<RunOutcome, ChatError> {
        self.resolve_stage(StageBucket::parse_lenient(raw)).await
    }

    fn begin_run(&self, stage: StageBucket) -> Result<RunTicket, ChatError> {
        let mut inner = self.lock()?;
        if inner.phase != PipelinePhase::AwaitingStageConfirmation || inner.pending.is_none() {
            return Err(ChatError::NoPendingQuestion);
        }
        inner.context.set_stage(stage)?;
        let pending = inner.pending.take().ok_or(ChatError::NoPendingQuestion)?;
        if let Err(e) = inner
            .sessions
            .remove_stage_prompt(pending.session_id, pending.prompt_id)
        {
            warn!(error = %e, "Stage prompt missing on resolve");
        }

        inner.supersede_active();
        inner.transition(PipelinePhase::IntentPending)?;
        let id = inner.next_run_id;
        inner.next_run_id += 1;
        let token = CancellationToken::new();
        inner.active_run = Some(ActiveRun {
            id,
            token: token.clone(),
        });
        inner.status = RunStatus::Running;

        let context = inner.context.snapshot();
        let payload = RunPayload {
            query: pending.question.clone(),
            ui: UiScope {
                scope_tables: inner.scope.selected().to_vec(),
                context,
            },
            intent: None,
        };
        info!(run_id = id, stage = %stage, "Pipeline started");

        Ok(RunTicket {
            id,
            token,
            session_id: pending.session_id,
            question: pending.question,
            context,
            payload,
            started: Instant::now(),
        })
    }

    /// Await `fut` unless the run's token fires first. The losing future is
    /// dropped, which aborts the underlying request.
    async fn guarded<T, F>(token: &CancellationToken, fut: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(BackendError::Cancelled),
            result = fut => result,
        }
    }

    async fn run_pipeline(&self, mut ticket: RunTicket) -> RunOutcome {
        let intent_request = IntentRequest {
            query: ticket.question.clone(),
            context: ticket.context,
        };
        let intent = match Self::guarded(&ticket.token, self.backend.resolve_intent(&intent_request)).await {
            Ok(resp) => resp,
            Err(e) => return self.finish_failed(&ticket, Step::Intent, e),
        };

        let route = intent.resolved_route();
        debug!(run_id = ticket.id, route = %route, "Intent resolved");
        ticket.payload.intent = Some(intent.intent.clone());
        if let Err(outcome) = self.advance(&ticket, PipelinePhase::QueryPending) {
            return outcome;
        }

        let sql_request = SqlRequest {
            intent: intent.intent,
            route,
            question: ticket.question.clone(),
            context: ticket.context,
            include_narrative: true,
        };
        let response = match Self::guarded(&ticket.token, self.backend.generate_sql(&sql_request)).await {
            Ok(resp) => resp,
            Err(e) => return self.finish_failed(&ticket, Step::Query, e),
        };

        self.present(ticket, &sql_request.intent, response)
    }

    /// Move a still-current run to `to`; a stale run gets its outcome back.
    fn advance(&self, ticket: &RunTicket, to: PipelinePhase) -> Result<(), RunOutcome> {
        let mut inner = match self.lock() {
            Ok(inner) => inner,
            Err(e) => {
                return Err(RunOutcome::Failed {
                    message: e.to_string(),
                })
            }
        };
        if !inner.is_current(ticket.id) {
            return Err(inner.stale_outcome(ticket.id));
        }
        if let Err(e) = inner.transition(to) {
            warn!(run_id = ticket.id, error = %e, "Unexpected pipeline phase");
            inner.finish(RunStatus::Failed);
            return Err(RunOutcome::Failed {
                message: e.to_string(),
            });
        }
        Ok(())
    }

    fn finish_failed(&self, ticket: &RunTicket, step: Step, err: BackendError) -> RunOutcome {
        let mut inner = match self.lock() {
            Ok(inner) => inner,
            Err(e) => {
                return RunOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };
        if !inner.is_current(ticket.id) {
            return inner.stale_outcome(ticket.id);
        }
        if err == BackendError::Cancelled {
            info!(run_id = ticket.id, "Run cancelled by transport");
            inner.finish(RunStatus::Cancelled);
            return RunOutcome::Cancelled;
        }

        let message = match &err {
            BackendError::Business { .. } => err
                .server_message()
                .unwrap_or(step.fallback_message())
                .to_string(),
            other => other.to_string(),
        };
        if let BackendError::Business { status, body, .. } = &err {
            let sql = body.get("sql").and_then(Value::as_str).map(str::to_string);
            inner.last_response = Some(LastResponse {
                ok: false,
                status: *status,
                data: body.clone(),
                payload: ticket.payload.clone(),
                at: Utc::now(),
                answer: None,
                sql,
                route_used: None,
                table: None,
            });
        }

        warn!(run_id = ticket.id, error = %err, "Pipeline failed");
        inner.append(ticket.session_id, Message::assistant(message.clone()));
        inner.finish(RunStatus::Failed);
        RunOutcome::Failed { message }
    }

    fn present(&self, ticket: RunTicket, intent: &Value, response: SqlResponse) -> RunOutcome {
        let mut inner = match self.lock() {
            Ok(inner) => inner,
            Err(e) => {
                return RunOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };
        if !inner.is_current(ticket.id) {
            return inner.stale_outcome(ticket.id);
        }
        if let Err(e) = inner.transition(PipelinePhase::Presenting) {
            warn!(run_id = ticket.id, error = %e, "Unexpected pipeline phase");
            inner.finish(RunStatus::Failed);
            return RunOutcome::Failed {
                message: e.to_string(),
            };
        }

        let currency = ticket.context.currency;
        let narrative = response
            .narrative
            .as_deref()
            .map(narrative::normalize)
            .unwrap_or_default();
        let answer = if narrative.is_empty() {
            summarize_rows(&response.columns, &response.rows, currency)
        } else {
            narrative
        };

        let table = TableData {
            columns: response.columns.clone(),
            rows: response.rows.clone(),
        };
        let wanted = choose_presentation(&ticket.question, presentation_hint(intent));
        let (kind, message) = compose_message(wanted, &table, &answer);
        let sql = response.sql.clone().unwrap_or_default();
        let lint = validate_sql(&sql);
        let elapsed_ms = ticket.started.elapsed().as_millis() as u64;

        inner.last_response = Some(LastResponse {
            ok: true,
            status: 200,
            data: serde_json::to_value(&response).unwrap_or_default(),
            payload: ticket.payload,
            at: Utc::now(),
            answer: Some(answer.clone()),
            sql: response.sql,
            route_used: response.route_used,
            table: Some(table),
        });
        inner.append(ticket.session_id, message);
        inner.finish(RunStatus::Done);
        info!(run_id = ticket.id, kind = %kind, elapsed_ms, "Run completed");

        RunOutcome::Completed {
            kind,
            answer,
            elapsed_ms,
            lint,
        }
    }

    /// Abort the in-flight run, or drop a question waiting for its stage.
    /// Returns whether there was anything to cancel.
    pub fn cancel(&self) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        if let Some(run) = inner.active_run.take() {
            run.token.cancel();
            inner.user_cancelled = Some(run.id);
            inner.finish(RunStatus::Cancelled);
            info!(run_id = run.id, "Run cancelled");
            return true;
        }
        if inner.pending.is_some() {
            inner.drop_pending();
            inner.finish(RunStatus::Cancelled);
            info!("Pending question cancelled");
            return true;
        }
        false
    }

    // ---- State accessors ----

    pub fn phase(&self) -> PipelinePhase {
        self.lock().map(|i| i.phase).unwrap_or_default()
    }

    pub fn status(&self) -> RunStatus {
        self.lock().map(|i| i.status).unwrap_or_default()
    }

    pub fn pending_question(&self) -> Option<String> {
        self.lock()
            .ok()
            .and_then(|i| i.pending.as_ref().map(|p| p.question.clone()))
    }

    pub fn last_response(&self) -> Option<LastResponse> {
        self.lock().ok().and_then(|i| i.last_response.clone())
    }

    pub fn context(&self) -> QueryContext {
        self.lock().map(|i| i.context.snapshot()).unwrap_or_default()
    }

    pub fn recents(&self) -> Vec<String> {
        self.lock().map(|i| i.recents.items().to_vec()).unwrap_or_default()
    }

    pub fn active_session(&self) -> Option<ChatSession> {
        self.lock().ok().and_then(|i| i.sessions.active().cloned())
    }

    pub fn session(&self, id: Uuid) -> Option<ChatSession> {
        self.lock().ok().and_then(|i| i.sessions.get(id).cloned())
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.lock().map(|i| i.sessions.summaries()).unwrap_or_default()
    }

    // ---- Sessions ----

    /// Create and activate a session, greeting it when enabled.
    pub fn new_session(&self) -> Result<Uuid, ChatError> {
        let mut inner = self.lock()?;
        let id = inner.sessions.new_session()?;
        if self.config.welcome_messages {
            inner.sessions.show_welcome(id)?;
        }
        Ok(id)
    }

    /// Greet the active session if it has not been greeted yet.
    pub fn greet_active(&self) -> Result<bool, ChatError> {
        if !self.config.welcome_messages {
            return Ok(false);
        }
        let mut inner = self.lock()?;
        let id = inner.sessions.ensure_active()?;
        inner.sessions.show_welcome(id)
    }

    pub fn activate(&self, id: Uuid) -> Result<(), ChatError> {
        self.lock()?.sessions.activate(id)
    }

    pub fn rename(&self, id: Uuid, name: &str) -> Result<(), ChatError> {
        self.lock()?.sessions.rename(id, name)
    }

    /// Delete every session, cancelling any run or pending question.
    pub fn clear_all(&self) -> Result<(), ChatError> {
        let mut inner = self.lock()?;
        inner.supersede_active();
        inner.pending = None;
        inner.reset_to_idle();
        inner.status = RunStatus::Ready;
        inner.sessions.clear_all()
    }

    // ---- Context and scope ----

    pub fn set_region(&self, region: Region) -> Result<QueryContext, ChatError> {
        let mut inner = self.lock()?;
        inner.context.set_region(region)?;
        Ok(inner.context.snapshot())
    }

    pub fn set_stage(&self, stage: StageBucket) -> Result<QueryContext, ChatError> {
        let mut inner = self.lock()?;
        inner.context.set_stage(stage)?;
        Ok(inner.context.snapshot())
    }

    pub fn selected_tables(&self) -> Vec<String> {
        self.lock().map(|i| i.scope.selected().to_vec()).unwrap_or_default()
    }

    pub fn toggle_table(&self, table: &str) -> Result<bool, ChatError> {
        self.lock()?.scope.toggle(table)
    }

    /// Available tables, or an empty list when the service is unreachable.
    pub async fn list_tables(&self) -> Vec<String> {
        match self.backend.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                warn!(error = %e, "Failed to list tables");
                Vec::new()
            }
        }
    }

    /// KPI strip for the current context. Never fails.
    pub async fn refresh_kpis(&self) -> KpiDisplay {
        let context = self.context();
        match self.backend.kpi_strip(&context).await {
            Ok(strip) => KpiDisplay::from_strip(&strip, context.currency),
            Err(e) => {
                warn!(error = %e, "Failed to fetch KPI strip");
                KpiDisplay::unavailable()
            }
        }
    }

    // ---- Last response actions ----

    /// Save the latest successful run as an approved example.
    pub async fn approve_latest(&self) -> Result<ApproveOutcome, ChatError> {
        let request = {
            let inner = self.lock()?;
            let Some(last) = inner.last_response.as_ref().filter(|l| l.ok) else {
                return Ok(ApproveOutcome::NothingToApprove);
            };
            let question = last.payload.query.trim().to_string();
            let sql = last.sql.as_deref().unwrap_or_default().trim().to_string();
            if question.is_empty() || sql.is_empty() {
                return Ok(ApproveOutcome::NothingToApprove);
            }
            let route = last
                .route_used
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or("unknown_route");
            let ctx = last.payload.ui.context;
            let answer: String = last
                .answer
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(APPROVE_NOTES_CHARS)
                .collect();
            ApproveRequest {
                question,
                sql,
                tags: vec![
                    "approved".to_string(),
                    route.to_string(),
                    ctx.region.code().to_string(),
                    ctx.currency.code().to_string(),
                    ctx.stage.as_str().to_string(),
                ],
                notes: format!("Approved from sqlchat. Final answer: {}", answer),
            }
        };

        let resp = self
            .backend
            .approve_example(&request)
            .await
            .map_err(|e| ChatError::Backend(e.to_string()))?;
        info!(id = %resp.id, "Example approved");
        Ok(ApproveOutcome::Saved { id: resp.id })
    }

    /// CSV of the latest successful result.
    pub fn export_csv(&self) -> Option<String> {
        let inner = self.lock().ok()?;
        let table = inner.last_response.as_ref()?.table.as_ref()?;
        Some(to_csv(&table.columns, &table.rows))
    }

    /// Pretty JSON of the latest request and response.
    pub fn debug_bundle(&self) -> Option<String> {
        let inner = self.lock().ok()?;
        let last = inner.last_response.as_ref()?;
        let bundle = json!({
            "at": last.at,
            "payload": last.payload,
            "response": last.data,
        });
        serde_json::to_string_pretty(&bundle).ok()
    }
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("phase", &self.phase())
            .field("status", &self.status())
            .finish()
    }
}
