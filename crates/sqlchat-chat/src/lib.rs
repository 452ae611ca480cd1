//! Conversational query engine for sqlchat.
//!
//! Owns the session and message model, context settings, the presentation
//! transforms, and the orchestrator that drives a question through stage
//! confirmation and the two remote pipeline phases.

pub mod backend;
pub mod chart;
pub mod context;
pub mod error;
pub mod export;
pub mod keys;
pub mod kpi;
pub mod narrative;
pub mod orchestrator;
pub mod prefs;
pub mod presentation;
pub mod response;
pub mod session;
pub mod state;
pub mod types;

pub use backend::{
    ApproveRequest, ApproveResponse, BackendError, IntentRequest, IntentResponse, QueryBackend,
    SqlRequest, SqlResponse,
};
pub use chart::extract_chart_data;
pub use context::{ContextSettings, QueryContext};
pub use error::ChatError;
pub use export::to_csv;
pub use kpi::{KpiDisplay, KpiStrip};
pub use orchestrator::{ApproveOutcome, LastResponse, QueryOrchestrator, RunOutcome, Submission};
pub use prefs::{filter_tables, DemoQuestions, MetricRules, RecentQuestions, TableScope};
pub use presentation::{choose_presentation, Presentation};
pub use session::SessionStore;
pub use state::{PipelinePhase, RunStatus};
pub use types::{Attachment, ChatSession, Message, MessageKind, Role, SessionSummary};
