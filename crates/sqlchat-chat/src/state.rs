//! Pipeline phase state machine with validated transitions.
//!
//! idle -> awaiting_stage_confirmation -> intent_pending -> query_pending
//! -> presenting -> idle. Every pending phase may drop back to idle when a
//! run is cancelled, superseded, or fails.

use std::fmt;

use serde::Serialize;

use crate::error::ChatError;

/// Where the orchestrator currently is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    #[default]
    Idle,
    AwaitingStageConfirmation,
    IntentPending,
    QueryPending,
    Presenting,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::AwaitingStageConfirmation => "awaiting_stage_confirmation",
            PipelinePhase::IntentPending => "intent_pending",
            PipelinePhase::QueryPending => "query_pending",
            PipelinePhase::Presenting => "presenting",
        }
    }

    /// Whether a remote call may be outstanding in this phase.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            PipelinePhase::IntentPending | PipelinePhase::QueryPending | PipelinePhase::Presenting
        )
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-visible status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Ready,
    AwaitingStage,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Ready => "Ready",
            RunStatus::AwaitingStage => "Choose a stage",
            RunStatus::Running => "Running...",
            RunStatus::Done => "Done",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Validate that a phase transition is allowed.
pub fn validate_transition(from: PipelinePhase, to: PipelinePhase) -> Result<(), ChatError> {
    use PipelinePhase::*;

    let valid = matches!(
        (from, to),
        (Idle, AwaitingStageConfirmation)
            | (AwaitingStageConfirmation, AwaitingStageConfirmation)
            | (AwaitingStageConfirmation, IntentPending)
            | (AwaitingStageConfirmation, Idle)
            | (IntentPending, QueryPending)
            | (IntentPending, Idle)
            | (QueryPending, Presenting)
            | (QueryPending, Idle)
            | (Presenting, Idle)
    );

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition(from, to))
    }
}
