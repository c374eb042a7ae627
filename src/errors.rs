//! Error taxonomy for the coordination engine.

use crate::phase::Phase;
use std::fmt::{Display, Formatter};

/// Errors surfaced by the state store, transition engine, and protocols.
///
/// Audit and status log failures are never represented here; logging is
/// best-effort and swallowed at the call site.
#[derive(Debug, Clone)]
pub enum WorkflowError {
    /// Operation requires an initialized workflow.
    NotInitialized,
    /// A non-terminal workflow already exists and no archive-and-restart
    /// was requested.
    AlreadyActive { id: String },
    /// The requested phase transition is not allowed from the current state.
    InvalidTransition { from: Phase, to: Phase },
    /// The caller's notion of the current phase disagrees with the state.
    NotCurrentPhase {
        claimed: Phase,
        actual: Option<Phase>,
    },
    /// A required exit criterion was not met; the transition did not occur.
    ExitCriteriaNotMet { criterion: String },
    /// The state document changed between read and write; retry.
    StaleWrite { based_on: u64, found: u64 },
    /// The id is already present in the state index.
    DuplicateId { id: String },
    /// The declared decision tier (or conflict shape) lacks the minimum
    /// supporting material.
    InsufficientEvidence { message: String },
    /// The workflow is blocked pending explicit human override.
    WorkflowBlocked,
    /// Open conflicts declare stakes on this transition.
    ConflictsOpen { ids: Vec<String> },
    /// The conflict was already resolved; open a new one referencing it.
    AlreadyResolved { id: String },
    /// Underlying storage failure.
    Storage { message: String },
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "no active workflow; run init first"),
            Self::AlreadyActive { id } => {
                write!(f, "workflow {} is active; archive-and-restart to replace it", id)
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid transition: {} -> {}", from, to)
            }
            Self::NotCurrentPhase { claimed, actual } => match actual {
                Some(actual) => write!(
                    f,
                    "phase {} is not current (current phase is {})",
                    claimed, actual
                ),
                None => write!(f, "phase {} is not current (no phase in progress)", claimed),
            },
            Self::ExitCriteriaNotMet { criterion } => {
                write!(f, "exit criterion not met: {}", criterion)
            }
            Self::StaleWrite { based_on, found } => write!(
                f,
                "stale write: based on revision {}, found {}; re-read and retry",
                based_on, found
            ),
            Self::DuplicateId { id } => write!(f, "duplicate record id: {}", id),
            Self::InsufficientEvidence { message } => {
                write!(f, "insufficient evidence: {}", message)
            }
            Self::WorkflowBlocked => {
                write!(f, "workflow is blocked; explicit unblock required")
            }
            Self::ConflictsOpen { ids } => {
                write!(f, "open conflicts block this transition: {}", ids.join(", "))
            }
            Self::AlreadyResolved { id } => write!(
                f,
                "conflict {} is already resolved; open a new conflict referencing it",
                id
            ),
            Self::Storage { message } => write!(f, "storage failure: {}", message),
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<std::io::Error> for WorkflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage {
            message: e.to_string(),
        }
    }
}
