//! Conflict categorization, scoped escalation, and single-shot
//! resolution.
//!
//! Escalation is mandatory: once opened, a conflict blocks phase
//! transitions whose exit its declared stakes affect, and only those;
//! conflicts are scoped, not global locks. A conflict resolves exactly
//! once. A later disagreement opens a new conflict referencing the old
//! one rather than reopening it.

use crate::audit::{AuditEntry, AuditLog};
use crate::errors::{Result, WorkflowError};
use crate::fsio;
use crate::paths::PicPaths;
use crate::phase::Phase;
use crate::state_store::{RecordKind, StateStore};
use crate::status_log::{StatusCategory, StatusLog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Conflict categories: A technical, B scope, C priority, D process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCategory {
    Technical,
    Scope,
    Priority,
    Process,
}

impl ConflictCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictCategory::Technical => "technical",
            ConflictCategory::Scope => "scope",
            ConflictCategory::Priority => "priority",
            ConflictCategory::Process => "process",
        }
    }

    /// Single-letter label used in summaries.
    pub fn letter(&self) -> char {
        match self {
            ConflictCategory::Technical => 'A',
            ConflictCategory::Scope => 'B',
            ConflictCategory::Priority => 'C',
            ConflictCategory::Process => 'D',
        }
    }
}

impl std::str::FromStr for ConflictCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "technical" | "a" | "A" => Ok(ConflictCategory::Technical),
            "scope" | "b" | "B" => Ok(ConflictCategory::Scope),
            "priority" | "c" | "C" => Ok(ConflictCategory::Priority),
            "process" | "d" | "D" => Ok(ConflictCategory::Process),
            other => Err(format!("unknown conflict category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    PositionA,
    PositionB,
    Synthesis,
}

impl std::str::FromStr for ResolutionOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "position-a" | "a" => Ok(ResolutionOutcome::PositionA),
            "position-b" | "b" => Ok(ResolutionOutcome::PositionB),
            "synthesis" => Ok(ResolutionOutcome::Synthesis),
            other => Err(format!("unknown resolution outcome: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub holder: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: ResolutionOutcome,
    /// The chosen position, or the synthesized one.
    pub chosen_position: String,
    pub rationale: String,
    pub decider: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: String,
    pub category: ConflictCategory,
    pub status: ConflictStatus,
    pub positions: Vec<Position>,
    /// Phases whose exit this conflict blocks while open.
    pub stakes: Vec<Phase>,
    pub phase: Phase,
    pub opened_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Id of an earlier, resolved conflict this one reopens the
    /// disagreement of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConflictInput {
    pub category: ConflictCategory,
    pub positions: Vec<Position>,
    pub stakes: Vec<Phase>,
    pub supersedes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolutionInput {
    pub outcome: ResolutionOutcome,
    pub chosen_position: String,
    pub rationale: String,
    pub decider: String,
}

#[derive(Debug, Clone)]
pub struct ConflictProtocol {
    store: StateStore,
    audit: AuditLog,
    status: StatusLog,
    paths: PicPaths,
}

impl ConflictProtocol {
    pub fn new(paths: &PicPaths) -> Self {
        Self {
            store: StateStore::new(paths),
            audit: AuditLog::new(paths),
            status: StatusLog::new(paths),
            paths: paths.clone(),
        }
    }

    /// Opens a conflict and escalates it: the record is filed, indexed,
    /// and audited, and from here on the declared stakes gate the
    /// affected transitions.
    pub fn open(&self, input: ConflictInput) -> Result<ConflictRecord> {
        if input.positions.len() < 2 {
            return Err(WorkflowError::InsufficientEvidence {
                message: format!(
                    "a conflict needs at least 2 positions (got {})",
                    input.positions.len()
                ),
            });
        }

        let mut attempts = 3u32;
        loop {
            let state = self.store.read()?;
            let phase = state.current_phase.unwrap_or(Phase::Review);
            let id = format!("CON-{:03}", state.conflicts.len() + 1);

            let record = ConflictRecord {
                id: id.clone(),
                category: input.category,
                status: ConflictStatus::Open,
                positions: input.positions.clone(),
                stakes: input.stakes.clone(),
                phase,
                opened_at: Utc::now(),
                resolution: None,
                supersedes: input.supersedes.clone(),
            };

            fsio::write_json_atomic(&self.record_path(&id), &record)?;
            match self.store.record_reference(RecordKind::Conflict, &id, phase) {
                Ok(_) => {
                    self.audit
                        .record(AuditEntry::conflict_escalated(&state.id, Some(phase), &id));
                    self.status.append(
                        StatusCategory::Conflict,
                        &format!(
                            "{} opened [category {}] staking {}",
                            id,
                            record.category.letter(),
                            record
                                .stakes
                                .iter()
                                .map(Phase::as_str)
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    );
                    return Ok(record);
                }
                Err(WorkflowError::StaleWrite { .. }) | Err(WorkflowError::DuplicateId { .. })
                    if attempts > 1 =>
                {
                    attempts -= 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolves an open conflict. The status flips open -> resolved
    /// exactly once; a second resolution is rejected.
    pub fn resolve(&self, id: &str, input: ResolutionInput) -> Result<ConflictRecord> {
        if input.rationale.trim().is_empty() || input.decider.trim().is_empty() {
            return Err(WorkflowError::InsufficientEvidence {
                message: "resolution needs a rationale and a decider".to_string(),
            });
        }

        let mut record = self.load(id)?;
        if record.status == ConflictStatus::Resolved {
            return Err(WorkflowError::AlreadyResolved { id: id.to_string() });
        }

        record.status = ConflictStatus::Resolved;
        record.resolution = Some(Resolution {
            outcome: input.outcome,
            chosen_position: input.chosen_position,
            rationale: input.rationale,
            decider: input.decider.clone(),
            timestamp: Utc::now(),
        });
        fsio::write_json_atomic(&self.record_path(id), &record)?;

        self.status.append(
            StatusCategory::Conflict,
            &format!("{} resolved by {}", id, input.decider),
        );
        Ok(record)
    }

    /// Ids of open conflicts whose stakes include the given phase.
    /// Unreadable records are skipped with a warning: a corrupt conflict
    /// document must not wedge every transition.
    pub fn open_conflicts_affecting(&self, phase: Phase) -> Result<Vec<String>> {
        let state = self.store.read()?;
        let mut blocking = Vec::new();
        for reference in &state.conflicts {
            match self.load(&reference.id) {
                Ok(record) => {
                    if record.status == ConflictStatus::Open && record.stakes.contains(&phase) {
                        blocking.push(record.id);
                    }
                }
                Err(e) => warn!(id = %reference.id, error = %e, "skipping unreadable conflict"),
            }
        }
        Ok(blocking)
    }

    pub fn load(&self, id: &str) -> Result<ConflictRecord> {
        fsio::read_json(&self.record_path(id))?.ok_or_else(|| WorkflowError::Storage {
            message: format!("no conflict record {}", id),
        })
    }

    fn record_path(&self, id: &str) -> std::path::PathBuf {
        self.paths.conflicts_dir().join(format!("{}.json", id))
    }
}

#[cfg(test)]
#[path = "tests/conflicts_tests.rs"]
mod tests;
