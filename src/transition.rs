//! Phase transition engine.
//!
//! The only component that advances the workflow. `handoff` validates
//! exit criteria, writes the immutable handoff record, advances the
//! state store, and reports the next actor and its capability set. At
//! the terminal phase it executes completion instead, producing the
//! workflow summary. The engine never starts agents; the invoker does.

use crate::audit::{AuditEntry, AuditLog};
use crate::conflicts::ConflictProtocol;
use crate::errors::{Result, WorkflowError};
use crate::fsio;
use crate::paths::PicPaths;
use crate::phase::{Capability, Phase, Role, ViolationSeverity};
use crate::state_store::{retry_stale, RecordKind, StateStore, WorkflowState};
use crate::status_log::{StatusCategory, StatusLog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// One entry of the caller-supplied exit checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitCriterion {
    pub name: String,
    pub required: bool,
    pub met: bool,
}

impl ExitCriterion {
    pub fn required(name: &str, met: bool) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            met,
        }
    }

    pub fn optional(name: &str, met: bool) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            met,
        }
    }
}

/// Immutable record of one phase handoff. A second handoff between the
/// same pair is permitted only as an explicit supersede, tracked by the
/// monotonically increasing revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub workflow: String,
    pub timestamp: DateTime<Utc>,
    pub deliverables: Vec<String>,
    pub exit_criteria: Vec<ExitCriterion>,
    pub notes: String,
    pub revision: u32,
}

impl HandoffRecord {
    /// The id this record is filed and indexed under.
    pub fn record_id(&self) -> String {
        handoff_id(self.from_phase, self.to_phase, self.revision)
    }
}

/// The role the invoker should start next, with its capability set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextActor {
    pub phase: Phase,
    pub role: Role,
    pub capabilities: Vec<Capability>,
}

impl NextActor {
    fn for_phase(phase: Phase) -> Self {
        let role = phase.role();
        Self {
            phase,
            role,
            capabilities: role.capabilities().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDuration {
    pub phase: Phase,
    pub seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionCount {
    pub phase: Phase,
    pub count: usize,
}

/// Summary produced when the terminal phase completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub workflow: String,
    pub problem: String,
    pub completed_at: DateTime<Utc>,
    pub phase_durations: Vec<PhaseDuration>,
    pub decision_counts: Vec<DecisionCount>,
    pub deliverables: Vec<String>,
}

/// What a successful `handoff` call produced.
#[derive(Debug, Clone)]
pub enum HandoffOutcome {
    Advanced {
        record: HandoffRecord,
        next_actor: NextActor,
    },
    Completed(CompletionSummary),
}

/// Caller-supplied material for one handoff.
#[derive(Debug, Clone)]
pub struct HandoffRequest {
    pub current_phase: Phase,
    pub criteria: Vec<ExitCriterion>,
    pub deliverables: Vec<String>,
    pub notes: String,
    /// Permit replacing an existing handoff record for this phase pair.
    pub supersede: bool,
    /// Skip ahead to a later phase; requires a rationale.
    pub skip_to: Option<Phase>,
    pub skip_rationale: Option<String>,
}

pub struct TransitionEngine {
    store: StateStore,
    audit: AuditLog,
    status: StatusLog,
    conflicts: ConflictProtocol,
    paths: PicPaths,
}

impl TransitionEngine {
    pub fn new(paths: &PicPaths) -> Self {
        Self {
            store: StateStore::new(paths),
            audit: AuditLog::new(paths),
            status: StatusLog::new(paths),
            conflicts: ConflictProtocol::new(paths),
            paths: paths.clone(),
        }
    }

    /// Completes the current phase and hands off to its successor, or
    /// executes completion at the terminal phase. On any failure the
    /// state document is left untouched: no partial transition is ever
    /// visible.
    pub fn handoff(&self, request: HandoffRequest) -> Result<HandoffOutcome> {
        let state = self.store.read()?;
        let current = state.current_phase.ok_or(WorkflowError::NotInitialized)?;
        if current != request.current_phase {
            return Err(WorkflowError::NotCurrentPhase {
                claimed: request.current_phase,
                actual: Some(current),
            });
        }
        if state.blocked {
            return Err(WorkflowError::WorkflowBlocked);
        }
        let blocking = self.conflicts.open_conflicts_affecting(current)?;
        if !blocking.is_empty() {
            return Err(WorkflowError::ConflictsOpen { ids: blocking });
        }

        if current.is_terminal() {
            return self.complete(&state);
        }

        if let Some(unmet) = request.criteria.iter().find(|c| c.required && !c.met) {
            return Err(WorkflowError::ExitCriteriaNotMet {
                criterion: unmet.name.clone(),
            });
        }

        let to = match request.skip_to {
            Some(target) => {
                if request.skip_rationale.is_none() {
                    return Err(WorkflowError::InvalidTransition {
                        from: current,
                        to: target,
                    });
                }
                target
            }
            None => current
                .successor()
                .ok_or(WorkflowError::InvalidTransition {
                    from: current,
                    to: current,
                })?,
        };

        let (path, revision) = self.handoff_slot(current, to, request.supersede)?;
        let mut notes = request.notes.clone();
        if let Some(rationale) = &request.skip_rationale {
            if notes.is_empty() {
                notes = format!("skip rationale: {}", rationale);
            } else {
                notes = format!("{}\nskip rationale: {}", notes, rationale);
            }
        }
        let record = HandoffRecord {
            from_phase: current,
            to_phase: to,
            workflow: state.id.clone(),
            timestamp: Utc::now(),
            deliverables: request.deliverables.clone(),
            exit_criteria: request.criteria.clone(),
            notes,
            revision,
        };
        fsio::write_json_atomic(&path, &record)?;

        retry_stale(3, || {
            self.store
                .advance(current, to, request.skip_rationale.as_deref())
        })?;
        let record_id = record.record_id();
        if let Err(e) = retry_stale(3, || {
            self.store
                .record_reference(RecordKind::Handoff, &record_id, current)
        }) {
            // The transition itself succeeded; a missing index entry is
            // recoverable from the record directory.
            warn!(id = %record_id, error = %e, "handoff indexed record write failed");
        }

        self.audit
            .record(AuditEntry::phase_handoff(&state.id, current, to));
        self.status.append(
            StatusCategory::Workflow,
            &format!("handoff: {} -> {} ({})", current, to, record_id),
        );
        debug!(from = %current, to = %to, "phase advanced");

        Ok(HandoffOutcome::Advanced {
            record,
            next_actor: NextActor::for_phase(to),
        })
    }

    fn complete(&self, state: &WorkflowState) -> Result<HandoffOutcome> {
        let completed = retry_stale(3, || self.store.complete())?;
        let summary = self.build_summary(&completed);
        fsio::write_json_atomic(&self.paths.completion_file(), &summary)?;

        self.audit.record(AuditEntry::workflow_complete(&state.id));
        self.status
            .append(StatusCategory::Workflow, "workflow complete");

        Ok(HandoffOutcome::Completed(summary))
    }

    fn build_summary(&self, state: &WorkflowState) -> CompletionSummary {
        let phase_durations = Phase::ORDER
            .iter()
            .map(|phase| {
                let seconds = state.progress(*phase).and_then(|p| {
                    match (p.started_at, p.completed_at) {
                        (Some(start), Some(end)) => Some((end - start).num_seconds()),
                        _ => None,
                    }
                });
                PhaseDuration {
                    phase: *phase,
                    seconds,
                }
            })
            .collect();

        let decision_counts = Phase::ORDER
            .iter()
            .map(|phase| DecisionCount {
                phase: *phase,
                count: state.decisions.iter().filter(|r| r.phase == *phase).count(),
            })
            .collect();

        let mut deliverables = Vec::new();
        for reference in &state.handoffs {
            let path = self
                .paths
                .handoffs_dir()
                .join(format!("{}.json", reference.id));
            match fsio::read_json::<HandoffRecord>(&path) {
                Ok(Some(record)) => deliverables.extend(record.deliverables),
                Ok(None) => warn!(id = %reference.id, "handoff record missing from disk"),
                Err(e) => warn!(id = %reference.id, error = %e, "unreadable handoff record"),
            }
        }

        CompletionSummary {
            workflow: state.id.clone(),
            problem: state.problem.clone(),
            completed_at: Utc::now(),
            phase_durations,
            decision_counts,
            deliverables,
        }
    }

    /// Handles an observed capability violation. Minor: recorded and
    /// ignored. Major and critical: the workflow is flagged blocked and
    /// stays blocked until a human clears it.
    pub fn report_violation(
        &self,
        actor: &str,
        severity: ViolationSeverity,
        description: &str,
    ) -> Result<()> {
        self.status.append(
            StatusCategory::Workflow,
            &format!(
                "capability violation ({:?}) by {}: {}",
                severity, actor, description
            ),
        );
        match severity {
            ViolationSeverity::Minor => {
                debug!(actor, description, "minor capability violation recorded");
                Ok(())
            }
            ViolationSeverity::Major | ViolationSeverity::Critical => {
                retry_stale(3, || self.store.set_blocked(true))?;
                warn!(actor, ?severity, "workflow blocked pending human override");
                Ok(())
            }
        }
    }

    /// Explicit human override clearing a blocked workflow.
    pub fn clear_block(&self, operator: &str) -> Result<WorkflowState> {
        let state = retry_stale(3, || self.store.set_blocked(false))?;
        self.status.append(
            StatusCategory::Workflow,
            &format!("block cleared by {}", operator),
        );
        Ok(state)
    }

    /// Finds the record path for this phase pair, honoring the
    /// supersede-only rule for repeats.
    fn handoff_slot(&self, from: Phase, to: Phase, supersede: bool) -> Result<(PathBuf, u32)> {
        let dir = self.paths.handoffs_dir();
        let base = dir.join(format!("{}.json", handoff_id(from, to, 1)));
        if !base.exists() {
            return Ok((base, 1));
        }
        if !supersede {
            return Err(WorkflowError::DuplicateId {
                id: handoff_id(from, to, 1),
            });
        }
        let mut revision = 2u32;
        loop {
            let candidate = dir.join(format!("{}.json", handoff_id(from, to, revision)));
            if !candidate.exists() {
                return Ok((candidate, revision));
            }
            revision += 1;
        }
    }
}

fn handoff_id(from: Phase, to: Phase, revision: u32) -> String {
    if revision <= 1 {
        format!("HANDOFF-{}-{}", from, to)
    } else {
        format!("HANDOFF-{}-{}-rev{}", from, to, revision)
    }
}

#[cfg(test)]
#[path = "tests/transition_tests.rs"]
mod tests;
