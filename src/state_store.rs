//! Persistent workflow state: the single source of truth.
//!
//! The state lives in one JSON document mutated with an advisory
//! read-before-write pattern. Every mutation is based on the revision
//! the caller read; the commit re-reads under an exclusive lock on a
//! sidecar lock file and fails with `StaleWrite` when the on-disk
//! revision moved in between. The caller re-reads and retries. Writes
//! are atomic (temp file + rename), so readers never observe a torn
//! document.

use crate::errors::{Result, WorkflowError};
use crate::fsio;
use crate::paths::PicPaths;
use crate::phase::{Phase, PhaseStatus, Role};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use uuid::Uuid;

/// Progress of a single phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseProgress {
    fn pending() -> Self {
        Self {
            status: PhaseStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Lightweight reference to a decision, conflict, or handoff record.
/// Full records live in per-id documents so a corrupt record cannot
/// corrupt this index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRef {
    pub id: String,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
}

/// Which index array a reference belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Decision,
    Conflict,
    Handoff,
}

/// The workflow state document. One per active workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub problem: String,
    pub phases: BTreeMap<Phase, PhaseProgress>,
    pub current_phase: Option<Phase>,
    pub current_actor: Option<Role>,
    /// Sticky flag set by major/critical capability violations; cleared
    /// only by explicit human override.
    pub blocked: bool,
    pub decisions: Vec<RecordRef>,
    pub conflicts: Vec<RecordRef>,
    pub handoffs: Vec<RecordRef>,
    /// Monotonic write counter backing optimistic concurrency.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// A fresh workflow: all phases pending except the first, which is
    /// in progress and owned by its role.
    pub fn new(problem: &str) -> Self {
        let now = Utc::now();
        let mut phases: BTreeMap<Phase, PhaseProgress> = Phase::ORDER
            .iter()
            .map(|p| (*p, PhaseProgress::pending()))
            .collect();
        let first = Phase::first();
        if let Some(progress) = phases.get_mut(&first) {
            progress.status = PhaseStatus::InProgress;
            progress.started_at = Some(now);
        }
        Self {
            id: Uuid::new_v4().to_string(),
            problem: problem.to_string(),
            phases,
            current_phase: Some(first),
            current_actor: Some(first.role()),
            blocked: false,
            decisions: Vec::new(),
            conflicts: Vec::new(),
            handoffs: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn progress(&self, phase: Phase) -> Option<&PhaseProgress> {
        self.phases.get(&phase)
    }

    /// The single phase currently in progress, if any.
    pub fn in_progress_phase(&self) -> Option<Phase> {
        Phase::ORDER
            .iter()
            .copied()
            .find(|p| self.status_of(*p) == PhaseStatus::InProgress)
    }

    pub fn status_of(&self, phase: Phase) -> PhaseStatus {
        self.phases
            .get(&phase)
            .map(|p| p.status)
            .unwrap_or(PhaseStatus::Pending)
    }

    /// Terminal means the review phase has completed.
    pub fn is_terminal(&self) -> bool {
        self.status_of(Phase::Review) == PhaseStatus::Completed
    }

    pub fn refs(&self, kind: RecordKind) -> &[RecordRef] {
        match kind {
            RecordKind::Decision => &self.decisions,
            RecordKind::Conflict => &self.conflicts,
            RecordKind::Handoff => &self.handoffs,
        }
    }

    fn refs_mut(&mut self, kind: RecordKind) -> &mut Vec<RecordRef> {
        match kind {
            RecordKind::Decision => &mut self.decisions,
            RecordKind::Conflict => &mut self.conflicts,
            RecordKind::Handoff => &mut self.handoffs,
        }
    }
}

/// Accessor for the state document. Cheap to clone; holds no state
/// beyond the workspace paths, so independently-invoked handlers each
/// construct their own and coordinate purely through the filesystem.
#[derive(Debug, Clone)]
pub struct StateStore {
    paths: PicPaths,
}

impl StateStore {
    pub fn new(paths: &PicPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.paths.state_file().exists()
    }

    /// Creates a fresh workflow. Fails with `AlreadyActive` if a
    /// non-terminal workflow exists, unless `archive_and_restart` is
    /// set, in which case the prior document is snapshotted read-only
    /// into the archive before being overwritten.
    pub fn initialize(&self, problem: &str, archive_and_restart: bool) -> Result<WorkflowState> {
        let _lock = self.acquire_lock()?;
        if let Some(existing) = fsio::read_json::<WorkflowState>(&self.paths.state_file())? {
            if !existing.is_terminal() && !archive_and_restart {
                return Err(WorkflowError::AlreadyActive { id: existing.id });
            }
            fsio::write_json_atomic(&self.paths.archived_state(&existing.id), &existing)?;
        }
        let mut state = WorkflowState::new(problem);
        state.revision = 1;
        fsio::write_json_atomic(&self.paths.state_file(), &state)?;
        Ok(state)
    }

    pub fn read(&self) -> Result<WorkflowState> {
        fsio::read_json(&self.paths.state_file())?.ok_or(WorkflowError::NotInitialized)
    }

    /// Commits a mutated state based on the revision the caller read.
    /// Fails with `StaleWrite` if the document changed in between; the
    /// caller must re-read and retry rather than silently discarding
    /// the concurrent update.
    pub fn commit(&self, based_on: u64, mut state: WorkflowState) -> Result<WorkflowState> {
        let _lock = self.acquire_lock()?;
        let found = fsio::read_json::<WorkflowState>(&self.paths.state_file())?
            .map(|s| s.revision)
            .unwrap_or(0);
        if found != based_on {
            return Err(WorkflowError::StaleWrite { based_on, found });
        }
        state.revision = based_on + 1;
        state.updated_at = Utc::now();
        fsio::write_json_atomic(&self.paths.state_file(), &state)?;
        Ok(state)
    }

    /// Marks `from` completed and `to` in progress. Pure state mutation:
    /// handoff-document creation is sequenced by the transition engine,
    /// not here. `to` must be the configured successor unless a skip
    /// rationale is supplied, in which case any later phase is accepted
    /// and the intermediate phases are marked skipped.
    pub fn advance(
        &self,
        from: Phase,
        to: Phase,
        skip_rationale: Option<&str>,
    ) -> Result<WorkflowState> {
        let mut state = self.read()?;
        let based_on = state.revision;

        if state.blocked {
            return Err(WorkflowError::WorkflowBlocked);
        }
        if state.current_phase != Some(from) || state.status_of(from) != PhaseStatus::InProgress {
            return Err(WorkflowError::InvalidTransition { from, to });
        }
        let direct = from.successor() == Some(to);
        let skip = to > from && skip_rationale.is_some();
        if !direct && !skip {
            return Err(WorkflowError::InvalidTransition { from, to });
        }

        let now = Utc::now();
        if let Some(progress) = state.phases.get_mut(&from) {
            progress.status = PhaseStatus::Completed;
            progress.completed_at = Some(now);
        }
        for phase in Phase::ORDER.iter().filter(|p| **p > from && **p < to) {
            if let Some(progress) = state.phases.get_mut(phase) {
                progress.status = PhaseStatus::Skipped;
            }
        }
        if let Some(progress) = state.phases.get_mut(&to) {
            progress.status = PhaseStatus::InProgress;
            progress.started_at = Some(now);
        }
        state.current_phase = Some(to);
        state.current_actor = Some(to.role());

        self.commit(based_on, state)
    }

    /// Terminal completion: marks the review phase completed and clears
    /// the current phase/actor pointers.
    pub fn complete(&self) -> Result<WorkflowState> {
        let mut state = self.read()?;
        let based_on = state.revision;

        if state.blocked {
            return Err(WorkflowError::WorkflowBlocked);
        }
        let terminal = Phase::Review;
        if state.current_phase != Some(terminal)
            || state.status_of(terminal) != PhaseStatus::InProgress
        {
            return Err(WorkflowError::NotCurrentPhase {
                claimed: terminal,
                actual: state.current_phase,
            });
        }

        if let Some(progress) = state.phases.get_mut(&terminal) {
            progress.status = PhaseStatus::Completed;
            progress.completed_at = Some(Utc::now());
        }
        state.current_phase = None;
        state.current_actor = None;

        self.commit(based_on, state)
    }

    /// Appends a record reference to the matching index array.
    pub fn record_reference(
        &self,
        kind: RecordKind,
        id: &str,
        phase: Phase,
    ) -> Result<WorkflowState> {
        let mut state = self.read()?;
        let based_on = state.revision;

        if state.refs(kind).iter().any(|r| r.id == id) {
            return Err(WorkflowError::DuplicateId { id: id.to_string() });
        }
        state.refs_mut(kind).push(RecordRef {
            id: id.to_string(),
            phase,
            timestamp: Utc::now(),
        });

        self.commit(based_on, state)
    }

    /// Sets or clears the sticky blocked flag.
    pub fn set_blocked(&self, blocked: bool) -> Result<WorkflowState> {
        let mut state = self.read()?;
        let based_on = state.revision;
        state.blocked = blocked;
        self.commit(based_on, state)
    }

    fn acquire_lock(&self) -> Result<File> {
        std::fs::create_dir_all(self.paths.root())?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.paths.state_lock())?;
        file.lock_exclusive()?;
        Ok(file)
    }
}

/// Retries an operation a bounded number of times when it loses an
/// optimistic-concurrency race. Any other outcome is returned as-is.
pub fn retry_stale<T>(attempts: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut remaining = attempts;
    loop {
        match op() {
            Err(WorkflowError::StaleWrite { .. }) if remaining > 1 => remaining -= 1,
            other => return other,
        }
    }
}

#[cfg(test)]
#[path = "tests/state_store_tests.rs"]
mod tests;
