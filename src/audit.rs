//! Append-only structured audit log.
//!
//! One JSONL record per observed event, partitioned by workflow and
//! phase. Large payloads are truncated to bounded previews with the
//! untruncated length recorded alongside, and the full payloads of
//! agent start/stop events land in phase-scoped side files (most recent
//! per phase only). Writes are strictly best-effort: failures are
//! swallowed so logging can never block the workflow itself. Before the
//! workflow is initialized, every call is a no-op.

use crate::correlate::mint_correlation_id;
use crate::errors::Result;
use crate::fsio;
use crate::paths::PicPaths;
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Preview bound for tool input/output.
pub const TOOL_PREVIEW_MAX: usize = 2_000;
/// Preview bound for agent prompts.
pub const PROMPT_PREVIEW_MAX: usize = 10_000;
/// Preview bound for full agent output.
pub const OUTPUT_PREVIEW_MAX: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AgentStart,
    AgentComplete,
    ToolUse,
    DecisionRecorded,
    ConflictEscalated,
    PhaseHandoff,
}

/// A single audit record. Append-only: no entry is mutated after being
/// written, so timelines are reconstructible purely by scanning in file
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub workflow: String,
    pub phase: Option<Phase>,
    pub event_type: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    fn base(workflow: &str, phase: Option<Phase>, event_type: AuditEventType) -> Self {
        Self {
            id: mint_correlation_id(),
            timestamp: Utc::now(),
            workflow: workflow.to_string(),
            phase,
            event_type,
            actor: None,
            tool: None,
            input_preview: None,
            input_len: None,
            output_preview: None,
            output_len: None,
            detail: None,
        }
    }

    pub fn agent_start(workflow: &str, phase: Option<Phase>, actor: &str, prompt: &str) -> Self {
        let mut entry = Self::base(workflow, phase, AuditEventType::AgentStart);
        entry.actor = Some(actor.to_string());
        entry.input_preview = Some(truncate_preview(prompt, PROMPT_PREVIEW_MAX));
        entry.input_len = Some(prompt.chars().count());
        entry
    }

    pub fn agent_complete(workflow: &str, phase: Option<Phase>, actor: &str, output: &str) -> Self {
        let mut entry = Self::base(workflow, phase, AuditEventType::AgentComplete);
        entry.actor = Some(actor.to_string());
        entry.output_preview = Some(truncate_preview(output, OUTPUT_PREVIEW_MAX));
        entry.output_len = Some(output.chars().count());
        entry
    }

    pub fn tool_use(
        workflow: &str,
        phase: Option<Phase>,
        tool: &str,
        input: &str,
        output: &str,
    ) -> Self {
        let mut entry = Self::base(workflow, phase, AuditEventType::ToolUse);
        entry.tool = Some(tool.to_string());
        entry.input_preview = Some(truncate_preview(input, TOOL_PREVIEW_MAX));
        entry.input_len = Some(input.chars().count());
        entry.output_preview = Some(truncate_preview(output, TOOL_PREVIEW_MAX));
        entry.output_len = Some(output.chars().count());
        entry
    }

    pub fn decision_recorded(workflow: &str, phase: Option<Phase>, decision_id: &str) -> Self {
        let mut entry = Self::base(workflow, phase, AuditEventType::DecisionRecorded);
        entry.detail = Some(decision_id.to_string());
        entry
    }

    pub fn conflict_escalated(workflow: &str, phase: Option<Phase>, conflict_id: &str) -> Self {
        let mut entry = Self::base(workflow, phase, AuditEventType::ConflictEscalated);
        entry.detail = Some(conflict_id.to_string());
        entry
    }

    pub fn phase_handoff(workflow: &str, from: Phase, to: Phase) -> Self {
        let mut entry = Self::base(workflow, Some(from), AuditEventType::PhaseHandoff);
        entry.detail = Some(format!("{} -> {}", from, to));
        entry
    }

    pub fn workflow_complete(workflow: &str) -> Self {
        let mut entry = Self::base(workflow, Some(Phase::Review), AuditEventType::PhaseHandoff);
        entry.detail = Some("workflow complete".to_string());
        entry
    }

    /// Overrides the minted id with a correlation id from the pairing
    /// store, so start and stop entries share one id.
    pub fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

/// Which side-file a full payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Input,
    Output,
}

/// Appender/reader for the audit log of one workspace.
#[derive(Debug, Clone)]
pub struct AuditLog {
    paths: PicPaths,
}

impl AuditLog {
    pub fn new(paths: &PicPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    /// Appends one record. Never fails the caller: before initialization
    /// this is a no-op, and write errors are logged and swallowed.
    pub fn record(&self, entry: AuditEntry) {
        if !self.paths.state_file().exists() {
            return;
        }
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "audit entry did not serialize; dropping");
                return;
            }
        };
        if let Err(e) = fsio::append_line(&self.paths.audit_log(), &line) {
            warn!(error = %e, "audit append failed; continuing without it");
        }
    }

    /// Writes the full, untruncated payload to the phase-scoped side
    /// file, overwriting the previous payload of that kind for the
    /// phase. Best-effort like `record`.
    pub fn write_capture(&self, phase: Phase, kind: CaptureKind, content: &str) {
        if !self.paths.state_file().exists() {
            return;
        }
        let path = match kind {
            CaptureKind::Input => self.paths.capture_input(phase),
            CaptureKind::Output => self.paths.capture_output(phase),
        };
        let result = std::fs::create_dir_all(self.paths.capture_dir())
            .and_then(|_| std::fs::write(&path, content));
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "capture write failed");
        }
    }

    /// Returns the last `n` entries in file order. Unparseable lines are
    /// skipped so one corrupt record cannot hide the rest of the trail.
    pub fn tail(&self, n: usize) -> Result<Vec<AuditEntry>> {
        let content = match std::fs::read_to_string(self.paths.audit_log()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<AuditEntry> = content
            .lines()
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unparseable audit line");
                    None
                }
            })
            .collect();
        let skip = entries.len().saturating_sub(n);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

fn truncate_preview(payload: &str, max: usize) -> String {
    if payload.chars().count() <= max {
        payload.to_string()
    } else {
        payload.chars().take(max).collect()
    }
}

#[cfg(test)]
#[path = "tests/audit_tests.rs"]
mod tests;
