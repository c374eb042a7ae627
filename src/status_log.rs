//! Human-skimmable status log.
//!
//! The coarse-grained counterpart of the audit log: one bracketed line
//! per notable workflow event, UTC timestamps, append-only. Like the
//! audit log, writes are best-effort and never fail the caller.
//!
//! ```text
//! [2026-08-06T14:30:00.123Z] [WORKFLOW] handoff: research -> planning
//! [2026-08-06T14:30:01.456Z] [AGENT] pic-planning started
//! ```

use crate::fsio;
use crate::paths::PicPaths;
use chrono::Utc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Workflow,
    Agent,
    Decision,
    Conflict,
}

impl StatusCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Workflow => "WORKFLOW",
            StatusCategory::Agent => "AGENT",
            StatusCategory::Decision => "DECISION",
            StatusCategory::Conflict => "CONFLICT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusLog {
    paths: PicPaths,
}

impl StatusLog {
    pub fn new(paths: &PicPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    /// Appends one line. No-op before initialization; errors are
    /// swallowed.
    pub fn append(&self, category: StatusCategory, message: &str) {
        if !self.paths.state_file().exists() {
            return;
        }
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let line = format!("[{}] [{}] {}", timestamp, category.as_str(), message);
        if let Err(e) = fsio::append_line(&self.paths.status_log(), &line) {
            warn!(error = %e, "status log append failed; continuing");
        }
    }
}
