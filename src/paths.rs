//! Workspace-relative path layout.
//!
//! Everything the engine persists lives under `<working_dir>/.pic-agent/`:
//!
//! ```text
//! .pic-agent/
//!   state.json                  mutable workflow document
//!   state.lock                  sidecar lock for state commits
//!   completion.json             summary written at terminal handoff
//!   archive/<id>-state.json     superseded workflow snapshots
//!   logs/status.log             human-skimmable, coarse-grained
//!   logs/audit.jsonl            machine-oriented, fine-grained
//!   records/decisions/DEC-001.json
//!   records/conflicts/CON-001.json
//!   records/handoffs/HANDOFF-<from>-<to>[-rev<N>].json
//!   capture/<phase>.input.md    full payloads, most recent per phase
//!   capture/<phase>.output.md
//!   correlation/<token>.json    ephemeral start/stop pairing entries
//! ```

use crate::phase::Phase;
use std::path::{Path, PathBuf};

pub const WORKSPACE_DIR: &str = ".pic-agent";

#[derive(Debug, Clone)]
pub struct PicPaths {
    root: PathBuf,
}

impl PicPaths {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            root: working_dir.join(WORKSPACE_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn state_lock(&self) -> PathBuf {
        self.root.join("state.lock")
    }

    pub fn completion_file(&self) -> PathBuf {
        self.root.join("completion.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn archived_state(&self, workflow_id: &str) -> PathBuf {
        self.archive_dir()
            .join(format!("{}-state.json", workflow_id))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn status_log(&self) -> PathBuf {
        self.logs_dir().join("status.log")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir().join("audit.jsonl")
    }

    pub fn decisions_dir(&self) -> PathBuf {
        self.root.join("records").join("decisions")
    }

    pub fn conflicts_dir(&self) -> PathBuf {
        self.root.join("records").join("conflicts")
    }

    pub fn handoffs_dir(&self) -> PathBuf {
        self.root.join("records").join("handoffs")
    }

    pub fn capture_dir(&self) -> PathBuf {
        self.root.join("capture")
    }

    pub fn capture_input(&self, phase: Phase) -> PathBuf {
        self.capture_dir().join(format!("{}.input.md", phase))
    }

    pub fn capture_output(&self, phase: Phase) -> PathBuf {
        self.capture_dir().join(format!("{}.output.md", phase))
    }

    pub fn correlation_dir(&self) -> PathBuf {
        self.root.join("correlation")
    }

    /// Path of the correlation entry keyed by a host-supplied invocation
    /// token. The token is sanitized so an arbitrary host id cannot
    /// escape the correlation directory.
    pub fn correlation_entry(&self, token: &str) -> PathBuf {
        self.correlation_dir()
            .join(format!("{}.json", sanitize_token(token)))
    }
}

fn sanitize_token(token: &str) -> String {
    let cleaned: String = token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unkeyed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_sanitization() {
        let paths = PicPaths::new(Path::new("/tmp/ws"));
        let entry = paths.correlation_entry("../../etc/passwd");
        let name = entry.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, "______etc_passwd.json");
        assert!(entry.starts_with(paths.correlation_dir()));
    }

    #[test]
    fn test_empty_token_gets_placeholder() {
        let paths = PicPaths::new(Path::new("/tmp/ws"));
        let entry = paths.correlation_entry("");
        assert!(entry.ends_with("correlation/unkeyed.json"));
    }
}
