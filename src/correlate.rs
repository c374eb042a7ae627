//! Correlation ids linking asynchronous start events to completions.
//!
//! Start and stop are reported by independent, stateless invocations
//! that may run in any process, so the pairing has to survive process
//! boundaries: `begin_event` persists the id to a keyed file under
//! `.pic-agent/correlation/` (key = host-supplied invocation token) and
//! `end_event` looks it up by the same token. A lookup miss mints a
//! fresh id instead of failing; workflow correctness never depends on
//! audit completeness.

use crate::audit::AuditEventType;
use crate::fsio;
use crate::paths::PicPaths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

static LAST_MINTED_NANOS: Mutex<u128> = Mutex::new(0);

/// Mints a correlation id from the nanosecond clock, bumped past the
/// previously minted value so ids stay distinct even when the clock
/// granularity is coarser than a call. Falls back to a decimal-seconds
/// form with a distinguishable prefix when the system clock cannot
/// produce a sub-second reading.
pub fn mint_correlation_id() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => {
            let mut last = LAST_MINTED_NANOS
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let nanos = elapsed.as_nanos().max(*last + 1);
            *last = nanos;
            format!("AUD-{}", nanos)
        }
        Err(_) => format!("AUD-S{}", Utc::now().timestamp()),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CorrelationEntry {
    id: String,
    kind: AuditEventType,
    actor: String,
    started_at: DateTime<Utc>,
}

/// Pairs start/stop events across independent invocations through the
/// keyed file store. Cheap to construct per invocation.
#[derive(Debug, Clone)]
pub struct EventCorrelator {
    paths: PicPaths,
}

impl EventCorrelator {
    pub fn new(paths: &PicPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    /// Mints a correlation id and persists it under the invocation
    /// token. Persistence is best-effort: a failed write degrades the
    /// later `end_event` to a fresh id, it never fails the caller.
    pub fn begin_event(&self, kind: AuditEventType, actor: &str, token: &str) -> String {
        let id = mint_correlation_id();
        let entry = CorrelationEntry {
            id: id.clone(),
            kind,
            actor: actor.to_string(),
            started_at: Utc::now(),
        };
        if let Err(e) = fsio::write_json_atomic(&self.paths.correlation_entry(token), &entry) {
            warn!(token, error = %e, "failed to persist correlation entry");
        }
        id
    }

    /// Looks up the correlation id persisted by `begin_event` for the
    /// same token and removes the entry. Mints a fresh id on any miss.
    pub fn end_event(&self, token: &str) -> String {
        let path = self.paths.correlation_entry(token);
        match fsio::read_json::<CorrelationEntry>(&path) {
            Ok(Some(entry)) => {
                let _ = std::fs::remove_file(&path);
                entry.id
            }
            Ok(None) => {
                debug!(token, "no correlation entry for token; minting fresh id");
                mint_correlation_id()
            }
            Err(e) => {
                warn!(token, error = %e, "unreadable correlation entry; minting fresh id");
                let _ = std::fs::remove_file(&path);
                mint_correlation_id()
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/correlate_tests.rs"]
mod tests;
