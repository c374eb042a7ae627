//! Lifecycle hook handlers.
//!
//! The agent-invocation collaborator fires these as independent,
//! stateless callbacks: agent starting, agent completing, tool used.
//! Each handler reads the state store, pairs start/stop through the
//! correlator, and attempts an audit write. None of them can fail the
//! caller: before initialization they are no-ops, and afterwards
//! logging problems are swallowed.

use crate::audit::{AuditEntry, AuditLog, CaptureKind};
use crate::correlate::EventCorrelator;
use crate::paths::PicPaths;
use crate::phase::Role;
use crate::state_store::StateStore;
use crate::status_log::{StatusCategory, StatusLog};
use tracing::debug;

pub struct LifecycleHooks {
    store: StateStore,
    audit: AuditLog,
    status: StatusLog,
    correlator: EventCorrelator,
}

impl LifecycleHooks {
    pub fn new(paths: &PicPaths) -> Self {
        Self {
            store: StateStore::new(paths),
            audit: AuditLog::new(paths),
            status: StatusLog::new(paths),
            correlator: EventCorrelator::new(paths),
        }
    }

    /// An agent is starting under the given invocation token.
    pub fn on_agent_start(&self, token: &str, actor: &str, prompt: &str) {
        let Ok(state) = self.store.read() else {
            return;
        };
        let phase = state.current_phase;
        if Role::parse(actor).is_none() {
            debug!(actor, "actor name is not a known role");
        }

        let id = self
            .correlator
            .begin_event(crate::audit::AuditEventType::AgentStart, actor, token);
        if let Some(phase) = phase {
            self.audit.write_capture(phase, CaptureKind::Input, prompt);
        }
        self.audit
            .record(AuditEntry::agent_start(&state.id, phase, actor, prompt).with_id(id));
        self.status
            .append(StatusCategory::Agent, &format!("{} started", actor));
    }

    /// The agent started under the same token has completed.
    pub fn on_agent_complete(&self, token: &str, actor: &str, output: &str) {
        let Ok(state) = self.store.read() else {
            return;
        };
        let phase = state.current_phase;

        let id = self.correlator.end_event(token);
        if let Some(phase) = phase {
            self.audit.write_capture(phase, CaptureKind::Output, output);
        }
        self.audit
            .record(AuditEntry::agent_complete(&state.id, phase, actor, output).with_id(id));
        self.status
            .append(StatusCategory::Agent, &format!("{} completed", actor));
    }

    /// A tool was used. Single event, no correlation pairing.
    pub fn on_tool_use(&self, tool: &str, input: &str, output: &str) {
        let Ok(state) = self.store.read() else {
            return;
        };
        self.audit.record(AuditEntry::tool_use(
            &state.id,
            state.current_phase,
            tool,
            input,
            output,
        ));
    }
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
