//! Tiered decision recording.
//!
//! The caller declares the intended tier; the protocol validates the
//! minimum supporting material per tier and files the record under a
//! zero-padded sequential id (`DEC-001`). Records are immutable once
//! filed: a contested decision is promoted by re-filing at a higher
//! tier, producing a new record that references the old one.

use crate::audit::{AuditEntry, AuditLog};
use crate::errors::{Result, WorkflowError};
use crate::fsio;
use crate::paths::PicPaths;
use crate::phase::Phase;
use crate::state_store::{RecordKind, StateStore};
use crate::status_log::{StatusCategory, StatusLog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTier {
    Implicit,
    Lightweight,
    Formal,
}

impl DecisionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionTier::Implicit => "implicit",
            DecisionTier::Lightweight => "lightweight",
            DecisionTier::Formal => "formal",
        }
    }
}

impl std::str::FromStr for DecisionTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "implicit" => Ok(DecisionTier::Implicit),
            "lightweight" => Ok(DecisionTier::Lightweight),
            "formal" => Ok(DecisionTier::Formal),
            other => Err(format!("unknown decision tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub summary: String,
    pub strength: EvidenceStrength,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub tier: DecisionTier,
    pub title: String,
    pub alternatives: Vec<String>,
    pub rationale: String,
    pub evidence: Vec<Evidence>,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
    /// Id of the lower-tier record this one promotes, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
}

/// Caller-supplied material for a new decision.
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub tier: DecisionTier,
    pub title: String,
    pub alternatives: Vec<String>,
    pub rationale: String,
    pub evidence: Vec<Evidence>,
    pub supersedes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DecisionProtocol {
    store: StateStore,
    audit: AuditLog,
    status: StatusLog,
    paths: PicPaths,
}

impl DecisionProtocol {
    pub fn new(paths: &PicPaths) -> Self {
        Self {
            store: StateStore::new(paths),
            audit: AuditLog::new(paths),
            status: StatusLog::new(paths),
            paths: paths.clone(),
        }
    }

    /// Validates the declared tier and files the record. The sequential
    /// id is derived from a fresh read of the index on every attempt, so
    /// losing a concurrency race retries with the next id rather than
    /// colliding.
    pub fn record(&self, input: DecisionInput) -> Result<DecisionRecord> {
        validate_tier(&input)?;

        let mut attempts = 3u32;
        loop {
            let state = self.store.read()?;
            let phase = state.current_phase.unwrap_or(Phase::Review);
            let id = format!("DEC-{:03}", state.decisions.len() + 1);

            let record = DecisionRecord {
                id: id.clone(),
                tier: input.tier,
                title: input.title.clone(),
                alternatives: input.alternatives.clone(),
                rationale: input.rationale.clone(),
                evidence: input.evidence.clone(),
                phase,
                timestamp: Utc::now(),
                supersedes: input.supersedes.clone(),
            };

            fsio::write_json_atomic(&self.record_path(&id), &record)?;
            match self.store.record_reference(RecordKind::Decision, &id, phase) {
                Ok(_) => {
                    self.audit
                        .record(AuditEntry::decision_recorded(&state.id, Some(phase), &id));
                    self.status.append(
                        StatusCategory::Decision,
                        &format!("{} [{}] {}", id, record.tier.as_str(), record.title),
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

    /// Promotes an existing record to a higher tier: files a new record
    /// carrying the old material plus whatever the caller adds, with
    /// `supersedes` pointing at the old id. The old record is untouched.
    pub fn promote(
        &self,
        old_id: &str,
        tier: DecisionTier,
        extra_alternatives: Vec<String>,
        extra_evidence: Vec<Evidence>,
        rationale: Option<String>,
    ) -> Result<DecisionRecord> {
        let old = self.load(old_id)?;
        if tier <= old.tier {
            return Err(WorkflowError::InsufficientEvidence {
                message: format!(
                    "promotion of {} must target a higher tier than {}",
                    old_id,
                    old.tier.as_str()
                ),
            });
        }
        let mut alternatives = old.alternatives;
        alternatives.extend(extra_alternatives);
        let mut evidence = old.evidence;
        evidence.extend(extra_evidence);
        self.record(DecisionInput {
            tier,
            title: old.title,
            alternatives,
            rationale: rationale.unwrap_or(old.rationale),
            evidence,
            supersedes: Some(old_id.to_string()),
        })
    }

    pub fn load(&self, id: &str) -> Result<DecisionRecord> {
        fsio::read_json(&self.record_path(id))?.ok_or_else(|| WorkflowError::Storage {
            message: format!("no decision record {}", id),
        })
    }

    fn record_path(&self, id: &str) -> std::path::PathBuf {
        self.paths.decisions_dir().join(format!("{}.json", id))
    }
}

fn validate_tier(input: &DecisionInput) -> Result<()> {
    match input.tier {
        DecisionTier::Formal => {
            if input.alternatives.len() < 2 {
                return Err(WorkflowError::InsufficientEvidence {
                    message: format!(
                        "formal decisions need at least 2 alternatives (got {}); \
                         add alternatives or downgrade the tier",
                        input.alternatives.len()
                    ),
                });
            }
            let has_solid = input
                .evidence
                .iter()
                .any(|e| e.strength >= EvidenceStrength::Moderate);
            if !has_solid {
                return Err(WorkflowError::InsufficientEvidence {
                    message: "formal decisions need at least 1 moderate or strong evidence item; \
                              add evidence or downgrade the tier"
                        .to_string(),
                });
            }
            Ok(())
        }
        DecisionTier::Lightweight => {
            if input.rationale.trim().is_empty() {
                return Err(WorkflowError::InsufficientEvidence {
                    message: "lightweight decisions need a non-empty rationale".to_string(),
                });
            }
            Ok(())
        }
        DecisionTier::Implicit => Ok(()),
    }
}

#[cfg(test)]
#[path = "tests/decisions_tests.rs"]
mod tests;
