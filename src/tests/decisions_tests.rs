use super::*;
use crate::state_store::StateStore;
use tempfile::{tempdir, TempDir};

fn protocol_in(dir: &TempDir) -> DecisionProtocol {
    let paths = PicPaths::new(dir.path());
    StateStore::new(&paths)
        .initialize("decide things", false)
        .expect("initialize");
    DecisionProtocol::new(&paths)
}

fn formal_input() -> DecisionInput {
    DecisionInput {
        tier: DecisionTier::Formal,
        title: "storage engine".to_string(),
        alternatives: vec!["sqlite".to_string(), "flat files".to_string()],
        rationale: "flat files keep the workspace inspectable".to_string(),
        evidence: vec![Evidence {
            summary: "both prototyped against the fixture project".to_string(),
            strength: EvidenceStrength::Moderate,
        }],
        supersedes: None,
    }
}

#[test]
fn test_formal_with_one_alternative_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let mut input = formal_input();
    input.alternatives.truncate(1);
    let result = protocol.record(input);
    assert!(matches!(
        result,
        Err(WorkflowError::InsufficientEvidence { .. })
    ));
}

#[test]
fn test_formal_without_solid_evidence_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let mut input = formal_input();
    input.evidence = vec![Evidence {
        summary: "gut feeling".to_string(),
        strength: EvidenceStrength::Weak,
    }];
    let result = protocol.record(input);
    assert!(matches!(
        result,
        Err(WorkflowError::InsufficientEvidence { .. })
    ));
}

#[test]
fn test_same_content_as_lightweight_succeeds() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    // The formal version fails for lack of alternatives...
    let mut input = formal_input();
    input.alternatives.truncate(1);
    assert!(protocol.record(input.clone()).is_err());

    // ...but declared lightweight with a rationale it records fine.
    input.tier = DecisionTier::Lightweight;
    let record = protocol.record(input).unwrap();
    assert_eq!(record.id, "DEC-001");
    assert_eq!(record.tier, DecisionTier::Lightweight);
}

#[test]
fn test_lightweight_needs_rationale() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let mut input = formal_input();
    input.tier = DecisionTier::Lightweight;
    input.rationale = "   ".to_string();
    let result = protocol.record(input);
    assert!(matches!(
        result,
        Err(WorkflowError::InsufficientEvidence { .. })
    ));
}

#[test]
fn test_implicit_requires_nothing() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let record = protocol
        .record(DecisionInput {
            tier: DecisionTier::Implicit,
            title: "kept the default".to_string(),
            alternatives: Vec::new(),
            rationale: String::new(),
            evidence: Vec::new(),
            supersedes: None,
        })
        .unwrap();
    assert_eq!(record.tier, DecisionTier::Implicit);
}

#[test]
fn test_sequential_ids_and_index() {
    let dir = tempdir().expect("temp dir");
    let paths = PicPaths::new(dir.path());
    let store = StateStore::new(&paths);
    store.initialize("decide things", false).unwrap();
    let protocol = DecisionProtocol::new(&paths);

    let first = protocol.record(formal_input()).unwrap();
    let second = protocol.record(formal_input()).unwrap();
    assert_eq!(first.id, "DEC-001");
    assert_eq!(second.id, "DEC-002");

    let state = store.read().unwrap();
    assert_eq!(state.decisions.len(), 2);
    assert_eq!(state.decisions[0].id, "DEC-001");
    assert_eq!(state.decisions[0].phase, Phase::Research);
}

#[test]
fn test_promotion_files_new_record_referencing_old() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let mut input = formal_input();
    input.tier = DecisionTier::Lightweight;
    let old = protocol.record(input).unwrap();

    let promoted = protocol
        .promote(
            &old.id,
            DecisionTier::Formal,
            Vec::new(),
            vec![Evidence {
                summary: "load-tested the chosen option".to_string(),
                strength: EvidenceStrength::Strong,
            }],
            None,
        )
        .unwrap();

    assert_eq!(promoted.id, "DEC-002");
    assert_eq!(promoted.tier, DecisionTier::Formal);
    assert_eq!(promoted.supersedes.as_deref(), Some("DEC-001"));

    // The old record is never mutated.
    let reloaded = protocol.load(&old.id).unwrap();
    assert_eq!(reloaded.tier, DecisionTier::Lightweight);
    assert!(reloaded.supersedes.is_none());
}

#[test]
fn test_promotion_must_raise_the_tier() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let record = protocol.record(formal_input()).unwrap();
    let result = protocol.promote(
        &record.id,
        DecisionTier::Lightweight,
        Vec::new(),
        Vec::new(),
        None,
    );
    assert!(matches!(
        result,
        Err(WorkflowError::InsufficientEvidence { .. })
    ));
}

#[test]
fn test_record_requires_initialized_workflow() {
    let dir = tempdir().expect("temp dir");
    let protocol = DecisionProtocol::new(&PicPaths::new(dir.path()));
    let result = protocol.record(formal_input());
    assert!(matches!(result, Err(WorkflowError::NotInitialized)));
}
