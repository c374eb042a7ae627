use super::*;
use crate::state_store::StateStore;
use tempfile::{tempdir, TempDir};

fn protocol_in(dir: &TempDir) -> ConflictProtocol {
    let paths = PicPaths::new(dir.path());
    StateStore::new(&paths)
        .initialize("contested ground", false)
        .expect("initialize");
    ConflictProtocol::new(&paths)
}

fn two_positions() -> Vec<Position> {
    vec![
        Position {
            holder: "pic-design".to_string(),
            summary: "split the parser into its own crate".to_string(),
        },
        Position {
            holder: "pic-implementation".to_string(),
            summary: "keep one crate until the API settles".to_string(),
        },
    ]
}

fn resolution() -> ResolutionInput {
    ResolutionInput {
        outcome: ResolutionOutcome::Synthesis,
        chosen_position: "one crate now, module boundary drawn for a later split".to_string(),
        rationale: "the API churn argument held under review".to_string(),
        decider: "pic-review".to_string(),
    }
}

#[test]
fn test_open_requires_two_positions() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let result = protocol.open(ConflictInput {
        category: ConflictCategory::Technical,
        positions: two_positions().into_iter().take(1).collect(),
        stakes: vec![Phase::Design],
        supersedes: None,
    });
    assert!(matches!(
        result,
        Err(WorkflowError::InsufficientEvidence { .. })
    ));
}

#[test]
fn test_open_files_and_indexes_record() {
    let dir = tempdir().expect("temp dir");
    let paths = PicPaths::new(dir.path());
    let store = StateStore::new(&paths);
    store.initialize("contested ground", false).unwrap();
    let protocol = ConflictProtocol::new(&paths);

    let record = protocol
        .open(ConflictInput {
            category: ConflictCategory::Scope,
            positions: two_positions(),
            stakes: vec![Phase::Research],
            supersedes: None,
        })
        .unwrap();

    assert_eq!(record.id, "CON-001");
    assert_eq!(record.status, ConflictStatus::Open);
    assert_eq!(record.category.letter(), 'B');
    assert_eq!(store.read().unwrap().conflicts.len(), 1);
}

#[test]
fn test_resolution_flips_status_exactly_once() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let record = protocol
        .open(ConflictInput {
            category: ConflictCategory::Technical,
            positions: two_positions(),
            stakes: vec![Phase::Design],
            supersedes: None,
        })
        .unwrap();

    let resolved = protocol.resolve(&record.id, resolution()).unwrap();
    assert_eq!(resolved.status, ConflictStatus::Resolved);
    let resolution_record = resolved.resolution.expect("resolution recorded");
    assert_eq!(resolution_record.decider, "pic-review");

    // Second resolution is rejected.
    let again = protocol.resolve(&record.id, resolution());
    assert!(matches!(again, Err(WorkflowError::AlreadyResolved { .. })));
}

#[test]
fn test_later_disagreement_opens_successor_conflict() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let old = protocol
        .open(ConflictInput {
            category: ConflictCategory::Priority,
            positions: two_positions(),
            stakes: vec![Phase::Planning],
            supersedes: None,
        })
        .unwrap();
    protocol.resolve(&old.id, resolution()).unwrap();

    let successor = protocol
        .open(ConflictInput {
            category: ConflictCategory::Priority,
            positions: two_positions(),
            stakes: vec![Phase::Planning],
            supersedes: Some(old.id.clone()),
        })
        .unwrap();
    assert_eq!(successor.id, "CON-002");
    assert_eq!(successor.supersedes.as_deref(), Some("CON-001"));
    assert_eq!(successor.status, ConflictStatus::Open);
}

#[test]
fn test_resolution_needs_rationale_and_decider() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let record = protocol
        .open(ConflictInput {
            category: ConflictCategory::Process,
            positions: two_positions(),
            stakes: Vec::new(),
            supersedes: None,
        })
        .unwrap();

    let mut input = resolution();
    input.decider = String::new();
    let result = protocol.resolve(&record.id, input);
    assert!(matches!(
        result,
        Err(WorkflowError::InsufficientEvidence { .. })
    ));

    // Still open after the rejected resolution.
    assert_eq!(
        protocol.load(&record.id).unwrap().status,
        ConflictStatus::Open
    );
}

#[test]
fn test_stakes_scope_which_phases_are_blocked() {
    let dir = tempdir().expect("temp dir");
    let protocol = protocol_in(&dir);

    let record = protocol
        .open(ConflictInput {
            category: ConflictCategory::Technical,
            positions: two_positions(),
            stakes: vec![Phase::Research, Phase::Testing],
            supersedes: None,
        })
        .unwrap();

    assert_eq!(
        protocol.open_conflicts_affecting(Phase::Research).unwrap(),
        vec![record.id.clone()]
    );
    assert!(protocol
        .open_conflicts_affecting(Phase::Planning)
        .unwrap()
        .is_empty());

    protocol.resolve(&record.id, resolution()).unwrap();
    assert!(protocol
        .open_conflicts_affecting(Phase::Research)
        .unwrap()
        .is_empty());
}

#[test]
fn test_category_parse_accepts_letters() {
    assert_eq!(
        "A".parse::<ConflictCategory>().unwrap(),
        ConflictCategory::Technical
    );
    assert_eq!(
        "process".parse::<ConflictCategory>().unwrap(),
        ConflictCategory::Process
    );
    assert!("e".parse::<ConflictCategory>().is_err());
}
