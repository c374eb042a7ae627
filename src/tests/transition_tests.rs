use super::*;
use crate::conflicts::{ConflictCategory, ConflictInput, ConflictStatus, Position};
use crate::decisions::{DecisionInput, DecisionProtocol, DecisionTier};
use crate::phase::PhaseStatus;
use crate::state_store::StateStore;
use tempfile::{tempdir, TempDir};

fn workspace() -> (TempDir, PicPaths) {
    let dir = tempdir().expect("temp dir");
    let paths = PicPaths::new(dir.path());
    StateStore::new(&paths)
        .initialize("ship the feature", false)
        .expect("initialize");
    (dir, paths)
}

fn met_request(phase: Phase) -> HandoffRequest {
    HandoffRequest {
        current_phase: phase,
        criteria: vec![
            ExitCriterion::required("findings documented", true),
            ExitCriterion::required("open questions listed", true),
            ExitCriterion::required("sources archived", true),
            ExitCriterion::required("scope confirmed", true),
        ],
        deliverables: vec![format!("{}-notes.md", phase)],
        notes: String::new(),
        supersede: false,
        skip_to: None,
        skip_rationale: None,
    }
}

fn advance_through(engine: &TransitionEngine, until: Phase) {
    for phase in Phase::ORDER {
        if phase == until {
            break;
        }
        engine.handoff(met_request(phase)).expect("handoff");
    }
}

#[test]
fn test_handoff_with_met_criteria_advances_and_names_next_actor() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);

    let outcome = engine.handoff(met_request(Phase::Research)).unwrap();
    let HandoffOutcome::Advanced { record, next_actor } = outcome else {
        panic!("expected an advance, not completion");
    };

    assert_eq!(record.from_phase, Phase::Research);
    assert_eq!(record.to_phase, Phase::Planning);
    assert_eq!(next_actor.role, Role::PlanningPic);
    assert!(next_actor.capabilities.contains(&Capability::WriteDocs));

    let state = StateStore::new(&paths).read().unwrap();
    assert_eq!(state.current_phase, Some(Phase::Planning));
    assert_eq!(state.handoffs.len(), 1);
    assert_eq!(state.handoffs[0].id, "HANDOFF-research-planning");
    assert!(paths
        .handoffs_dir()
        .join("HANDOFF-research-planning.json")
        .exists());
}

#[test]
fn test_unmet_required_criterion_leaves_state_untouched() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);

    let before = std::fs::read(paths.state_file()).unwrap();

    let mut request = met_request(Phase::Research);
    request.criteria[2].met = false;
    let result = engine.handoff(request);
    match result {
        Err(WorkflowError::ExitCriteriaNotMet { criterion }) => {
            assert_eq!(criterion, "sources archived");
        }
        other => panic!("expected ExitCriteriaNotMet, got {:?}", other.is_ok()),
    }

    let after = std::fs::read(paths.state_file()).unwrap();
    assert_eq!(before, after, "failed handoff must not touch the document");
    assert!(!paths
        .handoffs_dir()
        .join("HANDOFF-research-planning.json")
        .exists());
}

#[test]
fn test_unmet_optional_criterion_does_not_block() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);

    let mut request = met_request(Phase::Research);
    request
        .criteria
        .push(ExitCriterion::optional("nice to have", false));
    assert!(engine.handoff(request).is_ok());
}

#[test]
fn test_handoff_from_wrong_phase_is_rejected() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);

    let result = engine.handoff(met_request(Phase::Planning));
    assert!(matches!(
        result,
        Err(WorkflowError::NotCurrentPhase { .. })
    ));
}

#[test]
fn test_repeat_handoff_needs_explicit_supersede() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);
    engine.handoff(met_request(Phase::Research)).unwrap();

    // A fresh workflow in the same workspace hits the same record slot.
    StateStore::new(&paths)
        .initialize("second attempt", true)
        .unwrap();

    let result = engine.handoff(met_request(Phase::Research));
    assert!(matches!(result, Err(WorkflowError::DuplicateId { .. })));

    let mut request = met_request(Phase::Research);
    request.supersede = true;
    let outcome = engine.handoff(request).unwrap();
    let HandoffOutcome::Advanced { record, .. } = outcome else {
        panic!("expected an advance");
    };
    assert_eq!(record.revision, 2);
    assert_eq!(record.record_id(), "HANDOFF-research-planning-rev2");
    assert!(paths
        .handoffs_dir()
        .join("HANDOFF-research-planning-rev2.json")
        .exists());
}

#[test]
fn test_major_violation_blocks_until_cleared() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);
    advance_through(&engine, Phase::Implementation);

    engine
        .report_violation(
            "pic-implementation",
            ViolationSeverity::Major,
            "wrote outside the sandbox",
        )
        .unwrap();
    assert!(StateStore::new(&paths).read().unwrap().blocked);

    let result = engine.handoff(met_request(Phase::Implementation));
    assert!(matches!(result, Err(WorkflowError::WorkflowBlocked)));

    engine.clear_block("a human").unwrap();
    engine.handoff(met_request(Phase::Implementation)).unwrap();
    assert_eq!(
        StateStore::new(&paths).read().unwrap().current_phase,
        Some(Phase::Testing)
    );
}

#[test]
fn test_minor_violation_is_recorded_and_ignored() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);

    engine
        .report_violation(
            "pic-research",
            ViolationSeverity::Minor,
            "touched a scratch file",
        )
        .unwrap();
    assert!(!StateStore::new(&paths).read().unwrap().blocked);
    engine.handoff(met_request(Phase::Research)).unwrap();
}

#[test]
fn test_open_conflict_blocks_only_its_stakes() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);
    let conflicts = crate::conflicts::ConflictProtocol::new(&paths);

    let conflict = conflicts
        .open(ConflictInput {
            category: ConflictCategory::Scope,
            positions: vec![
                Position {
                    holder: "pic-research".to_string(),
                    summary: "fixture project is in scope".to_string(),
                },
                Position {
                    holder: "pic-planning".to_string(),
                    summary: "fixture project is out of scope".to_string(),
                },
            ],
            stakes: vec![Phase::Planning],
            supersedes: None,
        })
        .unwrap();

    // Research exit is unaffected by a conflict staking planning.
    engine.handoff(met_request(Phase::Research)).unwrap();

    let result = engine.handoff(met_request(Phase::Planning));
    match result {
        Err(WorkflowError::ConflictsOpen { ids }) => assert_eq!(ids, vec![conflict.id.clone()]),
        other => panic!("expected ConflictsOpen, got ok={}", other.is_ok()),
    }

    conflicts
        .resolve(
            &conflict.id,
            crate::conflicts::ResolutionInput {
                outcome: crate::conflicts::ResolutionOutcome::PositionA,
                chosen_position: "fixture project is in scope".to_string(),
                rationale: "the plan depends on it".to_string(),
                decider: "pic-review".to_string(),
            },
        )
        .unwrap();
    assert_eq!(
        conflicts.load(&conflict.id).unwrap().status,
        ConflictStatus::Resolved
    );

    engine.handoff(met_request(Phase::Planning)).unwrap();
}

#[test]
fn test_skip_marks_intermediate_phase_and_notes_rationale() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);

    let mut request = met_request(Phase::Research);
    request.skip_to = Some(Phase::Design);
    request.skip_rationale = Some("plan supplied by the caller".to_string());
    let outcome = engine.handoff(request).unwrap();
    let HandoffOutcome::Advanced { record, .. } = outcome else {
        panic!("expected an advance");
    };

    assert_eq!(record.to_phase, Phase::Design);
    assert!(record.notes.contains("plan supplied by the caller"));

    let state = StateStore::new(&paths).read().unwrap();
    assert_eq!(state.status_of(Phase::Planning), PhaseStatus::Skipped);
    assert_eq!(state.current_phase, Some(Phase::Design));
}

#[test]
fn test_skip_without_rationale_is_rejected() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);

    let mut request = met_request(Phase::Research);
    request.skip_to = Some(Phase::Design);
    let result = engine.handoff(request);
    assert!(matches!(
        result,
        Err(WorkflowError::InvalidTransition { .. })
    ));
}

#[test]
fn test_terminal_handoff_completes_the_workflow() {
    let (_dir, paths) = workspace();
    let engine = TransitionEngine::new(&paths);

    // Record a couple of decisions along the way for the counts.
    let decisions = DecisionProtocol::new(&paths);
    decisions
        .record(DecisionInput {
            tier: DecisionTier::Lightweight,
            title: "during research".to_string(),
            alternatives: Vec::new(),
            rationale: "context".to_string(),
            evidence: Vec::new(),
            supersedes: None,
        })
        .unwrap();

    advance_through(&engine, Phase::Review);

    let outcome = engine.handoff(met_request(Phase::Review)).unwrap();
    let HandoffOutcome::Completed(summary) = outcome else {
        panic!("expected completion at the terminal phase");
    };

    let state = StateStore::new(&paths).read().unwrap();
    assert!(state.is_terminal());
    assert_eq!(state.current_phase, None);

    assert_eq!(summary.problem, "ship the feature");
    // Five handoffs happened, each contributing one deliverable.
    assert_eq!(summary.deliverables.len(), 5);
    let research_count = summary
        .decision_counts
        .iter()
        .find(|c| c.phase == Phase::Research)
        .unwrap()
        .count;
    assert_eq!(research_count, 1);
    for duration in summary
        .phase_durations
        .iter()
        .filter(|d| d.phase != Phase::Review)
    {
        assert!(duration.seconds.is_some());
    }
    assert!(paths.completion_file().exists());

    // A completed workflow has no current phase left to hand off.
    let result = engine.handoff(met_request(Phase::Review));
    assert!(matches!(result, Err(WorkflowError::NotInitialized)));
}

#[test]
fn test_handoff_before_init_reports_no_workflow() {
    let dir = tempdir().expect("temp dir");
    let paths = PicPaths::new(dir.path());
    let engine = TransitionEngine::new(&paths);

    let result = engine.handoff(met_request(Phase::Research));
    assert!(matches!(result, Err(WorkflowError::NotInitialized)));
}
