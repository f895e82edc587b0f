//! End-to-end tests for the decision core.
//!
//! These build realistic goal stacks through the public API and exercise the
//! consistency checker, cascading removal and the activity waterfall together.

use akh_decide::activity::{Activation, ActivationClass, FiringType};
use akh_decide::changes::WmChange;
use akh_decide::config::DecideConfig;
use akh_decide::decide::{
    ActiveLevelState, Decider, Decision, LevelTransition, TransitionReason, WaterfallOutcome,
};
use akh_decide::goal::{GoalId, Impasse, ImpasseKind};
use akh_decide::phase::Phase;
use akh_decide::preference::Preference;
use akh_decide::scenario::{Scenario, StepOutcome};
use akh_decide::semantics::IndifferentSelection;
use akh_decide::slot::ContextAttribute;
use akh_decide::symbol::SymbolId;

fn test_decider() -> Decider {
    Decider::from_config(&DecideConfig {
        indifferent_selection: IndifferentSelection::First,
        ..Default::default()
    })
}

/// Top goal with `O1` installed above an operator no-change sub-goal.
fn operator_over_subgoal(d: &mut Decider) -> (GoalId, GoalId, SymbolId) {
    let s1 = d.create_top_goal().unwrap();
    let o1 = d.symbols_mut().intern("O1").unwrap();
    d.stack_mut()
        .add_preference(s1, Preference::acceptable(o1))
        .unwrap();
    assert_eq!(d.decide_operator(s1).unwrap(), Decision::Installed(o1));
    let Decision::Impasse { goal: s2, .. } = d.decide_operator(s1).unwrap() else {
        panic!("expected an operator no-change");
    };
    (s1, s2, o1)
}

/// Four goals: a tie at level 1, then state no-changes below it.
fn four_level_stack(d: &mut Decider) -> Vec<GoalId> {
    let s1 = d.create_top_goal().unwrap();
    let o1 = d.symbols_mut().intern("O1").unwrap();
    let o2 = d.symbols_mut().intern("O2").unwrap();
    d.stack_mut()
        .add_preference(s1, Preference::acceptable(o1))
        .unwrap();
    d.stack_mut()
        .add_preference(s1, Preference::acceptable(o2))
        .unwrap();
    d.decide_operator(s1).unwrap();
    let s2 = d.stack().bottom().unwrap();
    d.decide_operator(s2).unwrap();
    let s3 = d.stack().bottom().unwrap();
    d.decide_operator(s3).unwrap();
    let s4 = d.stack().bottom().unwrap();
    vec![s1, s2, s3, s4]
}

#[test]
fn scenario_a_replaced_candidate_invalidates_operator() {
    let mut d = test_decider();
    let (s1, s2, o1) = operator_over_subgoal(&mut d);

    // The operator's only acceptable preference is replaced by another.
    let o2 = d.symbols_mut().intern("O2").unwrap();
    let keep = d.stack().goal(s1).unwrap().operator().preference_entries()[0].0;
    d.stack_mut().remove_preference(s1, keep).unwrap();
    d.stack_mut()
        .add_preference(s1, Preference::acceptable(o2))
        .unwrap();

    assert!(!d.is_consistent(s1).unwrap());
    d.remove_decision(s1).unwrap();

    let top = d.stack().goal(s1).unwrap();
    assert!(top.operator().installed().is_none());
    assert!(!top.has_subgoal());
    assert!(!d.stack().contains(s2));
    assert_eq!(d.stack().depth(), 1);
    assert!(d.working_memory().applied().iter().any(|c| matches!(
        c,
        WmChange::FactRemoved { value, .. } if *value == o1
    )));
}

#[test]
fn scenario_b_indifferent_alternative_keeps_operator() {
    let mut d = test_decider();
    let (s1, s2, o1) = operator_over_subgoal(&mut d);

    let o2 = d.symbols_mut().intern("O2").unwrap();
    for pref in [
        Preference::acceptable(o2),
        Preference::indifferent(o2),
        Preference::indifferent(o1),
    ] {
        d.stack_mut().add_preference(s1, pref).unwrap();
    }

    assert!(d.is_consistent(s1).unwrap());
    assert!(d.check_stack_through_goal(s2).unwrap());
    assert!(d.stack().contains(s2));
}

#[test]
fn scenario_c_tie_stays_consistent_as_candidates_change() {
    let mut d = test_decider();
    let stack = four_level_stack(&mut d);
    let (s1, s2) = (stack[0], stack[1]);
    assert_eq!(
        d.stack().goal(s2).unwrap().impasse(),
        Some(Impasse::new(ImpasseKind::Tie, ContextAttribute::Operator))
    );

    let o3 = d.symbols_mut().intern("O3").unwrap();
    d.stack_mut()
        .add_preference(s1, Preference::acceptable(o3))
        .unwrap();

    assert!(d.is_consistent(s1).unwrap());
    assert!(d.check_stack_through_goal(stack[3]).unwrap());
    assert_eq!(d.stack().depth(), 4);
}

#[test]
fn scenario_d_quiescence_check_removes_decision_and_still_changes_phase() {
    for (apply, phase) in [(true, Phase::Output), (false, Phase::Decision)] {
        let mut d = test_decider();
        let (s1, s2, o1) = operator_over_subgoal(&mut d);
        d.stack_mut()
            .add_preference(s1, Preference::reject(o1))
            .unwrap();

        let mut state = ActiveLevelState::new();
        let outcome = if apply {
            d.run_waterfall_apply(&mut state).unwrap()
        } else {
            d.run_waterfall_propose(&mut state).unwrap()
        };

        assert_eq!(
            outcome,
            WaterfallOutcome::PhaseChange {
                phase,
                reason: TransitionReason::Quiescence,
            }
        );
        assert!(!d.stack().contains(s2));
        assert!(d.stack().goal(s1).unwrap().operator().installed().is_none());
        assert_eq!(d.phases().current(), phase);
    }
}

#[test]
fn scenario_e_higher_level_checks_before_committing() {
    let mut d = test_decider();
    let (s1, s2, o1) = operator_over_subgoal(&mut d);
    d.stack_mut()
        .enqueue(s2, ActivationClass::OutputAssertion, Activation::new("apply*deep"))
        .unwrap();

    let mut state = ActiveLevelState::new();
    d.run_waterfall_apply(&mut state).unwrap();
    assert_eq!(state.active_level(), 2);
    assert_eq!(state.firing_type(), FiringType::PreferenceElaboration);

    // While the deeper goal ran, the top operator was rejected.
    d.stack_mut()
        .add_preference(s1, Preference::reject(o1))
        .unwrap();
    d.stack_mut()
        .enqueue(s1, ActivationClass::InferenceAssertion, Activation::new("elab*top"))
        .unwrap();

    let outcome = d.run_waterfall_apply(&mut state).unwrap();
    assert_eq!(
        outcome,
        WaterfallOutcome::PhaseChange {
            phase: Phase::Output,
            reason: TransitionReason::Inconsistency,
        }
    );
    assert_eq!(state.firing_type(), FiringType::PreferenceElaboration);
    assert!(!d.stack().contains(s2));
}

#[test]
fn higher_level_with_consistent_change_fires_and_consumes_marker() {
    let mut d = test_decider();
    let (s1, s2, o1) = operator_over_subgoal(&mut d);
    d.stack_mut()
        .enqueue(s2, ActivationClass::OutputAssertion, Activation::new("apply*deep"))
        .unwrap();
    let mut state = ActiveLevelState::new();
    d.run_waterfall_apply(&mut state).unwrap();

    d.stack_mut()
        .add_preference(s1, Preference::best(o1))
        .unwrap();
    d.stack_mut()
        .enqueue(s1, ActivationClass::InferenceAssertion, Activation::new("elab*top"))
        .unwrap();

    let outcome = d.run_waterfall_apply(&mut state).unwrap();
    assert_eq!(
        outcome,
        WaterfallOutcome::Fire {
            goal: Some(s1),
            level: 1,
            firing_type: FiringType::InferenceElaboration,
            transition: LevelTransition::HigherLevel,
        }
    );
    assert!(!d.stack().goal(s1).unwrap().operator().is_changed());
    assert!(d.stack().contains(s2));
}

#[test]
fn cascading_removal_drops_every_lower_goal() {
    let mut d = test_decider();
    let stack = four_level_stack(&mut d);
    assert_eq!(d.stack().depth(), 4);

    d.remove_decision(stack[1]).unwrap();

    assert_eq!(d.stack().depth(), 2);
    assert_eq!(d.stack().bottom(), Some(stack[1]));
    assert!(!d.stack().goal(stack[1]).unwrap().has_subgoal());
    assert!(d.stack().get(stack[2]).is_none());
    assert!(d.stack().get(stack[3]).is_none());
    d.stack().check_invariants().unwrap();

    // Deepest goal is removed first.
    let removed: Vec<u32> = d
        .working_memory()
        .applied()
        .iter()
        .filter_map(|c| match c {
            WmChange::GoalRemoved { level, .. } => Some(*level),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec![4, 3]);

    // A fresh sub-goal reuses an arena slot without reviving stale handles.
    d.decide_operator(stack[1]).unwrap();
    let fresh = d.stack().bottom().unwrap();
    assert_eq!(d.stack().goal(fresh).unwrap().level(), 3);
    assert!(!d.stack().contains(stack[2]));
    assert!(!d.stack().contains(stack[3]));
}

#[test]
fn consistency_check_is_idempotent_and_commits_nothing() {
    let mut d = test_decider();
    let (s1, _s2, _o1) = operator_over_subgoal(&mut d);
    let commits = d.semantics().commits();
    let flushes = d.working_memory().flush_count();

    let first = d.is_consistent(s1).unwrap();
    let second = d.is_consistent(s1).unwrap();

    assert_eq!(first, second);
    assert_eq!(d.semantics().commits(), commits);
    assert_eq!(d.working_memory().flush_count(), flushes);
}

#[test]
fn pending_retractions_of_removed_goals_become_nil_goal_retractions() {
    let mut d = test_decider();
    let (s1, s2, o1) = operator_over_subgoal(&mut d);
    d.stack_mut()
        .enqueue(s2, ActivationClass::Retraction, Activation::new("elab*gone"))
        .unwrap();
    d.stack_mut()
        .add_preference(s1, Preference::reject(o1))
        .unwrap();

    assert!(!d.check_stack_through_goal(s1).unwrap());
    assert_eq!(d.stack().nil_goal_retractions().len(), 1);

    let mut state = ActiveLevelState::new();
    let outcome = d.run_waterfall_apply(&mut state).unwrap();
    assert_eq!(
        outcome,
        WaterfallOutcome::Fire {
            goal: None,
            level: 0,
            firing_type: FiringType::InferenceElaboration,
            transition: LevelTransition::NilGoalRetractions,
        }
    );
}

#[test]
fn scenario_file_runs_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("tie.toml");
    std::fs::write(
        &path,
        r#"
name = "resolved tie"

[[goals]]
preferences = [
  { kind = "acceptable", value = "O1" },
  { kind = "acceptable", value = "O2" },
]

[[steps]]
action = "decide"
level = 1

[[steps]]
action = "add_preference"
level = 1
kind = "better"
value = "O2"
referent = "O1"

[[steps]]
action = "check"
level = 2

[[steps]]
action = "decide"
level = 1
"#,
    )
    .unwrap();

    let config = DecideConfig {
        indifferent_selection: IndifferentSelection::First,
        ..Default::default()
    };
    let scenario = Scenario::load(&path).unwrap();
    let run = scenario.run(&config).unwrap();
    let trace = run.trace();

    assert!(matches!(
        trace[0].outcome,
        StepOutcome::Decision {
            decision: Decision::Impasse { .. },
            ..
        }
    ));
    assert_eq!(trace[0].depth, 2);
    // The tie became a unique choice: the tie sub-goal is removed.
    assert_eq!(
        trace[2].outcome,
        StepOutcome::Checked {
            level: 2,
            consistent: false
        }
    );
    assert_eq!(trace[2].depth, 1);
    let o2 = run.decider().symbols().lookup("O2").unwrap();
    assert_eq!(
        trace[3].outcome,
        StepOutcome::Decision {
            level: 1,
            decision: Decision::Installed(o2)
        }
    );
}

#[test]
fn config_round_trips_through_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("decide.toml");
    let config = DecideConfig {
        max_elaborations: 7,
        indifferent_selection: IndifferentSelection::First,
        seed: 42,
        check_invariants: false,
    };
    config.save(&path).unwrap();

    let loaded = DecideConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}
