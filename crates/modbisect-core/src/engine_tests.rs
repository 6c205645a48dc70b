//! Scenario and property tests for the bisection engine.

use std::collections::BTreeMap;

use crate::activation::{ActivationPort, MemoryActivator};
use crate::candidates::Verdict;
use crate::engine::{RunOutcome, Session, SessionInput, SessionState, Snapshot, StepOutcome};
use crate::error_handling::{ActivationError, BisectError};
use crate::graph::ModSet;
use crate::oracle::{CulpritOracle, Response, ScriptedOracle};

fn set(ids: &[&str]) -> ModSet {
    ids.iter().map(|s| s.to_string()).collect()
}

fn deps(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    edges
        .iter()
        .map(|(from, to)| (from.to_string(), to.iter().map(|s| s.to_string()).collect()))
        .collect()
}

fn start(universe: &[&str], required: &[&str], extra: &[(&str, &[&str])]) -> Session {
    Session::start(SessionInput::new(set(universe), set(required), deps(extra))).unwrap()
}

fn converged(ids: &[&str]) -> SessionState {
    SessionState::Converged { culprit: set(ids) }
}

fn ceil_log2(n: usize) -> usize {
    let mut bits = 0;
    while (1usize << bits) < n {
        bits += 1;
    }
    bits
}

/// Fails the first `failures` activations, then behaves like `MemoryActivator`.
struct FlakyPort {
    failures: usize,
    inner: MemoryActivator,
}

impl ActivationPort for FlakyPort {
    fn activate(&mut self, enabled: &ModSet) -> Result<(), ActivationError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ActivationError::Conflict {
                id: "x".to_string(),
                enabled_path: "x.jar".to_string(),
                disabled_path: "x.jar.disabled".to_string(),
            });
        }
        self.inner.activate(enabled)
    }
}

#[test]
fn five_mods_converge_on_designated_culprit() {
    let mut session = start(&["A", "B", "C", "D", "E"], &[], &[]);
    let mut port = MemoryActivator::new();
    let mut oracle = CulpritOracle::new(["B"]);

    let outcome = session.run(&mut port, &mut oracle, |_| {}).unwrap();

    assert_eq!(outcome, RunOutcome::Finished(converged(&["B"])));
    let trials: Vec<(ModSet, Verdict)> = session
        .history()
        .iter()
        .map(|t| (t.probe.clone(), t.verdict))
        .collect();
    assert_eq!(
        trials,
        vec![
            (set(&["A", "B", "C"]), Verdict::Bad),
            (set(&["A", "B"]), Verdict::Bad),
            (set(&["A"]), Verdict::Good),
        ]
    );
    assert_eq!(oracle.asked(), 3);
}

#[test]
fn cycle_members_are_always_enabled_together() {
    let cycle: &[(&str, &[&str])] = &[("sodium", &["indium"]), ("indium", &["sodium"])];
    let session = start(&["sodium", "indium"], &[], cycle);
    assert_eq!(session.expand(&set(&["sodium"])), set(&["indium", "sodium"]));
    assert_eq!(session.expand(&set(&["indium"])), set(&["indium", "sodium"]));

    let mut session = start(&["indium", "iris", "sodium"], &[], cycle);
    let mut port = MemoryActivator::new();
    let mut oracle = CulpritOracle::new(["sodium"]);
    let mut seen = Vec::new();
    let outcome = session
        .run(&mut port, &mut oracle, |s: &Snapshot| seen.push(s.enabled.clone()))
        .unwrap();

    for enabled in &seen {
        assert_eq!(enabled.contains("sodium"), enabled.contains("indium"));
    }
    // The two cannot be separated, so they are reported as one group.
    assert_eq!(outcome, RunOutcome::Finished(converged(&["indium", "sodium"])));
}

#[test]
fn inseparable_universe_gets_a_confirmation_trial() {
    let cycle: &[(&str, &[&str])] = &[("sodium", &["indium"]), ("indium", &["sodium"])];

    let mut session = start(&["sodium", "indium"], &[], cycle);
    let offer = session.next_offer().unwrap().unwrap();
    assert_eq!(offer.probe, set(&["indium", "sodium"]));
    assert_eq!(offer.enabled, set(&["indium", "sodium"]));
    session.record_verdict(Verdict::Bad).unwrap();
    assert_eq!(session.state(), &converged(&["indium", "sodium"]));
    assert_eq!(session.history().len(), 1);

    let mut session = start(&["sodium", "indium"], &[], cycle);
    session.next_offer().unwrap();
    session.record_verdict(Verdict::Good).unwrap();
    assert_eq!(session.state(), &SessionState::Inconclusive);
}

#[test]
fn good_verdict_on_last_suspect_is_inconclusive() {
    let mut session = start(&["only"], &[], &[]);
    let offer = session.next_offer().unwrap().unwrap();
    assert_eq!(offer.probe, set(&["only"]));

    let snapshot = session.record_verdict(Verdict::Good).unwrap();
    assert_eq!(snapshot.state, SessionState::Inconclusive);
    assert_eq!(session.state(), &SessionState::Inconclusive);
    assert!(session.undetermined().is_empty());
}

#[test]
fn bad_verdict_on_last_suspect_confirms_it() {
    let mut session = start(&["only", "req"], &["req"], &[]);
    let offer = session.next_offer().unwrap().unwrap();
    assert_eq!(offer.enabled, set(&["only", "req"]));
    session.record_verdict(Verdict::Bad).unwrap();
    assert_eq!(session.state(), &converged(&["only"]));
}

#[test]
fn all_required_is_inconclusive_immediately() {
    let mut session = start(&["a", "b"], &["a", "b"], &[]);
    assert_eq!(session.state(), &SessionState::Inconclusive);
    assert!(session.next_offer().unwrap().is_none());
}

#[test]
fn required_mods_always_enabled_and_undetermined_set_shrinks() {
    for n in 1..=33usize {
        let ids: Vec<String> = (0..n).map(|i| format!("mod{:02}", i)).collect();
        for culprit in &ids {
            let mut universe: ModSet = ids.iter().cloned().collect();
            universe.insert("fabric-api".to_string());
            let mut session = Session::start(SessionInput::new(
                universe,
                set(&["fabric-api"]),
                BTreeMap::new(),
            ))
            .unwrap();

            let mut port = MemoryActivator::new();
            let mut oracle = CulpritOracle::new([culprit.clone()]);
            let mut previous: ModSet = ids.iter().cloned().collect();
            let outcome = session
                .run(&mut port, &mut oracle, |s: &Snapshot| {
                    assert!(s.enabled.contains("fabric-api"));
                    assert!(s.remaining.is_subset(&previous));
                    // Only the single-suspect confirmation trial may leave the set as is.
                    assert!(
                        s.remaining.len() < previous.len() || s.state.is_terminal(),
                        "n={} culprit={}",
                        n,
                        culprit
                    );
                    previous = s.remaining.clone();
                })
                .unwrap();

            assert_eq!(
                outcome,
                RunOutcome::Finished(SessionState::Converged {
                    culprit: [culprit.clone()].into_iter().collect()
                })
            );
            assert!(
                session.history().len() <= ceil_log2(n) + 1,
                "n={} took {} trials",
                n,
                session.history().len()
            );
        }
    }
}

#[test]
fn activation_failure_reoffers_the_same_trial() {
    let mut session = start(&["a", "b", "c", "d"], &[], &[]);
    let mut port = FlakyPort {
        failures: 1,
        inner: MemoryActivator::new(),
    };
    let mut oracle = CulpritOracle::new(["c"]);

    let err = session.step(&mut port, &mut oracle).unwrap_err();
    assert!(matches!(err, BisectError::Activation(ActivationError::Conflict { .. })));
    let pending = session.pending().cloned().unwrap();
    assert_eq!(pending.iteration, 1);
    assert!(session.history().is_empty());
    assert_eq!(oracle.asked(), 0);

    match session.step(&mut port, &mut oracle).unwrap() {
        StepOutcome::Recorded(snapshot) => {
            assert_eq!(snapshot.iteration, 1);
            assert_eq!(snapshot.probe, pending.probe);
        }
        other => panic!("expected a recorded trial, got {:?}", other),
    }
}

#[test]
fn abort_keeps_history_and_session_resumes() {
    let mut session = start(&["A", "B", "C", "D"], &[], &[]);
    let mut port = MemoryActivator::new();
    let mut scripted = ScriptedOracle::new([Response::Bad]);

    let outcome = session.run(&mut port, &mut scripted, |_| {}).unwrap();
    assert_eq!(outcome, RunOutcome::Aborted);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.undetermined(), &set(&["A", "B"]));
    assert_eq!(session.pending().map(|p| p.iteration), Some(2));

    let saved = serde_json::to_string(&session).unwrap();
    let mut resumed: Session = serde_json::from_str(&saved).unwrap();
    let mut oracle = CulpritOracle::new(["A"]);
    let outcome = resumed.run(&mut port, &mut oracle, |_| {}).unwrap();
    assert_eq!(outcome, RunOutcome::Finished(converged(&["A"])));
    assert_eq!(resumed.history().len(), 2);
}

#[test]
fn bad_verdict_with_pulled_in_dependency_is_flagged() {
    let mut session = start(&["a", "b", "c", "d"], &[], &[("a", &["d"])]);
    let mut port = MemoryActivator::new();
    let mut oracle = CulpritOracle::new(["d"]);

    let first = match session.step(&mut port, &mut oracle).unwrap() {
        StepOutcome::Recorded(s) => s,
        other => panic!("expected a recorded trial, got {:?}", other),
    };
    assert_eq!(first.probe, set(&["a", "b"]));
    assert_eq!(first.enabled, set(&["a", "b", "d"]));
    assert_eq!(first.ambiguous_extras, set(&["d"]));
    assert_eq!(first.remaining, set(&["a", "b", "d"]));

    let mut seen = Vec::new();
    session
        .run(&mut port, &mut oracle, |s: &Snapshot| seen.push(s.enabled.clone()))
        .unwrap();
    for enabled in &seen {
        assert!(!enabled.contains("a") || enabled.contains("d"));
    }
    assert_eq!(session.state(), &converged(&["d"]));
    assert_eq!(session.report().ambiguous_trials, vec![1]);
}

#[test]
fn unknown_ids_are_reported_together() {
    let err = Session::start(SessionInput::new(
        set(&["a", "b"]),
        set(&["ghost"]),
        deps(&[("a", &["phantom"]), ("wraith", &["b"])]),
    ))
    .unwrap_err();
    match err {
        BisectError::Configuration { issues, .. } => {
            assert_eq!(issues.len(), 3);
            assert!(issues.iter().any(|i| i.contains("ghost")));
            assert!(issues.iter().any(|i| i.contains("phantom")));
            assert!(issues.iter().any(|i| i.contains("wraith")));
        }
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn metadata_dependencies_outside_the_directory_are_ignored() {
    let input = SessionInput::new(set(&["a", "b", "c"]), ModSet::new(), BTreeMap::new())
        .with_declared_deps(deps(&[("a", &["minecraft", "fabricloader", "b"])]));
    let session = Session::start(input).unwrap();
    assert_eq!(session.expand(&set(&["a"])), set(&["a", "b"]));
}

#[test]
fn dependencies_of_required_mods_are_locked_on() {
    let session = start(&["a", "b", "c", "lib"], &["a"], &[("a", &["lib"])]);
    assert_eq!(session.required(), &set(&["a", "lib"]));
    assert_eq!(session.undetermined(), &set(&["b", "c"]));
}

#[test]
fn require_mid_session_recomputes_offer() {
    let mut session = start(&["a", "b", "c", "d"], &[], &[]);
    let first = session.next_offer().unwrap().unwrap();
    assert_eq!(first.probe, set(&["a", "b"]));

    let moved = session.require("a").unwrap();
    assert_eq!(moved, set(&["a"]));
    assert!(session.pending().is_none());

    let next = session.next_offer().unwrap().unwrap();
    assert!(!next.probe.contains("a"));
    assert!(next.enabled.contains("a"));
    assert!(session.require("nope").is_err());
}

#[test]
fn added_dependency_applies_to_next_offer() {
    let mut session = start(&["a", "b", "c", "d"], &[], &[]);
    session.next_offer().unwrap();
    assert!(session.add_dependency("a", "c").unwrap());
    assert!(session.pending().is_none());

    let offer = session.next_offer().unwrap().unwrap();
    assert_eq!(offer.probe, set(&["a", "b"]));
    assert_eq!(offer.enabled, set(&["a", "b", "c"]));
    assert!(!session.add_dependency("a", "c").unwrap());
}

#[test]
fn verdict_without_offer_is_invariant_violation() {
    let mut session = start(&["a", "b"], &[], &[]);
    let err = session.record_verdict(Verdict::Bad).unwrap_err();
    assert!(matches!(err, BisectError::InvariantViolation { .. }));
    assert_eq!(session.state(), &SessionState::AwaitingTrial);
    assert!(session.history().is_empty());
    assert_eq!(session.undetermined(), &set(&["a", "b"]));
}

#[test]
fn finished_session_rejects_changes() {
    let mut session = start(&["a", "b"], &[], &[]);
    let mut port = MemoryActivator::new();
    let mut oracle = CulpritOracle::new(["b"]);
    session.run(&mut port, &mut oracle, |_| {}).unwrap();
    assert!(session.is_terminal());

    assert_eq!(
        session.step(&mut port, &mut oracle).unwrap(),
        StepOutcome::Finished(converged(&["b"]))
    );
    assert!(matches!(
        session.require("a").unwrap_err(),
        BisectError::Session { .. }
    ));

    let report = session.report();
    assert_eq!(report.culprit, Some(set(&["b"])));
    assert_eq!(report.trials, 1);
    assert!(report.render()[0].contains("Culprit found: b"));
}
