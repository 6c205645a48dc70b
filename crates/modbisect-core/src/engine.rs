//! Bisection engine: owns the session state and drives offer → activate → verdict cycles.
//!
//! Every trial enables `required ∪ closure(probe)` for a probe drawn from the undetermined
//! set, so required mods are always on and no mod is enabled without its dependencies.
//! The undetermined set only shrinks. The session ends `Converged` when one mod (or one
//! group of mods that cannot be enabled apart) remains, and `Inconclusive` when nothing
//! remains.

use std::collections::BTreeMap;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationPort;
use crate::candidates::{CandidateSet, Verdict};
use crate::error_handling::{configuration_error, invariant_violation, BisectError};
use crate::graph::{DependencyGraph, ModId, ModSet};
use crate::oracle::VerdictOracle;
use crate::utils::{self, join_ids};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    AwaitingTrial,
    Converged { culprit: ModSet },
    /// Nothing left to suspect: the verdicts contradict a single-culprit failure.
    Inconclusive,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::AwaitingTrial)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::AwaitingTrial => "awaiting trial",
            SessionState::Converged { .. } => "converged",
            SessionState::Inconclusive => "inconclusive",
        }
    }
}

/// Already-parsed configuration plus the scanned universe.
#[derive(Clone, Debug, Default)]
pub struct SessionInput {
    /// Every mod id in the mod directory, required ones included.
    pub universe: ModSet,
    pub required: ModSet,
    pub extra_deps: BTreeMap<ModId, Vec<ModId>>,
    /// Dependencies from mod metadata; ids outside the universe are ignored.
    pub declared_deps: BTreeMap<ModId, Vec<ModId>>,
}

impl SessionInput {
    pub fn new(universe: ModSet, required: ModSet, extra_deps: BTreeMap<ModId, Vec<ModId>>) -> Self {
        Self {
            universe,
            required,
            extra_deps,
            declared_deps: BTreeMap::new(),
        }
    }

    pub fn with_declared_deps(mut self, declared_deps: BTreeMap<ModId, Vec<ModId>>) -> Self {
        self.declared_deps = declared_deps;
        self
    }
}

/// A trial that has been offered but not judged yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialOffer {
    pub iteration: usize,
    pub probe: ModSet,
    pub enabled: ModSet,
}

/// One judged trial in the session history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    pub iteration: usize,
    pub probe: ModSet,
    pub enabled: ModSet,
    pub verdict: Verdict,
    /// Mods enabled only as dependencies of the probe when the bug reproduced.
    #[serde(default, skip_serializing_if = "ModSet::is_empty")]
    pub ambiguous_extras: ModSet,
    /// Size of the undetermined set after this trial.
    pub remaining: usize,
    pub recorded_at: String,
}

/// Progress report after each transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub iteration: usize,
    pub probe: ModSet,
    pub enabled: ModSet,
    pub verdict: Verdict,
    pub remaining: ModSet,
    pub state: SessionState,
    #[serde(skip_serializing_if = "ModSet::is_empty")]
    pub ambiguous_extras: ModSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Recorded(Snapshot),
    /// The session was already terminal; nothing was offered.
    Finished(SessionState),
    /// The oracle aborted; the pending trial stays in place.
    Aborted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Finished(SessionState),
    Aborted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    candidates: CandidateSet,
    graph: DependencyGraph,
    history: Vec<Trial>,
    pending: Option<TrialOffer>,
    state: SessionState,
}

impl Session {
    /// Validate the input and create a session. Unknown ids in `required` or `extra_deps`
    /// are all reported in one configuration error.
    pub fn start(input: SessionInput) -> Result<Self, BisectError> {
        let mut issues: Vec<String> = input
            .required
            .iter()
            .filter(|id| !input.universe.contains(*id))
            .map(|id| format!("required mod `{}` is not in the mod directory", id))
            .collect();
        let (mut graph, unknown) = DependencyGraph::build(&input.extra_deps, &input.universe);
        issues.extend(unknown.iter().map(|u| u.describe()));
        if !issues.is_empty() {
            return Err(configuration_error("session start", issues));
        }
        graph.add_declared(&input.declared_deps, &input.universe);

        // Whatever a required mod depends on has to stay on too.
        let locked = graph.closure(&input.required);
        let pulled: ModSet = locked.difference(&input.required).cloned().collect();
        if !pulled.is_empty() {
            utils::log(&format!(
                "Locked on as dependencies of required mods: {}",
                join_ids(&pulled)
            ));
        }

        let mut session = Self {
            candidates: CandidateSet::new(&input.universe, &locked),
            graph,
            history: Vec::new(),
            pending: None,
            state: SessionState::AwaitingTrial,
        };
        session.refresh_state();
        utils::log(&format!(
            "Session started: {} candidates, {} required, {} dependency edges",
            session.candidates.universe().len(),
            session.candidates.required().len(),
            session.graph.edge_count()
        ));
        Ok(session)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn history(&self) -> &[Trial] {
        &self.history
    }

    pub fn pending(&self) -> Option<&TrialOffer> {
        self.pending.as_ref()
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn undetermined(&self) -> &ModSet {
        self.candidates.undetermined()
    }

    pub fn required(&self) -> &ModSet {
        self.candidates.required()
    }

    /// `required ∪ closure(probe)`: what a trial of `probe` has to enable.
    pub fn expand(&self, probe: &ModSet) -> ModSet {
        let mut enabled = self.graph.closure(probe);
        enabled.extend(self.candidates.required().iter().cloned());
        enabled
    }

    /// Trials still needed if every split halves the undetermined set.
    pub fn estimated_trials_left(&self) -> usize {
        if self.is_terminal() {
            return 0;
        }
        let n = self.undetermined().len();
        if n <= 1 {
            return n;
        }
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }

    /// The trial to run next. Returns the pending offer if there is one (re-offer after an
    /// activation failure), `None` once the session is terminal.
    pub fn next_offer(&mut self) -> Result<Option<TrialOffer>, BisectError> {
        if self.is_terminal() {
            return Ok(None);
        }
        if let Some(pending) = &self.pending {
            return Ok(Some(pending.clone()));
        }

        let probe = match self.partitioning_probe() {
            Some(probe) => probe,
            None => {
                let group = self.undetermined().clone();
                utils::log(&format!(
                    "Remaining mods cannot be enabled apart (dependencies): {}",
                    join_ids(&group)
                ));
                if !self.history.iter().any(|t| t.verdict == Verdict::Bad) {
                    // No trial has reproduced the bug yet: confirm the whole group first.
                    group
                } else {
                    self.finish(SessionState::Converged { culprit: group });
                    return Ok(None);
                }
            }
        };
        let enabled = self.expand(&probe);
        self.check_offer(&probe, &enabled)?;

        let offer = TrialOffer {
            iteration: self.history.len() + 1,
            probe,
            enabled,
        };
        self.pending = Some(offer.clone());
        Ok(Some(offer))
    }

    /// Probe from the candidate manager, flipped to the other half when its closure would
    /// swallow the whole undetermined set. If neither half splits it, packs whole
    /// dependency groups up to half the set. `None` when no probe can split it.
    fn partitioning_probe(&self) -> Option<ModSet> {
        let undetermined = self.undetermined();
        let probe = self.candidates.select_probe();
        if undetermined.len() < 2 {
            return Some(probe);
        }
        let splits = |p: &ModSet| !undetermined.is_subset(&self.graph.closure(p));
        if splits(&probe) {
            return Some(probe);
        }
        let front = self.candidates.front_split();
        let other = if probe == front {
            self.candidates.back_split()
        } else {
            front
        };
        if other != probe && splits(&other) {
            return Some(other);
        }

        let target = undetermined.len().div_ceil(2);
        let mut packed = ModSet::new();
        for id in undetermined {
            if packed.len() >= target {
                break;
            }
            if packed.contains(id) {
                continue;
            }
            let mut grown = packed.clone();
            grown.extend(
                self.graph
                    .closure(std::iter::once(id))
                    .into_iter()
                    .filter(|m| undetermined.contains(m)),
            );
            if splits(&grown) {
                packed = grown;
            }
        }
        if packed.is_empty() {
            None
        } else {
            Some(packed)
        }
    }

    /// The offer must be exactly `required ∪ closure(probe)` with probe ⊆ undetermined.
    fn check_offer(&self, probe: &ModSet, enabled: &ModSet) -> Result<(), BisectError> {
        if probe.is_empty() || !probe.is_subset(self.undetermined()) {
            return Err(invariant_violation(
                "next_offer",
                format!("probe {} is not drawn from the undetermined set", join_ids(probe)),
            ));
        }
        if !self.required().is_subset(enabled) {
            return Err(invariant_violation("next_offer", "trial omits a required mod"));
        }
        if self.graph.closure(enabled) != *enabled {
            return Err(invariant_violation(
                "next_offer",
                "trial enables a mod without its dependencies",
            ));
        }
        Ok(())
    }

    /// Apply a verdict to the pending offer. Calling this with no pending offer (see
    /// `next_offer`) is a caller error: it is rejected and the session is left unchanged.
    pub fn record_verdict(&mut self, verdict: Verdict) -> Result<Snapshot, BisectError> {
        if self.is_terminal() {
            return Err(invariant_violation(
                "record_verdict",
                format!("session is already {}", self.state.label()),
            ));
        }
        let offer = self
            .pending
            .take()
            .ok_or_else(|| invariant_violation("record_verdict", "no trial is pending"))?;

        let effect = self
            .candidates
            .apply_verdict(&offer.probe, &offer.enabled, verdict)?;
        if verdict == Verdict::Bad && !effect.ambiguous_extras.is_empty() {
            utils::log(&format!(
                "Warning: trial {} reproduced the bug with {} enabled only as dependencies; \
                 keeping them under suspicion",
                offer.iteration,
                join_ids(&effect.ambiguous_extras)
            ));
        }

        let remaining = self.undetermined().clone();
        self.history.push(Trial {
            iteration: offer.iteration,
            probe: offer.probe.clone(),
            enabled: offer.enabled.clone(),
            verdict,
            ambiguous_extras: effect.ambiguous_extras.clone(),
            remaining: remaining.len(),
            recorded_at: Local::now().to_rfc3339(),
        });

        if remaining.is_empty() {
            self.finish(SessionState::Inconclusive);
        } else if remaining.len() == 1 || effect.unchanged {
            self.finish(SessionState::Converged {
                culprit: remaining.clone(),
            });
        }

        Ok(Snapshot {
            iteration: offer.iteration,
            probe: offer.probe,
            enabled: offer.enabled,
            verdict,
            remaining,
            state: self.state.clone(),
            ambiguous_extras: effect.ambiguous_extras,
        })
    }

    /// One offer → activate → ask → record cycle. Activation errors leave the offer pending.
    pub fn step<P, O>(&mut self, port: &mut P, oracle: &mut O) -> Result<StepOutcome, BisectError>
    where
        P: ActivationPort + ?Sized,
        O: VerdictOracle + ?Sized,
    {
        let offer = match self.next_offer()? {
            Some(offer) => offer,
            None => return Ok(StepOutcome::Finished(self.state.clone())),
        };
        port.activate(&offer.enabled)?;
        match oracle.ask_verdict(&offer.enabled).verdict() {
            Some(verdict) => Ok(StepOutcome::Recorded(self.record_verdict(verdict)?)),
            None => {
                utils::log(&format!(
                    "Aborted at trial {}; {} trials recorded",
                    offer.iteration,
                    self.history.len()
                ));
                Ok(StepOutcome::Aborted)
            }
        }
    }

    /// Step until the session is terminal or the oracle aborts.
    pub fn run<P, O, F>(
        &mut self,
        port: &mut P,
        oracle: &mut O,
        mut observer: F,
    ) -> Result<RunOutcome, BisectError>
    where
        P: ActivationPort + ?Sized,
        O: VerdictOracle + ?Sized,
        F: FnMut(&Snapshot),
    {
        loop {
            match self.step(port, oracle)? {
                StepOutcome::Recorded(snapshot) => observer(&snapshot),
                StepOutcome::Finished(state) => return Ok(RunOutcome::Finished(state)),
                StepOutcome::Aborted => return Ok(RunOutcome::Aborted),
            }
        }
    }

    fn known(&self, id: &str) -> bool {
        self.candidates.universe().contains(id) || self.candidates.required().contains(id)
    }

    fn ensure_open(&self, operation: &str) -> Result<(), BisectError> {
        if self.is_terminal() {
            return Err(BisectError::Session {
                operation: operation.to_string(),
                source: format!("session is already {}", self.state.label()),
            });
        }
        Ok(())
    }

    /// Keep `id` (and everything it depends on) enabled for the rest of the session.
    /// Returns the mods that became required. Drops the pending offer.
    pub fn require(&mut self, id: &str) -> Result<ModSet, BisectError> {
        self.ensure_open("require")?;
        if !self.known(id) {
            return Err(configuration_error(
                "require",
                vec![format!("`{}` is not in the mod directory", id)],
            ));
        }
        let lock = self.graph.closure(std::iter::once(&id.to_string()));
        let moved = self.candidates.lock(&lock);
        if !moved.is_empty() {
            utils::log(&format!("Now required: {}", join_ids(&moved)));
        }
        self.pending = None;
        self.refresh_state();
        Ok(moved)
    }

    /// Record that `id` needs `dependency`. Drops the pending offer so the next offer
    /// respects the new edge. Returns false if the edge already existed.
    pub fn add_dependency(&mut self, id: &str, dependency: &str) -> Result<bool, BisectError> {
        self.ensure_open("add_dependency")?;
        let unknown: Vec<String> = [id, dependency]
            .iter()
            .filter(|m| !self.known(m))
            .map(|m| format!("`{}` is not in the mod directory", m))
            .collect();
        if !unknown.is_empty() {
            return Err(configuration_error("add_dependency", unknown));
        }
        if id == dependency {
            return Ok(false);
        }
        let added = self.graph.add_edge(id, dependency);
        if self.candidates.is_required(&id.to_string()) {
            let lock = self.graph.closure(std::iter::once(&dependency.to_string()));
            self.candidates.lock(&lock);
        }
        self.pending = None;
        self.refresh_state();
        Ok(added)
    }

    fn refresh_state(&mut self) {
        if self.is_terminal() {
            return;
        }
        let undetermined = self.undetermined().clone();
        match undetermined.len() {
            0 => self.finish(SessionState::Inconclusive),
            1 if !self.history.is_empty() => {
                self.finish(SessionState::Converged {
                    culprit: undetermined,
                })
            }
            _ => {}
        }
    }

    fn finish(&mut self, state: SessionState) {
        self.pending = None;
        match &state {
            SessionState::Converged { culprit } => {
                utils::log(&format!("Converged on {}", join_ids(culprit)))
            }
            SessionState::Inconclusive => utils::log(
                "Inconclusive: bug not isolated to a single mod; \
                 consider a multi-mod or environment-dependent failure",
            ),
            SessionState::AwaitingTrial => {}
        }
        self.state = state;
    }
}
