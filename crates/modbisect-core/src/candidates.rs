//! Candidate set manager: which mods are still suspects, which are cleared, which are locked on.

use serde::{Deserialize, Serialize};

use crate::error_handling::{invariant_violation, BisectError};
use crate::graph::{ModId, ModSet};

/// Pass/fail result of one trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Bug absent.
    Good,
    /// Bug reproduced.
    Bad,
}

/// What a verdict did to the undetermined set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerdictEffect {
    /// Mods that left the undetermined set (now cleared).
    pub cleared: ModSet,
    /// Non-required mods enabled only through dependency closure on a bad verdict.
    /// Non-empty means the failure cannot be pinned on the probe alone.
    pub ambiguous_extras: ModSet,
    /// True when the undetermined set did not change.
    pub unchanged: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    /// Every mod under test (mod directory minus required and locked mods).
    universe: ModSet,
    /// Always enabled in every trial.
    required: ModSet,
    undetermined: ModSet,
    /// Left the undetermined set; innocent in the context they were tested in.
    cleared: ModSet,
    last_probe: Option<ModSet>,
}

impl CandidateSet {
    /// `universe` is every mod id known; candidates are `universe \ required`.
    pub fn new(universe: &ModSet, required: &ModSet) -> Self {
        let candidates: ModSet = universe.difference(required).cloned().collect();
        Self {
            universe: candidates.clone(),
            required: required.clone(),
            undetermined: candidates,
            cleared: ModSet::new(),
            last_probe: None,
        }
    }

    pub fn universe(&self) -> &ModSet {
        &self.universe
    }

    pub fn required(&self) -> &ModSet {
        &self.required
    }

    pub fn undetermined(&self) -> &ModSet {
        &self.undetermined
    }

    pub fn cleared(&self) -> &ModSet {
        &self.cleared
    }

    /// Roughly half of the undetermined set, by canonical order: the first `ceil(n/2)` mods.
    /// If the previous trial probed exactly that split, the last `ceil(n/2)` are taken
    /// instead so an identical split is never repeated. With one mod left, the probe is
    /// that mod (a confirmation trial).
    pub fn select_probe(&self) -> ModSet {
        let front = self.front_split();
        if self.last_probe.as_ref() == Some(&front) && self.undetermined.len() > 1 {
            return self.back_split();
        }
        front
    }

    /// First `ceil(n/2)` undetermined mods.
    pub fn front_split(&self) -> ModSet {
        let take = self.undetermined.len().div_ceil(2);
        self.undetermined.iter().take(take).cloned().collect()
    }

    /// Last `ceil(n/2)` undetermined mods.
    pub fn back_split(&self) -> ModSet {
        let take = self.undetermined.len().div_ceil(2);
        self.undetermined.iter().rev().take(take).cloned().collect()
    }

    /// Update the undetermined set from a verdict on `probe`, whose trial enabled
    /// `enabled` (required plus the dependency closure of the probe).
    ///
    /// - `Bad` with no extras: the culprit is in the probe.
    /// - `Bad` with extras pulled in by closure: narrow to `(probe ∪ extras) ∩ U` and report
    ///   the extras as ambiguous.
    /// - `Good`: the culprit is in `U \ probe`; the probe is cleared.
    pub fn apply_verdict(
        &mut self,
        probe: &ModSet,
        enabled: &ModSet,
        verdict: Verdict,
    ) -> Result<VerdictEffect, BisectError> {
        if probe.is_empty() {
            return Err(invariant_violation("apply_verdict", "probe is empty"));
        }
        if let Some(stray) = probe.difference(&self.undetermined).next() {
            return Err(invariant_violation(
                "apply_verdict",
                format!("probe mod `{}` is not in the undetermined set", stray),
            ));
        }
        if let Some(missing) = probe.union(&self.required).find(|id| !enabled.contains(*id)) {
            return Err(invariant_violation(
                "apply_verdict",
                format!("enabled set is missing `{}`", missing),
            ));
        }

        let mut effect = VerdictEffect::default();
        let next: ModSet = match verdict {
            Verdict::Good => self.undetermined.difference(probe).cloned().collect(),
            Verdict::Bad => {
                effect.ambiguous_extras = enabled
                    .iter()
                    .filter(|id| !probe.contains(*id) && !self.required.contains(*id))
                    .cloned()
                    .collect();
                if effect.ambiguous_extras.is_empty() {
                    probe.clone()
                } else {
                    self.undetermined
                        .iter()
                        .filter(|id| probe.contains(*id) || effect.ambiguous_extras.contains(*id))
                        .cloned()
                        .collect()
                }
            }
        };

        effect.cleared = self.undetermined.difference(&next).cloned().collect();
        effect.unchanged = effect.cleared.is_empty();
        self.cleared.extend(effect.cleared.iter().cloned());
        self.undetermined = next;
        self.last_probe = Some(probe.clone());
        Ok(effect)
    }

    /// Move mods into the required set for the rest of the session. They leave the
    /// candidate universe without being counted as cleared.
    pub fn lock(&mut self, ids: &ModSet) -> ModSet {
        let mut moved = ModSet::new();
        for id in ids {
            if self.required.insert(id.clone()) {
                moved.insert(id.clone());
            }
            self.universe.remove(id);
            self.undetermined.remove(id);
            self.cleared.remove(id);
        }
        if let Some(last) = self.last_probe.as_mut() {
            last.retain(|id| !ids.contains(id));
        }
        moved
    }

    pub fn is_required(&self, id: &ModId) -> bool {
        self.required.contains(id)
    }
}
