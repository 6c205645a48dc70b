//! End-of-session (or mid-session) summary.

use serde::Serialize;

use crate::engine::{Session, SessionState};
use crate::graph::ModSet;
use crate::utils::join_ids;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub culprit: Option<ModSet>,
    pub remaining: ModSet,
    pub cleared: ModSet,
    pub required: ModSet,
    pub trials: usize,
    /// Iterations whose bad verdict could not be pinned on the probe alone.
    pub ambiguous_trials: Vec<usize>,
    pub estimated_trials_left: usize,
}

impl Session {
    pub fn report(&self) -> Report {
        let culprit = match self.state() {
            SessionState::Converged { culprit } => Some(culprit.clone()),
            _ => None,
        };
        Report {
            state: self.state().clone(),
            culprit,
            remaining: self.undetermined().clone(),
            cleared: self.candidates().cleared().clone(),
            required: self.required().clone(),
            trials: self.history().len(),
            ambiguous_trials: self
                .history()
                .iter()
                .filter(|t| !t.ambiguous_extras.is_empty())
                .map(|t| t.iteration)
                .collect(),
            estimated_trials_left: self.estimated_trials_left(),
        }
    }
}

impl Report {
    /// Plain-text lines; the CLI adds colour.
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.state {
            SessionState::Converged { culprit } if culprit.len() == 1 => {
                lines.push(format!("Culprit found: {}", join_ids(culprit)));
            }
            SessionState::Converged { culprit } => {
                lines.push(format!(
                    "Culprit narrowed to {} mods that cannot be enabled apart: {}",
                    culprit.len(),
                    join_ids(culprit)
                ));
            }
            SessionState::Inconclusive => {
                lines.push("Inconclusive: no single mod reproduces the bug.".to_string());
                lines.push(
                    "The failure may need several mods together, or may not depend on mods at all."
                        .to_string(),
                );
            }
            SessionState::AwaitingTrial => {
                lines.push(format!(
                    "In progress: {} suspects left, about {} more trials",
                    self.remaining.len(),
                    self.estimated_trials_left
                ));
            }
        }
        lines.push(format!("Trials run: {}", self.trials));
        lines.push(format!("Required: {}", join_ids(&self.required)));
        if !self.cleared.is_empty() {
            lines.push(format!(
                "Cleared {} mods (innocent alone with the mods enabled at the time; \
                 interactions between cleared mods are not tested)",
                self.cleared.len()
            ));
        }
        if !self.ambiguous_trials.is_empty() {
            let iterations: Vec<String> =
                self.ambiguous_trials.iter().map(|i| i.to_string()).collect();
            lines.push(format!(
                "Warning: trials {} failed with mods enabled only as dependencies; \
                 the culprit may be one of those dependencies",
                iterations.join(", ")
            ));
        }
        lines
    }
}
