//! Verdict oracles: who decides whether a trial reproduced the bug.

use std::collections::VecDeque;

use crate::candidates::Verdict;
use crate::graph::ModSet;

/// Answer to "does the bug reproduce with this set enabled?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    Good,
    Bad,
    /// Stop the session; history and the pending trial are kept.
    Abort,
}

impl Response {
    pub fn verdict(self) -> Option<Verdict> {
        match self {
            Response::Good => Some(Verdict::Good),
            Response::Bad => Some(Verdict::Bad),
            Response::Abort => None,
        }
    }
}

pub trait VerdictOracle {
    /// Called after the activation port has applied `enabled`.
    fn ask_verdict(&mut self, enabled: &ModSet) -> Response;
}

/// Scripted oracle: the bug reproduces iff any designated culprit is enabled.
#[derive(Clone, Debug, Default)]
pub struct CulpritOracle {
    culprits: ModSet,
    asked: usize,
}

impl CulpritOracle {
    pub fn new<I, S>(culprits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            culprits: culprits.into_iter().map(Into::into).collect(),
            asked: 0,
        }
    }

    /// Number of verdicts given so far.
    pub fn asked(&self) -> usize {
        self.asked
    }
}

impl VerdictOracle for CulpritOracle {
    fn ask_verdict(&mut self, enabled: &ModSet) -> Response {
        self.asked += 1;
        if self.culprits.iter().any(|c| enabled.contains(c)) {
            Response::Bad
        } else {
            Response::Good
        }
    }
}

/// Replays a fixed list of responses, then aborts.
#[derive(Clone, Debug, Default)]
pub struct ScriptedOracle {
    responses: VecDeque<Response>,
}

impl ScriptedOracle {
    pub fn new(responses: impl IntoIterator<Item = Response>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
        }
    }
}

impl VerdictOracle for ScriptedOracle {
    fn ask_verdict(&mut self, _enabled: &ModSet) -> Response {
        self.responses.pop_front().unwrap_or(Response::Abort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn culprit_oracle_is_bad_iff_culprit_enabled() {
        let mut oracle = CulpritOracle::new(["iris"]);
        let with: ModSet = ["iris", "sodium"].iter().map(|s| s.to_string()).collect();
        let without: ModSet = ["sodium"].iter().map(|s| s.to_string()).collect();
        assert_eq!(oracle.ask_verdict(&with), Response::Bad);
        assert_eq!(oracle.ask_verdict(&without), Response::Good);
        assert_eq!(oracle.asked(), 2);
    }

    #[test]
    fn scripted_oracle_aborts_when_exhausted() {
        let mut oracle = ScriptedOracle::new([Response::Bad]);
        assert_eq!(oracle.ask_verdict(&ModSet::new()), Response::Bad);
        assert_eq!(oracle.ask_verdict(&ModSet::new()), Response::Abort);
    }
}
