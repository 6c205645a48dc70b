//! Dependency graph over mod ids. Edge `A -> B` means "if A is enabled, B must be too".
//! Cycles are allowed (mods that import each other); closure uses a visited set.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub type ModId = String;
pub type ModSet = BTreeSet<ModId>;

/// A reference from the extra-dependency map to a mod that is not in the universe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownReference {
    pub from: ModId,
    pub to: ModId,
    /// True when `from` itself is the unknown id (a key of `extra_deps`).
    pub unknown_key: bool,
}

impl UnknownReference {
    pub fn describe(&self) -> String {
        if self.unknown_key {
            format!("extra_deps: `{}` is not in the mod directory", self.from)
        } else {
            format!("extra_deps: `{}` depends on unknown mod `{}`", self.from, self.to)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    edges: BTreeMap<ModId, ModSet>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the declared extra-dependency map. Every entry is recorded, even ones that
    /// reference ids outside `known`; those are returned so the caller can report them.
    pub fn build(
        extra_deps: &BTreeMap<ModId, Vec<ModId>>,
        known: &ModSet,
    ) -> (Self, Vec<UnknownReference>) {
        let mut graph = Self::new();
        let mut unknown = Vec::new();
        for (from, deps) in extra_deps {
            if !known.contains(from) {
                unknown.push(UnknownReference {
                    from: from.clone(),
                    to: from.clone(),
                    unknown_key: true,
                });
            }
            for to in deps {
                if !known.contains(to) {
                    unknown.push(UnknownReference {
                        from: from.clone(),
                        to: to.clone(),
                        unknown_key: false,
                    });
                }
                graph.add_edge(from, to);
            }
        }
        (graph, unknown)
    }

    /// Merge dependencies declared in mod metadata. Ids outside `known` (minecraft, the
    /// loader, java) are not mods in the directory and are dropped.
    pub fn add_declared(&mut self, declared: &BTreeMap<ModId, Vec<ModId>>, known: &ModSet) {
        for (from, deps) in declared {
            if !known.contains(from) {
                continue;
            }
            for to in deps {
                if to != from && known.contains(to) {
                    self.add_edge(from, to);
                }
            }
        }
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string())
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|d| d.len()).sum()
    }

    /// Smallest superset of `seeds` that contains every direct and transitive dependency
    /// of its members. Iterative; terminates on cycles.
    pub fn closure<'a, I>(&self, seeds: I) -> ModSet
    where
        I: IntoIterator<Item = &'a ModId>,
    {
        let mut visited = ModSet::new();
        let mut stack: Vec<&str> = Vec::new();
        for seed in seeds {
            if visited.insert(seed.clone()) {
                stack.push(seed.as_str());
            }
        }
        while let Some(current) = stack.pop() {
            if let Some(deps) = self.edges.get(current) {
                for dep in deps {
                    if visited.insert(dep.clone()) {
                        stack.push(dep.as_str());
                    }
                }
            }
        }
        visited
    }
}
