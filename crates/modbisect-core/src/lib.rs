//! Core library for modbisect: dependency-aware bisection over a Minecraft mod directory.
//! Used by the CLI binary; the engine itself only needs an activation port and a verdict oracle.

pub mod activation;
pub mod candidates;
pub mod config;
pub mod engine;
pub mod error_handling;
pub mod graph;
pub mod jar;
pub mod modloaders;
pub mod oracle;
pub mod report;
pub mod store;
pub mod utils;

#[cfg(test)]
mod engine_tests;

// Re-export main API for CLI
pub use activation::{ActivationPort, DirectoryActivator, MemoryActivator};
pub use candidates::{CandidateSet, Verdict};
pub use config::{default_config_path, load_config, Config};
pub use engine::{
    RunOutcome, Session, SessionInput, SessionState, Snapshot, StepOutcome, Trial, TrialOffer,
};
pub use error_handling::{ActivationError, BisectError};
pub use graph::{DependencyGraph, ModId, ModSet};
pub use modloaders::{load_mods, ModEntry, ModIndex};
pub use oracle::{CulpritOracle, Response, ScriptedOracle, VerdictOracle};
pub use report::Report;
pub use store::{clear_session, load_session, save_session, SessionFile};
pub use utils::{init_state_dir, join_ids, log, state_dir};
