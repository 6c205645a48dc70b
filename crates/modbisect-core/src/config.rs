//! `config.toml`: mod directory, required mods, extra dependencies.
//!
//! ```toml
//! root = "mods"
//! required = ["fabric-api"]
//!
//! [overrides]
//! sodium = true        # same as listing it in `required`
//! optifabric = false   # kept disabled, never a candidate
//!
//! [extra_deps]
//! sodium = ["indium"]
//! indium = ["sodium"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::engine::SessionInput;
use crate::error_handling::{configuration_error, io_error, BisectError};
use crate::graph::{ModId, ModSet};
use crate::modloaders::ModIndex;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Mod directory. Relative paths are resolved against the config file's directory.
    pub root: PathBuf,
    #[serde(default)]
    pub required: Vec<ModId>,
    #[serde(default)]
    pub overrides: BTreeMap<ModId, bool>,
    #[serde(default)]
    pub extra_deps: BTreeMap<ModId, Vec<ModId>>,
}

/// `MODBISECT_CONFIG`, else `config.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var("MODBISECT_CONFIG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn load_config(path: &Path) -> Result<Config, BisectError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_error("load config", Some(path), e))?;
    let mut cfg = parse_config(&text)?;
    if cfg.root.is_relative() {
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        cfg.root = base.join(&cfg.root);
    }
    Ok(cfg)
}

pub fn parse_config(text: &str) -> Result<Config, BisectError> {
    let cfg: Config = toml::from_str(text)
        .map_err(|e| configuration_error("parse config", vec![e.to_string()]))?;
    if cfg.root.as_os_str().is_empty() {
        return Err(configuration_error(
            "parse config",
            vec!["`root` must name the mod directory".to_string()],
        ));
    }
    Ok(cfg)
}

impl Config {
    /// `required` plus every override set to `true`.
    pub fn required_set(&self) -> ModSet {
        let mut required: ModSet = self.required.iter().cloned().collect();
        required.extend(
            self.overrides
                .iter()
                .filter(|(_, on)| **on)
                .map(|(id, _)| id.clone()),
        );
        required
    }

    /// Overrides set to `false`.
    pub fn excluded_set(&self) -> ModSet {
        self.overrides
            .iter()
            .filter(|(_, on)| !**on)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Session input for the scanned mod directory. Excluded mods are left out of the
    /// universe; listing one as required is an error.
    pub fn session_input(&self, index: &ModIndex) -> Result<SessionInput, BisectError> {
        let required = self.required_set();
        let excluded = self.excluded_set();
        let conflicts: Vec<String> = required
            .intersection(&excluded)
            .map(|id| format!("`{}` is both required and overridden to false", id))
            .collect();
        if !conflicts.is_empty() {
            return Err(configuration_error("session input", conflicts));
        }
        let universe: ModSet = index.ids().difference(&excluded).cloned().collect();
        Ok(
            SessionInput::new(universe, required, self.extra_deps.clone())
                .with_declared_deps(index.declared_deps()),
        )
    }
}
