//! Activation ports: make exactly a given set of mods active.

use std::fs;
use std::path::Path;

use crate::error_handling::ActivationError;
use crate::graph::ModSet;
use crate::modloaders::ModIndex;

pub trait ActivationPort {
    /// Make exactly `enabled` active and everything else inactive. Blocks until done.
    fn activate(&mut self, enabled: &ModSet) -> Result<(), ActivationError>;
}

/// Rename `source` to `target`. Returns `Ok(false)` if it was already renamed.
fn rename_path(id: &str, source: &Path, target: &Path) -> Result<bool, ActivationError> {
    match (source.exists(), target.exists()) {
        (true, false) => fs::rename(source, target)
            .map(|_| true)
            .map_err(|e| ActivationError::Io {
                id: id.to_string(),
                path: source.display().to_string(),
                source: e.to_string(),
            }),
        (false, true) => Ok(false),
        (true, true) => Err(ActivationError::Conflict {
            id: id.to_string(),
            enabled_path: source.display().to_string(),
            disabled_path: target.display().to_string(),
        }),
        (false, false) => Err(ActivationError::Missing {
            id: id.to_string(),
            path: source.display().to_string(),
        }),
    }
}

/// Enables/disables mods by renaming `<jar>` to and from `<jar>.disabled`.
pub struct DirectoryActivator<'a> {
    index: &'a mut ModIndex,
}

impl<'a> DirectoryActivator<'a> {
    pub fn new(index: &'a mut ModIndex) -> Self {
        Self { index }
    }

    /// Enable or disable a single mod. Returns `Ok(false)` when it was already in that state.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<bool, ActivationError> {
        let root = self.index.root.clone();
        let entry = self
            .index
            .mods
            .get_mut(id)
            .ok_or_else(|| ActivationError::UnknownMod { id: id.to_string() })?;
        let (on, off) = entry.paths(&root);
        let changed = if enabled {
            rename_path(id, &off, &on)?
        } else {
            rename_path(id, &on, &off)?
        };
        entry.enabled = enabled;
        Ok(changed)
    }
}

impl ActivationPort for DirectoryActivator<'_> {
    fn activate(&mut self, enabled: &ModSet) -> Result<(), ActivationError> {
        if let Some(unknown) = enabled.iter().find(|id| !self.index.mods.contains_key(*id)) {
            return Err(ActivationError::UnknownMod { id: unknown.clone() });
        }
        let ids: Vec<String> = self.index.mods.keys().cloned().collect();
        for id in ids {
            self.set_enabled(&id, enabled.contains(&id))?;
        }
        Ok(())
    }
}

/// In-memory port: remembers the active set. Used by `simulate` and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryActivator {
    known: Option<ModSet>,
    pub active: ModSet,
    pub activations: usize,
}

impl MemoryActivator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject ids outside `known`, like a real mod directory would.
    pub fn with_known(known: ModSet) -> Self {
        Self {
            known: Some(known),
            ..Self::default()
        }
    }
}

impl ActivationPort for MemoryActivator {
    fn activate(&mut self, enabled: &ModSet) -> Result<(), ActivationError> {
        if let Some(known) = &self.known {
            if let Some(unknown) = enabled.iter().find(|id| !known.contains(*id)) {
                return Err(ActivationError::UnknownMod { id: unknown.clone() });
            }
        }
        self.active = enabled.clone();
        self.activations += 1;
        Ok(())
    }
}
