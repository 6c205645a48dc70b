//! Session persistence: `session.json` in the state directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::Session;
use crate::error_handling::{io_error, BisectError};
use crate::modloaders::ModIndex;
use crate::utils::SESSION_FILE;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFile {
    pub schema_version: u32,
    /// Mod directory the session was started on.
    pub root: String,
    /// `ModIndex::fingerprint` at session start.
    pub fingerprint: String,
    pub session: Session,
}

impl SessionFile {
    pub fn new(index: &ModIndex, session: Session) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            root: index.root.display().to_string(),
            fingerprint: index.fingerprint(),
            session,
        }
    }

    /// Error if mods were added, removed or replaced since the session started.
    pub fn check_fingerprint(&self, index: &ModIndex) -> Result<(), BisectError> {
        if self.fingerprint != index.fingerprint() {
            return Err(BisectError::Session {
                operation: "load session".to_string(),
                source: format!(
                    "mods in {} changed since the session started; run `modbisect reset`",
                    index.root.display()
                ),
            });
        }
        Ok(())
    }
}

pub fn session_path(state_dir: &Path) -> PathBuf {
    state_dir.join(SESSION_FILE)
}

/// Write via a temp file and rename so an interrupted save never leaves half a file.
pub fn save_session(state_dir: &Path, file: &SessionFile) -> Result<(), BisectError> {
    let path = session_path(state_dir);
    let json = serde_json::to_string_pretty(file).map_err(|e| BisectError::Session {
        operation: "save session".to_string(),
        source: e.to_string(),
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| io_error("save session", Some(&tmp), e))?;
    fs::rename(&tmp, &path).map_err(|e| io_error("save session", Some(&path), e))
}

/// `Ok(None)` when no session has been started.
pub fn load_session(state_dir: &Path) -> Result<Option<SessionFile>, BisectError> {
    let path = session_path(state_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|e| io_error("load session", Some(&path), e))?;
    let file: SessionFile = serde_json::from_str(&text).map_err(|e| BisectError::Session {
        operation: "load session".to_string(),
        source: format!("{} is corrupt ({}); run `modbisect reset`", path.display(), e),
    })?;
    if file.schema_version != SCHEMA_VERSION {
        return Err(BisectError::Session {
            operation: "load session".to_string(),
            source: format!(
                "schema version {} is not supported (expected {}); run `modbisect reset`",
                file.schema_version, SCHEMA_VERSION
            ),
        });
    }
    Ok(Some(file))
}

/// Returns true if a session file was removed.
pub fn clear_session(state_dir: &Path) -> Result<bool, BisectError> {
    let path = session_path(state_dir);
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path).map_err(|e| io_error("reset session", Some(&path), e))?;
    Ok(true)
}
