//! Error taxonomy for modbisect sessions.
//! Configuration and invariant errors end a session; activation errors pause it until the
//! user fixes the mod directory and re-applies the pending trial.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Main error type for modbisect operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BisectError {
    /// Unknown ids in `required`/`extra_deps`, duplicate mod ids, unreadable config.
    Configuration {
        operation: String,
        issues: Vec<String>,
    },
    /// Internal contract breach (probe outside the undetermined set, verdict with no offer).
    InvariantViolation {
        operation: String,
        details: String,
    },
    /// The activation port could not make the mod directory match a trial.
    Activation(ActivationError),
    /// I/O while scanning mods or reading/writing session state
    Io {
        operation: String,
        path: Option<String>,
        source: String,
    },
    /// Saved session missing, corrupt, or stale
    Session {
        operation: String,
        source: String,
    },
}

/// Failure to apply an enabled set to the mod directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationError {
    /// Neither `<jar>` nor `<jar>.disabled` exists.
    Missing { id: String, path: String },
    /// Both `<jar>` and `<jar>.disabled` exist; refusing to pick one.
    Conflict { id: String, enabled_path: String, disabled_path: String },
    /// Trial enables an id that has no file in the mod directory.
    UnknownMod { id: String },
    Io { id: String, path: String, source: String },
}

impl fmt::Display for BisectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BisectError::Configuration { operation, issues } => {
                write!(f, "Configuration error in {}", operation)?;
                match issues.as_slice() {
                    [] => Ok(()),
                    [one] => write!(f, ": {}", one),
                    many => {
                        write!(f, " ({} issues):", many.len())?;
                        for issue in many {
                            write!(f, "\n  - {}", issue)?;
                        }
                        Ok(())
                    }
                }
            }
            BisectError::InvariantViolation { operation, details } => {
                write!(f, "Invariant violation in {}: {}", operation, details)
            }
            BisectError::Activation(e) => write!(f, "Activation failed: {}", e),
            BisectError::Io { operation, path, source } => {
                write!(f, "I/O error in {}: {}", operation, source)?;
                if let Some(path) = path {
                    write!(f, " (path: {})", path)?;
                }
                Ok(())
            }
            BisectError::Session { operation, source } => {
                write!(f, "Session error in {}: {}", operation, source)
            }
        }
    }
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationError::Missing { id, path } => {
                write!(f, "{}: file not found ({})", id, path)
            }
            ActivationError::Conflict { id, enabled_path, disabled_path } => write!(
                f,
                "{}: both {} and {} exist; remove one and run `modbisect apply`",
                id, enabled_path, disabled_path
            ),
            ActivationError::UnknownMod { id } => {
                write!(f, "{}: no such mod in the mod directory", id)
            }
            ActivationError::Io { id, path, source } => {
                write!(f, "{}: {} ({})", id, source, path)
            }
        }
    }
}

impl std::error::Error for BisectError {}
impl std::error::Error for ActivationError {}

impl From<ActivationError> for BisectError {
    fn from(e: ActivationError) -> Self {
        BisectError::Activation(e)
    }
}

pub fn io_error(operation: &str, path: Option<&std::path::Path>, source: std::io::Error) -> BisectError {
    BisectError::Io {
        operation: operation.to_string(),
        path: path.map(|p| p.display().to_string()),
        source: source.to_string(),
    }
}

pub fn invariant_violation(operation: &str, details: impl Into<String>) -> BisectError {
    BisectError::InvariantViolation {
        operation: operation.to_string(),
        details: details.into(),
    }
}

pub fn configuration_error(operation: &str, issues: Vec<String>) -> BisectError {
    BisectError::Configuration {
        operation: operation.to_string(),
        issues,
    }
}
