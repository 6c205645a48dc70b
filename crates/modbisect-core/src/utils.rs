use std::env;
use std::fs::{self, OpenOptions};
use std::io::{Result, Write};
use std::path::PathBuf;

use chrono::Local;

pub const LOG_FILE: &str = "logs.txt";
pub const SESSION_FILE: &str = "session.json";
pub const DEFAULT_STATE_DIR: &str = ".modbisect";

/// Directory holding the saved session and the log file. Uses MODBISECT_STATE_DIR if set;
/// otherwise `.modbisect` in the current directory (next to config.toml).
pub fn state_dir() -> PathBuf {
    match env::var("MODBISECT_STATE_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_STATE_DIR),
    }
}

pub fn init_state_dir() -> Result<PathBuf> {
    let dir = state_dir();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn is_quiet() -> bool {
    if env::var("MODBISECT_QUIET").map(|v| v == "1" || v == "true").unwrap_or(false) {
        return true;
    }
    env::var("MODBISECT_LOG")
        .map(|v| v.to_lowercase() == "quiet" || v.to_lowercase() == "error")
        .unwrap_or(false)
}

pub fn log(message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let log_message = format!("[{}] {}", timestamp, message);

    if !is_quiet() {
        println!("{}", log_message);
    }

    // File logging starts once init_state_dir() has run.
    let dir = state_dir();
    if !dir.is_dir() {
        return;
    }
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(dir.join(LOG_FILE)) {
        let _ = writeln!(file, "{}", log_message);
    }
}

/// Render a mod set as `a, b, c` (canonical order), or `(none)`.
pub fn join_ids<'a, I>(ids: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let parts: Vec<&str> = ids.into_iter().map(|s| s.as_str()).collect();
    if parts.is_empty() {
        "(none)".to_string()
    } else {
        parts.join(", ")
    }
}
