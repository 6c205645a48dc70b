//! Integration tests: run the modbisect binary against a throwaway mod folder.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn modbisect(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_modbisect"));
    cmd.current_dir(dir)
        .env_remove("MODBISECT_CONFIG")
        .env_remove("MODBISECT_QUIET")
        .env("MODBISECT_STATE_DIR", dir.join("state"))
        .env("NO_COLOR", "1");
    cmd
}

/// Mod folder with stub jars (no metadata, so ids are the file stems) and a config.
fn fixture(mods: &[&str], config_extra: &str) -> tempfile::TempDir {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("mods");
    fs::create_dir_all(&root).unwrap();
    for id in mods {
        fs::write(root.join(format!("{}.jar", id)), b"not a zip").unwrap();
    }
    fs::write(
        td.path().join("config.toml"),
        format!("root = \"mods\"\n{}", config_extra),
    )
    .unwrap();
    td
}

fn run(dir: &Path, args: &[&str]) -> Output {
    modbisect(dir).args(args).output().unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

fn enabled(dir: &Path, id: &str) -> bool {
    dir.join("mods").join(format!("{}.jar", id)).exists()
}

#[test]
fn test_help() {
    let td = tempfile::tempdir().unwrap();
    let out = run(td.path(), &["--help"]);
    assert!(out.status.success(), "modbisect --help should succeed");
    let text = stdout(&out);
    assert!(text.contains("start"));
    assert!(text.contains("good"));
    assert!(text.contains("bad"));
    assert!(text.contains("simulate"));
}

#[test]
fn test_version() {
    let td = tempfile::tempdir().unwrap();
    let out = run(td.path(), &["--version"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_status_without_config_fails() {
    let td = tempfile::tempdir().unwrap();
    let out = run(td.path(), &["status"]);
    assert!(!out.status.success(), "status with no config.toml should fail");
}

#[test]
fn test_status_without_session() {
    let td = fixture(&["a", "b", "c", "d"], "");
    let out = run(td.path(), &["status"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("Total:    4"));
    assert!(text.contains("No session in progress"));
}

#[test]
fn test_simulate_json_touches_no_files() {
    let td = fixture(&["a", "b", "c", "d"], "");
    let out = run(td.path(), &["simulate", "--culprit", "c", "--json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let value: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(value["report"]["culprit"], serde_json::json!(["c"]));
    assert_eq!(value["trials"].as_array().map(|t| t.len()), Some(2));
    for id in ["a", "b", "c", "d"] {
        assert!(enabled(td.path(), id));
    }
    assert!(!td.path().join("state").join("session.json").exists());
}

#[test]
fn test_simulate_unknown_culprit_fails() {
    let td = fixture(&["a", "b"], "");
    let out = run(td.path(), &["simulate", "--culprit", "zzz"]);
    assert!(!out.status.success());
}

#[test]
fn test_start_good_bad_finds_culprit() {
    let td = fixture(&["a", "b", "c", "d"], "");
    let dir = td.path();

    let out = run(dir, &["start"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(enabled(dir, "a") && enabled(dir, "b"));
    assert!(!enabled(dir, "c") && !enabled(dir, "d"));
    assert!(dir.join("mods").join("c.jar.disabled").exists());

    // Culprit is c: the bug is gone with a and b.
    let out = run(dir, &["good"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(enabled(dir, "c"));
    assert!(!enabled(dir, "a"));

    let out = run(dir, &["bad"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("Culprit found: c"));

    let out = run(dir, &["history", "--json"]);
    assert!(out.status.success());
    let history: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(history.as_array().map(|h| h.len()), Some(2));
    assert_eq!(history[0]["verdict"], "good");

    let out = run(dir, &["reset"]);
    assert!(out.status.success());
    for id in ["a", "b", "c", "d"] {
        assert!(enabled(dir, id));
    }
    assert!(!dir.join("state").join("session.json").exists());
}

#[test]
fn test_required_mods_stay_enabled() {
    let td = fixture(&["a", "b", "c", "lib"], "required = [\"lib\"]\n");
    let dir = td.path();
    assert!(run(dir, &["start"]).status.success());
    assert!(enabled(dir, "lib"));
    assert!(run(dir, &["bad"]).status.success());
    assert!(enabled(dir, "lib"));
}

#[test]
fn test_second_start_needs_force() {
    let td = fixture(&["a", "b", "c"], "");
    let dir = td.path();
    assert!(run(dir, &["start"]).status.success());
    assert!(!run(dir, &["start"]).status.success());
    assert!(run(dir, &["start", "--force"]).status.success());
}

#[test]
fn test_verdict_refused_until_trial_is_applied() {
    let td = fixture(&["a", "b", "c", "d"], "");
    let dir = td.path();
    let blocker = dir.join("mods").join("c.jar.disabled");
    fs::create_dir_all(&blocker).unwrap();

    // c cannot be disabled, so trial 1 never reaches the disk.
    let out = run(dir, &["start"]);
    assert!(!out.status.success());
    assert!(enabled(dir, "c"));

    let out = run(dir, &["bad"]);
    assert!(!out.status.success(), "bad must not be recorded for an unapplied trial");
    assert!(String::from_utf8_lossy(&out.stderr).contains("modbisect apply"));
    let out = run(dir, &["history", "--json"]);
    let history: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(history.as_array().map(|h| h.len()), Some(0));

    fs::remove_dir(&blocker).unwrap();
    let out = run(dir, &["apply"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(!enabled(dir, "c"));
    let out = run(dir, &["bad"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn test_verdict_refused_after_manual_toggle() {
    let td = fixture(&["a", "b", "c", "d"], "");
    let dir = td.path();
    assert!(run(dir, &["start"]).status.success());
    assert!(run(dir, &["enable", "c"]).status.success());

    let out = run(dir, &["good"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("trial 1"));

    assert!(run(dir, &["apply"]).status.success());
    assert!(!enabled(dir, "c"));
    assert!(run(dir, &["good"]).status.success());
}

#[test]
fn test_verdict_without_session_fails() {
    let td = fixture(&["a", "b"], "");
    let out = run(td.path(), &["good"]);
    assert!(!out.status.success(), "good with no session should fail");
}

#[test]
fn test_unknown_required_mod_is_reported() {
    let td = fixture(&["a", "b"], "required = [\"ghost\"]\n");
    let out = run(td.path(), &["start"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("ghost"));
}

#[test]
fn test_enable_disable_single_mod() {
    let td = fixture(&["a"], "");
    let dir = td.path();
    assert!(run(dir, &["disable", "a"]).status.success());
    assert!(!enabled(dir, "a"));
    let out = run(dir, &["disable", "a"]);
    assert!(stdout(&out).contains("already disabled"));
    assert!(run(dir, &["enable", "a"]).status.success());
    assert!(enabled(dir, "a"));
}
