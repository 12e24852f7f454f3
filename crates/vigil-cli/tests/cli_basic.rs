//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary and verify outputs.

use std::process::Command;

/// Run the CLI and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_vigil-cli"))
        .args(args)
        .output()
        .expect("failed to execute CLI");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Run `level` against the built-in defaults, ignoring any user config.
fn run_level(extra: &[&str]) -> serde_json::Value {
    let mut args = vec!["level", "--config", "/nonexistent/vigil.toml"];
    args.extend_from_slice(extra);
    let (stdout, _, code) = run_cli(&args);
    assert_eq!(code, 0);
    serde_json::from_str(&stdout).unwrap()
}

#[test]
fn test_level_classifies_emergency() {
    let parsed = run_level(&["--minutes", "4320"]);
    assert_eq!(parsed["level"], "emergency");
}

#[test]
fn test_level_one_minute_short_is_danger() {
    let parsed = run_level(&["--minutes", "4319"]);
    assert_eq!(parsed["level"], "danger");
}

#[test]
fn test_level_weekend_multiplier_slows_ladder() {
    let parsed = run_level(&["--minutes", "4320", "--weekend"]);
    // 4320 * 1.5 = 6480: the same silence is only danger on a weekend.
    assert_eq!(parsed["level"], "danger");
    assert_eq!(parsed["adjusted_thresholds"]["emergency"], 6480.0);
}

#[test]
fn test_config_init_and_validate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let path_str = path.to_str().unwrap();

    let (stdout, _, code) = run_cli(&["config", "init", "--path", path_str]);
    assert_eq!(code, 0);
    assert!(stdout.contains("wrote"));
    assert!(path.exists());

    let (stdout, _, code) = run_cli(&["config", "validate", "--path", path_str]);
    assert_eq!(code, 0);
    assert!(stdout.contains("is valid"));

    // A second init without --force refuses to clobber.
    let (_, stderr, code) = run_cli(&["config", "init", "--path", path_str]);
    assert_ne!(code, 0);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_config_validate_rejects_bad_ladder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[thresholds]\nwarning_minutes = 2880\ndanger_minutes = 1440\nemergency_minutes = 4320\n",
    )
    .unwrap();

    let (_, stderr, code) = run_cli(&["config", "validate", "--path", path.to_str().unwrap()]);
    assert_ne!(code, 0);
    assert!(stderr.contains("warning must be below danger"));
}

#[test]
fn test_simulate_prints_event_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.toml");
    std::fs::write(
        &path,
        r#"
start = "2026-03-04T12:00:00Z"

[[users]]
id = "u1"
last_heartbeat = "2026-03-03T11:00:00Z"

[[steps]]
evaluate = ["u1"]
"#,
    )
    .unwrap();

    let (stdout, _, code) = run_cli(&["simulate", path.to_str().unwrap()]);
    assert_eq!(code, 0);
    let first_line = stdout.lines().next().expect("an event line");
    let event: serde_json::Value = serde_json::from_str(first_line).unwrap();
    assert_eq!(event["type"], "AlertFired");
    assert_eq!(event["user_id"], "u1");
    assert_eq!(event["level"], "warning");
}
