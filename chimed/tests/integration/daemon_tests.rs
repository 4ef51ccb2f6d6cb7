use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::common::init_test_logging;

fn wait_for(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    path.exists()
}

/// Poll `path` until it contains `needle` (the file may appear before the
/// daemon is done writing it). Returns the last content read.
fn wait_for_content(path: &Path, needle: &str, timeout: Duration) -> String {
    let deadline = Instant::now() + timeout;
    let mut content = String::new();
    while Instant::now() < deadline {
        content = std::fs::read_to_string(path).unwrap_or_default();
        if content.contains(needle) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    content
}

#[test]
fn test_chimed_help_lists_flags() {
    init_test_logging();
    crate::test_log!("TEST START: test_chimed_help_lists_flags");

    let output = Command::new(env!("CARGO_BIN_EXE_chimed"))
        .arg("--help")
        .output()
        .expect("Failed to run chimed --help");

    assert!(output.status.success(), "chimed --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("chimed"),
        "Expected help output to mention chimed, got: {stdout}"
    );
    for flag in ["--store", "--config-dir", "--audio-dir", "--timezone", "--debounce"] {
        assert!(stdout.contains(flag), "Expected help to list {flag}");
    }

    crate::test_log!("TEST PASS: test_chimed_help_lists_flags");
}

#[test]
fn test_chimed_version_flag() {
    init_test_logging();
    crate::test_log!("TEST START: test_chimed_version_flag");

    let output = Command::new(env!("CARGO_BIN_EXE_chimed"))
        .arg("--version")
        .output()
        .expect("Failed to run chimed --version");

    assert!(output.status.success(), "chimed --version failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.trim().is_empty(), "Expected version output");

    crate::test_log!("TEST PASS: test_chimed_version_flag");
}

#[test]
fn test_unknown_timezone_fails_startup() {
    init_test_logging();
    crate::test_log!("TEST START: test_unknown_timezone_fails_startup");

    let tmp = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_chimed"))
        .arg("--store")
        .arg(tmp.path().join("store.json"))
        .arg("--config-dir")
        .arg(tmp.path().join("configs"))
        .arg("--audio-dir")
        .arg(tmp.path().join("audio"))
        .arg("--timezone")
        .arg("Nowhere/Nope")
        .output()
        .expect("Failed to run chimed");

    assert!(!output.status.success(), "bad timezone must fail startup");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("timezone"),
        "Expected a timezone error, got: {stderr}"
    );

    crate::test_log!("TEST PASS: test_unknown_timezone_fails_startup");
}

#[test]
fn test_bootstrap_exports_stored_guilds() {
    init_test_logging();
    crate::test_log!("TEST START: test_bootstrap_exports_stored_guilds");

    let tmp = TempDir::new().unwrap();
    let store_path = tmp.path().join("store.json");
    let config_dir = tmp.path().join("configs");
    std::fs::write(
        &store_path,
        r#"{ "guilds": { "42": { "triggers": [ { "cron": "0 0 9 * * *" } ] } } }"#,
    )
    .unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_chimed"))
        .arg("--store")
        .arg(&store_path)
        .arg("--config-dir")
        .arg(&config_dir)
        .arg("--audio-dir")
        .arg(tmp.path().join("audio"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn chimed");

    // Bootstrap must project the stored guild into a config file and
    // create the catalog.
    let guild_file = config_dir.join("42.ini");
    let content = wait_for_content(&guild_file, "[time.1]", Duration::from_secs(15));
    assert!(content.contains("[time.1]"), "missing trigger section: {content}");
    assert!(content.contains("time = 09:00"));
    assert!(wait_for(
        &config_dir.join("catalog.json"),
        Duration::from_secs(15)
    ));

    child.kill().ok();
    child.wait().ok();

    crate::test_log!("TEST PASS: test_bootstrap_exports_stored_guilds");
}
