//! CLI integration tests for the hookgate command-line interface.
//!
//! Every test points `HOOKGATE_CONFIG_DIR` and the working directory at a
//! fresh temp dir so no real config file leaks in.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command as StdCommand, Stdio};
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the hookgate binary, isolated in `dir`.
fn hookgate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hookgate").unwrap();
    cmd.current_dir(dir.path())
        .env("HOOKGATE_CONFIG_DIR", dir.path())
        .env_remove("HOOKGATE_CONFIG")
        .env_remove("HOOKGATE_PORT")
        .env_remove("HOOKGATE_PROTOCOL")
        .env_remove("RUST_LOG");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hookgate"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir).arg("frobnicate").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[server]"))
        .stdout(predicate::str::contains("port = 5678"))
        .stdout(predicate::str::contains("webhook-waiting"))
        .stdout(predicate::str::contains("using defaults"));
}

#[test]
fn test_config_show_reads_project_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hookgate.toml"), "[server]\nport = 9100\n").unwrap();

    hookgate(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 9100"))
        .stdout(predicate::str::contains("hookgate.toml"));
}

#[test]
fn test_config_flag_selects_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[endpoints]\nwebhook = \"hooks\"\n").unwrap();

    hookgate(&dir)
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("webhook = \"hooks\""));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .args(["config", "show", "--config", "does-not-exist.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.toml"));
}

#[test]
fn test_env_overrides_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hookgate.toml"), "[server]\nport = 9100\n").unwrap();

    hookgate(&dir)
        .env("HOOKGATE_PORT", "9200")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 9200"));
}

#[test]
fn test_invalid_env_value_fails() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .env("HOOKGATE_PORT", "not-a-port")
        .args(["config", "show"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("HOOKGATE_PORT"));
}

#[test]
fn test_config_show_masks_queue_password() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .env("HOOKGATE_QUEUE_REDIS_PASSWORD", "hunter2")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_config_path_uses_config_dir() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_which_lists_sources() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Start Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_start_on_occupied_port_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    hookgate(&dir)
        .args(["start", "--listen", "127.0.0.1", "--port"])
        .arg(port.to_string())
        .timeout(Duration::from_secs(20))
        .assert()
        .code(1)
        .stderr(predicate::str::contains(port.to_string()))
        .stderr(predicate::str::contains("already in use"));
}

#[test]
fn test_start_https_without_material_fails() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .env("HOOKGATE_PROTOCOL", "https")
        .args(["start", "--listen", "127.0.0.1", "--port", "0"])
        .timeout(Duration::from_secs(20))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ssl_key"));
}

#[test]
fn test_start_https_with_unreadable_material_fails() {
    let dir = TempDir::new().unwrap();
    hookgate(&dir)
        .env("HOOKGATE_PROTOCOL", "https")
        .env("HOOKGATE_SSL_KEY", dir.path().join("missing-key.pem"))
        .env("HOOKGATE_SSL_CERT", dir.path().join("missing-cert.pem"))
        .args(["start", "--listen", "127.0.0.1", "--port", "0"])
        .timeout(Duration::from_secs(20))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing-"));
}

#[test]
fn test_start_serves_health() {
    let dir = TempDir::new().unwrap();
    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("hookgate"))
        .current_dir(dir.path())
        .env("HOOKGATE_CONFIG_DIR", dir.path())
        .env_remove("HOOKGATE_CONFIG")
        .env_remove("HOOKGATE_PORT")
        .env_remove("HOOKGATE_PROTOCOL")
        .args(["start", "--listen", "127.0.0.1", "--port", "0"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut banner = String::new();
    BufReader::new(child.stdout.take().unwrap())
        .read_line(&mut banner)
        .unwrap();
    let addr = banner
        .trim()
        .strip_prefix("hookgate listening on http://")
        .unwrap_or_else(|| panic!("unexpected banner: {banner}"))
        .to_string();

    let mut stream = TcpStream::connect(&addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();

    child.kill().unwrap();
    let _ = child.wait();

    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains(r#"{"status":"ok"}"#));
}
