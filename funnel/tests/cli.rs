//! CLI tests for the `funnel` binary.
//!
//! Spawns the binary and verifies config handling and exit codes for
//! sessions that end before any interactive input is needed.

use std::fs;
use std::process::{Command, Stdio};

use funnel::exit_codes;
use funnel::io::config::{BASE_URL_ENV, DEFAULT_CONFIG_FILE, FunnelConfig, load_config};

fn funnel() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_funnel"));
    cmd.env_remove(BASE_URL_ENV).stdin(Stdio::null());
    cmd
}

/// A local address nothing is listening on.
fn closed_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = funnel()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("funnel init");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let path = temp.path().join(DEFAULT_CONFIG_FILE);
    assert_eq!(load_config(&path).expect("load"), FunnelConfig::default());

    fs::write(&path, "projects = [\"Sign\"]\n").expect("edit config");
    let status = funnel()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("funnel init again");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(
        fs::read_to_string(&path).expect("read"),
        "projects = [\"Sign\"]\n"
    );
}

#[test]
fn projects_lists_configured_names() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("custom.toml");
    fs::write(&path, "projects = [\"Sign\", \"Monad\", \"sign\"]\n").expect("write");

    let output = funnel()
        .arg("--config")
        .arg(&path)
        .arg("projects")
        .output()
        .expect("funnel projects");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["Sign", "Monad"]);
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("funnel.toml");
    fs::write(&path, "[backend]\ntimeout_secs = 0\n").expect("write");

    let status = funnel()
        .arg("--config")
        .arg(&path)
        .arg("projects")
        .status()
        .expect("funnel projects");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn run_with_empty_handle_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = funnel()
        .current_dir(temp.path())
        .env(BASE_URL_ENV, closed_base_url())
        .args(["run", "--handle", " @ ", "--project", "Sign"])
        .status()
        .expect("funnel run");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn run_against_unreachable_backend_exits_unavailable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = funnel()
        .current_dir(temp.path())
        .env(BASE_URL_ENV, closed_base_url())
        .args(["run", "--handle", "me", "--project", "Sign"])
        .output()
        .expect("funnel run");
    assert_eq!(output.status.code(), Some(exit_codes::UNAVAILABLE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("transport error"), "stderr: {stderr}");
}
