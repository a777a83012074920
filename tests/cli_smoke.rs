//! CLI smoke tests: commands that need neither git nor a database.
//!
//! These tests run the compiled binary and verify exit codes and output.
//! HOME points at an empty temp dir so no user config leaks in.

use std::path::Path;
use std::process::Command;

/// Helper: run graft with given args and return (exit_code, stdout, stderr).
fn run_cli_in(home: &Path, args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_graft");
    let output = Command::new(bin)
        .args(args)
        .env("HOME", home)
        .env("RUST_LOG", "error") // suppress tracing noise
        .env_remove("GRAFT_DATABASE_TUNNEL_DOMAIN")
        .env_remove("GRAFT_DATABASE_DIRECT_DOMAIN")
        .output()
        .expect("failed to execute graft binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn run_cli(args: &[&str]) -> (i32, String, String) {
    let home = tempfile::tempdir().unwrap();
    run_cli_in(home.path(), args)
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let (code, stdout, _stderr) = run_cli(&[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("graft"));
}

#[test]
fn cli_help_flag() {
    let (code, stdout, _stderr) = run_cli(&["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Commands:"));
    assert!(stdout.contains("load"));
    assert!(stdout.contains("hosts"));
}

#[test]
fn cli_version_command() {
    let (code, stdout, _stderr) = run_cli(&["version"]);
    assert_eq!(code, 0);
    assert!(stdout.starts_with("graft "));
    assert!(stdout.contains('.'));
}

// ============================================================================
// Services
// ============================================================================

#[test]
fn cli_services_lists_catalog() {
    let (code, stdout, _stderr) = run_cli(&["services"]);
    assert_eq!(code, 0);
    let names: Vec<&str> = stdout.lines().collect();
    assert_eq!(names.len(), 15);
    assert_eq!(names[0], "user");
    assert!(names.contains(&"catalog"));
}

#[test]
fn cli_load_unknown_service_fails() {
    let (code, _stdout, stderr) = run_cli(&["load", "billing"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("billing"), "stderr: {}", stderr);
}

#[test]
fn cli_load_rejects_malformed_override() {
    let (code, _stdout, stderr) = run_cli(&["load", "catalog", "--db", "noequals"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--db"), "stderr: {}", stderr);
}

// ============================================================================
// Hosts
// ============================================================================

#[test]
fn cli_hosts_bare_label() {
    let (code, stdout, _stderr) = run_cli(&["hosts", "noki-7"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "db.noki-7.dyn.example.com");
}

#[test]
fn cli_hosts_with_adapter_port() {
    let (code, stdout, _stderr) = run_cli(&["hosts", "noki-7", "--adapter", "postgresql"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "db.noki-7.dyn.example.com:5432");
}

#[test]
fn cli_hosts_convention_host_expands() {
    let (code, stdout, _stderr) = run_cli(&["hosts", "my.noki-7.example.com"]);
    assert_eq!(code, 0);
    let hosts: Vec<&str> = stdout.lines().collect();
    assert_eq!(hosts[0], "my.noki-7.example.com");
    assert_eq!(hosts[1], "db.noki-7.dyn.example.com");
    assert_eq!(hosts.len(), 4);
}

#[test]
fn cli_hosts_ip_literal_is_kept() {
    let (code, stdout, _stderr) = run_cli(&["hosts", "10.0.0.5"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "10.0.0.5");
}

#[test]
fn cli_hosts_url_keeps_its_own_port() {
    let url = "postgres://db.noki-7.example.com:6432/app";
    let (code, stdout, _stderr) = run_cli(&["hosts", url, "--adapter", "postgres"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), url);
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn cli_config_check_defaults() {
    let (code, stdout, _stderr) = run_cli(&["config", "check"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Config file:"));
    assert!(stdout.contains("using defaults"));
}

#[test]
fn cli_config_check_reports_invalid_json() {
    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join(".graft");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.json"), "{ not json").unwrap();

    let (code, stdout, _stderr) = run_cli_in(home.path(), &["config", "check"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("[ERROR] Invalid JSON"));
}

#[test]
fn cli_config_check_help() {
    let (code, stdout, _stderr) = run_cli(&["config", "check", "--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Check"));
}
