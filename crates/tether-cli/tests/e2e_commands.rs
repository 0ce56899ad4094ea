//! E2E CLI tests covering:
//! - `tether config show` effective and raw views
//! - `tether completions`
//! - `tether geocode` argument checks and the no-match advisory
//! - `tether set-status` rollback and exit status on an unreachable server
//!
//! Network tests point at `127.0.0.1:9`, which refuses connections, so no
//! test depends on a live geocoder or API.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const UNREACHABLE: &str = "http://127.0.0.1:9";

fn tether_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tether"));
    cmd.current_dir(dir);
    cmd.env("TETHER_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join("xdg"));
    cmd.env("HOME", dir);
    cmd.env_remove("FORMAT");
    cmd
}

fn write_project_config(dir: &Path, body: &str) {
    std::fs::create_dir_all(dir.join(".tether")).expect("mkdir .tether");
    std::fs::write(dir.join(".tether/config.toml"), body).expect("write config");
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_show_json_merges_project_file() {
    let dir = TempDir::new().expect("tempdir");
    write_project_config(dir.path(), "[autosave]\nquiet_ms = 250\n");

    let output = tether_cmd(dir.path())
        .args(["config", "show", "--json"])
        .output()
        .expect("config show should not crash");
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");

    assert_eq!(json["resolved_output"], "json");
    assert_eq!(json["project"]["autosave"]["quiet_ms"], 250);
    assert_eq!(json["project"]["geocode"]["country_codes"], "ph");
}

#[test]
fn config_show_project_prints_raw_toml() {
    let dir = TempDir::new().expect("tempdir");
    write_project_config(dir.path(), "[geocode]\ncountry = \"Philippines\"\n");

    tether_cmd(dir.path())
        .args(["config", "show", "--project", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[geocode]"))
        .stdout(predicate::str::contains("country = \"Philippines\""))
        .stdout(predicate::str::contains("autosave").not());
}

#[test]
fn config_show_rejects_malformed_project_file() {
    let dir = TempDir::new().expect("tempdir");
    write_project_config(dir.path(), "[autosave\nquiet_ms = ");

    tether_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// completions
// ---------------------------------------------------------------------------

#[test]
fn completions_bash_mentions_binary() {
    let dir = TempDir::new().expect("tempdir");
    tether_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tether"));
}

// ---------------------------------------------------------------------------
// geocode
// ---------------------------------------------------------------------------

#[test]
fn geocode_without_address_fails() {
    let dir = TempDir::new().expect("tempdir");
    tether_cmd(dir.path())
        .args(["geocode"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--city"));
}

#[test]
fn geocode_unreachable_endpoint_reports_no_matches() {
    let dir = TempDir::new().expect("tempdir");
    let output = tether_cmd(dir.path())
        .args(["geocode", "--city", "Cebu", "--endpoint", UNREACHABLE, "--json"])
        .output()
        .expect("geocode should not crash");
    assert!(
        output.status.success(),
        "lookup failures are not command errors: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert!(json["coordinate"].is_null());
    assert!(json["accepted_by"].is_null());
    assert_eq!(json["advisory"], "No matches found");
    assert_eq!(json["error_code"], "E4102");
    assert!(
        json["steps"]
            .as_array()
            .is_some_and(|steps| !steps.is_empty())
    );
}

// ---------------------------------------------------------------------------
// set-status
// ---------------------------------------------------------------------------

#[test]
fn set_status_unreachable_server_rolls_back_and_exits_1() {
    let dir = TempDir::new().expect("tempdir");
    write_project_config(dir.path(), "[autosave]\nquiet_ms = 20\nsaved_display_ms = 20\n");

    tether_cmd(dir.path())
        .args([
            "set-status",
            "--endpoint",
            UNREACHABLE,
            "--id",
            "1",
            "--status",
            "solved",
            "--current",
            "Ongoing",
            "--format",
            "text",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("key=victim-1.status"))
        .stdout(predicate::str::contains("committed=Ongoing"))
        .stderr(predicate::str::contains("E4001"))
        .stderr(predicate::str::contains("Edit the field again to retry."));
}

#[test]
fn set_status_rejects_unknown_status() {
    let dir = TempDir::new().expect("tempdir");
    tether_cmd(dir.path())
        .args([
            "set-status",
            "--endpoint",
            UNREACHABLE,
            "--id",
            "1",
            "--status",
            "closed",
        ])
        .assert()
        .failure();
}
