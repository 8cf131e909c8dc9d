//! Integration tests for the `tarp` binary.
// The cargo_bin function is marked deprecated in favor of cargo_bin! macro,
// but both work correctly. Suppressing until assert_cmd stabilizes the new API.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A project directory with an already-created default environment.
fn setup_project(descriptor: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("tarp.yml"), descriptor).unwrap();
    let env_prefix = temp.path().join("envs").join("default");
    fs::create_dir_all(env_prefix.join("conda-meta")).unwrap();
    let env_prefix = env_prefix.canonicalize().unwrap();
    (temp, env_prefix)
}

fn tarp(temp: &TempDir, env_prefix: &PathBuf) -> Command {
    let mut cmd = Command::new(cargo_bin("tarp"));
    cmd.current_dir(temp.path())
        .env("CONDA_ENV_PATH", env_prefix)
        .env("NO_COLOR", "1")
        .env_remove("TARP_DIRECTORY");
    cmd
}

#[test]
fn cli_shows_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("tarp"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Declarative project environments"));
    Ok(())
}

#[test]
fn cli_shows_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("tarp"));
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn check_reports_descriptor_problems() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("runtime: 42\n");
    tarp(&temp, &prefix)
        .arg("check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unable to load the project"))
        .stderr(predicate::str::contains(
            "runtime section contains wrong value type 42",
        ));
    Ok(())
}

#[test]
fn check_reports_missing_variable() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("runtime: [TARP_TEST_UNSET_VAR]\n");
    tarp(&temp, &prefix)
        .arg("check")
        .env_remove("TARP_TEST_UNSET_VAR")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "TARP_TEST_UNSET_VAR environment variable must be set",
        ));
    Ok(())
}

#[test]
fn check_succeeds_when_everything_is_set() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("runtime: [TARP_TEST_SET_VAR]\n");
    tarp(&temp, &prefix)
        .arg("check")
        .env("TARP_TEST_SET_VAR", "yes")
        .assert()
        .success()
        .stdout(predicate::str::contains("The project is ready to run commands."));
    Ok(())
}

#[test]
fn directory_flag_selects_project() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("name: elsewhere\n");
    let other = TempDir::new()?;
    let mut cmd = Command::new(cargo_bin("tarp"));
    cmd.current_dir(other.path())
        .env("CONDA_ENV_PATH", &prefix)
        .args(["info", "--directory"])
        .arg(temp.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("elsewhere"));
    Ok(())
}

#[test]
fn info_json_prints_publication_info() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("name: demo\nruntime: [DB_PASSWORD]\n");
    let output = tarp(&temp, &prefix).args(["info", "--json"]).output()?;
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["name"], "demo");
    assert_eq!(value["variables"]["DB_PASSWORD"]["encrypted"], true);
    Ok(())
}

#[test]
fn set_variable_records_value() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("name: demo\n");
    tarp(&temp, &prefix)
        .args(["set-variable", "API_URL=http://localhost:8000"])
        .assert()
        .success();

    let state = fs::read_to_string(temp.path().join(".tarp").join("local.yml"))?;
    assert!(state.contains("http://localhost:8000"));
    let descriptor = fs::read_to_string(temp.path().join("tarp.yml"))?;
    assert!(descriptor.contains("API_URL"));
    Ok(())
}

#[test]
fn set_variable_rejects_bad_assignment() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("");
    tarp(&temp, &prefix)
        .args(["set-variable", "NO_EQUALS"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("NAME=VALUE"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn run_executes_named_command() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project(
        "commands:\n  hello:\n    shell: echo hello-from-tarp\n    windows: echo hello-from-tarp\n",
    );
    tarp(&temp, &prefix)
        .args(["run", "--command", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello-from-tarp"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn run_propagates_exit_code() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("commands:\n  default:\n    shell: exit 3\n");
    tarp(&temp, &prefix).arg("run").assert().code(3);
    Ok(())
}

#[test]
fn run_unknown_command_fails() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("commands:\n  hello:\n    shell: echo hi\n    windows: echo hi\n");
    tarp(&temp, &prefix)
        .args(["run", "-c", "missing"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing"));
    Ok(())
}

#[test]
fn clean_removes_environments() -> Result<(), Box<dyn std::error::Error>> {
    let (temp, prefix) = setup_project("");
    tarp(&temp, &prefix).arg("clean").assert().success();
    assert!(!temp.path().join("envs").exists());
    Ok(())
}
