use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

/// Binary run inside an empty working directory with an isolated HOME, so
/// neither `./config.json` nor `~/.kualitee/config.json` exists unless a
/// test writes one.
fn isolated() -> (TempDir, Command) {
    let tmp = TempDir::new().expect("create temp dir");
    let home = tmp.path().join("home");
    fs::create_dir_all(&home).expect("create isolated home");

    let mut cmd = cargo_bin_cmd!("kualitee-cli");
    cmd.current_dir(tmp.path())
        .env("HOME", &home)
        .env_remove("KUALITEE_CONFIG")
        .env_remove("KUALITEE_API_URL");
    (tmp, cmd)
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_config_exits_before_menu() {
    let (_tmp, mut cmd) = isolated();
    let output = cmd.write_stdin("1\n").assert().failure().get_output().clone();

    let stdout = stdout_of(&output);
    let stderr = stderr_of(&output);
    assert!(!stdout.contains("Select Module"), "menu was shown: {}", stdout);
    assert!(stderr.contains("config file not found"), "stderr: {}", stderr);
    assert!(stderr.contains("\"project_id\": 27433"), "sample config missing: {}", stderr);
}

#[test]
fn config_without_project_id_is_fatal() {
    let (tmp, mut cmd) = isolated();
    fs::write(tmp.path().join("config.json"), r#"{"token":"abc"}"#).expect("write config");

    let output = cmd.write_stdin("").assert().failure().get_output().clone();
    assert!(stderr_of(&output).contains("project_id"));
    assert!(!stdout_of(&output).contains("Select Module"));
}

#[test]
fn malformed_config_is_fatal() {
    let (tmp, mut cmd) = isolated();
    fs::write(tmp.path().join("config.json"), "{ not json").expect("write config");

    let output = cmd.write_stdin("").assert().failure().get_output().clone();
    assert!(stderr_of(&output).contains("invalid JSON"));
}

#[test]
fn config_path_can_come_from_environment() {
    let (tmp, mut cmd) = isolated();
    let custom = tmp.path().join("elsewhere.json");
    fs::write(&custom, r#"{"token":""}"#).expect("write config");

    // The named file is used (and rejected for its empty token) instead of
    // reporting a missing ./config.json.
    let output = cmd
        .env("KUALITEE_CONFIG", &custom)
        .write_stdin("")
        .assert()
        .failure()
        .get_output()
        .clone();
    assert!(stderr_of(&output).contains("token is empty"));
}
