use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn write_valid_config(dir: &Path, file_name: &str) -> PathBuf {
    let data_dir = dir.join("data");
    fs::create_dir_all(&data_dir).expect("create data dir");

    let config_path = dir.join(file_name);
    fs::write(
        &config_path,
        format!(
            r#"
name = "qrpass-cli-test"
env = "dev"
sqlite_path = "{sqlite}"

[bind.http]
ip = "127.0.0.1"
port = 0

[observability.log]
output = "console"

[services.qr]
secret_key = "{key}"
default_ttl_seconds = 120
max_ttl_seconds = 3600
link_base_url = "https://checkin.example.com/scan"

[services.qr.store]
backend = "memory"
"#,
            sqlite = data_dir.display(),
            key = TEST_KEY,
        ),
    )
    .expect("write valid config");

    config_path
}

fn write_invalid_config(dir: &Path, file_name: &str) -> PathBuf {
    let config_path = dir.join(file_name);
    fs::write(
        &config_path,
        r#"
name = "qrpass-cli-invalid"
env = "dev"

[services.qr]
default_ttl_seconds = 0
"#,
    )
    .expect("write invalid config");

    config_path
}

fn run_qrpass(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qrpass"))
        .args(args)
        .output()
        .expect("run qrpass binary")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn gen_key_prints_hex_key() {
    let output = run_qrpass(&["gen-key"]);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));

    let key = stdout_of(&output).trim().to_string();
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

    let second = stdout_of(&run_qrpass(&["gen-key"])).trim().to_string();
    assert_ne!(key, second);
}

#[test]
fn test_command_accepts_valid_config() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = write_valid_config(temp.path(), "valid.toml");

    let output = run_qrpass(&["test", config.to_str().expect("utf8 path")]);
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        stdout_of(&output),
        stderr_of(&output)
    );
}

#[test]
fn test_command_rejects_invalid_config() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = write_invalid_config(temp.path(), "invalid.toml");

    let output = run_qrpass(&["test", config.to_str().expect("utf8 path")]);
    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(stderr.contains("secret_key"), "stderr: {stderr}");
}

#[test]
fn test_command_reports_missing_file() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let missing = temp.path().join("missing.toml");

    let output = run_qrpass(&["test", missing.to_str().expect("utf8 path")]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("not found"));
}

#[test]
fn issue_command_prints_token_json() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = write_valid_config(temp.path(), "issue.toml");

    let output = run_qrpass(&[
        "issue",
        "--event",
        "event-42",
        "--ttl",
        "60",
        "--config",
        config.to_str().expect("utf8 path"),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));

    let stdout = stdout_of(&output);
    let line = stdout.lines().last().expect("issue should print a line");
    let body: Value = serde_json::from_str(line).expect("issue output should be json");
    assert_eq!(body["event_id"], "event-42");
    let issued_at = body["issued_at"].as_i64().expect("issued_at");
    assert_eq!(body["expires_at"].as_i64(), Some(issued_at + 60_000));
    let token = body["token"].as_str().expect("token");
    assert!(!token.is_empty());
    assert!(
        body["link"]
            .as_str()
            .expect("link")
            .starts_with("https://checkin.example.com/scan?token=")
    );
}

#[test]
fn issue_command_rejects_ttl_above_max() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = write_valid_config(temp.path(), "issue.toml");

    let output = run_qrpass(&[
        "issue",
        "--event",
        "event-42",
        "--ttl",
        "7200",
        "--config",
        config.to_str().expect("utf8 path"),
    ]);
    assert!(!output.status.success());
    assert!(stdout_of(&output).trim().is_empty());
}
