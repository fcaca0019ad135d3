//! CLI smoke tests: verify basic binary behavior.

use std::process::Command;

fn cli_bin(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_instinct"));
    cmd.arg("--db")
        .arg(dir.path().join("cli.db"))
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .env_remove("INSTINCT_DB_PATH");
    cmd
}

#[test]
fn test_help_flag() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = cli_bin(&dir).arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
}

#[test]
fn test_version_flag() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = cli_bin(&dir).arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("instinct_cli"), "Expected crate name in --version output");
}

#[test]
fn test_create_then_guidance() {
    let dir = tempfile::TempDir::new().unwrap();
    let created = cli_bin(&dir)
        .args(["create", "--domain", "format", "--trigger", "user asks for data", "--action", "use tables"])
        .args(["--confidence", "0.95"])
        .output()
        .expect("failed to run");
    assert!(created.status.success(), "{}", String::from_utf8_lossy(&created.stderr));

    let output = cli_bin(&dir).args(["guidance", "show me the numbers", "--seed", "7"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("### Output Format Preferences"));
    assert!(stdout.contains("- use tables (always apply)"));
}

#[test]
fn test_unknown_profile_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = cli_bin(&dir).args(["profile", "wizard"]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_out_of_range_config_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[confidence]\nmin_confidence = 1.5\n").unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_instinct"))
        .arg("--db")
        .arg(dir.path().join("cli.db"))
        .arg("--config")
        .arg(&config)
        .arg("summary")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("min_confidence"));
}
