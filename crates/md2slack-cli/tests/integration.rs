#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `md2slack` running in `dir` with its home and database inside `home`.
fn md2slack(dir: &TempDir, home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("md2slack").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", home.path())
        .env("MD2SLACK_DB_PATH", home.path().join("md2slack.db"))
        .env_remove("MD2SLACK_WEB_ADDR")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_flags() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    md2slack(&dir, &home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--web-addr"))
        .stdout(predicate::str::contains("--install"));
}

#[test]
fn date_is_required_without_web() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    md2slack(&dir, &home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("<DATES>"));
}

#[test]
fn open_requires_web() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    md2slack(&dir, &home)
        .args(["--open", "01-05-2026"])
        .assert()
        .failure();
}

#[cfg(unix)]
#[test]
fn install_links_app_dir() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    md2slack(&dir, &home)
        .arg("--install")
        .assert()
        .success()
        .stdout(predicate::str::contains("Installation successful!"))
        .stdout(predicate::str::contains("export PATH=$PATH:$HOME/.md2slack"));

    let link = home.path().join(".md2slack");
    let target = std::fs::read_link(&link).unwrap();
    assert_eq!(
        std::fs::canonicalize(target).unwrap(),
        std::fs::canonicalize(dir.path()).unwrap()
    );
}

#[test]
fn non_repository_reports_fact_error() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    md2slack(&dir, &home)
        .args(["--debug", "01-05-2026"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--- Processing Date: 01-05-2026 (Repo: unknown) ---"))
        .stderr(predicate::str::contains("Error generating facts for 01-05-2026"));
}
