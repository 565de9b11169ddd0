//! Exit codes of the command line entry point.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn editor_release(cwd: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("editor_release").unwrap();
    cmd.current_dir(cwd.path())
        .env("USER", "alice")
        .env_remove("RUST_LOG")
        .env_remove("EDITOR_RELEASE_STORE_ROOT");
    cmd
}

#[test]
fn missing_revision_exits_3() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp)
        .args(["-n", "dart-editor-linux", "-o", "out"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("missing revision option"));
}

#[test]
fn missing_builder_name_exits_4() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp)
        .args(["-r", "123", "-o", "out"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("missing builder name"));
}

#[test]
fn missing_output_directory_exits_5() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp)
        .args(["-r", "123", "-n", "dart-editor-linux"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("missing output directory"));
}

#[test]
fn missing_username_exits_6() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp)
        .env_remove("USER")
        .env_remove("USERNAME")
        .args(["-r", "123", "-n", "dart-editor-linux", "-o", "out"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("USER and USERNAME"));
}

#[test]
fn revision_is_checked_before_everything_else() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp)
        .env_remove("USER")
        .env_remove("USERNAME")
        .assert()
        .code(3);
}

#[test]
fn positional_arguments_exit_2() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp)
        .args(["-r", "123", "stray"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("stray"));
}

#[test]
fn unknown_flags_are_usage_errors() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp).arg("--bogus").assert().code(2);
}

#[test]
fn configuration_errors_allocate_nothing() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp)
        .args(["-r", "123", "-n", "dart-editor-linux"])
        .assert()
        .code(5);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn help_lists_the_options() {
    let tmp = TempDir::new().unwrap();
    editor_release(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--revision"))
        .stdout(predicate::str::contains("--unmatched-runtime"));
}
