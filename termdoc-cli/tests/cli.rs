use assert_cmd::Command;
use predicates::prelude::*;

fn termdoc() -> Command {
    Command::cargo_bin("termdoc").unwrap()
}

#[test]
fn help_lists_view_flags() {
    termdoc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--fit"))
        .stdout(predicate::str::contains("--dual"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("only PDF files are supported"));
}

#[test]
fn missing_file_fails_before_touching_the_terminal() {
    let dir = tempfile::tempdir().unwrap();
    termdoc()
        .arg(dir.path().join("absent.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn unknown_mode_is_a_usage_error() {
    termdoc()
        .args(["paper.pdf", "--dark", "sepia"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sepia"));
}

#[test]
fn file_argument_is_required() {
    termdoc().assert().failure().stderr(predicate::str::contains("<FILE>"));
}
