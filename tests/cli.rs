//! Integration tests for the taskrun binary

mod common;

use assert_cmd::Command;
use common::{create_task_file, create_task_file_in_subdir};
use predicates::prelude::*;
use std::fs;

const TASKS: &str = r#"
vars:
  GREETING: !describe { desc: "what to say", value: !default hello }
tasks:
  hello:
    desc: Say hello
    vars:
      WHO: !describe { desc: "who to greet", value: !default world }
    run:
      - echo: $(GREETING) $(WHO)
  _private:
    run:
      - echo: hidden
  quiet:
    run:
      - run:
          cmd: echo quiet-output
          quiet: true
  fail:
    run:
      - abort: stopped at $(GREETING)
        code: 7
  leave:
    run:
      - exit: 3
  broken:
    run: "false"
"#;

fn taskrun() -> Command {
    Command::cargo_bin("taskrun").unwrap()
}

#[test]
fn test_list_tasks() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .arg("-l")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"))
        .stdout(predicate::str::contains("quiet"))
        .stdout(predicate::str::contains("_private").not());
}

#[test]
fn test_run_task_with_vars() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .args(["GREETING=hi", "hello:WHO=team", "hello"])
        .assert()
        .success()
        .stdout("hi team\n");
}

#[test]
fn test_quiet_command_only_shows_output() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .arg("quiet")
        .assert()
        .success()
        .stdout("quiet-output\n");

    taskrun()
        .current_dir(dir.path())
        .args(["-v", "run", "quiet"])
        .assert()
        .success()
        .stdout("echo quiet-output\nquiet-output\n");
}

#[test]
fn test_special_variable_rejected() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .args(["_TOP_=/", "hello"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("special variable"));
}

#[test]
fn test_abort_exit_code_and_message() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .arg("fail")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("stopped at hello"));
}

#[test]
fn test_exit_step() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .args(["leave", "hello"])
        .assert()
        .code(3)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_failed_command() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .arg("broken")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_unknown_task() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .arg("nope")
        .assert()
        .code(6)
        .stderr(predicate::str::contains("No such task: nope"));
}

#[test]
fn test_missing_task_file() {
    let dir = tempfile::TempDir::new().unwrap();
    taskrun()
        .current_dir(dir.path())
        .arg("-l")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unable to find task file"));
}

#[test]
fn test_walk_and_dir() {
    let (dir, _path, sub_dir) = create_task_file_in_subdir(TASKS);

    taskrun()
        .current_dir(&sub_dir)
        .arg("-l")
        .assert()
        .code(2);

    taskrun()
        .current_dir(&sub_dir)
        .args(["-w", "-l"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"));

    taskrun()
        .current_dir(&sub_dir)
        .arg("-d")
        .arg(dir.path())
        .arg("hello")
        .assert()
        .success()
        .stdout("hello world\n");
}

#[test]
fn test_alternate_file_name() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(
        dir.path().join("other.yml"),
        "tasks:\n  t:\n    run:\n      - echo: other $(_TOP_)\n",
    )
    .unwrap();

    taskrun()
        .current_dir(dir.path())
        .args(["-f", "other.yml", "t"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("other /"));
}

#[test]
fn test_var_help() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains("Var: GREETING\n Desc: what to say\n"))
        .stdout(predicate::str::contains("Current value").not());

    taskrun()
        .current_dir(dir.path())
        .args(["-V", "-v", "var", "GREETING=hey"])
        .assert()
        .success()
        .stdout(predicate::str::contains(" Current value: hey"));
}

#[test]
fn test_task_help() {
    let (dir, _path) = create_task_file(TASKS);
    taskrun()
        .current_dir(dir.path())
        .args(["-H", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Task: hello\n Entry: 0\n  Desc: Say hello\n  Var: WHO\n   Desc: who to greet\n",
        ))
        .stdout(predicate::str::contains("Task: quiet").not());
}
