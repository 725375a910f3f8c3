use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::process::Command;

fn popen() -> Command {
    Command::cargo_bin("popen").unwrap()
}

#[test]
fn run_redirects_stdout_to_a_file() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let out = tmp.child("out.txt");
    popen()
        .args([
            "run",
            "--stdout",
            &format!("truncate:{}", out.path().display()),
            "--env",
            "GREETING=hello",
            "--",
            "/bin/sh",
            "-c",
            "echo $GREETING",
        ])
        .assert()
        .success();
    out.assert("hello\n");
}

#[test]
fn run_exits_with_the_child_code() {
    popen()
        .args(["run", "--", "/bin/sh", "-c", "exit 9"])
        .assert()
        .code(9);
}

#[test]
fn run_reports_launch_failure_as_127() {
    popen()
        .args(["run", "--", "/nonexistent/popen-cli-binary"])
        .assert()
        .code(127)
        .stderr(contains("failed before exec").and(contains("execve")));
}

#[test]
fn run_rejects_pipe_intents() {
    popen()
        .args(["run", "--stdout", "pipe", "--", "/bin/true"])
        .assert()
        .failure()
        .stderr(contains("pipe"));
}

#[test]
fn run_rejects_malformed_intents() {
    popen()
        .args(["run", "--stdin", "fd:minus", "--", "/bin/true"])
        .assert()
        .failure()
        .stderr(contains("fd:minus"));
}

#[test]
fn exec_runs_a_plan_in_its_cwd() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("marker").touch().unwrap();
    let plan = tmp.child("plan.toml");
    plan.write_str(&format!(
        "argv = [\"/bin/sh\", \"-c\", \"test -e marker\"]\ncwd = {:?}\nclose_fds = true\n",
        tmp.path().display().to_string()
    ))
    .unwrap();
    popen()
        .args(["exec", "--plan", plan.path().to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn show_prints_the_parsed_plan() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let plan = tmp.child("plan.toml");
    plan.write_str("argv = [\"cat\"]\n[streams]\nstdin = \"read:in.txt\"\n")
        .unwrap();
    popen()
        .args(["show", "--plan", plan.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("argv = [\"cat\"]").and(contains("stdin = \"read:in.txt\"")));
}

#[test]
fn show_rejects_an_empty_plan() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let plan = tmp.child("plan.toml");
    plan.write_str("\n").unwrap();
    popen()
        .args(["show", "--plan", plan.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("Plan is empty"));
}
