//! CLI tests for `ralph build`, `ralph run`, `ralph list`, and `ralph worktree`.
//!
//! Spawns the ralph binary against a temp project whose `ralph.toml` points
//! the agent at a fake script, and verifies exit codes and spec movement.
#![cfg(unix)]

use std::fs;
use std::process::{Command, Output};

use ralph::core::completion::COMPLETION_MARKER;
use ralph::exit_codes;
use ralph::test_support::{FakeAgent, SpecFixture, text_run};

fn project(agent: &FakeAgent) -> SpecFixture {
    let fixture = SpecFixture::new().expect("fixture");
    let config = format!(
        "default_iterations = 3\n\n[agent]\nprogram = {:?}\n",
        agent.program().display().to_string()
    );
    fs::write(fixture.root().join("ralph.toml"), config).expect("write config");
    fixture
}

fn ralph(fixture: &SpecFixture, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ralph"))
        .arg("--root")
        .arg(fixture.root())
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("spawn ralph")
}

#[test]
fn build_completes_and_moves_spec() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);
    fx.add_spec("2025-06-01-auth", true).expect("spec");
    agent
        .script(1, &text_run(&format!("done {COMPLETION_MARKER}")), &[], 0)
        .expect("script");

    let out = ralph(&fx, &["build", "auth"]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(agent.calls().expect("calls"), 1);
    assert!(!fx.root().join("specs/backlog/2025-06-01-auth").exists());
    let moved = fx.root().join("specs/complete/2025-06-01-auth");
    assert!(moved.join("PRD.md").is_file());
    assert!(moved.join("logs").is_dir());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Spec '2025-06-01-auth' moved to complete."), "{stdout}");
}

#[test]
fn build_without_marker_exits_with_max_iterations() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);
    fx.add_spec("auth", true).expect("spec");

    let out = ralph(&fx, &["build", "auth", "-n", "2"]);

    assert_eq!(out.status.code(), Some(exit_codes::MAX_ITERATIONS));
    assert_eq!(agent.calls().expect("calls"), 2);
    assert!(fx.root().join("specs/backlog/auth").is_dir());
}

#[test]
fn build_uses_configured_default_iterations() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);
    fx.add_spec("auth", true).expect("spec");

    let out = ralph(&fx, &["build", "auth"]);

    assert_eq!(out.status.code(), Some(exit_codes::MAX_ITERATIONS));
    assert_eq!(agent.calls().expect("calls"), 3);
}

#[test]
fn failing_agent_exits_with_error() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);
    fx.add_spec("auth", true).expect("spec");
    agent.script(1, &[], &["boom"], 4).expect("script");

    let out = ralph(&fx, &["build", "auth"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERROR));
    assert_eq!(agent.calls().expect("calls"), 1);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("boom"), "{stderr}");
    assert!(stderr.contains("Error in iteration 1: agent exited with code 4"), "{stderr}");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(!stdout.contains("Error in iteration"), "{stdout}");
}

#[test]
fn build_without_plan_fails_before_running_agent() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);
    fx.add_spec("auth", false).expect("spec");

    let out = ralph(&fx, &["build", "auth"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERROR));
    assert_eq!(agent.calls().expect("calls"), 0);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("ralph plan auth"), "{stderr}");
}

#[test]
fn run_with_inline_prompt() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);
    agent
        .script(1, &text_run(COMPLETION_MARKER), &[], 0)
        .expect("script");

    let out = ralph(&fx, &["run", "--prompt", "Fix the tests.", "-n", "4"]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let args = agent.args(1).expect("args");
    assert!(args.iter().any(|arg| arg == "Fix the tests."), "{args:?}");
    assert_eq!(agent.cwd(1).expect("cwd"), fx.root());
}

#[test]
fn usage_errors_do_not_use_the_max_iterations_code() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);

    let out = ralph(&fx, &["build", "auth", "-n", "0"]);

    assert_eq!(out.status.code(), Some(exit_codes::ERROR));
    assert_eq!(agent.calls().expect("calls"), 0);
}

#[test]
fn list_prints_backlog_specs_sorted() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);

    let out = ralph(&fx, &["list"]);
    assert_eq!(out.status.code(), Some(exit_codes::ERROR));

    fx.add_spec("zeta", false).expect("spec");
    fx.add_spec("2025-01-02-alpha", false).expect("spec");
    let out = ralph(&fx, &["list"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "2025-01-02-alpha\nzeta\n");
}

#[test]
fn worktree_remove_with_only_the_main_checkout_is_a_no_op() {
    let agent = FakeAgent::new().expect("agent");
    let fx = project(&agent);
    let status = Command::new("git")
        .args(["init", "-q"])
        .current_dir(fx.root())
        .status()
        .expect("git init");
    assert!(status.success());

    let out = ralph(&fx, &["worktree", "remove"]);

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("No removable worktrees found"), "{stdout}");
    assert_eq!(agent.calls().expect("calls"), 0);
}
