//! Loop tests against a real subprocess.
//!
//! A shell script stands in for the `claude` binary so these exercise process
//! spawning, stream draining, and session log persistence end to end.
#![cfg(unix)]

use std::fs;

use ralph::core::completion::COMPLETION_MARKER;
use ralph::core::render::RenderOptions;
use ralph::io::config::SpecsConfig;
use ralph::io::executor::{ClaudeExecutor, agent_args};
use ralph::io::specs::SpecRepository;
use ralph::looping::{LoopOutcome, LoopRequest, LoopResult, run_loop};
use ralph::test_support::{FakeAgent, SpecFixture, assistant_line, text_run};

struct Harness {
    fixture: SpecFixture,
    agent: FakeAgent,
}

impl Harness {
    fn new() -> Self {
        let fixture = SpecFixture::new().expect("fixture");
        fixture.add_spec("auth", true).expect("spec");
        let agent = FakeAgent::new().expect("fake agent");
        Self { fixture, agent }
    }

    fn run(&self, prompt: &str, max_iterations: u32) -> LoopOutcome {
        let spec = SpecRepository::new(self.fixture.root(), &SpecsConfig::default())
            .resolve("auth")
            .expect("resolve");
        let executor = ClaudeExecutor::new(self.agent.program().display().to_string());
        let request = LoopRequest {
            prompt: prompt.to_string(),
            workdir: self.fixture.root().to_path_buf(),
            max_iterations,
            spec: Some(spec),
            render: RenderOptions::default(),
        };
        run_loop(&executor, &request).expect("loop")
    }
}

fn journal_of(outcome: &LoopOutcome) -> String {
    let transcript = outcome.transcript_path.as_ref().expect("transcript path");
    fs::read_to_string(transcript.with_extension("jsonl")).expect("read journal")
}

fn transcript_of(outcome: &LoopOutcome) -> String {
    let transcript = outcome.transcript_path.as_ref().expect("transcript path");
    fs::read_to_string(transcript).expect("read transcript")
}

#[test]
fn completes_when_agent_emits_marker() {
    let h = Harness::new();
    h.agent
        .script(1, &text_run("Working on the first task."), &[], 0)
        .expect("script 1");
    h.agent
        .script(2, &text_run(&format!("All done {COMPLETION_MARKER}")), &[], 0)
        .expect("script 2");

    let outcome = h.run("Build it.", 5);

    assert_eq!(outcome.result, LoopResult::FullyComplete);
    assert_eq!(outcome.iterations_run, 2);
    assert_eq!(h.agent.calls().expect("calls"), 2);
    let transcript = transcript_of(&outcome);
    assert!(transcript.contains("Working on the first task."), "{transcript}");
    assert!(transcript.contains("🎉 Spec complete after 2 iterations."));
}

#[test]
fn passes_fixed_flags_and_workdir() {
    let h = Harness::new();
    h.agent
        .script(1, &text_run(COMPLETION_MARKER), &[], 0)
        .expect("script");

    h.run("Study @PRD.md then work.", 1);

    let expected: Vec<String> = agent_args("Study @PRD.md then work.")
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(h.agent.args(1).expect("args"), expected);
    assert_eq!(h.agent.cwd(1).expect("cwd"), h.fixture.root());
}

#[test]
fn journal_holds_every_decoded_event_and_nothing_else() {
    let h = Harness::new();
    let mut stdout = text_run("progress");
    stdout.insert(1, "plain text from a wrapper script".to_string());
    stdout.insert(2, String::new());
    h.agent
        .script(1, &stdout, &["warning: rate limited"], 0)
        .expect("script");

    let outcome = h.run("P", 1);

    assert_eq!(outcome.result, LoopResult::MaxIterationsReached);
    let journal = journal_of(&outcome);
    let lines: Vec<&str> = journal.lines().collect();
    assert_eq!(lines.len(), 3, "{journal}");
    assert_eq!(lines[1], assistant_line("progress"));
    assert!(!journal.contains("plain text"));
    assert!(!journal.contains("rate limited"));

    let transcript = transcript_of(&outcome);
    assert!(transcript.contains("plain text from a wrapper script\n"));
    assert!(transcript.contains("warning: rate limited\n"));
}

#[test]
fn non_zero_exit_stops_the_loop() {
    let h = Harness::new();
    h.agent
        .script(1, &text_run("first"), &[], 0)
        .expect("script 1");
    h.agent
        .script(2, &text_run("crashing"), &["fatal: boom"], 3)
        .expect("script 2");

    let outcome = h.run("P", 5);

    assert_eq!(outcome.result, LoopResult::Error);
    assert_eq!(outcome.iterations_run, 2);
    assert_eq!(outcome.failure.as_deref(), Some("agent exited with code 3"));
    assert_eq!(h.agent.calls().expect("calls"), 2);
    let transcript = transcript_of(&outcome);
    assert!(transcript.contains("fatal: boom"));
    assert!(transcript.contains("Error in iteration 2: agent exited with code 3"));
    assert_eq!(transcript.matches("\nEnded: ").count(), 1);
}

#[test]
fn marker_split_across_blocks_is_detected() {
    let h = Harness::new();
    let (head, tail) = COMPLETION_MARKER.split_at(9);
    let stdout = vec![assistant_line(&format!("done {head}")), assistant_line(tail)];
    h.agent.script(1, &stdout, &[], 0).expect("script");

    let outcome = h.run("P", 3);

    assert_eq!(outcome.result, LoopResult::FullyComplete);
    assert_eq!(outcome.iterations_run, 1);
}

#[test]
fn missing_agent_binary_is_an_error_result() {
    let fixture = SpecFixture::new().expect("fixture");
    let folder = fixture.add_spec("auth", true).expect("spec");
    let spec = SpecRepository::new(fixture.root(), &SpecsConfig::default())
        .resolve("auth")
        .expect("resolve");
    let executor = ClaudeExecutor::new(folder.join("no-such-agent").display().to_string());
    let request = LoopRequest {
        prompt: "P".to_string(),
        workdir: fixture.root().to_path_buf(),
        max_iterations: 3,
        spec: Some(spec),
        render: RenderOptions::default(),
    };

    let outcome = run_loop(&executor, &request).expect("loop");

    assert_eq!(outcome.result, LoopResult::Error);
    assert_eq!(outcome.iterations_run, 1);
    let failure = outcome.failure.expect("failure");
    assert!(failure.starts_with("failed to launch"), "{failure}");
}
