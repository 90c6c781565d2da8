//! End-to-end tests of the run loop with a scripted model and in-memory
//! tools.

use refocus::agent::prompt::{FOCUS_REMINDER, NUDGE};
use refocus::agent::run_loop::{STEP_LIMIT_ERROR, STEP_LIMIT_TEXT};
use refocus::agent::strategy::Baseline;
use refocus::agent::{EventObserver, RunConfig, RunEvent, RunLoop};
use refocus::api::{Completion, Inference, InferenceFuture, InferenceRequest};
use refocus::context::{CompressionReport, KNOWLEDGE_MARKER, check_pairing};
use refocus::error::ProviderError;
use refocus::metrics::{RunOutcome, RunResult, SnapshotKind};
use refocus::tools::{FnTool, ToolSet};
use refocus::{ActionRequest, Role, ToolDef, Turn, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ── Scripted model ─────────────────────────────────────────────────

/// Replays a fixed list of responses and records every buffer it is sent.
/// Once the script runs out it keeps answering with plain text.
struct Scripted {
    script: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl Scripted {
    fn new(script: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Inference for Scripted {
    fn infer<'a>(&'a self, request: InferenceRequest<'a>) -> InferenceFuture<'a> {
        check_pairing(request.turns).expect("buffer sent to the model must be well paired");
        self.seen.lock().unwrap().push(request.turns.to_vec());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Completion::text("still thinking").usage(50, 5)));
        Box::pin(async move { next })
    }
}

/// A model that never answers.
struct Hanging;

impl Inference for Hanging {
    fn infer<'a>(&'a self, _: InferenceRequest<'a>) -> InferenceFuture<'a> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Completion::text("too late"))
        })
    }
}

// ── Script helpers ─────────────────────────────────────────────────

fn start(id: &str, description: &str) -> ActionRequest {
    ActionRequest::new(
        id,
        "start_focus",
        format!(r#"{{"description":"{description}","goal":"understand {description}"}}"#),
    )
}

fn complete(id: &str, outcome: &str, learnings: &str) -> ActionRequest {
    ActionRequest::new(
        id,
        "complete_focus",
        format!(r#"{{"outcome":"{outcome}","learnings":"{learnings}"}}"#),
    )
}

fn inspect(id: &str) -> ActionRequest {
    ActionRequest::new(id, "inspect", format!(r#"{{"path":"src/{id}.rs"}}"#))
}

fn act(actions: Vec<ActionRequest>) -> Result<Completion, ProviderError> {
    Ok(Completion::with_actions(actions).usage(100, 10))
}

fn done() -> Result<Completion, ProviderError> {
    Ok(Completion::text("All fixed. TASK_COMPLETE").usage(100, 20))
}

#[derive(Deserialize, JsonSchema)]
struct InspectArgs {
    path: String,
}

fn inspect_tool(calls: &'static AtomicUsize) -> FnTool {
    FnTool::new(
        ToolDef::new("inspect", "Look at a file", json_schema_for::<InspectArgs>()),
        move |args: InspectArgs| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("contents of {}", args.path))
        },
    )
}

fn focus_tools(calls: &'static AtomicUsize) -> ToolSet {
    ToolSet::new()
        .with_arg_validation(true)
        .with_focus_tools()
        .with(inspect_tool(calls))
}

fn leak_counter() -> &'static AtomicUsize {
    Box::leak(Box::new(AtomicUsize::new(0)))
}

/// Run `config` against `model`, collecting every compression report.
async fn run_collecting(
    model: &dyn Inference,
    tools: &ToolSet,
    config: RunConfig,
) -> (RunResult, Vec<CompressionReport>) {
    let reports = Mutex::new(Vec::new());
    let observer = EventObserver::new(|event| {
        if let RunEvent::FocusCompressed { report } = event {
            reports.lock().unwrap().push((*report).clone());
        }
    });
    let result = RunLoop::new(model, tools, config)
        .with_event_handler(&observer)
        .run("Fix the bug.", Path::new("/workspace"))
        .await;
    drop(observer);
    (result, reports.into_inner().unwrap())
}

fn focus_config() -> RunConfig {
    RunConfig::focus("test/model").with_focus_reminder_after(None)
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn single_focus_compresses_back_to_protected_prefix() {
    let model = Scripted::new(vec![
        act(vec![start("s1", "A")]),
        act(vec![inspect("p1")]),
        act(vec![inspect("p2")]),
        act(vec![inspect("p3")]),
        act(vec![complete("c1", "success", "X")]),
        done(),
    ]);
    let tools = focus_tools(leak_counter());
    let (result, reports) = run_collecting(&model, &tools, focus_config()).await;

    assert!(result.success);
    assert_eq!(result.outcome, RunOutcome::Completed);
    assert!(result.final_text.contains("TASK_COMPLETE"));

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.marker.description, "A");
    assert_eq!(report.safe_index, 2);
    assert_eq!(report.discarded, 9);
    assert_eq!(report.knowledge_entries, 1);

    // The request after the compression: system, task, continuation.
    let seen = model.seen();
    let after = &seen[5];
    assert_eq!(after.len(), 3);
    assert_eq!(after[0].role, Role::System);
    assert!(after[0].text.contains(KNOWLEDGE_MARKER));
    assert!(after[0].text.contains("**Learnings:** X"));
    assert_eq!(after[1].text, "Fix the bug.");
    assert_eq!(after[2].role, Role::User);
    assert!(after[2].text.starts_with("Focus completed: A"));

    let m = &result.metrics;
    assert_eq!(m.compressions, 1);
    assert_eq!(m.turns_discarded, 9);
    assert_eq!(m.knowledge_entries, 1);
    assert_eq!(m.active_focuses, 0);
    assert_eq!(m.inference_calls, 6);
    assert_eq!(m.action_calls, 5);
    assert_eq!(m.final_buffer_len, 4);
}

#[tokio::test]
async fn start_focus_reply_is_a_tool_result() {
    let model = Scripted::new(vec![act(vec![start("s1", "config")]), done()]);
    let tools = focus_tools(leak_counter());
    let (result, _) = run_collecting(&model, &tools, focus_config()).await;

    let seen = model.seen();
    let last = seen[1].last().unwrap();
    assert_eq!(last.role, Role::ToolResult);
    assert_eq!(last.result_of.as_deref(), Some("s1"));
    assert_eq!(
        last.text,
        "Focus started: config\nGoal: understand config\n\nProceeding with investigation..."
    );
    assert_eq!(result.metrics.active_focuses, 1);
}

#[tokio::test]
async fn custom_system_prompt_survives_compression() {
    let prompt = "You fix bugs.\n\n## KNOWLEDGE BASE RULES\n\nNever edit vendored code.\n";
    let model = Scripted::new(vec![
        act(vec![start("s1", "A")]),
        act(vec![complete("c1", "success", "X")]),
        done(),
    ]);
    let tools = focus_tools(leak_counter());
    let (result, _) = run_collecting(&model, &tools, focus_config().with_system_prompt(prompt)).await;

    assert!(result.success);
    let seen = model.seen();
    assert_eq!(seen[0][0].text, prompt);
    let system = &seen[2][0].text;
    assert!(system.starts_with(prompt));
    assert!(system.contains("**Learnings:** X"));
}

#[tokio::test]
async fn complete_without_open_is_a_failed_tool_result() {
    let model = Scripted::new(vec![act(vec![complete("c1", "success", "nothing")]), done()]);
    let tools = focus_tools(leak_counter());
    let (result, reports) = run_collecting(&model, &tools, focus_config()).await;

    assert!(result.success);
    assert!(reports.is_empty());
    assert_eq!(result.metrics.compressions, 0);
    assert_eq!(result.metrics.knowledge_entries, 0);

    let seen = model.seen();
    let next = &seen[1];
    assert_eq!(next.len(), 4);
    assert_eq!(next[0].text, seen[0][0].text);
    assert!(!next[0].text.contains(KNOWLEDGE_MARKER));
    assert_eq!(
        next[3].text,
        "Error: No active focus to complete. Use start_focus first."
    );
}

#[tokio::test]
async fn nested_focus_only_discards_inner_span() {
    let model = Scripted::new(vec![
        act(vec![start("s1", "A")]),
        act(vec![inspect("p1")]),
        act(vec![start("s2", "B")]),
        act(vec![inspect("p2")]),
        act(vec![inspect("p3")]),
        act(vec![complete("c1", "partial", "inner")]),
        act(vec![inspect("p4")]),
        act(vec![complete("c2", "success", "outer")]),
        done(),
    ]);
    let tools = focus_tools(leak_counter());
    let (result, reports) = run_collecting(&model, &tools, focus_config()).await;

    assert!(result.success);
    assert_eq!(reports.len(), 2);

    let inner = &reports[0];
    assert_eq!(inner.marker.description, "B");
    assert_eq!(inner.remaining_depth, 1);
    assert_eq!(inner.safe_index, 6);
    assert!(!inner.overshoot);

    // A's own work survives the inner compression.
    let seen = model.seen();
    let after_inner = &seen[6];
    assert!(after_inner.iter().any(|t| t.result_of.as_deref() == Some("p1")));
    assert!(!after_inner.iter().any(|t| t.result_of.as_deref() == Some("p2")));

    let outer = &reports[1];
    assert_eq!(outer.marker.description, "A");
    assert_eq!(outer.remaining_depth, 0);
    assert_eq!(outer.safe_index, 2);

    let system = &seen[8][0].text;
    let inner_at = system.find("**Learnings:** inner").unwrap();
    let outer_at = system.find("**Learnings:** outer").unwrap();
    assert!(inner_at < outer_at);
    assert_eq!(result.metrics.knowledge_entries, 2);
}

#[tokio::test]
async fn focuses_opened_in_one_batch_stay_paired() {
    let model = Scripted::new(vec![
        act(vec![inspect("p1"), start("s1", "A"), start("s2", "B"), inspect("p2")]),
        act(vec![complete("c1", "partial", "inner")]),
        act(vec![complete("c2", "success", "outer")]),
        done(),
    ]);
    let tools = focus_tools(leak_counter());
    let (result, reports) = run_collecting(&model, &tools, focus_config()).await;

    assert!(result.success);
    assert_eq!(reports.len(), 2);

    // No boundary between the two anchors closes a group, so the inner
    // cut falls back to the protected prefix.
    let inner = &reports[0];
    assert_eq!(inner.marker.description, "B");
    assert_eq!(inner.safe_index, 2);
    assert!(inner.overshoot);
    assert_eq!(inner.buffer_len, 3);

    let outer = &reports[1];
    assert_eq!(outer.marker.description, "A");
    assert_eq!(outer.marker.anchor, 4);
    assert_eq!(outer.candidate, 4);
    assert_eq!(outer.safe_index, 3);
    assert!(!outer.overshoot);
    assert_eq!(result.metrics.active_focuses, 0);
    assert_eq!(model.seen().len(), 4);
}

#[tokio::test]
async fn step_limit_ends_the_run() {
    let model = Scripted::new(vec![]);
    let tools = focus_tools(leak_counter());
    let config = focus_config().with_max_steps(5);
    let (result, _) = run_collecting(&model, &tools, config).await;

    assert!(!result.success);
    assert_eq!(result.outcome, RunOutcome::StepLimitExceeded);
    assert_eq!(result.error.as_deref(), Some(STEP_LIMIT_ERROR));
    assert_eq!(result.final_text, STEP_LIMIT_TEXT);
    assert_eq!(result.metrics.inference_calls, 5);
    assert_eq!(result.metrics.trajectory.count(SnapshotKind::Inference), 5);
    assert_eq!(result.metrics.trajectory.len(), 5);

    // Every text-only response is followed by a nudge.
    let seen = model.seen();
    assert_eq!(seen[1].last().unwrap().text, NUDGE);
}

#[tokio::test]
async fn step_limit_trajectory_includes_compression_snapshots() {
    let model = Scripted::new(vec![
        act(vec![start("s1", "A")]),
        act(vec![inspect("p1")]),
        act(vec![complete("c1", "blocked", "dead end")]),
    ]);
    let tools = focus_tools(leak_counter());
    let config = focus_config().with_max_steps(4);
    let (result, _) = run_collecting(&model, &tools, config).await;

    let trajectory = &result.metrics.trajectory;
    assert_eq!(result.outcome, RunOutcome::StepLimitExceeded);
    assert_eq!(trajectory.count(SnapshotKind::Inference), 4);
    assert_eq!(trajectory.count(SnapshotKind::Compression), 1);

    let records = trajectory.export();
    assert_eq!(records.len(), 5);
    let steps: Vec<usize> = records.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![0, 1, 2, 3, 3]);
    // The compression snapshot shows the drop before the next inference.
    assert!(records[3].buffer_length < records[2].buffer_length);
    assert_eq!(records[3].cumulative_compressions, 1);
    assert_eq!(records[2].cumulative_compressions, 0);
}

#[tokio::test]
async fn compression_abandons_the_rest_of_the_batch() {
    let calls = leak_counter();
    let model = Scripted::new(vec![
        act(vec![start("s1", "A")]),
        act(vec![inspect("p1"), complete("c1", "success", "enough"), inspect("p2")]),
        done(),
    ]);
    let tools = focus_tools(calls);
    let (result, reports) = run_collecting(&model, &tools, focus_config()).await;

    assert!(result.success);
    assert_eq!(reports.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.metrics.action_calls, 3);

    let seen = model.seen();
    let after = &seen[2];
    assert!(!after.iter().any(|t| t.result_of.is_some()));
    assert_eq!(after.len(), 3);
}

#[tokio::test]
async fn completion_marker_skips_pending_actions() {
    let calls = leak_counter();
    let model = Scripted::new(vec![Ok(Completion {
        text: "TASK_COMPLETE".into(),
        actions: vec![inspect("p1")],
        ..Default::default()
    })]);
    let tools = focus_tools(calls);
    let (result, _) = run_collecting(&model, &tools, focus_config()).await;

    assert!(result.success);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.metrics.action_calls, 0);
}

#[tokio::test]
async fn reminder_fires_until_compression() {
    let model = Scripted::new(vec![
        act(vec![start("s1", "A")]),
        act(vec![inspect("p1"), inspect("p2")]),
        act(vec![inspect("p3")]),
        act(vec![inspect("p4")]),
        act(vec![complete("c1", "success", "ok")]),
        act(vec![inspect("p5")]),
        done(),
    ]);
    let tools = focus_tools(leak_counter());
    let config = RunConfig::focus("test/model").with_focus_reminder_after(Some(3));
    let (result, _) = run_collecting(&model, &tools, config).await;
    assert!(result.success);

    let seen = model.seen();
    let last_text = |i: usize| seen[i].last().unwrap().text.clone();
    assert_ne!(last_text(2), FOCUS_REMINDER);
    assert_eq!(last_text(3), FOCUS_REMINDER);
    assert_eq!(last_text(4), FOCUS_REMINDER);
    assert!(last_text(5).starts_with("Focus completed: A"));
    assert_ne!(last_text(6), FOCUS_REMINDER);

    // The reminder comes after the batch's results, never inside it.
    let reminded = &seen[3];
    let at = reminded.len() - 1;
    assert_eq!(reminded[at - 1].result_of.as_deref(), Some("p3"));
}

#[tokio::test]
async fn baseline_never_reminds_or_compresses() {
    let calls = leak_counter();
    let model = Scripted::new(vec![
        act(vec![inspect("p1"), inspect("p2"), inspect("p3")]),
        act(vec![complete("c1", "success", "x")]),
        done(),
    ]);
    let tools = ToolSet::new().with(inspect_tool(calls));
    let config = RunConfig::baseline("test/model").with_focus_reminder_after(Some(1));
    let (result, reports) = run_collecting(&model, &tools, config).await;

    assert!(result.success);
    assert!(reports.is_empty());
    let seen = model.seen();
    assert_eq!(seen[1].last().unwrap().result_of.as_deref(), Some("p3"));
    assert_eq!(
        seen[2].last().unwrap().text,
        "Error: unknown tool 'complete_focus'"
    );
}

#[tokio::test]
async fn baseline_strategy_refuses_registered_focus_tools() {
    let model = Scripted::new(vec![act(vec![start("s1", "A")]), done()]);
    let tools = focus_tools(leak_counter());
    let result = RunLoop::new(&model, &tools, focus_config())
        .with_strategy(Baseline)
        .run("task", Path::new("/w"))
        .await;

    assert!(result.success);
    assert_eq!(
        model.seen()[1].last().unwrap().text,
        "Error: Focus tools are not available in this run."
    );
    assert_eq!(result.metrics.active_focuses, 0);
}

#[tokio::test]
async fn provider_failure_is_attributed_to_the_run() {
    let model = Scripted::new(vec![
        act(vec![inspect("p1")]),
        Err(ProviderError::Status {
            code: 401,
            body: "bad key".into(),
        }),
    ]);
    let tools = focus_tools(leak_counter());
    let (result, _) = run_collecting(&model, &tools, focus_config()).await;

    assert!(!result.success);
    assert_eq!(result.outcome, RunOutcome::ProviderFailed);
    assert_eq!(result.error.as_deref(), Some("API error 401: bad key"));
    assert_eq!(result.metrics.inference_calls, 1);
    assert_eq!(result.metrics.trajectory.len(), 1);
}

#[tokio::test]
async fn deadline_cancels_inference() {
    let tools = focus_tools(leak_counter());
    let config = focus_config().with_timeout(Duration::from_millis(50));
    let (result, _) = run_collecting(&Hanging, &tools, config).await;

    assert!(!result.success);
    assert_eq!(result.outcome, RunOutcome::TimedOut);
    assert_eq!(result.error.as_deref(), Some("timeout after 0.05s"));
    assert_eq!(result.metrics.inference_calls, 0);
    assert!(result.metrics.wall_clock_secs < 5.0);
}

#[tokio::test]
async fn deadline_cancels_tool_calls() {
    #[derive(Deserialize, JsonSchema)]
    struct Empty {}

    let model = Scripted::new(vec![act(vec![ActionRequest::new("w1", "wait", "{}")])]);
    let tools = ToolSet::new().with(FnTool::new(
        ToolDef::new("wait", "Wait a long time", json_schema_for::<Empty>()),
        |_: Empty| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("waited".to_string())
        },
    ));
    let config = RunConfig::baseline("test/model").with_timeout(Duration::from_millis(100));
    let (result, _) = run_collecting(&model, &tools, config).await;

    assert_eq!(result.outcome, RunOutcome::TimedOut);
    assert_eq!(result.metrics.inference_calls, 1);
    assert_eq!(result.metrics.action_calls, 0);
}

#[tokio::test]
async fn token_counters_and_cost_accumulate() {
    let model = Scripted::new(vec![act(vec![inspect("p1")]), done()]);
    let tools = focus_tools(leak_counter());
    let config = RunConfig::focus("anthropic/claude-haiku-4.5");
    let (result, _) = run_collecting(&model, &tools, config).await;

    assert_eq!(result.metrics.input_tokens, 200);
    assert_eq!(result.metrics.output_tokens, 30);
    let records = result.metrics.trajectory.export();
    assert_eq!(records[0].cumulative_tokens, 110);
    assert_eq!(records[1].cumulative_tokens, 230);
    assert!(result.metrics.estimated_cost_usd > 0.0);
    assert!(result.trace_id.starts_with("tr-"));
}

// ── Randomized pairing property ────────────────────────────────────

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_script(rng: &mut Lcg, steps: usize) -> Vec<Result<Completion, ProviderError>> {
    let outcomes = ["success", "partial", "blocked", "abandoned"];
    (0..steps)
        .map(|step| {
            let count = 1 + rng.below(3) as usize;
            let actions = (0..count)
                .map(|k| {
                    let id = format!("c{step}_{k}");
                    match rng.below(10) {
                        0..=2 => start(&id, &format!("f{step}")),
                        3..=4 => {
                            let outcome = outcomes[rng.below(4) as usize];
                            complete(&id, outcome, &format!("learned at {step}"))
                        }
                        _ => inspect(&id),
                    }
                })
                .collect();
            if rng.below(12) == 0 {
                Ok(Completion::text("hmm").usage(10, 1))
            } else {
                act(actions)
            }
        })
        .collect()
}

#[tokio::test]
async fn random_runs_keep_every_invariant() {
    let mut rng = Lcg(0x5eed);
    for _ in 0..150 {
        let steps = 5 + rng.below(30) as usize;
        let model = Scripted::new(random_script(&mut rng, steps));
        let tools = focus_tools(leak_counter());
        let config = focus_config().with_max_steps(steps);
        let (result, reports) = run_collecting(&model, &tools, config).await;

        // Every buffer the model saw was checked by `Scripted::infer`.
        assert_eq!(model.seen().len(), steps);
        assert_eq!(result.outcome, RunOutcome::StepLimitExceeded);

        for report in &reports {
            assert!(report.safe_index >= 2);
            assert!(report.safe_index <= report.candidate);
        }

        let records = result.metrics.trajectory.export();
        for pair in records.windows(2) {
            let delta = pair[1].cumulative_compressions - pair[0].cumulative_compressions;
            assert!(delta <= 1);
        }
        assert_eq!(result.metrics.compressions, reports.len());
        assert_eq!(
            result.metrics.trajectory.count(SnapshotKind::Compression),
            reports.len()
        );
        assert_eq!(
            records.last().map_or(0, |r| r.cumulative_compressions),
            reports.len()
        );
        assert!(result.metrics.final_buffer_len >= 2);
    }
}
