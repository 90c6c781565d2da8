//! The step loop shared by every strategy.
//!
//! Each step sends the whole buffer to the inference collaborator, appends
//! the response, samples the trajectory and then either finishes (the
//! response contains the completion marker), nudges (no actions), or
//! dispatches the requested actions in order. A focus signal is handed to
//! the run's [`ContextStrategy`]; when it compresses, the rest of the batch
//! is dropped because its call ids no longer have an assistant turn to
//! pair with.
//!
//! [`RunLoop::run`] always returns a [`RunResult`]. Provider failures,
//! deadline expiry and step-limit exhaustion are all reported through it.

use super::config::{RunConfig, StrategyKind};
use super::events::{EventHandler, NoopHandler, RunEvent};
use super::prompt::{FOCUS_REMINDER, NUDGE, focus_started, system_prompt};
use super::strategy::{ContextStrategy, FocusSignal, SignalReaction, strategy_for};
use crate::Turn;
use crate::api::tracing::{cost_usd, generate_span_id, generate_trace_id};
use crate::api::{Completion, Inference, InferenceRequest, TokenUsage};
use crate::context::ConversationBuffer;
use crate::error::ProviderError;
use crate::metrics::{RunMetrics, RunOutcome, RunResult, SnapshotKind, TrajectoryRecorder};
use crate::tools::{ToolOutcome, ToolSet};
use crate::tools::core::result_text;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Final text of a run that ran out of steps.
pub const STEP_LIMIT_TEXT: &str = "Max steps reached without completing task.";

/// Error string of a run that ran out of steps.
pub const STEP_LIMIT_ERROR: &str = "max_steps_exceeded";

/// Drives one agent over one task.
///
/// # Example
///
/// ```ignore
/// let tools = config.build_tool_set(&workdir);
/// let result = RunLoop::new(&client, &tools, config)
///     .with_event_handler(&LoggingHandler)
///     .run(task, &workdir)
///     .await;
/// println!("{} in {} steps", result.outcome, result.metrics.inference_calls);
/// ```
pub struct RunLoop<'a> {
    inference: &'a dyn Inference,
    tools: &'a ToolSet,
    config: RunConfig,
    strategy: Box<dyn ContextStrategy>,
    event_handler: &'a dyn EventHandler,
}

impl<'a> RunLoop<'a> {
    /// Build a run loop with the stock strategy for `config.strategy`.
    pub fn new(inference: &'a dyn Inference, tools: &'a ToolSet, config: RunConfig) -> Self {
        Self {
            inference,
            tools,
            strategy: strategy_for(config.strategy),
            config,
            event_handler: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Replace the strategy chosen from the config.
    pub fn with_strategy(mut self, strategy: impl ContextStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Run `task` against the workspace at `workspace` until it completes,
    /// fails or runs out of steps or time.
    pub async fn run(mut self, task: &str, workspace: &Path) -> RunResult {
        let trace_id = generate_trace_id();
        let deadline = self.config.timeout.map(|d| Instant::now() + d);
        let kind = self.strategy.kind();
        let system = self.config.system_prompt.clone().unwrap_or_else(|| {
            system_prompt(kind, workspace, &self.config.completion_marker)
        });

        info!(
            "Run started: trace_id={}, strategy={}, model={}, max_steps={}",
            trace_id, kind, self.config.model, self.config.max_steps
        );
        self.event_handler.on_event(&RunEvent::RunStarted {
            trace_id: &trace_id,
            strategy: kind.as_str(),
            model: &self.config.model,
        });

        let mut state = RunState::new(system, task);
        let exit = self.drive(&mut state, &trace_id, deadline).await;
        self.finish(state, exit, trace_id)
    }

    async fn drive(&mut self, state: &mut RunState, trace_id: &str, deadline: Option<Instant>) -> Exit {
        let tool_defs = self.tools.definitions();

        for step in 0..self.config.max_steps {
            self.event_handler.on_event(&RunEvent::StepStarted {
                step,
                max_steps: self.config.max_steps,
                buffer_len: state.buffer.len(),
            });
            debug!(
                "[{}] buffer={} turns, ~{} chars",
                generate_span_id(trace_id, step),
                state.buffer.len(),
                state.buffer.char_len()
            );

            let request = InferenceRequest {
                model: &self.config.model,
                turns: state.buffer.turns(),
                tools: &tool_defs,
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };
            let completion = match within(deadline, self.inference.infer(request)).await {
                None => return Exit::TimedOut,
                Some(Err(e)) => return Exit::ProviderFailed(e),
                Some(Ok(completion)) => completion,
            };

            let Completion {
                text,
                actions,
                usage,
            } = completion;
            state.record_usage(usage.input_tokens, usage.output_tokens);
            self.event_handler.on_event(&RunEvent::TokenUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            });

            state.buffer.push(Turn::assistant(text.clone(), actions.clone()));
            state.sample(step, SnapshotKind::Inference);

            if !text.is_empty() {
                self.event_handler.on_event(&RunEvent::Text(&text));
            }

            if text.contains(self.config.completion_marker.as_str()) {
                if !actions.is_empty() {
                    debug!(
                        "Completion marker with {} pending action(s); not dispatching",
                        actions.len()
                    );
                }
                return Exit::Completed(text);
            }

            if actions.is_empty() {
                state.buffer.push(Turn::user(NUDGE));
                self.event_handler.on_event(&RunEvent::NudgeInjected { step });
                continue;
            }

            self.event_handler.on_event(&RunEvent::ActionsReceived {
                step,
                count: actions.len(),
            });

            let mut compressed = false;
            for action in &actions {
                self.event_handler.on_event(&RunEvent::ActionExecuting {
                    name: &action.name,
                    arguments: &action.arguments,
                });
                let Some(outcome) =
                    within(deadline, self.tools.execute(&action.name, &action.arguments)).await
                else {
                    return Exit::TimedOut;
                };
                state.metrics.action_calls += 1;

                let reaction = match outcome {
                    ToolOutcome::Ordinary(result) => {
                        state.calls_since_compression += 1;
                        Reaction::Reply(result)
                    }
                    ToolOutcome::FocusOpened { description, goal } => self.react(
                        state,
                        FocusSignal::Open {
                            description: &description,
                            goal: &goal,
                        },
                    ),
                    ToolOutcome::FocusClosed {
                        outcome,
                        learnings,
                        next_action,
                    } => self.react(
                        state,
                        FocusSignal::Close {
                            outcome,
                            learnings: &learnings,
                            next_action: next_action.as_deref(),
                        },
                    ),
                };
                let Reaction::Reply(reply) = reaction else {
                    compressed = true;
                    break;
                };

                let text = result_text(&reply);
                trace!("Result for {} ({}): {} bytes", action.name, action.id, text.len());
                self.event_handler.on_event(&RunEvent::ActionResult {
                    name: &action.name,
                    call_id: &action.id,
                    result: &text,
                });
                state.buffer.push(Turn::tool_result(action.id.as_str(), text));
            }

            if !compressed && self.reminder_due(state.calls_since_compression) {
                state.buffer.push(Turn::user(FOCUS_REMINDER));
                self.event_handler.on_event(&RunEvent::ReminderInjected {
                    calls_since_compression: state.calls_since_compression,
                });
            }
        }

        Exit::StepLimit
    }

    /// Hand a focus signal to the strategy and account for what it did.
    fn react(&mut self, state: &mut RunState, signal: FocusSignal<'_>) -> Reaction {
        match self.strategy.on_signal(&mut state.buffer, signal) {
            SignalReaction::Opened { marker, depth } => {
                self.event_handler.on_event(&RunEvent::FocusOpened {
                    marker: &marker,
                    depth,
                });
                Reaction::Reply(Ok(focus_started(&marker.description, &marker.goal)))
            }
            SignalReaction::Rejected(reason) => {
                self.event_handler
                    .on_event(&RunEvent::FocusRejected { reason: &reason });
                Reaction::Reply(Err(reason))
            }
            SignalReaction::Compressed(report) => {
                state.metrics.compressions += 1;
                state.metrics.turns_discarded += report.discarded;
                state.calls_since_compression = 0;
                let at = state.metrics.inference_calls;
                state.sample(at, SnapshotKind::Compression);
                self.event_handler
                    .on_event(&RunEvent::FocusCompressed { report: &report });
                Reaction::Compressed
            }
        }
    }

    fn reminder_due(&self, calls_since_compression: usize) -> bool {
        self.strategy.kind() == StrategyKind::Focus
            && self
                .config
                .focus_reminder_after
                .is_some_and(|n| calls_since_compression >= n)
    }

    fn finish(self, state: RunState, exit: Exit, trace_id: String) -> RunResult {
        let RunState {
            buffer,
            mut metrics,
            recorder,
            ..
        } = state;
        metrics.wall_clock_secs = recorder.elapsed_secs();
        metrics.knowledge_entries = self.strategy.knowledge_entries();
        metrics.active_focuses = self.strategy.active_focuses();
        metrics.final_buffer_len = buffer.len();
        metrics.estimated_cost_usd = cost_usd(
            &self.config.model,
            TokenUsage {
                input_tokens: metrics.input_tokens,
                output_tokens: metrics.output_tokens,
            },
        );

        let (outcome, final_text, error) = match exit {
            Exit::Completed(text) => (RunOutcome::Completed, text, None),
            Exit::StepLimit => (
                RunOutcome::StepLimitExceeded,
                STEP_LIMIT_TEXT.to_string(),
                Some(STEP_LIMIT_ERROR.to_string()),
            ),
            Exit::TimedOut => {
                let secs = self.config.timeout.unwrap_or(Duration::ZERO).as_secs_f64();
                warn!("Run {trace_id} timed out after {secs}s");
                (RunOutcome::TimedOut, String::new(), Some(format!("timeout after {secs}s")))
            }
            Exit::ProviderFailed(e) => {
                self.event_handler
                    .on_event(&RunEvent::ProviderFailed { error: &e });
                (RunOutcome::ProviderFailed, String::new(), Some(e.to_string()))
            }
        };

        if metrics.active_focuses > 0 {
            debug!("{} focus(es) still open at run end", metrics.active_focuses);
        }
        info!(
            "Run finished: trace_id={}, outcome={}, steps={}, compressions={}, buffer={}, \
             tokens={}, est. cost=${:.4}",
            trace_id,
            outcome,
            metrics.inference_calls,
            metrics.compressions,
            metrics.final_buffer_len,
            metrics.total_tokens(),
            metrics.estimated_cost_usd
        );
        self.event_handler.on_event(&RunEvent::Finished {
            outcome,
            steps: metrics.inference_calls,
            trace_id: &trace_id,
        });

        RunResult {
            success: outcome == RunOutcome::Completed,
            final_text,
            outcome,
            error,
            trace_id,
            metrics,
        }
    }
}

// ── Run state ──────────────────────────────────────────────────────

/// What dispatching one action produced.
enum Reaction {
    /// Append this as the action's tool result.
    Reply(Result<String, String>),
    /// The buffer was rewritten; drop the rest of the batch.
    Compressed,
}

/// How the step loop ended.
enum Exit {
    Completed(String),
    StepLimit,
    TimedOut,
    ProviderFailed(ProviderError),
}

/// Everything a single run owns and mutates.
struct RunState {
    buffer: ConversationBuffer,
    metrics: RunMetrics,
    recorder: TrajectoryRecorder,
    /// Ordinary tool calls since the last compression.
    calls_since_compression: usize,
}

impl RunState {
    fn new(system: String, task: &str) -> Self {
        Self {
            buffer: ConversationBuffer::new(system, task),
            metrics: RunMetrics::default(),
            recorder: TrajectoryRecorder::start(),
            calls_since_compression: 0,
        }
    }

    fn record_usage(&mut self, input_tokens: u64, output_tokens: u64) {
        self.metrics.inference_calls += 1;
        self.metrics.input_tokens += input_tokens;
        self.metrics.output_tokens += output_tokens;
    }

    fn sample(&mut self, step: usize, kind: SnapshotKind) {
        self.recorder
            .sample(&mut self.metrics, step, self.buffer.len(), kind);
    }
}

/// Await `fut`, giving up at `deadline`. `None` means the deadline passed.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}
