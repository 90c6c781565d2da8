//! Progress events emitted by the [`RunLoop`](super::run_loop::RunLoop).
//!
//! The run loop never prints. Everything a human might want to watch, from
//! step start through tool dispatch to focus compression, flows through
//! [`RunEvent`] into an injected [`EventHandler`].
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or pooled runs where only the result matters |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`EventObserver`] | Same, for closures that capture a short-lived borrow |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::context::{CompressionReport, FocusMarker};
use crate::error::ProviderError;
use crate::metrics::RunOutcome;
use tracing::{debug, info, trace, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted during a run.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// A run is starting.
    RunStarted {
        trace_id: &'a str,
        strategy: &'a str,
        model: &'a str,
    },
    /// An inference step is starting.
    StepStarted {
        step: usize,
        max_steps: usize,
        buffer_len: usize,
    },
    /// The model returned text (may be alongside actions).
    Text(&'a str),
    /// The model requested actions this step.
    ActionsReceived { step: usize, count: usize },
    /// A single action is about to be dispatched.
    ActionExecuting { name: &'a str, arguments: &'a str },
    /// A tool-result turn was appended.
    ActionResult {
        name: &'a str,
        call_id: &'a str,
        result: &'a str,
    },
    /// Token usage reported for this step.
    TokenUsage {
        input_tokens: u64,
        output_tokens: u64,
    },
    /// A focus was opened.
    FocusOpened { marker: &'a FocusMarker, depth: usize },
    /// A focus was closed and the buffer compressed.
    FocusCompressed { report: &'a CompressionReport },
    /// `complete_focus` was called with no active focus.
    FocusRejected { reason: &'a str },
    /// The response had no actions and no completion marker.
    NudgeInjected { step: usize },
    /// Too many ordinary calls since the last compression.
    ReminderInjected { calls_since_compression: usize },
    /// The run ended.
    Finished {
        outcome: RunOutcome,
        steps: usize,
        trace_id: &'a str,
    },
    /// The inference collaborator failed; the run is over.
    ProviderFailed { error: &'a ProviderError },
}

/// Sink for [`RunEvent`]s.
///
/// The default implementation ignores everything.
///
/// # Example
///
/// ```ignore
/// struct Progress;
///
/// impl EventHandler for Progress {
///     fn on_event(&self, event: &RunEvent<'_>) {
///         if let RunEvent::FocusCompressed { report } = event {
///             println!("dropped {} turns", report.discarded);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &RunEvent<'_>) {
        let _ = event;
    }
}

impl<H: EventHandler + ?Sized> EventHandler for &H {
    fn on_event(&self, event: &RunEvent<'_>) {
        (**self).on_event(event);
    }
}

/// Discards every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let RunEvent::Text(text) = event {
///         println!("{text}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&RunEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&RunEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&RunEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent<'_>) {
        (self.0)(event);
    }
}

/// Borrowing variant of [`FnEventHandler`] for closures that capture local
/// state, such as a counter owned by the calling test.
pub struct EventObserver<'f> {
    f: Box<dyn Fn(&RunEvent<'_>) + Send + Sync + 'f>,
}

impl<'f> EventObserver<'f> {
    pub fn new(f: impl Fn(&RunEvent<'_>) + Send + Sync + 'f) -> Self {
        Self { f: Box::new(f) }
    }
}

impl EventHandler for EventObserver<'_> {
    fn on_event(&self, event: &RunEvent<'_>) {
        (self.f)(event);
    }
}

/// Dispatches each event to every inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(show_progress, ProgressPrinter);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &RunEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::RunStarted {
                trace_id,
                strategy,
                model,
            } => {
                info!("[{trace_id}] Run started: strategy={strategy}, model={model}");
            }
            RunEvent::StepStarted {
                step,
                max_steps,
                buffer_len,
            } => {
                debug!("[step {}/{}] buffer={} turns", step + 1, max_steps, buffer_len);
            }
            RunEvent::Text(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "LLM text: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            RunEvent::ActionsReceived { step, count } => {
                debug!("{count} action(s) in step {step}");
            }
            RunEvent::ActionExecuting { name, arguments } => {
                let preview: String = arguments.chars().take(120).collect();
                trace!("Executing {name}({preview})");
            }
            RunEvent::ActionResult { name, result, .. } => {
                debug!("Tool {name} result: {} bytes", result.len());
            }
            RunEvent::TokenUsage {
                input_tokens,
                output_tokens,
            } => {
                debug!("Tokens: input={input_tokens}, output={output_tokens}");
            }
            RunEvent::FocusOpened { marker, depth } => {
                info!(
                    "Focus opened: {} (anchor={}, depth={depth})",
                    marker.description, marker.anchor
                );
            }
            RunEvent::FocusCompressed { report } => {
                info!(
                    "Focus compressed: {} [{}] discarded={} buffer={} knowledge={}",
                    report.marker.description,
                    report.outcome,
                    report.discarded,
                    report.buffer_len,
                    report.knowledge_entries,
                );
            }
            RunEvent::FocusRejected { reason } => {
                warn!("complete_focus rejected: {reason}");
            }
            RunEvent::NudgeInjected { step } => {
                debug!("No actions at step {step}, nudging");
            }
            RunEvent::ReminderInjected {
                calls_since_compression,
            } => {
                info!("Focus reminder after {calls_since_compression} tool call(s)");
            }
            RunEvent::Finished {
                outcome,
                steps,
                trace_id,
            } => {
                info!("[{trace_id}] Run finished: {outcome} after {steps} step(s)");
            }
            RunEvent::ProviderFailed { error } => {
                warn!("Inference failed: {error}");
            }
        }
    }
}
