//! Context strategies: how a run reacts to focus signals.
//!
//! The run loop is shared. The only thing that differs between the
//! baseline agent and the focus agent is what happens when a tool returns a
//! focus outcome, and that decision lives behind [`ContextStrategy`].

use super::config::StrategyKind;
use crate::context::{CompressionEngine, CompressionReport, ConversationBuffer, FocusMarker, Outcome};

/// A focus control request, borrowed from a
/// [`ToolOutcome`](crate::tools::ToolOutcome).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusSignal<'a> {
    Open {
        description: &'a str,
        goal: &'a str,
    },
    Close {
        outcome: Outcome,
        learnings: &'a str,
        next_action: Option<&'a str>,
    },
}

/// What the strategy did with a signal.
#[derive(Debug, Clone)]
pub enum SignalReaction {
    /// A focus was opened; the buffer is untouched.
    Opened { marker: FocusMarker, depth: usize },
    /// The buffer was compressed. The batch must not continue.
    Compressed(CompressionReport),
    /// The signal was refused; the message becomes a failed tool result.
    Rejected(String),
}

/// Reaction to focus signals, selected when the run loop is built.
pub trait ContextStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// React to a focus signal. Only [`SignalReaction::Compressed`] may
    /// have mutated `buffer`.
    fn on_signal(
        &mut self,
        buffer: &mut ConversationBuffer,
        signal: FocusSignal<'_>,
    ) -> SignalReaction;

    fn knowledge_entries(&self) -> usize {
        0
    }

    fn active_focuses(&self) -> usize {
        0
    }
}

/// Build the stock strategy for `kind`.
pub fn strategy_for(kind: StrategyKind) -> Box<dyn ContextStrategy> {
    match kind {
        StrategyKind::Baseline => Box::new(Baseline),
        StrategyKind::Focus => Box::new(Focus::new()),
    }
}

// ── Baseline ───────────────────────────────────────────────────────

/// The buffer only grows. Focus signals are refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct Baseline;

impl ContextStrategy for Baseline {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Baseline
    }

    fn on_signal(&mut self, _: &mut ConversationBuffer, _: FocusSignal<'_>) -> SignalReaction {
        SignalReaction::Rejected("Focus tools are not available in this run.".to_string())
    }
}

// ── Focus ──────────────────────────────────────────────────────────

/// Opens and closes focuses on a [`CompressionEngine`].
#[derive(Debug, Default)]
pub struct Focus {
    engine: CompressionEngine,
}

impl Focus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine(&self) -> &CompressionEngine {
        &self.engine
    }
}

impl ContextStrategy for Focus {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Focus
    }

    fn on_signal(
        &mut self,
        buffer: &mut ConversationBuffer,
        signal: FocusSignal<'_>,
    ) -> SignalReaction {
        match signal {
            FocusSignal::Open { description, goal } => {
                let marker = self.engine.open_focus(buffer, description, goal);
                SignalReaction::Opened {
                    marker,
                    depth: self.engine.stack().depth(),
                }
            }
            FocusSignal::Close {
                outcome,
                learnings,
                next_action,
            } => match self.engine.complete_focus(buffer, outcome, learnings, next_action) {
                Ok(report) => SignalReaction::Compressed(report),
                Err(e) => SignalReaction::Rejected(e.to_string()),
            },
        }
    }

    fn knowledge_entries(&self) -> usize {
        self.engine.ledger().len()
    }

    fn active_focuses(&self) -> usize {
        self.engine.stack().depth()
    }
}
