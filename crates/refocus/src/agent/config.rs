//! Configuration types for a [`RunLoop`](super::run_loop::RunLoop) and
//! the worker pool.
//!
//! Nothing in the library reads the environment. Callers build a
//! [`RunConfig`] explicitly, either from a preset or field by field:
//!
//! ```ignore
//! let config = RunConfig::focus("anthropic/claude-haiku-4.5")
//!     .with_max_steps(100)
//!     .with_timeout(Duration::from_secs(1800));
//!
//! let config = RunConfig {
//!     focus_reminder_after: Some(25),
//!     ..RunConfig::focus("anthropic/claude-haiku-4.5")
//! };
//! ```

use crate::tools::ToolSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Text that marks a response as the final answer.
pub const DEFAULT_COMPLETION_MARKER: &str = "TASK_COMPLETE";

/// Ordinary tool calls since the last compression before a reminder.
pub const DEFAULT_FOCUS_REMINDER_AFTER: usize = 15;

/// Default timeout applied to each tool call by [`RunConfig::build_tool_set`].
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

// ── StrategyKind ──────────────────────────────────────────────────

/// Which context strategy a run uses.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// The buffer only grows.
    Baseline,
    /// `start_focus` / `complete_focus` drive compression.
    #[default]
    Focus,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Baseline => "baseline",
            StrategyKind::Focus => "focus",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── RunConfig ─────────────────────────────────────────────────────

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Model identifier (e.g. `"anthropic/claude-haiku-4.5"`).
    pub model: String,
    pub strategy: StrategyKind,
    /// Inference calls before the run ends as step-limit exhausted.
    pub max_steps: usize,
    /// Maximum tokens per model response.
    pub max_tokens: u32,
    pub temperature: f32,
    /// A response whose text contains this ends the run successfully.
    pub completion_marker: String,
    /// Inject a focus reminder after this many ordinary tool calls without
    /// a compression. Only honored by the focus strategy.
    pub focus_reminder_after: Option<usize>,
    /// Wall-clock deadline for the whole run.
    pub timeout: Option<Duration>,
    /// Replaces the strategy's default system prompt.
    pub system_prompt: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            strategy: StrategyKind::Baseline,
            max_steps: 200,
            max_tokens: 4096,
            temperature: 0.0,
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
            focus_reminder_after: None,
            timeout: None,
            system_prompt: None,
        }
    }
}

impl RunConfig {
    /// Baseline preset: no compression, no reminders.
    pub fn baseline(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Focus preset: focus tools enabled with the default reminder.
    pub fn focus(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            strategy: StrategyKind::Focus,
            focus_reminder_after: Some(DEFAULT_FOCUS_REMINDER_AFTER),
            ..Default::default()
        }
    }

    /// Preset for `strategy`.
    pub fn for_strategy(strategy: StrategyKind, model: impl Into<String>) -> Self {
        match strategy {
            StrategyKind::Baseline => Self::baseline(model),
            StrategyKind::Focus => Self::focus(model),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = marker.into();
        self
    }

    /// Set the reminder threshold. `None` disables reminders.
    pub fn with_focus_reminder_after(mut self, calls: Option<usize>) -> Self {
        self.focus_reminder_after = calls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// The standard tool set for this configuration: workspace tools rooted
    /// at `workdir`, plus the focus tools when the strategy uses them.
    pub fn build_tool_set(&self, workdir: impl AsRef<Path>) -> ToolSet {
        ToolSet::new()
            .with_arg_validation(true)
            .with_default_timeout(Some(DEFAULT_TOOL_TIMEOUT))
            .with_workspace_tools(workdir.as_ref())
            .with_focus_tools_if(self.strategy == StrategyKind::Focus)
    }
}

impl ToolSet {
    fn with_focus_tools_if(self, enabled: bool) -> Self {
        if enabled { self.with_focus_tools() } else { self }
    }
}

// ── PoolConfig ────────────────────────────────────────────────────

/// Configuration for [`run_pool`](super::pool::run_pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Jobs in flight at once. Values below 1 are treated as 1.
    pub concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl PoolConfig {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self { concurrency }
    }
}
