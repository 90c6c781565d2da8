//! Convenience re-exports for common `refocus` types.
//!
//! ```ignore
//! use refocus::prelude::*;
//! ```
//!
//! Pulls in what most programs need to run an agent: the inference client
//! and retry wrapper, [`RunLoop`] + [`RunConfig`], the [`Tool`] trait and
//! [`ToolSet`], event handlers, and the result types. The compression
//! internals (safe-truncation scan, pairing checker) are left out; import
//! those from [`crate::context`] directly.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ActionRequest, Role, ToolDef, Turn, json_schema_for};

// ── Inference ───────────────────────────────────────────────────────
pub use crate::api::{
    Completion, Inference, InferenceFuture, InferenceRequest, OpenRouterClient, RetryConfig,
    Retrying, TokenUsage,
};
pub use crate::error::{FocusError, ProviderError, WorkspaceError};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    CompositeEventHandler, ContextStrategy, EventHandler, EventObserver, FnEventHandler,
    LoggingHandler, NoopHandler, PoolConfig, RunConfig, RunEvent, RunLoop, StrategyKind, run_pool,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{ConversationBuffer, KnowledgeEntry, Outcome};

// ── Metrics ─────────────────────────────────────────────────────────
pub use crate::metrics::{RunMetrics, RunOutcome, RunResult, TrajectoryRecord};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::core::parse_tool_args;
pub use crate::tools::{FnTool, Tool, ToolFuture, ToolOutcome, ToolSet};

// ── Workspaces ──────────────────────────────────────────────────────
pub use crate::workspace::{
    ExistingDir, PreparedWorkspace, ScratchCopy, WorkspaceProvider, prepare_blocking,
};
