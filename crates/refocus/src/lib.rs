//! Bounded conversation buffers with focus-based compression for
//! long-horizon coding agents.
//!
//! `refocus` runs an LLM agent step by step against a task and lets the
//! agent mark the boundaries of its own sub-tasks. When a sub-task (a
//! *focus*) completes, its transcript is discarded and only a distilled
//! learning survives, rendered into a persistent `KNOWLEDGE` preamble in
//! the system turn. Truncation always lands on a boundary that keeps every
//! action request paired with its results, so the compressed buffer stays
//! valid for tool-augmented chat protocols.
//!
//! # Getting started
//!
//! ```ignore
//! use refocus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ProviderError> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let client = Retrying::new(OpenRouterClient::new(api_key)?, RetryConfig::with_retries(3));
//!
//!     let config = RunConfig::focus("anthropic/claude-haiku-4.5").with_max_steps(100);
//!     let tools = config.build_tool_set("/path/to/workdir");
//!
//!     let result = RunLoop::new(&client, &tools, config)
//!         .with_event_handler(&LoggingHandler)
//!         .run("Fix the failing test in tests/parse.rs", "/path/to/workdir".as_ref())
//!         .await;
//!
//!     println!("success={} compressions={}", result.success, result.metrics.compressions);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **The compression protocol:** [`context::buffer`] (the conversation
//!   buffer and the tool-pairing checker), [`context::focus`] (the focus
//!   stack), [`context::knowledge`] (the knowledge ledger and its preamble),
//!   and [`context::compression`] (safe truncation and the engine itself).
//! - **Running an agent:** [`RunLoop`](agent::run_loop::RunLoop) with a
//!   [`RunConfig`](agent::config::RunConfig). The context strategy
//!   (baseline or focus) is chosen at construction, see [`agent::strategy`].
//! - **Observing a run:** implement [`EventHandler`](agent::events::EventHandler)
//!   or use [`LoggingHandler`](agent::events::LoggingHandler).
//! - **Metrics and trajectories:** [`metrics`] holds [`RunMetrics`](metrics::RunMetrics),
//!   the sawtooth [`Trajectory`](metrics::Trajectory) and the exported
//!   [`TrajectoryRecord`](metrics::TrajectoryRecord) shape.
//! - **Many runs at once:** [`agent::pool`] runs independent jobs under a
//!   concurrency limit.
//! - **Collaborators:** [`api::Inference`] for the model, [`tools::Tool`] for
//!   actions, [`workspace::WorkspaceProvider`] for the filesystem root.

pub mod agent;
pub mod api;
pub mod context;
pub mod error;
pub mod metrics;
pub mod prelude;
pub mod tools;
pub mod workspace;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

/// Default model for agent runs.
pub const DEFAULT_MODEL: &str = "anthropic/claude-haiku-4.5";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Tool parameter schemas are derived from their
/// typed argument structs through this function.
///
/// ```
/// use refocus::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ReadArgs {
///     path: String,
/// }
///
/// let schema = json_schema_for::<ReadArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"path".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Conversation types ─────────────────────────────────────────────

/// Role of a turn in the conversation buffer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::ToolResult => write!(f, "tool-result"),
        }
    }
}

/// An action the model asked to run, as carried on an assistant turn.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ActionRequest {
    /// Provider-assigned call id. Paired with [`Turn::result_of`].
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Raw JSON arguments string.
    pub arguments: String,
}

impl ActionRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One entry in the conversation buffer.
///
/// `requested_actions` is only populated on assistant turns and `result_of`
/// only on tool-result turns. The constructors enforce that shape.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_actions: Vec<ActionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_of: Option<String>,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
            requested_actions: Vec::new(),
            result_of: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            requested_actions: Vec::new(),
            result_of: None,
        }
    }

    pub fn assistant(text: impl Into<String>, actions: Vec<ActionRequest>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            requested_actions: actions,
            result_of: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::ToolResult,
            text: text.into(),
            requested_actions: Vec::new(),
            result_of: Some(call_id.into()),
        }
    }

    /// Whether this is an assistant turn that opened a pairing group.
    pub fn has_requests(&self) -> bool {
        self.role == Role::Assistant && !self.requested_actions.is_empty()
    }
}

// ── Tool definition types ──────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the inference provider (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}
