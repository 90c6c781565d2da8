//! Tool abstraction and dispatch.
//!
//! The [`Tool`] trait defines the interface every tool implements: a static
//! API definition (name, description, JSON schema) and an async `execute`
//! method returning a [`ToolOutcome`]. Tools are collected into a
//! [`ToolSet`] which handles dispatch, validation, timeouts and result
//! truncation.
//!
//! The outcome is a tagged union decided by the tool itself. Focus control
//! is carried in its own variants, so the run loop never has to parse
//! signals back out of free text.

use crate::ToolDef;
use crate::context::knowledge::Outcome;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolOutcome> + Send + 'a>>;

// ── ToolOutcome ────────────────────────────────────────────────────

/// Result of invoking a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// A regular result. `Err` carries a failure message shown to the model.
    Ordinary(Result<String, String>),
    /// Request to open a focus.
    FocusOpened { description: String, goal: String },
    /// Request to close the innermost focus and compress.
    FocusClosed {
        outcome: Outcome,
        learnings: String,
        next_action: Option<String>,
    },
}

impl ToolOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        ToolOutcome::Ordinary(Ok(output.into()))
    }

    pub fn err(message: impl Into<String>) -> Self {
        ToolOutcome::Ordinary(Err(message.into()))
    }

    /// Whether this outcome is a focus control signal.
    pub fn is_focus_signal(&self) -> bool {
        !matches!(self, ToolOutcome::Ordinary(_))
    }

    /// Whether this outcome asks for compression.
    pub fn is_compression_signal(&self) -> bool {
        matches!(self, ToolOutcome::FocusClosed { .. })
    }
}

/// Text of a tool-result turn for an ordinary result.
pub fn result_text(result: &Result<String, String>) -> String {
    match result {
        Ok(output) => output.clone(),
        Err(error) => format!("Error: {error}"),
    }
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool that an agent can invoke via function-calling.
///
/// # Example
///
/// ```ignore
/// struct ReadFile { root: PathBuf }
///
/// impl Tool for ReadFile {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute(&self, arguments: &str) -> ToolFuture<'_> {
///         let arguments = arguments.to_string();
///         Box::pin(async move {
///             let args: ReadArgs = match parse_tool_args(&arguments) {
///                 Ok(a) => a,
///                 Err(e) => return ToolOutcome::err(e),
///             };
///             // read the file
///             ToolOutcome::ok(contents)
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the inference provider.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Failures are returned as [`ToolOutcome::Ordinary`] errors rather
    /// than panics. The run loop hands them back to the model.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    /// The tool's name (delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name.clone()
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// A collection of tools that can be dispatched by name.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_max_result_bytes(15_000)
///     .with_workspace_tools("/path/to/workdir")
///     .with_focus_tools()
///     .with_arg_validation(true)
///     .with_default_timeout(Some(Duration::from_secs(120)));
///
/// let defs = tools.definitions();
/// ```
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    max_result_bytes: usize,
    /// Validate arguments against the tool's JSON Schema before execution.
    validate_args: bool,
    /// `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("max_result_bytes", &self.max_result_bytes)
            .field("validate_args", &self.validate_args)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: false,
            default_timeout: None,
        }
    }

    /// Set the maximum result size in bytes before truncation.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// Enable JSON Schema argument validation before tool execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Set a timeout applied to every tool call. `None` disables it.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn max_result_bytes(&self) -> usize {
        self.max_result_bytes
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register a tool only when `condition` holds.
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// Tool definitions for the inference request, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name.
    ///
    /// Unknown names and schema violations become failed outcomes so the
    /// model can correct itself. Ordinary output is truncated to
    /// `max_result_bytes`; focus signals pass through untouched.
    pub async fn execute(&self, name: &str, arguments: &str) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            warn!("Unknown tool requested: {name}");
            return ToolOutcome::err(format!("unknown tool '{name}'"));
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return ToolOutcome::err(error);
        }

        log_tool_call(name, arguments);
        let start = std::time::Instant::now();

        let outcome = match self.default_timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(arguments)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    ToolOutcome::err(format!(
                        "tool '{name}' timed out after {:.0} seconds. \
                         Consider breaking the task into smaller steps or using \
                         different arguments.",
                        limit.as_secs_f64(),
                    ))
                }
            },
            None => tool.execute(arguments).await,
        };

        debug!(
            "Tool {name} completed in {:.0}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        match outcome {
            ToolOutcome::Ordinary(result) => {
                let result = result
                    .map(|s| truncate_result(s, self.max_result_bytes))
                    .map_err(|e| truncate_result(e, self.max_result_bytes));
                trace!(
                    "Tool {name} result preview: {}",
                    preview(&result_text(&result), 300)
                );
                ToolOutcome::Ordinary(result)
            }
            signal => signal,
        }
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler =
    Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = ToolOutcome> + Send>> + Send + Sync>;

/// A closure-based tool that parses typed arguments and delegates to a
/// handler. Use it for stateless tools; tools with shared state implement
/// [`Tool`] on a struct.
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct GrepArgs { pattern: String }
///
/// let tool = FnTool::new(
///     ToolDef::new("grep", "Search files", json_schema_for::<GrepArgs>()),
///     |args: GrepArgs| async move { Ok(format!("searched for {}", args.pattern)) },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    /// Create a closure-based tool. Argument parse errors become failed
    /// outcomes without calling the handler.
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let erased = move |raw: String| -> Pin<Box<dyn Future<Output = ToolOutcome> + Send>> {
            match parse_tool_args::<A>(&raw) {
                Ok(args) => {
                    let fut = handler(args);
                    Box::pin(async move { ToolOutcome::Ordinary(fut.await) })
                }
                Err(e) => Box::pin(async move { ToolOutcome::err(e) }),
            }
        };

        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        (self.handler)(arguments.to_string())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate tool arguments against the tool's declared JSON Schema.
///
/// Returns `None` if valid, or `Some(message)` formatted for the model to
/// understand and self-correct.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "invalid JSON arguments for tool '{}': {e}. \
                 Please provide valid JSON matching the tool's parameter schema.",
                tool.name()
            ));
        }
    };

    let schema = tool.definition().function.parameters;

    // An invalid schema skips validation.
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return None;
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "argument validation failed for tool '{}':\n{}\n\
             Please fix the arguments and try again.",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at DEBUG level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    debug!(
        "[tool] {name}({}{})",
        preview(arguments, 120),
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a string to at most `max` bytes (on a char boundary), appending
/// a notice if trimmed.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let total = s.len();
    let mut out = s;
    out.truncate(cut);
    out.push_str(&format!("...\n[truncated: {total} bytes total]"));
    out
}

/// First `max_chars` characters of `s`.
pub fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Parse raw JSON arguments into a typed struct, with an error message
/// suitable for returning to the model.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments).map_err(|e| {
        format!(
            "invalid tool arguments: {e}. \
             Please provide valid JSON matching the tool's parameter schema."
        )
    })
}

// ── Tests ──────────────────────────────────────────────────────────
