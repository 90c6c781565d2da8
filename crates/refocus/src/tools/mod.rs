//! Tools the agent can call, and the dispatcher that runs them.
//!
//! - [`core`]: the [`Tool`](core::Tool) trait, the
//!   [`ToolOutcome`](core::ToolOutcome) tagged union and the
//!   [`ToolSet`](core::ToolSet) dispatcher.
//! - [`focus`]: `start_focus` / `complete_focus`.
//! - [`workspace`]: file and shell tools rooted at the run's workspace.

pub mod core;
pub mod focus;
pub mod workspace;

pub use self::core::{FnTool, Tool, ToolFuture, ToolOutcome, ToolSet};
