//! The `start_focus` and `complete_focus` control tools.
//!
//! Both are ordinary tools from the dispatcher's point of view. Their
//! outcomes are the [`ToolOutcome::FocusOpened`] and
//! [`ToolOutcome::FocusClosed`] variants; what happens next is up to the
//! run's context strategy.

use super::core::{Tool, ToolFuture, ToolOutcome, ToolSet, parse_tool_args};
use crate::context::knowledge::Outcome;
use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;

pub const START_FOCUS: &str = "start_focus";
pub const COMPLETE_FOCUS: &str = "complete_focus";

/// Whether `name` is one of the focus control tools.
pub fn is_focus_tool(name: &str) -> bool {
    name == START_FOCUS || name == COMPLETE_FOCUS
}

// ── start_focus ────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct StartFocusArgs {
    /// What you're about to focus on (e.g., 'Investigate config loading').
    pub description: String,
    /// The specific goal of this focus (e.g., 'Find where API keys are loaded').
    pub goal: String,
}

pub struct StartFocus;

impl Tool for StartFocus {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            START_FOCUS,
            "Declare what you're about to focus on investigating or implementing. \
             Use this BEFORE starting a distinct line of work: exploring a new part \
             of the codebase, implementing a specific change, or investigating a bug. \
             Pair every start_focus with a later complete_focus.",
            json_schema_for::<StartFocusArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<StartFocusArgs>(arguments);
        Box::pin(async move {
            match parsed {
                Ok(args) => ToolOutcome::FocusOpened {
                    description: args.description,
                    goal: args.goal,
                },
                Err(e) => ToolOutcome::err(e),
            }
        })
    }
}

// ── complete_focus ─────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct CompleteFocusArgs {
    /// How this focus concluded.
    pub outcome: Outcome,
    /// Key learnings to preserve (be specific: file paths, function names).
    pub learnings: String,
    /// What to do next (optional).
    #[serde(default)]
    pub next_action: Option<String>,
}

pub struct CompleteFocus;

impl Tool for CompleteFocus {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            COMPLETE_FOCUS,
            "Complete your current focus and capture what you learned. This saves \
             your learnings to the persistent KNOWLEDGE section, clears the detailed \
             work from context and lets you continue fresh. Outcomes: success \
             (achieved the goal), partial (made progress), blocked (could not \
             proceed), abandoned (path not worth pursuing).",
            json_schema_for::<CompleteFocusArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<CompleteFocusArgs>(arguments);
        Box::pin(async move {
            match parsed {
                Ok(args) => ToolOutcome::FocusClosed {
                    outcome: args.outcome,
                    learnings: args.learnings,
                    next_action: args.next_action.filter(|s| !s.trim().is_empty()),
                },
                Err(e) => ToolOutcome::err(e),
            }
        })
    }
}

impl ToolSet {
    /// Register `start_focus` and `complete_focus`.
    pub fn with_focus_tools(self) -> Self {
        self.with(StartFocus).with(CompleteFocus)
    }
}
