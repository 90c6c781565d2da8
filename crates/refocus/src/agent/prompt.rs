//! System prompts and the synthetic user turns the run loop injects.

use super::config::StrategyKind;
use std::path::Path;

/// Appended when a response has neither actions nor the completion marker.
pub const NUDGE: &str = "Continue working on the task. Use tools to make progress.";

/// Appended when the model has gone too long without compressing.
pub const FOCUS_REMINDER: &str = "REMINDER: You should call `complete_focus` to compress your \
context and preserve learnings.\n\
Your context is growing large. Summarize what you've learned so far and call complete_focus with:\n\
- outcome: \"success\", \"partial\", \"blocked\", or \"abandoned\"\n\
- learnings: Key facts discovered (file paths, function names, root cause, etc.)\n\
- next_action: What to do next\n\n\
Then call start_focus for your next phase of work.";

const PREAMBLE: &str =
    "You are an expert software engineer. Your task is to solve the following problem.";

const FOCUS_TOOLS: &str = "You have access to `start_focus` and `complete_focus` tools:\n\n\
- **start_focus**: Use when beginning a distinct line of investigation or implementation.\n\
- **complete_focus**: Use when you've finished investigating something. This saves your key \
learnings to persistent knowledge, compresses your detailed work (you keep the learnings) and \
gives you a fresh context for the next focus.\n\n\
Use these especially when exploring unfamiliar parts of the codebase, trying approaches that \
might not work out, or working on multi-step tasks with distinct phases.";

/// Builder for multi-section system prompts.
///
/// Sections are joined with blank lines; empty sections are skipped.
///
/// ```
/// use refocus::agent::prompt::SystemPromptBuilder;
///
/// let prompt = SystemPromptBuilder::new("You are an agent.")
///     .section("Workspace", "/tmp/w")
///     .section_if(false, "Hidden", || "never".into())
///     .build();
///
/// assert!(prompt.contains("## Workspace\n\n/tmp/w"));
/// assert!(!prompt.contains("Hidden"));
/// ```
pub struct SystemPromptBuilder {
    sections: Vec<String>,
}

impl SystemPromptBuilder {
    /// Start with an unheaded preamble.
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            sections: vec![preamble.into()],
        }
    }

    /// Append a `## heading` section. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.sections.push(format!("## {heading}\n\n{content}"));
        }
        self
    }

    /// Append a section only when `condition` holds. `content` is lazy.
    pub fn section_if(
        self,
        condition: bool,
        heading: &str,
        content: impl FnOnce() -> String,
    ) -> Self {
        if condition {
            self.section(heading, content())
        } else {
            self
        }
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

/// Default system prompt for `strategy`, working in `workspace`.
pub fn system_prompt(strategy: StrategyKind, workspace: &Path, completion_marker: &str) -> String {
    SystemPromptBuilder::new(PREAMBLE)
        .section("Workspace", workspace.display().to_string())
        .section_if(
            strategy == StrategyKind::Focus,
            "Tools for Organizing Your Work",
            || FOCUS_TOOLS.to_string(),
        )
        .section(
            "Completing the Task",
            format!(
                "When you're done with the entire task, respond with {completion_marker} \
                 and a summary of what you did."
            ),
        )
        .build()
}

/// Tool-result text for a successful `start_focus`.
pub fn focus_started(description: &str, goal: &str) -> String {
    format!("Focus started: {description}\nGoal: {goal}\n\nProceeding with investigation...")
}
