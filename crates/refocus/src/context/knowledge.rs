//! The knowledge ledger and its system-prompt preamble.
//!
//! Completed focuses leave a [`KnowledgeEntry`] behind. The ledger renders
//! all entries, in insertion order, into a `## KNOWLEDGE` section that is
//! appended to the seeded system prompt after every compression.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Heading that delimits the preamble inside the system turn.
pub const KNOWLEDGE_MARKER: &str = "## KNOWLEDGE";

/// How a focus ended.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Blocked,
    Abandoned,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Success,
        Outcome::Partial,
        Outcome::Blocked,
        Outcome::Abandoned,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Blocked => "blocked",
            Outcome::Abandoned => "abandoned",
        }
    }

    /// Single-glyph badge used in the rendered preamble.
    pub fn badge(self) -> &'static str {
        match self {
            Outcome::Success => "✓",
            Outcome::Partial => "~",
            Outcome::Blocked => "✗",
            Outcome::Abandoned => "→",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Outcome::ALL
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("invalid outcome '{s}': expected one of success, partial, blocked, abandoned")
            })
    }
}

/// Distilled result of one completed focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeEntry {
    pub description: String,
    pub goal: String,
    pub outcome: Outcome,
    pub learnings: String,
}

/// Append-only list of knowledge entries.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeLedger {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: KnowledgeEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the preamble. Empty when the ledger is empty.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }

        let mut out = format!("{KNOWLEDGE_MARKER} (Preserved from previous investigations)\n\n");
        for (i, entry) in self.entries.iter().enumerate() {
            out.push_str(&format!(
                "### {}. [{}] {}\n**Goal:** {}\n**Outcome:** {}\n**Learnings:** {}\n\n",
                i + 1,
                entry.outcome.badge(),
                entry.description,
                entry.goal,
                entry.outcome,
                entry.learnings,
            ));
        }
        out
    }
}

/// The system turn text for `base` with `preamble` appended.
///
/// `base` is kept verbatim, including any text that happens to look like
/// a preamble heading. An empty preamble yields `base` unchanged.
pub fn compose_system_text(base: &str, preamble: &str) -> String {
    if preamble.is_empty() {
        base.to_string()
    } else {
        format!("{base}\n\n{preamble}")
    }
}
