//! The conversation buffer and the tool-pairing checker.
//!
//! A [`ConversationBuffer`] is the ordered list of turns sent to the model on
//! every inference call. It only grows, except through the two crate-private
//! operations the compression engine uses: [`truncate`](ConversationBuffer::truncate)
//! and the knowledge preamble rewrite. The first two turns (system prompt and
//! task) form the protected prefix and are never discarded.
//!
//! The system prompt the buffer was seeded with is kept on the side. The
//! system turn is always rebuilt from it, so no text the caller put in the
//! prompt is ever parsed back out.

use super::knowledge::compose_system_text;
use crate::error::PairingViolation;
use crate::{Role, Turn};
use std::collections::HashSet;

/// Number of leading turns (system + task) that truncation never removes.
pub const PROTECTED_LEN: usize = 2;

/// Ordered sequence of turns owned by a single run.
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    turns: Vec<Turn>,
    base_system: String,
}

impl ConversationBuffer {
    /// Seed a buffer with the system prompt and the task.
    pub fn new(system_prompt: impl Into<String>, task: impl Into<String>) -> Self {
        let base_system = system_prompt.into();
        Self {
            turns: vec![Turn::system(base_system.clone()), Turn::user(task)],
            base_system,
        }
    }

    /// Append a turn at the end.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Index just past the system and task turns.
    pub fn protected_len(&self) -> usize {
        PROTECTED_LEN.min(self.turns.len())
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Text of the system turn.
    pub fn system_text(&self) -> &str {
        self.turns
            .first()
            .map(|t| t.text.as_str())
            .unwrap_or_default()
    }

    /// The system prompt as seeded, without any knowledge preamble.
    pub fn base_system_text(&self) -> &str {
        &self.base_system
    }

    /// Approximate size in characters, used for token estimates in logs.
    pub fn char_len(&self) -> usize {
        self.turns
            .iter()
            .map(|t| {
                t.text.len()
                    + t.requested_actions
                        .iter()
                        .map(|a| a.name.len() + a.arguments.len())
                        .sum::<usize>()
            })
            .sum()
    }

    /// Drop every turn at index `>= n`. Returns the number of turns removed.
    ///
    /// `n` is clamped to the protected prefix, so the system and task turns
    /// always survive.
    pub(crate) fn truncate(&mut self, n: usize) -> usize {
        let keep = n.max(self.protected_len());
        let before = self.turns.len();
        self.turns.truncate(keep);
        before - self.turns.len()
    }

    /// Rebuild the system turn as the seeded prompt followed by `preamble`.
    /// An empty preamble restores the seeded prompt byte for byte.
    pub(crate) fn set_knowledge_preamble(&mut self, preamble: &str) {
        let text = compose_system_text(&self.base_system, preamble);
        if let Some(first) = self.turns.first_mut() {
            first.text = text;
        }
    }
}

// ── Pairing checks ─────────────────────────────────────────────────

/// Verify the tool-pairing invariant over a complete buffer.
///
/// Every assistant turn carrying N requests must be followed, before any
/// turn of another role, by exactly N tool results answering those ids.
pub fn check_pairing(turns: &[Turn]) -> Result<(), PairingViolation> {
    scan_pairing(turns, false)
}

/// Like [`check_pairing`], but tolerates a trailing group whose results are
/// still being appended. This is the shape the buffer has between two tool
/// dispatches of the same batch.
pub fn check_pairing_prefix(turns: &[Turn]) -> Result<(), PairingViolation> {
    scan_pairing(turns, true)
}

struct OpenGroup {
    index: usize,
    pending: Vec<String>,
    answered: HashSet<String>,
}

impl OpenGroup {
    fn unanswered(&self) -> Option<PairingViolation> {
        self.pending
            .first()
            .map(|id| PairingViolation::UnansweredRequest {
                index: self.index,
                call_id: id.clone(),
            })
    }
}

fn scan_pairing(turns: &[Turn], allow_open_tail: bool) -> Result<(), PairingViolation> {
    let mut group: Option<OpenGroup> = None;

    for (index, turn) in turns.iter().enumerate() {
        match turn.role {
            Role::ToolResult => {
                let call_id = turn
                    .result_of
                    .as_deref()
                    .ok_or(PairingViolation::MissingCallId { index })?;
                let Some(open) = group.as_mut() else {
                    return Err(PairingViolation::OrphanResult {
                        index,
                        call_id: call_id.to_string(),
                    });
                };
                if let Some(pos) = open.pending.iter().position(|id| id == call_id) {
                    open.pending.remove(pos);
                    open.answered.insert(call_id.to_string());
                } else if open.answered.contains(call_id) {
                    return Err(PairingViolation::DuplicateResult {
                        index,
                        call_id: call_id.to_string(),
                    });
                } else {
                    return Err(PairingViolation::OrphanResult {
                        index,
                        call_id: call_id.to_string(),
                    });
                }
            }
            role => {
                if let Some(violation) = group.take().and_then(|g| g.unanswered()) {
                    return Err(violation);
                }
                if role == Role::Assistant && turn.has_requests() {
                    group = Some(OpenGroup {
                        index,
                        pending: turn.requested_actions.iter().map(|a| a.id.clone()).collect(),
                        answered: HashSet::new(),
                    });
                }
            }
        }
    }

    if allow_open_tail {
        return Ok(());
    }
    match group.and_then(|g| g.unanswered()) {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}
