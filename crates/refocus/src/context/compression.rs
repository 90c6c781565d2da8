//! Focus completion: safe truncation and the knowledge preamble.
//!
//! When a focus completes, the engine pops its marker, records what was
//! learned, and cuts the buffer back to the nearest index at or before the
//! marker's anchor that does not split a request/result group. The system
//! turn is then rebuilt from the seeded prompt plus the ledger preamble, and
//! a continuation turn tells the model where it stands.
//!
//! An index `j` is safe when the turn before it is
//! - a `user` turn, or
//! - the last result of a complete group: the contiguous run of tool
//!   results ending at `j - 1` answers every request of the assistant turn
//!   just before that run.
//!
//! The second rule is checked structurally rather than by peeking at the
//! next turn, so a batch whose results are still being appended is never
//! mistaken for a finished one.

use super::buffer::ConversationBuffer;
use super::focus::{FocusMarker, FocusStack};
use super::knowledge::{KnowledgeEntry, KnowledgeLedger, Outcome};
use crate::error::FocusError;
use crate::{Role, Turn};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

// ── Safe truncation ────────────────────────────────────────────────

/// Whether truncating to `index` keeps the tool-pairing invariant.
pub fn is_safe_boundary(turns: &[Turn], index: usize) -> bool {
    let Some(prev) = index.checked_sub(1).and_then(|i| turns.get(i)) else {
        return false;
    };
    match prev.role {
        Role::User => true,
        Role::ToolResult => closes_group(turns, index),
        Role::System | Role::Assistant => false,
    }
}

/// The tool results in `turns[start..index]` answer every request of the
/// assistant turn at `start - 1`, and `turns[index]` is not another result.
fn closes_group(turns: &[Turn], index: usize) -> bool {
    if turns.get(index).is_some_and(|t| t.role == Role::ToolResult) {
        return false;
    }
    let start = turns[..index]
        .iter()
        .rposition(|t| t.role != Role::ToolResult)
        .map_or(0, |p| p + 1);
    let Some(request) = start.checked_sub(1).map(|i| &turns[i]) else {
        return false;
    };
    if !request.has_requests() {
        return false;
    }
    let answered: HashSet<&str> = turns[start..index]
        .iter()
        .filter_map(|t| t.result_of.as_deref())
        .collect();
    request
        .requested_actions
        .iter()
        .all(|a| answered.contains(a.id.as_str()))
}

/// Scan backward from `candidate` to `floor` for the first safe index.
///
/// `candidate` is clamped into `[floor, turns.len()]`. Falls back to
/// `floor` when nothing above it is safe.
pub fn safe_truncation_index(turns: &[Turn], candidate: usize, floor: usize) -> usize {
    let start = candidate.min(turns.len()).max(floor);
    (floor + 1..=start)
        .rev()
        .find(|&j| is_safe_boundary(turns, j))
        .unwrap_or(floor)
}

// ── Engine ─────────────────────────────────────────────────────────

/// What a successful `complete_focus` did to the buffer.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionReport {
    /// The focus that was closed.
    pub marker: FocusMarker,
    pub outcome: Outcome,
    /// Anchor after clamping to the buffer length.
    pub candidate: usize,
    /// Index the buffer was truncated to.
    pub safe_index: usize,
    /// Turns removed by the truncation.
    pub discarded: usize,
    /// The cut landed before the anchor of the still-open enclosing focus.
    pub overshoot: bool,
    /// Buffer length after the continuation turn was appended.
    pub buffer_len: usize,
    /// Ledger size after recording this focus.
    pub knowledge_entries: usize,
    /// Stack depth after popping this focus.
    pub remaining_depth: usize,
}

/// Owns the focus stack and the knowledge ledger for one run.
#[derive(Debug, Default)]
pub struct CompressionEngine {
    stack: FocusStack,
    ledger: KnowledgeLedger,
}

impl CompressionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack(&self) -> &FocusStack {
        &self.stack
    }

    pub fn ledger(&self) -> &KnowledgeLedger {
        &self.ledger
    }

    /// Open a focus anchored at the current buffer length.
    pub fn open_focus(
        &mut self,
        buffer: &ConversationBuffer,
        description: &str,
        goal: &str,
    ) -> FocusMarker {
        let marker = self.stack.open(description, goal, buffer.len()).clone();
        info!(
            "Focus opened: {} (anchor={}, depth={})",
            marker.description,
            marker.anchor,
            self.stack.depth()
        );
        marker
    }

    /// Close the innermost focus and compress the buffer.
    ///
    /// On [`FocusError::EmptyStack`] neither the buffer nor the ledger is
    /// touched.
    pub fn complete_focus(
        &mut self,
        buffer: &mut ConversationBuffer,
        outcome: Outcome,
        learnings: &str,
        next_action: Option<&str>,
    ) -> Result<CompressionReport, FocusError> {
        let marker = self.stack.close()?;

        self.ledger.record(KnowledgeEntry {
            description: marker.description.clone(),
            goal: marker.goal.clone(),
            outcome,
            learnings: learnings.to_string(),
        });

        let floor = buffer.protected_len();
        let candidate = marker.anchor.min(buffer.len());
        let safe_index = safe_truncation_index(buffer.turns(), candidate, floor);
        let discarded = buffer.truncate(safe_index);

        let overshoot = self
            .stack
            .top()
            .is_some_and(|enclosing| safe_index < enclosing.anchor);
        if overshoot {
            warn!(
                "Compression of {} cut to {safe_index}, past the enclosing focus anchor {:?}",
                marker.description,
                self.stack.top().map(|m| m.anchor)
            );
        }

        buffer.set_knowledge_preamble(&self.ledger.render());
        buffer.push(Turn::user(continuation_text(
            &marker.description,
            outcome,
            next_action,
        )));

        debug!(
            "Buffer truncated: candidate={candidate}, safe_index={safe_index}, \
             discarded={discarded}, len={}",
            buffer.len()
        );
        info!(
            "Focus completed: {} ({outcome}), {discarded} turn(s) discarded, \
             {} knowledge entries, depth={}",
            marker.description,
            self.ledger.len(),
            self.stack.depth()
        );

        Ok(CompressionReport {
            marker,
            outcome,
            candidate,
            safe_index,
            discarded,
            overshoot,
            buffer_len: buffer.len(),
            knowledge_entries: self.ledger.len(),
            remaining_depth: self.stack.depth(),
        })
    }
}

/// Synthetic user turn appended after a compression.
pub fn continuation_text(description: &str, outcome: Outcome, next_action: Option<&str>) -> String {
    let next = match next_action.map(str::trim).filter(|s| !s.is_empty()) {
        Some(action) => format!("Next: {action}"),
        None => "What would you like to do next?".to_string(),
    };
    format!(
        "Focus completed: {description}\n\n\
         Outcome: {outcome}\n\n\
         Your learnings have been saved to the KNOWLEDGE section above.\n\n\
         {next}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionRequest;
    use crate::context::buffer::check_pairing;

    fn call(id: &str) -> ActionRequest {
        ActionRequest::new(id, "read_file", "{}")
    }

    fn pair(buffer: &mut ConversationBuffer, id: &str) {
        buffer.push(Turn::assistant("", vec![call(id)]));
        buffer.push(Turn::tool_result(id, "ok"));
    }

    #[test]
    fn user_turn_and_complete_group_are_safe() {
        let turns = vec![
            Turn::system("s"),
            Turn::user("t"),
            Turn::assistant("", vec![call("a"), call("b")]),
            Turn::tool_result("a", ""),
            Turn::tool_result("b", ""),
            Turn::assistant("thinking", vec![]),
        ];
        assert!(is_safe_boundary(&turns, 2));
        assert!(!is_safe_boundary(&turns, 3));
        assert!(!is_safe_boundary(&turns, 4));
        assert!(is_safe_boundary(&turns, 5));
        assert!(!is_safe_boundary(&turns, 6));
        assert!(!is_safe_boundary(&turns, 0));
        assert!(!is_safe_boundary(&turns, 7));
    }

    #[test]
    fn incomplete_trailing_batch_is_unsafe() {
        let turns = vec![
            Turn::system("s"),
            Turn::user("t"),
            Turn::assistant("", vec![call("a"), call("b")]),
            Turn::tool_result("a", ""),
        ];
        assert!(!is_safe_boundary(&turns, 4));
        assert_eq!(safe_truncation_index(&turns, 4, 2), 2);
    }

    #[test]
    fn candidate_is_clamped() {
        let turns = vec![Turn::system("s"), Turn::user("t"), Turn::user("u")];
        assert_eq!(safe_truncation_index(&turns, 10, 2), 3);
        assert_eq!(safe_truncation_index(&turns, 0, 2), 2);
    }

    #[test]
    fn scenario_single_focus_returns_to_protected_minimum() {
        let mut buffer = ConversationBuffer::new("You are an engineer.", "fix it");
        let mut engine = CompressionEngine::new();

        buffer.push(Turn::assistant("", vec![ActionRequest::new("f0", "start_focus", "{}")]));
        let marker = engine.open_focus(&buffer, "A", "find bug");
        assert_eq!(marker.anchor, 3);
        buffer.push(Turn::tool_result("f0", "Focus started: A"));
        for id in ["c1", "c2", "c3"] {
            pair(&mut buffer, id);
        }
        buffer.push(Turn::assistant(
            "",
            vec![ActionRequest::new("f1", "complete_focus", "{}")],
        ));

        let report = engine
            .complete_focus(&mut buffer, Outcome::Success, "X", None)
            .unwrap();

        assert_eq!(report.safe_index, 2);
        assert_eq!(report.discarded, 9);
        assert_eq!(engine.ledger().len(), 1);
        assert_eq!(engine.ledger().entries()[0].learnings, "X");
        assert!(buffer.system_text().contains("**Learnings:** X"));
        assert!(buffer.system_text().starts_with("You are an engineer.\n\n## KNOWLEDGE"));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.turns()[2].role, Role::User);
        assert!(buffer.turns()[2].text.contains("What would you like to do next?"));
        assert_eq!(check_pairing(buffer.turns()), Ok(()));
    }

    #[test]
    fn empty_stack_leaves_everything_untouched() {
        let mut buffer = ConversationBuffer::new("sys", "task");
        pair(&mut buffer, "c1");
        let before = buffer.turns().to_vec();
        let mut engine = CompressionEngine::new();

        let err = engine
            .complete_focus(&mut buffer, Outcome::Success, "nothing", None)
            .unwrap_err();
        assert_eq!(err, FocusError::EmptyStack);
        assert_eq!(buffer.turns(), before.as_slice());
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn nested_close_only_discards_inner_span() {
        let mut buffer = ConversationBuffer::new("sys", "task");
        let mut engine = CompressionEngine::new();

        buffer.push(Turn::assistant("", vec![ActionRequest::new("a0", "start_focus", "{}")]));
        let outer = engine.open_focus(&buffer, "A", "outer");
        buffer.push(Turn::tool_result("a0", "started"));
        pair(&mut buffer, "c1");
        pair(&mut buffer, "c2");

        buffer.push(Turn::assistant("", vec![ActionRequest::new("b0", "start_focus", "{}")]));
        let inner = engine.open_focus(&buffer, "B", "inner");
        buffer.push(Turn::tool_result("b0", "started"));
        pair(&mut buffer, "c3");
        buffer.push(Turn::assistant("", vec![ActionRequest::new("b1", "complete_focus", "{}")]));

        let report = engine
            .complete_focus(&mut buffer, Outcome::Partial, "inner notes", Some("check tests"))
            .unwrap();

        assert_eq!(engine.stack().depth(), 1);
        assert_eq!(engine.stack().top().unwrap().description, "A");
        assert_eq!(report.safe_index, inner.anchor - 1);
        assert!(report.safe_index >= outer.anchor);
        assert!(!report.overshoot);
        assert!(buffer.last().unwrap().text.ends_with("Next: check tests"));
        assert_eq!(check_pairing(buffer.turns()), Ok(()));
    }

    #[test]
    fn zero_discard_still_reports() {
        let mut buffer = ConversationBuffer::new("sys", "task");
        let mut engine = CompressionEngine::new();
        engine.open_focus(&buffer, "A", "g");

        let report = engine
            .complete_focus(&mut buffer, Outcome::Abandoned, "dead end", None)
            .unwrap();
        assert_eq!(report.discarded, 0);
        assert_eq!(report.safe_index, 2);
        assert_eq!(engine.ledger().len(), 1);
    }

    #[test]
    fn learnings_with_separators_survive_verbatim() {
        let mut buffer = ConversationBuffer::new("sys", "task");
        let mut engine = CompressionEngine::new();
        engine.open_focus(&buffer, "A", "g");
        engine
            .complete_focus(&mut buffer, Outcome::Success, "a::b::c", None)
            .unwrap();
        assert!(buffer.system_text().contains("**Learnings:** a::b::c"));
    }

    #[test]
    fn system_prompt_resembling_the_marker_survives() {
        let prompt = "You are an engineer.\n\n## KNOWLEDGE BASE RULES\n\nNever edit vendored code.\n";
        let mut buffer = ConversationBuffer::new(prompt, "task");
        let mut engine = CompressionEngine::new();

        for (name, learnings) in [("A", "first"), ("B", "second")] {
            buffer.push(Turn::assistant("", vec![ActionRequest::new(name, "start_focus", "{}")]));
            engine.open_focus(&buffer, name, "g");
            buffer.push(Turn::tool_result(name, "started"));
            engine
                .complete_focus(&mut buffer, Outcome::Success, learnings, None)
                .unwrap();

            let system = buffer.system_text();
            assert!(system.starts_with(prompt));
            assert!(system.contains("Never edit vendored code."));
            assert_eq!(system.matches("(Preserved from previous investigations)").count(), 1);
        }
        assert!(buffer.system_text().contains("**Learnings:** first"));
        assert!(buffer.system_text().contains("**Learnings:** second"));
    }

    #[test]
    fn inner_cut_past_enclosing_anchor_then_outer_candidate_is_clamped() {
        let mut buffer = ConversationBuffer::new("sys", "task");
        let mut engine = CompressionEngine::new();

        // One batch: two reads, then both focuses open, then another read.
        buffer.push(Turn::assistant(
            "",
            vec![
                call("p1"),
                call("p2"),
                ActionRequest::new("a0", "start_focus", "{}"),
                ActionRequest::new("b0", "start_focus", "{}"),
                call("p3"),
            ],
        ));
        buffer.push(Turn::tool_result("p1", "ok"));
        buffer.push(Turn::tool_result("p2", "ok"));
        let outer = engine.open_focus(&buffer, "A", "outer");
        buffer.push(Turn::tool_result("a0", "started"));
        let inner = engine.open_focus(&buffer, "B", "inner");
        buffer.push(Turn::tool_result("b0", "started"));
        buffer.push(Turn::tool_result("p3", "ok"));
        assert_eq!((outer.anchor, inner.anchor), (5, 6));

        buffer.push(Turn::assistant("", vec![ActionRequest::new("b1", "complete_focus", "{}")]));
        let inner_report = engine
            .complete_focus(&mut buffer, Outcome::Partial, "inner", None)
            .unwrap();
        assert_eq!(inner_report.candidate, 6);
        assert_eq!(inner_report.safe_index, 2);
        assert!(inner_report.overshoot);
        assert_eq!(inner_report.remaining_depth, 1);
        assert_eq!(buffer.len(), 3);
        assert_eq!(check_pairing(buffer.turns()), Ok(()));

        let len_before = buffer.len();
        let outer_report = engine
            .complete_focus(&mut buffer, Outcome::Success, "outer", None)
            .unwrap();
        assert!(outer.anchor > len_before);
        assert_eq!(outer_report.candidate, len_before);
        assert_eq!(outer_report.safe_index, len_before);
        assert_eq!(outer_report.discarded, 0);
        assert!(!outer_report.overshoot);
        assert_eq!(engine.stack().depth(), 0);
        assert_eq!(check_pairing(buffer.turns()), Ok(()));
    }
}
