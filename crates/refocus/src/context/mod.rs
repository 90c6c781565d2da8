//! Context management: the conversation buffer and focus-based compression.
//!
//! The pieces, leaves first:
//!
//! 1. **[`buffer`]**: [`ConversationBuffer`] holds the turns sent to the
//!    model. Append-only apart from the truncation the compression engine
//!    performs. [`check_pairing`] verifies the tool-pairing invariant.
//!
//! 2. **[`focus`]**: [`FocusStack`] of open investigations, each anchored
//!    at the buffer length when it was opened.
//!
//! 3. **[`knowledge`]**: [`KnowledgeLedger`] of distilled learnings,
//!    rendered into a `## KNOWLEDGE` preamble on the system turn.
//!
//! 4. **[`compression`]**: [`CompressionEngine`] closes a focus, records
//!    its learnings and cuts the buffer back to a pairing-safe index.
//!
//! All of it is owned by a single run and dropped when the run ends.

pub mod buffer;
pub mod compression;
pub mod focus;
pub mod knowledge;

pub use buffer::{ConversationBuffer, PROTECTED_LEN, check_pairing, check_pairing_prefix};
pub use compression::{CompressionEngine, CompressionReport, safe_truncation_index};
pub use focus::{FocusMarker, FocusStack};
pub use knowledge::{KNOWLEDGE_MARKER, KnowledgeEntry, KnowledgeLedger, Outcome};
