//! Error types shared across the crate.
//!
//! Tool failures are not errors at this level: they are reported back to
//! the model as tool-result text. The types here cover the situations the
//! run loop itself has to react to.

use thiserror::Error;

/// Misuse of the focus protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FocusError {
    /// `complete_focus` was called with no open focus.
    #[error("No active focus to complete. Use start_focus first.")]
    EmptyStack,
}

/// Failure of an inference call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The provider answered with a non-success status.
    #[error("API error {code}: {body}")]
    Status { code: u16, body: String },
    /// A 200 response carrying an `error` payload.
    #[error("API error: {0}")]
    Api(String),
    /// The response body could not be decoded.
    #[error("failed to parse response: {0}")]
    Decode(String),
    /// The request exceeded its own timeout.
    #[error("request timed out")]
    Timeout,
}

impl ProviderError {
    /// Whether a retry has a chance of succeeding.
    ///
    /// Rate limits, 5xx responses, timeouts and transport failures are
    /// transient. Everything else (bad request, auth, undecodable bodies)
    /// fails the same way the next time.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout => true,
            ProviderError::Status { code, .. } => *code == 429 || *code >= 500,
            ProviderError::Api(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("rate limit") || lower.contains("overloaded")
            }
            ProviderError::Decode(_) => false,
        }
    }
}

/// A tool-pairing violation found by [`check_pairing`](crate::context::buffer::check_pairing).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingViolation {
    #[error("turn {index}: tool result for {call_id} has no matching request")]
    OrphanResult { index: usize, call_id: String },
    #[error("turn {index}: tool result is missing its call id")]
    MissingCallId { index: usize },
    #[error("turn {index}: request {call_id} was never answered")]
    UnansweredRequest { index: usize, call_id: String },
    #[error("turn {index}: request {call_id} was answered more than once")]
    DuplicateResult { index: usize, call_id: String },
}

/// Failure to prepare a workspace directory.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace source {0} is not a directory")]
    NotADirectory(String),
    #[error("workspace I/O error: {0}")]
    Io(#[from] std::io::Error),
}
