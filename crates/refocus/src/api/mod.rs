//! The inference collaborator and its OpenRouter implementation.
//!
//! The run loop only sees the [`Inference`] trait: hand it the current
//! buffer and the tool definitions, get back text, requested actions and
//! token usage. Everything else lives here:
//!
//! - [`openrouter`]: [`OpenRouterClient`], an OpenAI-compatible
//!   chat-completions client over `reqwest`.
//! - [`retry`]: [`RetryConfig`] and the [`Retrying`] wrapper, which retries
//!   transient [`ProviderError`]s with exponential backoff.
//! - [`tracing`]: trace ids and [`cost_usd`] estimates.

pub mod openrouter;
pub mod retry;
pub mod tracing;

pub use openrouter::OpenRouterClient;
pub use retry::{RetryConfig, Retrying};
pub use tracing::{cost_usd, generate_trace_id};

use crate::error::ProviderError;
use crate::{ActionRequest, ToolDef, Turn};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Inference::infer`].
pub type InferenceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>>;

/// One inference call's input.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub model: &'a str,
    pub turns: &'a [Turn],
    pub tools: &'a [ToolDef],
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Token counts reported for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One inference call's output.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub actions: Vec<ActionRequest>,
    pub usage: TokenUsage,
}

impl Completion {
    /// A text-only completion.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A completion requesting `actions`.
    pub fn with_actions(actions: Vec<ActionRequest>) -> Self {
        Self {
            actions,
            ..Default::default()
        }
    }

    pub fn usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = TokenUsage {
            input_tokens,
            output_tokens,
        };
        self
    }
}

/// A model that turns a conversation into the next assistant turn.
pub trait Inference: Send + Sync {
    fn infer<'a>(&'a self, request: InferenceRequest<'a>) -> InferenceFuture<'a>;
}

impl<T: Inference + ?Sized> Inference for &T {
    fn infer<'a>(&'a self, request: InferenceRequest<'a>) -> InferenceFuture<'a> {
        (**self).infer(request)
    }
}

impl<T: Inference + ?Sized> Inference for std::sync::Arc<T> {
    fn infer<'a>(&'a self, request: InferenceRequest<'a>) -> InferenceFuture<'a> {
        (**self).infer(request)
    }
}
