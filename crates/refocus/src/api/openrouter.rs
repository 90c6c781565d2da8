//! OpenAI-compatible chat-completions client (OpenRouter by default).

use super::{Completion, Inference, InferenceFuture, InferenceRequest, TokenUsage};
use crate::error::ProviderError;
use crate::{ActionRequest, Role, ToolDef, Turn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// OpenRouter chat completions endpoint.
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

// ── Wire types ─────────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [ToolDef],
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn no_tools(tools: &&[ToolDef]) -> bool {
    tools.is_empty()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in wire format.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::System => Message {
                role: MessageRole::System,
                content: Some(turn.text.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::User => Message {
                role: MessageRole::User,
                content: Some(turn.text.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Assistant => {
                let tool_calls: Vec<ToolCall> =
                    turn.requested_actions.iter().map(ToolCall::from).collect();
                let content = if turn.text.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(turn.text.clone())
                };
                Message {
                    role: MessageRole::Assistant,
                    content,
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                }
            }
            Role::ToolResult => Message {
                role: MessageRole::Tool,
                content: Some(turn.text.clone()),
                tool_calls: None,
                tool_call_id: turn.result_of.clone(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call in wire format.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

impl From<&ActionRequest> for ToolCall {
    fn from(action: &ActionRequest) -> Self {
        ToolCall {
            id: action.id.clone(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: action.name.clone(),
                arguments: action.arguments.clone(),
            },
        }
    }
}

impl From<ToolCall> for ActionRequest {
    fn from(call: ToolCall) -> Self {
        ActionRequest {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
struct UsageInfo {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

/// Decode a response body into a [`Completion`].
fn parse_completion(body: &str) -> Result<Completion, ProviderError> {
    let parsed: RawChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Api(err.message));
    }

    let usage = parsed.usage.unwrap_or_default();
    let usage = TokenUsage {
        input_tokens: usage.prompt_tokens.unwrap_or(0),
        output_tokens: usage.completion_tokens.unwrap_or(0),
    };

    let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
        debug!("LLM output: empty (no choices)");
        return Ok(Completion {
            usage,
            ..Default::default()
        });
    };

    let actions: Vec<ActionRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(ActionRequest::from)
        .collect();
    let text = choice.message.content.unwrap_or_default();
    debug!(
        "LLM output: {} chars text, {} tool call(s)",
        text.len(),
        actions.len()
    );

    Ok(Completion {
        text,
        actions,
        usage,
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// Create a client for OpenRouter with the default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_headers(api_key, "https://github.com/refocus-rs", "refocus")
    }

    /// Create a client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("refocus/0.1")
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: OPENROUTER_URL.to_string(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Send one chat completion request.
    pub async fn chat(&self, request: InferenceRequest<'_>) -> Result<Completion, ProviderError> {
        let body = ChatRequest {
            model: request.model,
            messages: request.turns.iter().map(Message::from).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools,
        };
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.tools.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ProviderError::Status {
                code: status.as_u16(),
                body: text,
            });
        }

        parse_completion(&text)
    }
}

impl Inference for OpenRouterClient {
    fn infer<'a>(&'a self, request: InferenceRequest<'a>) -> InferenceFuture<'a> {
        Box::pin(self.chat(request))
    }
}
