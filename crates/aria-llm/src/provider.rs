use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat roles in the provider's wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the provider's chat format.
///
/// `content` is either a JSON string or an array of content parts — the
/// multimodal user message carries `[{type: "text", …}, {type: "image_url",
/// …}]` blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: Value,
    /// Tool name, set on `tool` role messages for providers that accept it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ProviderMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Value::String(content.into()),
            name: None,
        }
    }
}

/// Request to an LLM provider. System turns lead the message list.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
}

/// Common interface for chat providers. Returns the raw response body text;
/// all parsing is the LLM client's job.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Endpoint URL recorded in API logs. Never includes credentials.
    fn endpoint(&self) -> String {
        self.name().to_string()
    }

    /// Whether the provider accepts a dedicated `tool` role. When false,
    /// tool messages are down-converted to system messages by the client.
    fn supports_tool_role(&self) -> bool {
        false
    }

    /// Send a chat request and wait for the full raw reply text.
    async fn chat(&self, req: &ChatRequest) -> Result<String, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}
