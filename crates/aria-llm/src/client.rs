use std::sync::Arc;

use base64::Engine;
use serde_json::{json, Value};
use tracing::{info, warn};

use aria_core::files::{FileDescriptor, FileKind};
use aria_core::message::{Message, MessageKind};

use crate::apilog::ApiLogger;
use crate::error::LlmError;
use crate::json::{extract_json, validate_schema};
use crate::provider::{ChatRequest, LlmProvider, ProviderMessage, Role};

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Provider-agnostic LLM invocation.
///
/// Converts the running transcript into the provider's chat format, attaches
/// image files to the most recent user turn, extracts the JSON object from
/// the raw reply, validates it against the caller's schema, and always
/// persists a request/response log.
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    logger: ApiLogger,
    model: String,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, logger: ApiLogger, model: String) -> Self {
        Self {
            provider,
            logger,
            model,
        }
    }

    /// One structured LLM call. `schema` failures surface as
    /// [`LlmError::Schema`] — the caller's fallback path handles them.
    pub async fn invoke(
        &self,
        transcript: &[Message],
        system_prompts: &[String],
        files: &[FileDescriptor],
        api_name: &str,
        schema: Option<&Value>,
    ) -> Result<Value, LlmError> {
        let mut messages: Vec<ProviderMessage> = system_prompts
            .iter()
            .map(|p| ProviderMessage::text(Role::System, p.clone()))
            .collect();
        messages.extend(build_provider_messages(
            transcript,
            files,
            self.provider.supports_tool_role(),
        ));

        let req = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: DEFAULT_MAX_TOKENS,
        };

        info!(
            model = %req.model,
            provider = %self.provider.name(),
            api_name,
            message_count = req.messages.len(),
            "invoking LLM"
        );

        let request_log = json!({
            "model": req.model,
            "messages": req.messages,
        });
        let headers = vec![("content-type".to_string(), "application/json".to_string())];

        let raw = match self.provider.chat(&req).await {
            Ok(raw) => {
                self.logger.save(
                    &self.provider.endpoint(),
                    &headers,
                    &request_log,
                    &json!({ "content": raw }),
                    api_name,
                );
                raw
            }
            Err(e) => {
                self.logger.save(
                    &self.provider.endpoint(),
                    &headers,
                    &request_log,
                    &json!({ "error": e.to_string() }),
                    &format!("{api_name}_error"),
                );
                return Err(e.into());
            }
        };

        let value = extract_json(&raw).ok_or_else(|| {
            warn!(api_name, "no JSON object found in LLM reply");
            LlmError::Parse(truncate(&raw, 200))
        })?;

        if let Some(schema) = schema {
            let violations = validate_schema(&value, schema);
            if !violations.is_empty() {
                warn!(api_name, ?violations, "LLM reply failed schema validation");
                return Err(LlmError::Schema(violations.join("; ")));
            }
        }

        Ok(value)
    }
}

/// Convert the transcript to provider messages.
///
/// Tool messages are down-converted to system messages (with a
/// `Tool "{name}" result:` prefix) for providers without a tool role.
/// Image files are attached as inline base64 data URIs to the most recent
/// human message only, producing a multipart user message.
pub fn build_provider_messages(
    transcript: &[Message],
    files: &[FileDescriptor],
    supports_tool_role: bool,
) -> Vec<ProviderMessage> {
    let latest_human = transcript
        .iter()
        .rposition(|m| m.kind == MessageKind::Human);

    transcript
        .iter()
        .enumerate()
        .map(|(i, msg)| match msg.kind {
            MessageKind::Human => {
                if Some(i) == latest_human {
                    human_with_images(msg, files)
                } else {
                    ProviderMessage::text(Role::User, msg.text())
                }
            }
            MessageKind::Assistant => ProviderMessage::text(Role::Assistant, msg.text()),
            MessageKind::System => ProviderMessage::text(Role::System, msg.text()),
            MessageKind::Tool => {
                let name = msg.tool_name.clone().unwrap_or_else(|| "unknown".to_string());
                if supports_tool_role {
                    ProviderMessage {
                        role: Role::Tool,
                        content: Value::String(msg.text()),
                        name: Some(name),
                    }
                } else {
                    ProviderMessage::text(
                        Role::System,
                        format!("Tool \"{name}\" result:\n{}", msg.text()),
                    )
                }
            }
        })
        .collect()
}

/// Multipart user message: the text plus one `image_url` part per attached
/// image that still carries bytes. Falls back to plain text when nothing
/// attaches.
fn human_with_images(msg: &Message, files: &[FileDescriptor]) -> ProviderMessage {
    let mut parts = vec![json!({ "type": "text", "text": msg.text() })];

    for file in files {
        if file.kind != FileKind::Image {
            continue;
        }
        let Some(bytes) = &file.bytes else { continue };
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{};base64,{}", file.mime, encoded) }
        }));
    }

    if parts.len() == 1 {
        ProviderMessage::text(Role::User, msg.text())
    } else {
        ProviderMessage {
            role: Role::User,
            content: Value::Array(parts),
            name: None,
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
