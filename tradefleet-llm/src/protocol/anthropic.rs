use crate::{ChatRequest, ChatResponse, LlmError, Message, Role, Usage};
use serde::{Deserialize, Serialize};

/// Required `anthropic-version` header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory on this dialect; applied when the caller set none.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// <https://docs.anthropic.com/en/api/messages>
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl MessagesRequest {
    /// Build the wire request, hoisting `system` messages into the top-level
    /// `system` field and forwarding the rest.
    pub fn from_request(request: &ChatRequest, model: &str) -> Self {
        let mut system = None;
        let mut messages = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            match message.role {
                Role::System => system = Some(message.content.clone()),
                _ => messages.push(message.clone()),
            }
        }

        Self {
            model: model.to_string(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    pub model: Option<String>,
    pub usage: Option<AnthropicUsage>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Map the wire reply onto the uniform [`ChatResponse`]; the content is the
/// concatenation of all `text`-typed blocks.
pub fn into_chat_response(
    reply: MessagesResponse,
    requested_model: &str,
) -> Result<ChatResponse, LlmError> {
    let content = reply
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<String>();

    Ok(ChatResponse {
        content,
        model: reply.model.unwrap_or_else(|| requested_model.to_string()),
        usage: reply
            .usage
            .map(|usage| Usage::new(usage.input_tokens, usage.output_tokens)),
        finish_reason: reply.stop_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod de {
        use super::*;

        #[test]
        fn test_messages_response() {
            let raw = r#"{
                "id": "msg_01",
                "model": "claude-3-5-sonnet-20241022",
                "content": [
                    {"type": "text", "text": "{\"decision\":"},
                    {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                    {"type": "text", "text": " \"wait\"}"}
                ],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 88, "output_tokens": 12}
            }"#;

            let reply = serde_json::from_str::<MessagesResponse>(raw).unwrap();
            let response = into_chat_response(reply, "claude-3-5-sonnet-20241022").unwrap();

            assert_eq!(response.content, "{\"decision\": \"wait\"}");
            assert_eq!(response.usage, Some(Usage::new(Some(88), Some(12))));
            assert_eq!(response.finish_reason.as_deref(), Some("end_turn"));
        }
    }

    mod ser {
        use super::*;

        #[test]
        fn test_system_message_is_hoisted() {
            let request = ChatRequest {
                messages: vec![
                    Message::system("you are a trader"),
                    Message::user("what now?"),
                ],
                ..Default::default()
            };

            let wire = MessagesRequest::from_request(&request, "claude-3-haiku-20240307");
            assert_eq!(wire.system.as_deref(), Some("you are a trader"));
            assert_eq!(wire.messages.len(), 1);
            assert_eq!(wire.max_tokens, DEFAULT_MAX_TOKENS);

            let body = serde_json::to_value(&wire).unwrap();
            assert_eq!(body["system"], "you are a trader");
            assert!(body.get("temperature").is_none());
        }
    }
}
