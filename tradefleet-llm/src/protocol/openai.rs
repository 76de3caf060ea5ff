use crate::{
    ChatRequest, ChatResponse, DEFAULT_TEMPERATURE, LlmError, Message, Usage,
};
use serde::{Deserialize, Serialize};

/// <https://platform.openai.com/docs/api-reference/chat/create>
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatCompletionsRequest {
    pub fn from_request(request: &ChatRequest, model: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: request.messages.clone(),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: request.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub model: Option<String>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

/// Map the wire reply onto the uniform [`ChatResponse`], reading the content
/// at `choices[0].message.content`.
pub fn into_chat_response(
    reply: ChatCompletionsResponse,
    requested_model: &str,
) -> Result<ChatResponse, LlmError> {
    let Some(choice) = reply.choices.into_iter().next() else {
        return Err(LlmError::Parse("response contains no choices".to_string()));
    };

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        model: reply.model.unwrap_or_else(|| requested_model.to_string()),
        usage: reply
            .usage
            .map(|usage| Usage::new(usage.prompt_tokens, usage.completion_tokens)),
        finish_reason: choice.finish_reason,
    })
}
