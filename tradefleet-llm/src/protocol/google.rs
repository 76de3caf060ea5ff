use crate::{ChatRequest, ChatResponse, DEFAULT_TEMPERATURE, LlmError, Role, Usage};
use serde::{Deserialize, Serialize};

/// <https://ai.google.dev/api/generate-content>
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
}

impl GenerateContentRequest {
    /// Build the wire request: non-system messages map onto `contents` with
    /// roles `user` / `model`; a system message becomes `systemInstruction`.
    pub fn from_request(request: &ChatRequest) -> Self {
        let mut system_instruction = None;
        let mut contents = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            match message.role {
                Role::System => {
                    system_instruction = Some(SystemInstruction {
                        parts: vec![Part {
                            text: message.content.clone(),
                        }],
                    });
                }
                Role::User => contents.push(Content::new("user", &message.content)),
                Role::Assistant => contents.push(Content::new("model", &message.content)),
            }
        }

        Self {
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_output_tokens: request.max_tokens,
            },
            system_instruction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<GoogleUsage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUsage {
    pub prompt_token_count: Option<u64>,
    pub candidates_token_count: Option<u64>,
}

/// Map the wire reply onto the uniform [`ChatResponse`]; the content is the
/// concatenation of `candidates[0].content.parts[*].text`.
pub fn into_chat_response(
    reply: GenerateContentResponse,
    requested_model: &str,
) -> Result<ChatResponse, LlmError> {
    let Some(candidate) = reply.candidates.into_iter().next() else {
        return Err(LlmError::Parse(
            "response contains no candidates".to_string(),
        ));
    };

    let content = candidate
        .content
        .map(|content| {
            content
                .parts
                .iter()
                .map(|part| part.text.as_str())
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        model: requested_model.to_string(),
        usage: reply
            .usage_metadata
            .map(|usage| Usage::new(usage.prompt_token_count, usage.candidates_token_count)),
        finish_reason: candidate.finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    mod de {
        use super::*;

        #[test]
        fn test_generate_content_response() {
            let raw = r#"{
                "candidates": [{
                    "content": {
                        "parts": [{"text": "["}, {"text": "]"}],
                        "role": "model"
                    },
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 64, "candidatesTokenCount": 2}
            }"#;

            let reply = serde_json::from_str::<GenerateContentResponse>(raw).unwrap();
            let response = into_chat_response(reply, "gemini-pro").unwrap();

            assert_eq!(response.content, "[]");
            assert_eq!(response.model, "gemini-pro");
            assert_eq!(response.usage, Some(Usage::new(Some(64), Some(2))));
            assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
        }

        #[test]
        fn test_empty_candidates_is_parse_error() {
            let reply =
                serde_json::from_str::<GenerateContentResponse>(r#"{"candidates": []}"#).unwrap();
            assert!(matches!(
                into_chat_response(reply, "gemini-pro"),
                Err(LlmError::Parse(_))
            ));
        }
    }

    mod ser {
        use super::*;

        #[test]
        fn test_roles_and_system_instruction() {
            let request = ChatRequest {
                messages: vec![
                    Message::system("rules"),
                    Message::user("question"),
                    Message::assistant("prior answer"),
                ],
                temperature: Some(0.2),
                ..Default::default()
            };

            let wire = GenerateContentRequest::from_request(&request);
            let body = serde_json::to_value(&wire).unwrap();

            assert_eq!(body["contents"][0]["role"], "user");
            assert_eq!(body["contents"][1]["role"], "model");
            assert_eq!(body["systemInstruction"]["parts"][0]["text"], "rules");
            assert_eq!(body["generationConfig"]["temperature"], 0.2);
            assert!(body["generationConfig"].get("maxOutputTokens").is_none());
        }
    }
}
