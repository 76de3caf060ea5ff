use crate::{LlmClient, LlmProtocol, error::LlmError};
use serde::{Deserialize, Serialize};

/// One entry of a provider's model catalogue.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, derive_more::Constructor)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GoogleModelList {
    #[serde(default)]
    models: Vec<GoogleModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleModel {
    name: String,
    display_name: Option<String>,
}

/// Anthropic exposes no list endpoint; the catalogue is static.
fn anthropic_models() -> Vec<ModelInfo> {
    [
        ("claude-3-opus-20240229", "Claude 3 Opus"),
        ("claude-3-sonnet-20240229", "Claude 3 Sonnet"),
        ("claude-3-haiku-20240307", "Claude 3 Haiku"),
        ("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet"),
    ]
    .into_iter()
    .map(|(id, name)| ModelInfo::new(id.to_string(), name.to_string()))
    .collect()
}

impl LlmClient {
    /// Fetch the provider's model catalogue.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let config = self.config();
        let base = config.base_url_trimmed();

        match config.protocol {
            LlmProtocol::Anthropic => Ok(anthropic_models()),
            LlmProtocol::OpenAi => {
                let response = self
                    .http
                    .get(format!("{base}/models"))
                    .bearer_auth(&config.api_key)
                    .send()
                    .await?;
                let status = response.status();
                let body = response.text().await?;
                if !status.is_success() {
                    return Err(LlmError::Response {
                        status: status.as_u16(),
                        body,
                    });
                }

                let list = serde_json::from_str::<OpenAiModelList>(&body)
                    .map_err(|error| LlmError::Parse(error.to_string()))?;
                Ok(list
                    .data
                    .into_iter()
                    .map(|model| ModelInfo::new(model.id.clone(), model.id))
                    .collect())
            }
            LlmProtocol::Google => {
                let response = self
                    .http
                    .get(format!("{base}/models?key={key}", key = config.api_key))
                    .send()
                    .await?;
                let status = response.status();
                let body = response.text().await?;
                if !status.is_success() {
                    return Err(LlmError::Response {
                        status: status.as_u16(),
                        body,
                    });
                }

                let list = serde_json::from_str::<GoogleModelList>(&body)
                    .map_err(|error| LlmError::Parse(error.to_string()))?;
                Ok(list
                    .models
                    .into_iter()
                    .map(|model| {
                        let id = model
                            .name
                            .strip_prefix("models/")
                            .unwrap_or(&model.name)
                            .to_string();
                        let name = model.display_name.unwrap_or_else(|| id.clone());
                        ModelInfo::new(id, name)
                    })
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod de {
        use super::*;

        #[test]
        fn test_openai_model_list() {
            let raw = r#"{"object": "list", "data": [{"id": "gpt-4", "object": "model"}]}"#;
            let list = serde_json::from_str::<OpenAiModelList>(raw).unwrap();
            assert_eq!(list.data.len(), 1);
            assert_eq!(list.data[0].id, "gpt-4");
        }

        #[test]
        fn test_google_model_list() {
            let raw = r#"{"models": [{"name": "models/gemini-pro", "displayName": "Gemini Pro"}]}"#;
            let list = serde_json::from_str::<GoogleModelList>(raw).unwrap();
            assert_eq!(list.models[0].name, "models/gemini-pro");
            assert_eq!(list.models[0].display_name.as_deref(), Some("Gemini Pro"));
        }
    }

    #[test]
    fn test_anthropic_catalogue_is_static() {
        let models = anthropic_models();
        assert!(models.iter().any(|m| m.id == "claude-3-haiku-20240307"));
    }
}
