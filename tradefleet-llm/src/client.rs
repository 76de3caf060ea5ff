use crate::{
    ChatClient, ChatOutcome, ChatRequest, ChatResponse, LlmConfig, LlmProtocol,
    error::LlmError,
    log::{LlmCallStatus, LlmLog, LlmLogId, LlmLogSink},
    protocol::{anthropic, google, openai},
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::StatusCode;
use std::{sync::Arc, time::Instant};
use tracing::{error, warn};

/// Response bodies recorded for failed calls are capped at this many bytes.
const ERROR_BODY_CAP: usize = 2048;

/// Multi-protocol LLM chat client.
///
/// One instance per provider row; protocol dispatch happens per call, so
/// adding a dialect means adding a [`LlmProtocol`] variant and its wire
/// module, nothing else.
#[derive(Debug, Clone)]
pub struct LlmClient {
    pub(crate) http: reqwest::Client,
    config: LlmConfig,
    log_sink: Option<Arc<dyn LlmLogSink>>,
}

impl LlmClient {
    /// Construct a client for the provided provider configuration.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|error| LlmError::Connection(error.to_string()))?;

        Ok(Self {
            http,
            config,
            log_sink: None,
        })
    }

    /// Attach the sink that receives one [`LlmLog`] per call.
    pub fn with_log_sink(mut self, sink: Arc<dyn LlmLogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Execute one chat round-trip, emitting exactly one log record
    /// regardless of the outcome.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        let (url, request_body) = self.build_call(&request, &model)?;

        let request_time = now_utc8();
        let started = Instant::now();
        let result = self.execute(&url, &request_body).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((status, _retry_after, body)) if status.is_success() => {
                match self.parse_reply(&body, &model) {
                    Ok(response) => {
                        let log_id = self.record(LlmLog {
                            provider_id: self.config.provider_id.clone(),
                            model_name: model,
                            agent_id: request.agent_id.clone(),
                            request_body,
                            response_body: Some(body),
                            duration_ms,
                            status: LlmCallStatus::Success,
                            error_message: None,
                            tokens_in: response.usage.and_then(|usage| usage.tokens_in),
                            tokens_out: response.usage.and_then(|usage| usage.tokens_out),
                            request_time,
                        });
                        Ok(ChatOutcome { response, log_id })
                    }
                    Err(parse_error) => {
                        error!(
                            provider_id = %self.config.provider_id,
                            %parse_error,
                            "failed to parse LLM response"
                        );
                        self.record(self.error_log(
                            &request,
                            request_body,
                            Some(truncate_body(&body)),
                            duration_ms,
                            request_time,
                            &parse_error,
                        ));
                        Err(parse_error)
                    }
                }
            }
            Ok((status, retry_after, body)) => {
                let api_error = if status == StatusCode::TOO_MANY_REQUESTS {
                    LlmError::RateLimit {
                        retry_after_secs: retry_after,
                    }
                } else {
                    LlmError::Response {
                        status: status.as_u16(),
                        body: truncate_body(&body),
                    }
                };
                warn!(
                    provider_id = %self.config.provider_id,
                    %status,
                    "LLM endpoint returned an error response"
                );
                self.record(self.error_log(
                    &request,
                    request_body,
                    Some(truncate_body(&body)),
                    duration_ms,
                    request_time,
                    &api_error,
                ));
                Err(api_error)
            }
            Err(transport_error) => {
                error!(
                    provider_id = %self.config.provider_id,
                    %transport_error,
                    "LLM request failed"
                );
                self.record(self.error_log(
                    &request,
                    request_body,
                    None,
                    duration_ms,
                    request_time,
                    &transport_error,
                ));
                Err(transport_error)
            }
        }
    }

    /// Single-prompt convenience wrapper around [`Self::chat`].
    pub async fn chat_simple(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(crate::Message::system(system));
        }
        messages.push(crate::Message::user(prompt));

        let outcome = self
            .chat(ChatRequest {
                messages,
                ..Default::default()
            })
            .await?;
        Ok(outcome.response.content)
    }

    /// Build the dialect-specific url and JSON request body.
    fn build_call(&self, request: &ChatRequest, model: &str) -> Result<(String, String), LlmError> {
        let base = self.config.base_url_trimmed();

        let (url, body) = match self.config.protocol {
            LlmProtocol::OpenAi => {
                let wire = openai::ChatCompletionsRequest::from_request(request, model);
                (format!("{base}/chat/completions"), to_body(&wire)?)
            }
            LlmProtocol::Anthropic => {
                let wire = anthropic::MessagesRequest::from_request(request, model);
                (format!("{base}/v1/messages"), to_body(&wire)?)
            }
            LlmProtocol::Google => {
                let wire = google::GenerateContentRequest::from_request(request);
                let url = format!(
                    "{base}/models/{model}:generateContent?key={key}",
                    key = self.config.api_key,
                );
                (url, to_body(&wire)?)
            }
        };

        Ok((url, body))
    }

    /// POST the body with dialect auth headers; returns the status, any
    /// `Retry-After` seconds and the raw response text.
    async fn execute(
        &self,
        url: &str,
        body: &str,
    ) -> Result<(StatusCode, Option<u64>, String), LlmError> {
        let mut builder = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());

        match self.config.protocol {
            LlmProtocol::OpenAi => {
                builder = builder.bearer_auth(&self.config.api_key);
            }
            LlmProtocol::Anthropic => {
                builder = builder
                    .header("x-api-key", &self.config.api_key)
                    .header("anthropic-version", anthropic::ANTHROPIC_VERSION);
            }
            // Google authenticates via the `key` query parameter.
            LlmProtocol::Google => {}
        }

        let response = builder.send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let text = response.text().await?;

        Ok((status, retry_after, text))
    }

    fn parse_reply(&self, body: &str, model: &str) -> Result<ChatResponse, LlmError> {
        match self.config.protocol {
            LlmProtocol::OpenAi => {
                let reply = serde_json::from_str(body)
                    .map_err(|error| LlmError::Parse(error.to_string()))?;
                openai::into_chat_response(reply, model)
            }
            LlmProtocol::Anthropic => {
                let reply = serde_json::from_str(body)
                    .map_err(|error| LlmError::Parse(error.to_string()))?;
                anthropic::into_chat_response(reply, model)
            }
            LlmProtocol::Google => {
                let reply = serde_json::from_str(body)
                    .map_err(|error| LlmError::Parse(error.to_string()))?;
                google::into_chat_response(reply, model)
            }
        }
    }

    fn error_log(
        &self,
        request: &ChatRequest,
        request_body: String,
        response_body: Option<String>,
        duration_ms: u64,
        request_time: DateTime<FixedOffset>,
        error: &LlmError,
    ) -> LlmLog {
        LlmLog {
            provider_id: self.config.provider_id.clone(),
            model_name: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.default_model.clone()),
            agent_id: request.agent_id.clone(),
            request_body,
            response_body,
            duration_ms,
            status: LlmCallStatus::Error,
            error_message: Some(error.to_string()),
            tokens_in: None,
            tokens_out: None,
            request_time,
        }
    }

    fn record(&self, log: LlmLog) -> Option<LlmLogId> {
        self.log_sink.as_ref().map(|sink| sink.record(log))
    }
}

#[async_trait]
impl ChatClient for LlmClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError> {
        LlmClient::chat(self, request).await
    }
}

fn to_body<T: serde::Serialize>(wire: &T) -> Result<String, LlmError> {
    serde_json::to_string(wire).map_err(|error| LlmError::Parse(error.to_string()))
}

/// Cap a response body at [`ERROR_BODY_CAP`] bytes on a char boundary.
fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_CAP {
        return body.to_string();
    }
    let mut end = ERROR_BODY_CAP;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

/// Exchange-timezone timestamp for log records.
fn now_utc8() -> DateTime<FixedOffset> {
    let utc8 = FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset");
    Utc::now().with_timezone(&utc8)
}
