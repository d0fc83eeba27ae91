//! OpenAI-compatible chat completions client.

use super::{ChatMessage, CompletionOptions, CompletionResponse, ModelClient, TokenUsage};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Map transport-level reqwest failures to classified provider errors
fn map_http_error(error: reqwest::Error) -> ProviderError {
    if let Some(status) = error.status() {
        classify_status(status, error.to_string(), None)
    } else if error.is_timeout() {
        ProviderError::Timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ProviderError::Connection(format!("Connection error: {}", error))
    } else if error.is_decode() {
        ProviderError::MalformedResponse(format!("Failed to decode response: {}", error))
    } else if error.is_builder() {
        ProviderError::InvalidRequest(format!("Failed to build request: {}", error))
    } else {
        ProviderError::Connection(format!("HTTP error: {}", error))
    }
}

/// Classify a non-success HTTP status
pub(crate) fn classify_status(
    status: StatusCode,
    body: String,
    retry_after_ms: Option<u64>,
) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::AuthFailed(format!("Authentication failed: {}", body)),
        429 => ProviderError::RateLimited {
            message: format!("Rate limit exceeded: {}", body),
            retry_after_ms,
        },
        408 => ProviderError::Timeout(format!("Request timeout: {}", body)),
        400 | 404 | 413 | 422 => {
            ProviderError::InvalidRequest(format!("Request rejected ({}): {}", status, body))
        }
        code if status.is_server_error() => ProviderError::ServerError {
            status: code,
            message: body,
        },
        _ => ProviderError::InvalidRequest(format!("Request failed ({}): {}", status, body)),
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

fn build_provider_http_client(request_timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

/// OpenAI provider client
pub struct OpenAiClient {
    client: Client,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = build_provider_http_client(request_timeout)?;
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            model,
            api_key,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured("no API key available for the OpenAI client".to_string())
        })?;

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|msg| OpenAiMessage {
                    role: msg.role.as_str().to_string(),
                    content: Some(msg.content),
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "Sending chat completion request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after(
                response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, error_text, retry_after_ms));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse response: {}", e))
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;
        let content = choice
            .message
            .content
            .ok_or_else(|| ProviderError::MalformedResponse("Choice has no content".into()))?;

        let usage = completion.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(CompletionResponse {
            content,
            model: completion.model,
            usage,
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
