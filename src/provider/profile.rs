//! Provider profile: which model endpoint to call and how.

use super::{CompletionOptions, ModelClient, OpenAiClient};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Supported provider wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "openai")]
    OpenAI,
    /// Any server speaking the OpenAI chat completions protocol
    #[serde(rename = "openai-compatible")]
    OpenAICompatible,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::OpenAICompatible => "openai-compatible",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_type")]
    pub provider_type: ProviderType,

    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL; required for `openai-compatible`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider_type() -> ProviderType {
    ProviderType::OpenAI
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.2)
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            model: default_model(),
            endpoint: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("Temperature must be between 0.0 and 2.0, got {}", t));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be greater than zero".to_string());
        }
        match (&self.provider_type, &self.endpoint) {
            (ProviderType::OpenAICompatible, None) => {
                return Err("openai-compatible providers require an endpoint".to_string())
            }
            (_, Some(endpoint))
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") =>
            {
                return Err(format!("Endpoint must be an http(s) URL, got '{}'", endpoint))
            }
            _ => {}
        }
        Ok(())
    }

    /// API key from the configured environment variable, if set and non-empty.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Fails with `NotConfigured` when the provider cannot make a call at all.
    pub fn ensure_ready(&self) -> Result<(), ProviderError> {
        self.validate().map_err(ProviderError::NotConfigured)?;
        if self.provider_type == ProviderType::OpenAI && self.resolve_api_key().is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "environment variable {} is not set",
                self.api_key_env
            )));
        }
        Ok(())
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_response: true,
        }
    }

    pub fn build_client(&self) -> Result<Arc<dyn ModelClient>, ProviderError> {
        let client = OpenAiClient::new(
            self.model.clone(),
            self.resolve_api_key(),
            self.endpoint.clone(),
            Duration::from_secs(self.request_timeout_secs),
        )?;
        Ok(Arc::new(client))
    }
}
