//! Live transport: one OpenAI-compatible `chat/completions` call per request.
//!
//! Gated by `allow_network`; with the gate closed every call fails with
//! [`ProviderErrorKind::NetworkDisabled`] before any socket is opened.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::estimate_tokens;
use crate::domain::errors::{ProviderError, ProviderErrorKind};
use crate::domain::models::LiveTransportConfig;
use crate::domain::ports::{AgentRequest, AgentTransport, TransportResponse};
use crate::infrastructure::logging::hash_text;

const DEFAULT_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u64,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// OpenAI-compatible chat completions client.
pub struct LiveTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    allow_network: bool,
}

impl LiveTransport {
    /// Client for `base_url`. No request is sent unless `allow_network` is set.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, allow_network: bool) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            allow_network,
        }
    }

    /// Build from configuration. The key comes from the config value or, failing
    /// that, the environment variable it names.
    pub fn from_config(config: &LiveTransportConfig, allow_network: bool) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .filter(|k| !k.trim().is_empty());
        Self::new(config.base_url.clone(), api_key, allow_network)
    }

    fn classify(err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::new(ProviderErrorKind::Timeout, "provider request timed out")
        } else if err.is_connect() {
            ProviderError::new(ProviderErrorKind::Network, "could not connect to provider")
        } else {
            ProviderError::new(ProviderErrorKind::Network, "provider request failed")
        }
    }
}

#[async_trait]
impl AgentTransport for LiveTransport {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn complete(&self, request: &AgentRequest) -> Result<TransportResponse, ProviderError> {
        if !self.allow_network {
            return Err(ProviderError::new(
                ProviderErrorKind::NetworkDisabled,
                "live transport selected but outbound network is disabled",
            ));
        }
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::new(
                ProviderErrorKind::NotConfigured,
                "live transport has no API key",
            ));
        };

        let body = ChatRequest {
            model: &request.model_id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: request.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        debug!(
            role = %request.role,
            model = %request.model_id,
            max_tokens = request.max_tokens,
            "sending chat completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Self::classify(&e))?;

        if !status.is_success() {
            let fp = hash_text(&text);
            warn!(status = status.as_u16(), body_sha = %fp, "provider returned error status");
            return Err(ProviderError::status(status.as_u16()).with_fingerprint(fp));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|_| {
            ProviderError::new(ProviderErrorKind::InvalidResponse, "provider response was not a chat completion")
                .with_fingerprint(hash_text(&text))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ProviderError::new(ProviderErrorKind::InvalidResponse, "no response from model")
                    .with_fingerprint(hash_text(&text))
            })?;

        let usage = parsed.usage;
        let input_tokens = usage
            .as_ref()
            .and_then(|u| u.prompt_tokens)
            .unwrap_or_else(|| estimate_tokens(&request.system_prompt) + estimate_tokens(&request.user_prompt));
        let output_tokens = usage
            .as_ref()
            .and_then(|u| u.completion_tokens)
            .unwrap_or_else(|| estimate_tokens(&content));

        Ok(TransportResponse {
            model_id: parsed.model.unwrap_or_else(|| request.model_id.clone()),
            text: content,
            input_tokens,
            output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentRole, TraceContext};

    fn request() -> AgentRequest {
        AgentRequest {
            role: AgentRole::Diagnostician,
            contract: AgentRole::Diagnostician.contract(),
            model_id: "openai/gpt-4o".to_string(),
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
            max_tokens: 256,
            temperature: None,
            trace: TraceContext::new("job", "run", "diagnose"),
            candidate_count: 1,
        }
    }

    #[tokio::test]
    async fn test_network_gate_blocks_before_any_request() {
        let transport = LiveTransport::new("http://127.0.0.1:9", Some("key".into()), false);
        let err = transport.complete(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::NetworkDisabled);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let transport = LiveTransport::new("http://127.0.0.1:9", None, true);
        let err = transport.complete(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::NotConfigured);
    }

    #[test]
    fn test_from_config_prefers_explicit_key() {
        let config = LiveTransportConfig {
            api_key: Some("explicit".to_string()),
            ..LiveTransportConfig::default()
        };
        let transport = LiveTransport::from_config(&config, false);
        assert_eq!(transport.api_key.as_deref(), Some("explicit"));
        assert!(!transport.base_url.ends_with('/'));
    }
}
