//! Anthropic adapter — Messages API, text only.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use genroute_core::config::ProviderConfig;
use genroute_core::types::{Capability, GenerationResponse, ProviderMeta, TextRequest, Usage};
use genroute_core::Result;

use crate::adapter::{AdapterCore, BuiltinModels};
use crate::sse::{anthropic_delta, SseDecoder, TextStream};
use crate::traits::{Provider, TextGeneration};

pub static ANTHROPIC_META: ProviderMeta = ProviderMeta {
    id: "anthropic",
    display_name: "Anthropic",
    version: "1.0.0",
    capabilities: &[Capability::Text],
};

static ANTHROPIC_MODELS: BuiltinModels = &[(
    Capability::Text,
    &["claude-sonnet-4-20250514", "claude-3-5-haiku-20241022"],
)];

const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
/// The Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

impl<'a> MessagesRequest<'a> {
    fn new(model: &'a str, request: &'a TextRequest, stream: bool) -> Self {
        Self {
            model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
            system: request.system_prompt.as_deref(),
            temperature: request.temperature,
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<AnthropicUsage> for Usage {
    fn from(u: AnthropicUsage) -> Self {
        Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        }
    }
}

pub struct AnthropicProvider {
    core: AdapterCore,
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self {
            core: AdapterCore::new(&ANTHROPIC_META, ANTHROPIC_MODELS, DEFAULT_API_BASE),
        }
    }

    /// Override the retry backoff step.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.core.set_backoff_unit(unit);
        self
    }

    fn authed(
        client: &Client,
        method: reqwest::Method,
        url: &str,
        config: &ProviderConfig,
    ) -> RequestBuilder {
        client
            .request(method, url)
            .header("x-api-key", &config.api_key)
            .header("anthropic-version", API_VERSION)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn meta(&self) -> &'static ProviderMeta {
        &ANTHROPIC_META
    }

    fn initialize(&self, config: Arc<ProviderConfig>) {
        self.core.initialize(config);
    }

    fn is_initialized(&self) -> bool {
        self.core.is_initialized()
    }

    fn resolve_model(&self, capability: Capability, requested: Option<&str>) -> Result<String> {
        self.core.resolve_model(capability, requested)
    }

    async fn validate_credentials(&self) -> bool {
        self.core
            .check_credentials(|client, config| {
                let url = format!("{}/models", self.core.api_base(config));
                Self::authed(client, reqwest::Method::GET, &url, config)
            })
            .await
    }

    fn as_text(&self) -> Option<&dyn TextGeneration> {
        Some(self)
    }
}

#[async_trait]
impl TextGeneration for AnthropicProvider {
    async fn generate_text(&self, request: &TextRequest) -> Result<GenerationResponse<String>> {
        let config = self.core.prepare(Capability::Text)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Text, request.model.as_deref())?;
        let body = MessagesRequest::new(&model, request, false);
        let url = format!("{}/messages", self.core.api_base(&config));

        debug!(provider = "anthropic", model = %model, "generating text");
        let started = Instant::now();
        let raw = self
            .core
            .send_with_retry(&config, |client| {
                Self::authed(client, reqwest::Method::POST, &url, &config).json(&body)
            })
            .await?;
        let parsed: MessagesResponse = self.core.parse_json(&raw)?;
        if parsed.content.is_empty() {
            return Err(self.core.shape_error("content", &raw));
        }

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        Ok(GenerationResponse::new(text)
            .with_usage(parsed.usage.map(Usage::from))
            .with_meta(self.core.response_meta(&model, started)))
    }

    async fn stream_text(&self, request: &TextRequest) -> Result<TextStream> {
        let config = self.core.prepare(Capability::Text)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Text, request.model.as_deref())?;
        let body = MessagesRequest::new(&model, request, true);
        let url = format!("{}/messages", self.core.api_base(&config));

        debug!(provider = "anthropic", model = %model, "streaming text");
        let response = self
            .core
            .send_once(&config, |client| {
                Self::authed(client, reqwest::Method::POST, &url, &config).json(&body)
            })
            .await?;

        Ok(
            SseDecoder::new(Box::pin(response.bytes_stream()), "anthropic", anthropic_delta)
                .into_stream(),
        )
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use genroute_core::GenError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> AnthropicProvider {
        let provider = AnthropicProvider::new().with_backoff_unit(Duration::from_millis(1));
        provider.initialize(Arc::new(ProviderConfig {
            api_key: "sk-ant-test".into(),
            api_base: Some(server.uri()),
            ..Default::default()
        }));
        provider
    }

    #[tokio::test]
    async fn test_generate_text_sends_required_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 4096,
                "system": "Be terse.",
                "messages": [{"role": "user", "content": "Hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 10, "output_tokens": 3}
            })))
            .mount(&server)
            .await;

        let request = TextRequest {
            system_prompt: Some("Be terse.".into()),
            ..TextRequest::new("Hi")
        };
        let resp = provider(&server).generate_text(&request).await.unwrap();
        assert_eq!(resp.payload, "Hello!");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.total_tokens, 13);
    }

    #[tokio::test]
    async fn test_missing_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "msg_1"})),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_text(&TextRequest::new("Hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing content"));
    }

    #[tokio::test]
    async fn test_http_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_text(&TextRequest::new("Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::Provider { status: Some(401), .. }));
    }

    #[tokio::test]
    async fn test_stream_text_reads_block_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,",
            "\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,",
            "\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;

        let stream = provider(&server)
            .stream_text(&TextRequest::new("Hi"))
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), "Hello");
    }

    #[tokio::test]
    async fn test_unsupported_capability_accessors() {
        let provider = AnthropicProvider::new();
        assert!(provider.as_image().is_none());
        assert!(!provider.supports(Capability::Image));
        assert!(provider.as_text().is_some());
    }

    #[tokio::test]
    async fn test_validate_credentials_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(!provider(&server).validate_credentials().await);
    }
}
