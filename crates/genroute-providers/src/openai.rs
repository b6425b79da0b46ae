//! OpenAI adapter — chat completions, DALL·E / gpt-image, text-to-speech,
//! and embeddings.
//!
//! The chat completions wire types live here too; OpenRouter speaks the same
//! dialect and reuses them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use genroute_core::config::ProviderConfig;
use genroute_core::media::{save_media, MediaData, SaveOptions};
use genroute_core::types::{
    AudioRequest, Capability, EmbeddingRequest, GenerationResponse, ImageRequest, ImageResult,
    MediaResult, ProviderMeta, TextRequest, Usage,
};
use genroute_core::Result;

use crate::adapter::{save_images, AdapterCore, BuiltinModels};
use crate::sse::{openai_delta, SseDecoder, TextStream};
use crate::traits::{AudioGeneration, Embedding, ImageGeneration, Provider, TextGeneration};

pub static OPENAI_META: ProviderMeta = ProviderMeta {
    id: "openai",
    display_name: "OpenAI",
    version: "1.0.0",
    capabilities: &[
        Capability::Text,
        Capability::Image,
        Capability::Audio,
        Capability::Embedding,
    ],
};

static OPENAI_MODELS: BuiltinModels = &[
    (Capability::Text, &["gpt-4o-mini", "gpt-4o", "gpt-4.1"]),
    (Capability::Image, &["dall-e-3", "gpt-image-1"]),
    (Capability::Audio, &["tts-1", "tts-1-hd"]),
    (Capability::Embedding, &["text-embedding-3-small", "text-embedding-3-large"]),
];

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_AUDIO_FORMAT: &str = "mp3";

// ─────────────────────────────────────────────
// Chat completions wire format (shared)
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<&'a [&'a str]>,
}

impl<'a> ChatRequest<'a> {
    pub fn from_text(model: &'a str, request: &'a TextRequest, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        Self {
            model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
            modalities: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub images: Vec<ChatImage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatImage {
    pub image_url: ChatImageUrl,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatImageUrl {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<ChatUsage> for Usage {
    fn from(u: ChatUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// Parse a chat completions body; `choices` must be non-empty.
pub(crate) fn parse_chat(core: &AdapterCore, raw: &str) -> Result<ChatResponse> {
    let parsed: ChatResponse = core.parse_json(raw)?;
    if parsed.choices.is_empty() {
        return Err(core.shape_error("choices", raw));
    }
    Ok(parsed)
}

/// Text of the first choice plus usage.
pub(crate) fn chat_text(core: &AdapterCore, raw: &str) -> Result<(String, Option<Usage>)> {
    let mut parsed = parse_chat(core, raw)?;
    let text = parsed.choices.swap_remove(0).message.content.unwrap_or_default();
    Ok((text, parsed.usage.map(Usage::from)))
}

// ─────────────────────────────────────────────
// Images / speech / embeddings wire format
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────
// OpenAiProvider
// ─────────────────────────────────────────────

pub struct OpenAiProvider {
    core: AdapterCore,
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiProvider {
    pub fn new() -> Self {
        Self {
            core: AdapterCore::new(&OPENAI_META, OPENAI_MODELS, DEFAULT_API_BASE),
        }
    }

    /// Override the retry backoff step.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.core.set_backoff_unit(unit);
        self
    }

    fn url(&self, config: &ProviderConfig, path: &str) -> String {
        format!("{}/{}", self.core.api_base(config), path)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn meta(&self) -> &'static ProviderMeta {
        &OPENAI_META
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
                client
                    .get(self.url(config, "models"))
                    .bearer_auth(&config.api_key)
            })
            .await
    }

    fn as_text(&self) -> Option<&dyn TextGeneration> {
        Some(self)
    }

    fn as_image(&self) -> Option<&dyn ImageGeneration> {
        Some(self)
    }

    fn as_audio(&self) -> Option<&dyn AudioGeneration> {
        Some(self)
    }

    fn as_embedding(&self) -> Option<&dyn Embedding> {
        Some(self)
    }
}

#[async_trait]
impl TextGeneration for OpenAiProvider {
    async fn generate_text(&self, request: &TextRequest) -> Result<GenerationResponse<String>> {
        let config = self.core.prepare(Capability::Text)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Text, request.model.as_deref())?;
        let body = ChatRequest::from_text(&model, request, false);
        let url = self.url(&config, "chat/completions");

        debug!(provider = "openai", model = %model, "generating text");
        let started = Instant::now();
        let raw = self
            .core
            .send_with_retry(&config, |client| {
                client.post(&url).bearer_auth(&config.api_key).json(&body)
            })
            .await?;
        let (text, usage) = chat_text(&self.core, &raw)?;

        Ok(GenerationResponse::new(text)
            .with_usage(usage)
            .with_meta(self.core.response_meta(&model, started)))
    }

    async fn stream_text(&self, request: &TextRequest) -> Result<TextStream> {
        let config = self.core.prepare(Capability::Text)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Text, request.model.as_deref())?;
        let body = ChatRequest::from_text(&model, request, true);
        let url = self.url(&config, "chat/completions");

        debug!(provider = "openai", model = %model, "streaming text");
        let response = self
            .core
            .send_once(&config, |client| {
                client.post(&url).bearer_auth(&config.api_key).json(&body)
            })
            .await?;

        Ok(SseDecoder::new(Box::pin(response.bytes_stream()), "openai", openai_delta).into_stream())
    }
}

#[async_trait]
impl ImageGeneration for OpenAiProvider {
    async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<GenerationResponse<Vec<ImageResult>>> {
        let config = self.core.prepare(Capability::Image)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Image, request.model.as_deref())?;
        // gpt-image models always return base64 and reject the parameter.
        let response_format = model.starts_with("dall-e").then_some("b64_json");
        let body = ImagesRequest {
            model: &model,
            prompt: &request.prompt,
            n: request.n,
            size: request.size.as_deref(),
            quality: request.quality.as_deref(),
            style: request.style.as_deref(),
            response_format,
        };
        let url = self.url(&config, "images/generations");

        debug!(provider = "openai", model = %model, n = ?request.n, "generating image");
        let started = Instant::now();
        let raw = self
            .core
            .send_with_retry(&config, |client| {
                client.post(&url).bearer_auth(&config.api_key).json(&body)
            })
            .await?;
        let parsed: ImagesResponse = self.core.parse_json(&raw)?;
        if parsed.data.is_empty() {
            return Err(self.core.shape_error("data", &raw));
        }

        let mut images: Vec<ImageResult> = parsed
            .data
            .into_iter()
            .map(|d| ImageResult {
                url: d.url,
                b64_json: d.b64_json,
                revised_prompt: d.revised_prompt,
                file_path: None,
            })
            .collect();

        if let Some(path) = request.output_path.as_deref() {
            save_images(&mut images, path, "png")?;
        }

        Ok(GenerationResponse::new(images).with_meta(self.core.response_meta(&model, started)))
    }
}

#[async_trait]
impl AudioGeneration for OpenAiProvider {
    async fn generate_audio(
        &self,
        request: &AudioRequest,
    ) -> Result<GenerationResponse<MediaResult>> {
        let config = self.core.prepare(Capability::Audio)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Audio, request.model.as_deref())?;
        let format = request.format.as_deref().unwrap_or(DEFAULT_AUDIO_FORMAT);
        let body = SpeechRequest {
            model: &model,
            input: &request.prompt,
            voice: request.voice.as_deref().unwrap_or(DEFAULT_VOICE),
            response_format: format,
            speed: request.speed,
        };
        let url = self.url(&config, "audio/speech");

        debug!(provider = "openai", model = %model, format, "generating speech");
        let started = Instant::now();
        let bytes = self
            .core
            .send_with_retry_bytes(&config, |client| {
                client.post(&url).bearer_auth(&config.api_key).json(&body)
            })
            .await?;

        let mut media = MediaResult {
            format: format.to_string(),
            size_bytes: Some(bytes.len()),
            ..Default::default()
        };
        match request.output_path.as_deref() {
            Some(path) => {
                let opts = SaveOptions::for_path(path, "audio", format);
                media.file_path = Some(save_media(MediaData::Bytes(bytes), &opts)?);
            }
            None => media.data = Some(bytes),
        }

        Ok(GenerationResponse::new(media).with_meta(self.core.response_meta(&model, started)))
    }
}

#[async_trait]
impl Embedding for OpenAiProvider {
    async fn embed(&self, request: &EmbeddingRequest) -> Result<GenerationResponse<Vec<Vec<f32>>>> {
        let config = self.core.prepare(Capability::Embedding)?;
        request.validate()?;
        let model = self
            .core
            .resolve_model(Capability::Embedding, request.model.as_deref())?;
        let body = EmbeddingsRequest {
            model: &model,
            input: &request.prompt,
        };
        let url = self.url(&config, "embeddings");

        let started = Instant::now();
        let raw = self
            .core
            .send_with_retry(&config, |client| {
                client.post(&url).bearer_auth(&config.api_key).json(&body)
            })
            .await?;
        let parsed: EmbeddingsResponse = self.core.parse_json(&raw)?;
        if parsed.data.is_empty() {
            return Err(self.core.shape_error("data", &raw));
        }

        let vectors = parsed.data.into_iter().map(|d| d.embedding).collect();
        Ok(GenerationResponse::new(vectors)
            .with_usage(parsed.usage.map(Usage::from))
            .with_meta(self.core.response_meta(&model, started)))
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

    fn provider(server: &MockServer) -> OpenAiProvider {
        let provider = OpenAiProvider::new().with_backoff_unit(Duration::from_millis(1));
        provider.initialize(Arc::new(ProviderConfig {
            api_key: "test-key".into(),
            api_base: Some(server.uri()),
            ..Default::default()
        }));
        provider
    }

    #[tokio::test]
    async fn test_generate_text_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Hi there"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
            })))
            .mount(&server)
            .await;

        let request = TextRequest {
            system_prompt: Some("Be brief.".into()),
            ..TextRequest::new("Hello")
        };
        let resp = provider(&server).generate_text(&request).await.unwrap();

        assert_eq!(resp.payload, "Hi there");
        assert_eq!(resp.usage.unwrap().total_tokens, 11);
        let meta = resp.meta.unwrap();
        assert_eq!(meta.model, "gpt-4o-mini");
        assert_eq!(meta.provider, "openai");
    }

    #[tokio::test]
    async fn test_missing_choices_is_provider_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"object": "weird"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_text(&TextRequest::new("Hello"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("choices"));
        assert!(msg.contains("weird"));
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_text(&TextRequest::new("Hello"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_max_retries_from_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new().with_backoff_unit(Duration::from_millis(1));
        provider.initialize(Arc::new(ProviderConfig {
            api_key: "k".into(),
            api_base: Some(server.uri()),
            max_retries: Some(1),
            ..Default::default()
        }));
        assert!(provider.generate_text(&TextRequest::new("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let err = OpenAiProvider::new()
            .generate_text(&TextRequest::new("Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn test_stream_text_yields_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let stream = provider(&server)
            .stream_text(&TextRequest::new("Hi"))
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_stream_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server).stream_text(&TextRequest::new("Hi")).await;
        assert!(matches!(result, Err(GenError::Provider { status: Some(500), .. })));
    }

    #[tokio::test]
    async fn test_generate_images_saves_suffixed_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(body_partial_json(serde_json::json!({
                "model": "dall-e-3",
                "response_format": "b64_json",
                "n": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"b64_json": "aGk=", "revised_prompt": "a cat, revised"},
                    {"b64_json": "aGk="}
                ]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let request = ImageRequest {
            n: Some(2),
            output_path: Some(dir.path().join("cat.png")),
            ..ImageRequest::new("a cat")
        };
        let resp = provider(&server).generate_image(&request).await.unwrap();

        assert_eq!(resp.payload.len(), 2);
        assert_eq!(resp.payload[0].revised_prompt.as_deref(), Some("a cat, revised"));
        assert!(dir.path().join("cat_0.png").exists());
        assert!(dir.path().join("cat_1.png").exists());
    }

    #[tokio::test]
    async fn test_generate_images_missing_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_image(&ImageRequest::new("a cat"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing data"));
    }

    #[tokio::test]
    async fn test_generate_audio_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(body_partial_json(serde_json::json!({
                "model": "tts-1",
                "input": "Read me",
                "voice": "alloy",
                "response_format": "mp3"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("speech.mp3");
        let request = AudioRequest {
            output_path: Some(out.clone()),
            ..AudioRequest::new("Read me")
        };
        let resp = provider(&server).generate_audio(&request).await.unwrap();

        assert_eq!(resp.payload.file_path.as_deref(), Some(out.as_path()));
        assert_eq!(resp.payload.size_bytes, Some(3));
        assert!(resp.payload.data.is_none());
        assert_eq!(std::fs::read(&out).unwrap(), vec![0xFF, 0xFB, 0x90]);
    }

    #[tokio::test]
    async fn test_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}],
                "usage": {"prompt_tokens": 3, "total_tokens": 3}
            })))
            .mount(&server)
            .await;

        let resp = provider(&server)
            .embed(&EmbeddingRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(resp.payload, vec![vec![0.1_f32, 0.2, 0.3]]);
        assert_eq!(resp.usage.unwrap().prompt_tokens, 3);
    }

    #[tokio::test]
    async fn test_validate_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        assert!(provider(&server).validate_credentials().await);
    }

    #[tokio::test]
    async fn test_validate_credentials_swallows_network_error() {
        let provider = OpenAiProvider::new();
        provider.initialize(Arc::new(ProviderConfig {
            api_key: "k".into(),
            api_base: Some("http://127.0.0.1:1".into()),
            ..Default::default()
        }));
        assert!(!provider.validate_credentials().await);
    }

    #[test]
    fn test_declares_all_accessors() {
        let provider = OpenAiProvider::new();
        assert!(provider.as_text().is_some());
        assert!(provider.as_image().is_some());
        assert!(provider.as_audio().is_some());
        assert!(provider.as_embedding().is_some());
        assert!(provider.as_video().is_none());
        assert!(!provider.supports(Capability::Video));
    }
}
