//! OpenRouter adapter — OpenAI-compatible chat for text, and image models
//! reached through chat with the `image` output modality.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

use genroute_core::config::ProviderConfig;
use genroute_core::types::{
    Capability, GenerationResponse, ImageRequest, ImageResult, ProviderMeta, TextRequest,
};
use genroute_core::Result;

use crate::adapter::{save_images, AdapterCore, BuiltinModels};
use crate::openai::{chat_text, parse_chat, ChatMessage, ChatRequest};
use crate::sse::{openai_delta, SseDecoder, TextStream};
use crate::traits::{ImageGeneration, Provider, TextGeneration};

pub static OPENROUTER_META: ProviderMeta = ProviderMeta {
    id: "openrouter",
    display_name: "OpenRouter",
    version: "1.0.0",
    capabilities: &[Capability::Text, Capability::Image],
};

static OPENROUTER_MODELS: BuiltinModels = &[
    (Capability::Text, &["openai/gpt-4o-mini", "anthropic/claude-sonnet-4"]),
    (Capability::Image, &["google/gemini-2.5-flash-image-preview"]),
];

const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const REFERER: &str = "https://github.com/genroute/genroute";
const APP_TITLE: &str = "genroute";
const IMAGE_MODALITIES: &[&str] = &["image", "text"];

const DATA_URI_PATTERN: &str = r"data:image/([a-zA-Z0-9.+-]+);base64,([A-Za-z0-9+/=]+)";
const HTTP_URL_PATTERN: &str = r#"https?://[^\s)"'<>\]]+"#;

/// Turn one image reference (data URI or URL) into an [`ImageResult`].
fn image_from_reference(reference: &str) -> ImageResult {
    match reference.strip_prefix("data:") {
        Some(rest) => ImageResult {
            b64_json: Some(
                rest.split_once(',')
                    .map(|(_, b64)| b64.to_string())
                    .unwrap_or_default(),
            ),
            ..Default::default()
        },
        None => ImageResult {
            url: Some(reference.to_string()),
            ..Default::default()
        },
    }
}

/// Image format named by the first data URI, if any.
fn format_from_reference(reference: &str) -> Option<&str> {
    let mime = reference.strip_prefix("data:image/")?;
    let end = mime.find(';')?;
    match &mime[..end] {
        "jpeg" => Some("jpg"),
        other => Some(other),
    }
}

/// Fallback when the model puts the image in the message text.
fn images_from_content(content: &str) -> Vec<String> {
    if let Ok(re) = Regex::new(DATA_URI_PATTERN) {
        let found: Vec<String> = re
            .find_iter(content)
            .map(|m| m.as_str().to_string())
            .collect();
        if !found.is_empty() {
            return found;
        }
    }
    Regex::new(HTTP_URL_PATTERN)
        .ok()
        .map(|re| {
            re.find_iter(content)
                .map(|m| m.as_str().to_string())
                .collect()
        })
        .unwrap_or_default()
}

pub struct OpenRouterProvider {
    core: AdapterCore,
}

impl Default for OpenRouterProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenRouterProvider {
    pub fn new() -> Self {
        Self {
            core: AdapterCore::new(&OPENROUTER_META, OPENROUTER_MODELS, DEFAULT_API_BASE),
        }
    }

    /// Override the retry backoff step.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.core.set_backoff_unit(unit);
        self
    }

    fn post(client: &Client, url: &str, config: &ProviderConfig) -> RequestBuilder {
        client
            .post(url)
            .bearer_auth(&config.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
    }

    fn chat_url(&self, config: &ProviderConfig) -> String {
        format!("{}/chat/completions", self.core.api_base(config))
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn meta(&self) -> &'static ProviderMeta {
        &OPENROUTER_META
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
                    .get(format!("{}/key", self.core.api_base(config)))
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
}

#[async_trait]
impl TextGeneration for OpenRouterProvider {
    async fn generate_text(&self, request: &TextRequest) -> Result<GenerationResponse<String>> {
        let config = self.core.prepare(Capability::Text)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Text, request.model.as_deref())?;
        let body = ChatRequest::from_text(&model, request, false);
        let url = self.chat_url(&config);

        debug!(provider = "openrouter", model = %model, "generating text");
        let started = Instant::now();
        let raw = self
            .core
            .send_with_retry(&config, |client| Self::post(client, &url, &config).json(&body))
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
        let url = self.chat_url(&config);

        debug!(provider = "openrouter", model = %model, "streaming text");
        let response = self
            .core
            .send_once(&config, |client| Self::post(client, &url, &config).json(&body))
            .await?;

        Ok(
            SseDecoder::new(Box::pin(response.bytes_stream()), "openrouter", openai_delta)
                .into_stream(),
        )
    }
}

#[async_trait]
impl ImageGeneration for OpenRouterProvider {
    async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<GenerationResponse<Vec<ImageResult>>> {
        let config = self.core.prepare(Capability::Image)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Image, request.model.as_deref())?;
        let body = ChatRequest {
            model: &model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: None,
            max_tokens: None,
            stream: false,
            modalities: Some(IMAGE_MODALITIES),
        };
        let url = self.chat_url(&config);

        debug!(provider = "openrouter", model = %model, "generating image");
        let started = Instant::now();
        let raw = self
            .core
            .send_with_retry(&config, |client| Self::post(client, &url, &config).json(&body))
            .await?;
        let mut parsed = parse_chat(&self.core, &raw)?;
        let message = parsed.choices.swap_remove(0).message;

        let mut references: Vec<String> =
            message.images.into_iter().map(|i| i.image_url.url).collect();
        if references.is_empty() {
            references = images_from_content(message.content.as_deref().unwrap_or_default());
        }
        if references.is_empty() {
            warn!(provider = "openrouter", model = %model, "no image found in response");
            return Err(self.core.shape_error("images", &raw));
        }

        let format = format_from_reference(&references[0])
            .unwrap_or("png")
            .to_string();
        let mut images: Vec<ImageResult> =
            references.iter().map(|r| image_from_reference(r)).collect();

        if let Some(path) = request.output_path.as_deref() {
            save_images(&mut images, path, &format)?;
        }

        Ok(GenerationResponse::new(images).with_meta(self.core.response_meta(&model, started)))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
