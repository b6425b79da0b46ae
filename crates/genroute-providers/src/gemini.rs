//! Google Gemini adapter — `generateContent` text, Imagen images, and Veo
//! video through a long-running operation.
//!
//! Authentication is the `key` query parameter on every call, including the
//! final video download.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use genroute_core::config::ProviderConfig;
use genroute_core::media::{save_media, MediaData, SaveOptions};
use genroute_core::types::{
    Capability, GenerationResponse, ImageRequest, ImageResult, MediaResult, ProviderMeta,
    TextRequest, Usage, VideoRequest,
};
use genroute_core::{GenError, Result};

use crate::adapter::{save_images, AdapterCore, BuiltinModels};
use crate::sse::{gemini_delta, SseDecoder, TextStream};
use crate::traits::{ImageGeneration, Provider, TextGeneration, VideoGeneration};

pub static GEMINI_META: ProviderMeta = ProviderMeta {
    id: "gemini",
    display_name: "Google Gemini",
    version: "1.0.0",
    capabilities: &[Capability::Text, Capability::Image, Capability::Video],
};

static GEMINI_MODELS: BuiltinModels = &[
    (Capability::Text, &["gemini-2.0-flash", "gemini-2.5-pro"]),
    (Capability::Image, &["imagen-3.0-generate-002"]),
    (Capability::Video, &["veo-2.0-generate-001"]),
];

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_MAX_POLLS: u32 = 60;

// ─────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_text(request: &'a TextRequest) -> Self {
        let generation_config = (request.temperature.is_some() || request.max_tokens.is_some())
            .then(|| GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            });
        Self {
            contents: [Content {
                role: Some("user"),
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: request.system_prompt.as_deref().map(|text| Content {
                role: None,
                parts: [Part { text }],
            }),
            generation_config,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UsageMetadata {
    prompt_token_count: u32,
    candidates_token_count: u32,
    total_token_count: u32,
}

impl From<UsageMetadata> for Usage {
    fn from(u: UsageMetadata) -> Self {
        Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct PromptInstance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a, P: Serialize> {
    instances: [PromptInstance<'a>; 1],
    parameters: P,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagenParameters {
    sample_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VeoParameters<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<Value>,
    response: Option<Value>,
}

fn format_from_mime(mime: Option<&str>) -> &'static str {
    match mime {
        Some("image/jpeg") => "jpg",
        Some("image/webp") => "webp",
        _ => "png",
    }
}

// ─────────────────────────────────────────────
// GeminiProvider
// ─────────────────────────────────────────────

pub struct GeminiProvider {
    core: AdapterCore,
    poll_interval: Duration,
    max_polls: u32,
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self {
            core: AdapterCore::new(&GEMINI_META, GEMINI_MODELS, DEFAULT_API_BASE),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Override the retry backoff step.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.core.set_backoff_unit(unit);
        self
    }

    /// How often, and how many times, to poll a video operation.
    pub fn with_poll_interval(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn model_url(&self, config: &ProviderConfig, model: &str, action: &str) -> String {
        format!("{}/models/{}:{}", self.core.api_base(config), model, action)
    }

    /// POST a JSON body with retry and return the raw response text.
    async fn post_json<B: Serialize + Sync>(
        &self,
        config: &ProviderConfig,
        url: &str,
        body: &B,
    ) -> Result<String> {
        self
            .core
            .send_with_retry(config, |client| {
                client
                    .post(url)
                    .query(&[("key", config.api_key.as_str())])
                    .json(body)
            })
            .await
    }

    async fn get_json(&self, config: &ProviderConfig, url: &str) -> Result<String> {
        self
            .core
            .send_with_retry(config, |client| {
                client.get(url).query(&[("key", config.api_key.as_str())])
            })
            .await
    }

    /// Poll `name` until the operation reports `done`.
    async fn wait_for_operation(&self, config: &ProviderConfig, name: &str) -> Result<Operation> {
        let url = format!("{}/{}", self.core.api_base(config), name);
        for poll in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let raw = self.get_json(config, &url).await?;
            let op: Operation = self.core.parse_json(&raw)?;
            if op.done {
                debug!(provider = "gemini", operation = name, polls = poll, "operation finished");
                return Ok(op);
            }
            debug!(provider = "gemini", operation = name, poll, "operation still running");
        }
        Err(GenError::provider(
            "gemini",
            format!(
                "video operation {name} not done after {} polls",
                self.max_polls
            ),
        ))
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn meta(&self) -> &'static ProviderMeta {
        &GEMINI_META
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
                    .get(format!("{}/models", self.core.api_base(config)))
                    .query(&[("key", config.api_key.as_str())])
            })
            .await
    }

    fn as_text(&self) -> Option<&dyn TextGeneration> {
        Some(self)
    }

    fn as_image(&self) -> Option<&dyn ImageGeneration> {
        Some(self)
    }

    fn as_video(&self) -> Option<&dyn VideoGeneration> {
        Some(self)
    }
}

#[async_trait]
impl TextGeneration for GeminiProvider {
    async fn generate_text(&self, request: &TextRequest) -> Result<GenerationResponse<String>> {
        let config = self.core.prepare(Capability::Text)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Text, request.model.as_deref())?;
        let body = GenerateContentRequest::from_text(request);
        let url = self.model_url(&config, &model, "generateContent");

        debug!(provider = "gemini", model = %model, "generating text");
        let started = Instant::now();
        let raw = self.post_json(&config, &url, &body).await?;
        let parsed: GenerateContentResponse = self.core.parse_json(&raw)?;
        let Some(first) = parsed.candidates.into_iter().next() else {
            return Err(self.core.shape_error("candidates", &raw));
        };

        let text: String = first
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        Ok(GenerationResponse::new(text)
            .with_usage(parsed.usage_metadata.map(Usage::from))
            .with_meta(self.core.response_meta(&model, started)))
    }

    async fn stream_text(&self, request: &TextRequest) -> Result<TextStream> {
        let config = self.core.prepare(Capability::Text)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Text, request.model.as_deref())?;
        let body = GenerateContentRequest::from_text(request);
        let url = self.model_url(&config, &model, "streamGenerateContent");

        debug!(provider = "gemini", model = %model, "streaming text");
        let response = self
            .core
            .send_once(&config, |client| {
                client
                    .post(&url)
                    .query(&[("alt", "sse"), ("key", config.api_key.as_str())])
                    .json(&body)
            })
            .await?;

        Ok(SseDecoder::new(Box::pin(response.bytes_stream()), "gemini", gemini_delta).into_stream())
    }
}

#[async_trait]
impl ImageGeneration for GeminiProvider {
    async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<GenerationResponse<Vec<ImageResult>>> {
        let config = self.core.prepare(Capability::Image)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Image, request.model.as_deref())?;
        let body = PredictRequest {
            instances: [PromptInstance {
                prompt: &request.prompt,
            }],
            parameters: ImagenParameters {
                sample_count: request.n.unwrap_or(1),
            },
        };
        let url = self.model_url(&config, &model, "predict");

        debug!(provider = "gemini", model = %model, "generating image");
        let started = Instant::now();
        let raw = self.post_json(&config, &url, &body).await?;
        let parsed: PredictResponse = self.core.parse_json(&raw)?;
        if parsed.predictions.is_empty() {
            return Err(self.core.shape_error("predictions", &raw));
        }

        let format = format_from_mime(
            parsed
                .predictions
                .first()
                .and_then(|p| p.mime_type.as_deref()),
        );
        let mut images: Vec<ImageResult> = parsed
            .predictions
            .into_iter()
            .filter_map(|p| p.bytes_base64_encoded)
            .map(|b64| ImageResult {
                b64_json: Some(b64),
                ..Default::default()
            })
            .collect();
        if images.is_empty() {
            return Err(self.core.shape_error("predictions[].bytesBase64Encoded", &raw));
        }

        if let Some(path) = request.output_path.as_deref() {
            save_images(&mut images, path, format)?;
        }

        Ok(GenerationResponse::new(images).with_meta(self.core.response_meta(&model, started)))
    }
}

#[async_trait]
impl VideoGeneration for GeminiProvider {
    async fn generate_video(
        &self,
        request: &VideoRequest,
    ) -> Result<GenerationResponse<MediaResult>> {
        let config = self.core.prepare(Capability::Video)?;
        request.validate()?;
        let model = self.core.resolve_model(Capability::Video, request.model.as_deref())?;
        let body = PredictRequest {
            instances: [PromptInstance {
                prompt: &request.prompt,
            }],
            parameters: VeoParameters {
                aspect_ratio: request.aspect_ratio.as_deref(),
                duration_seconds: request.duration_seconds,
            },
        };
        let url = self.model_url(&config, &model, "predictLongRunning");

        let started = Instant::now();
        let raw = self.post_json(&config, &url, &body).await?;
        let submitted: Operation = self.core.parse_json(&raw)?;
        let Some(name) = submitted.name.clone() else {
            return Err(self.core.shape_error("name", &raw));
        };
        info!(
            provider = "gemini",
            model = %model,
            operation = %name,
            "video operation submitted"
        );

        let op = if submitted.done {
            submitted
        } else {
            self.wait_for_operation(&config, &name).await?
        };
        if let Some(error) = op.error {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| error.to_string());
            return Err(GenError::provider("gemini", message));
        }

        let uri = op
            .response
            .as_ref()
            .and_then(|r| r.pointer("/generateVideoResponse/generatedSamples/0/video/uri"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                let body = op.response.map(|r| r.to_string()).unwrap_or_default();
                self.core.shape_error("generatedSamples", &body)
            })?;

        debug!(provider = "gemini", uri = %uri, "downloading video");
        let bytes = self
            .core
            .send_with_retry_bytes(&config, |client| {
                client.get(&uri).query(&[("key", config.api_key.as_str())])
            })
            .await?;

        let mut media = MediaResult {
            format: "mp4".into(),
            url: Some(uri),
            size_bytes: Some(bytes.len()),
            ..Default::default()
        };
        match request.output_path.as_deref() {
            Some(path) => {
                let opts = SaveOptions::for_path(path, "video", "mp4");
                media.file_path = Some(save_media(MediaData::Bytes(bytes), &opts)?);
            }
            None => media.data = Some(bytes),
        }

        Ok(GenerationResponse::new(media).with_meta(self.core.response_meta(&model, started)))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
