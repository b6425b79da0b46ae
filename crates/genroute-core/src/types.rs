//! Capability model — the shared vocabulary every vendor adapter speaks.
//!
//! Requests and responses here are vendor-neutral. Each adapter translates
//! them to and from its own wire format.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{GenError, Result};

// ─────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────

/// A generation modality an adapter may support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Text,
    Image,
    Audio,
    Video,
    Embedding,
}

impl Capability {
    /// Every capability, in display order.
    pub const ALL: [Capability; 5] = [
        Capability::Text,
        Capability::Image,
        Capability::Audio,
        Capability::Video,
        Capability::Embedding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Image => "image",
            Capability::Audio => "audio",
            Capability::Video => "video",
            Capability::Embedding => "embedding",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one adapter type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderMeta {
    /// Registry identifier (e.g. `"openai"`).
    pub id: &'static str,
    /// Human-readable name for output.
    pub display_name: &'static str,
    /// Adapter version.
    pub version: &'static str,
    /// Capabilities this adapter declares.
    pub capabilities: &'static [Capability],
}

impl ProviderMeta {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

// ─────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────

fn require_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(GenError::InvalidRequest("prompt must not be empty".into()));
    }
    Ok(())
}

/// Text generation request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TextRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_prompt(&self.prompt)
    }
}

/// Image generation request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: Option<String>,
    /// e.g. `"1024x1024"`.
    pub size: Option<String>,
    pub quality: Option<String>,
    pub style: Option<String>,
    /// Number of images to generate.
    pub n: Option<u32>,
    pub output_path: Option<PathBuf>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_prompt(&self.prompt)
    }
}

/// Text-to-speech request. `prompt` is the text to speak.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AudioRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub voice: Option<String>,
    /// Output container, e.g. `"mp3"`.
    pub format: Option<String>,
    pub speed: Option<f64>,
    pub output_path: Option<PathBuf>,
}

impl AudioRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_prompt(&self.prompt)
    }
}

/// Video generation request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VideoRequest {
    pub prompt: String,
    pub model: Option<String>,
    /// e.g. `"16:9"`.
    pub aspect_ratio: Option<String>,
    pub duration_seconds: Option<u32>,
    pub output_path: Option<PathBuf>,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_prompt(&self.prompt)
    }
}

/// Embedding request. `prompt` is the text to embed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub prompt: String,
    pub model: Option<String>,
}

impl EmbeddingRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_prompt(&self.prompt)
    }
}

// ─────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────

/// Token usage reported by the vendor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Where a response came from and how long it took.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub model: String,
    pub provider: String,
    pub duration_ms: u64,
}

/// One generated image. At least one of `url`, `b64_json`, `file_path` is set.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

/// A single generated audio or video artifact.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaResult {
    /// Container format (e.g. `"mp3"`, `"mp4"`).
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Size of the downloaded payload, when one was downloaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<usize>,
    /// Raw bytes, kept in memory only when not saved to disk.
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

/// A successful generation. Failures travel as the `Err` side of [`Result`].
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct GenerationResponse<T> {
    pub payload: T,
    pub usage: Option<Usage>,
    pub meta: Option<ResponseMeta>,
}

impl<T> GenerationResponse<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            usage: None,
            meta: None,
        }
    }

    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Serialized outcome of one generation call.
///
/// Only built from a `Result`, so `success == true` always carries `data`
/// and `success == false` always carries `error` and no `data`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl<T> From<Result<GenerationResponse<T>>> for ResponseEnvelope<T> {
    fn from(result: Result<GenerationResponse<T>>) -> Self {
        match result {
            Ok(resp) => ResponseEnvelope {
                success: true,
                data: Some(resp.payload),
                error: None,
                usage: resp.usage,
                meta: resp.meta,
            },
            Err(e) => ResponseEnvelope {
                success: false,
                data: None,
                error: Some(e.to_string()),
                usage: None,
                meta: None,
            },
        }
    }
}

// ─────────────────────────────────────────────
// Cost estimation
// ─────────────────────────────────────────────

/// Pre-flight cost estimate for one request. Prices are USD.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    /// `true` when pricing was defaulted rather than looked up.
    pub is_estimate: bool,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
