//! Provider traits — the capability-oriented contract every vendor adapter
//! implements.
//!
//! A [`Provider`] declares its capabilities in [`ProviderMeta`] and exposes
//! the matching capability traits through the `as_*` accessors. Accessors for
//! capabilities an adapter does not implement return `None`; callers check
//! both [`Provider::supports`] and the accessor before invoking anything.

use std::sync::Arc;

use async_trait::async_trait;

use genroute_core::config::ProviderConfig;
use genroute_core::types::{
    AudioRequest, Capability, EmbeddingRequest, GenerationResponse, ImageRequest, ImageResult,
    MediaResult, ProviderMeta, TextRequest, VideoRequest,
};
use genroute_core::Result;

use crate::sse::TextStream;

/// A vendor adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static metadata: id, display name, version, capabilities.
    fn meta(&self) -> &'static ProviderMeta;

    /// Whether the adapter declares `capability`.
    fn supports(&self, capability: Capability) -> bool {
        self.meta().supports(capability)
    }

    /// Store the config. Calling again replaces it; never fails.
    fn initialize(&self, config: Arc<ProviderConfig>);

    fn is_initialized(&self) -> bool;

    /// Model to use: requested → configured default → built-in default.
    fn resolve_model(&self, capability: Capability, requested: Option<&str>) -> Result<String>;

    /// Lightweight authenticated call. Any failure reports `false`.
    async fn validate_credentials(&self) -> bool;

    fn as_text(&self) -> Option<&dyn TextGeneration> {
        None
    }

    fn as_image(&self) -> Option<&dyn ImageGeneration> {
        None
    }

    fn as_audio(&self) -> Option<&dyn AudioGeneration> {
        None
    }

    fn as_video(&self) -> Option<&dyn VideoGeneration> {
        None
    }

    fn as_embedding(&self) -> Option<&dyn Embedding> {
        None
    }
}

#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate_text(&self, request: &TextRequest) -> Result<GenerationResponse<String>>;

    /// Single attempt, no retry; the returned stream yields text deltas.
    async fn stream_text(&self, request: &TextRequest) -> Result<TextStream>;
}

#[async_trait]
pub trait ImageGeneration: Send + Sync {
    async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<GenerationResponse<Vec<ImageResult>>>;
}

#[async_trait]
pub trait AudioGeneration: Send + Sync {
    async fn generate_audio(
        &self,
        request: &AudioRequest,
    ) -> Result<GenerationResponse<MediaResult>>;
}

#[async_trait]
pub trait VideoGeneration: Send + Sync {
    async fn generate_video(
        &self,
        request: &VideoRequest,
    ) -> Result<GenerationResponse<MediaResult>>;
}

#[async_trait]
pub trait Embedding: Send + Sync {
    async fn embed(&self, request: &EmbeddingRequest) -> Result<GenerationResponse<Vec<Vec<f32>>>>;
}
