//! Provider layer for genroute.
//!
//! # Architecture
//!
//! - [`traits::Provider`] plus one trait per capability — the adapter contract
//! - [`adapter::AdapterCore`] — initialization, capability checks, model
//!   resolution and HTTP execution shared by every adapter
//! - [`retry`] — per-attempt timeout with linear backoff
//! - [`sse::SseDecoder`] — incremental SSE decoding for streamed text
//! - [`openai`], [`anthropic`], [`gemini`], [`openrouter`] — vendor adapters
//! - [`registry::ProviderRegistry`] — factories and live instances by id
//! - [`cost`], [`pricing`], [`tokenizer`] — pre-flight cost guard

pub mod adapter;
pub mod anthropic;
pub mod cost;
pub mod gemini;
pub mod openai;
pub mod openrouter;
pub mod pricing;
pub mod registry;
pub mod retry;
pub mod sse;
pub mod tokenizer;
pub mod traits;

// Re-export main types for convenience
pub use cost::{check_cost_limit, ensure_pricing_available, estimate_cost, CostGuard};
pub use pricing::{OpenRouterPricingSource, PricingSource};
pub use registry::ProviderRegistry;
pub use retry::{execute_with_retry, RetryPolicy};
pub use sse::{SseDecoder, TextStream};
pub use traits::{
    AudioGeneration, Embedding, ImageGeneration, Provider, TextGeneration, VideoGeneration,
};
