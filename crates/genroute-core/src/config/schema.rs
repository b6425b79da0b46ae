//! Configuration schema.
//!
//! Hierarchy: `Config` → `ProvidersConfig`, `DefaultsConfig`, `PricingConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::Capability;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.genroute/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub defaults: DefaultsConfig,
    pub pricing: PricingConfig,
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Per-capability default models for one provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultModels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<String>,
}

impl DefaultModels {
    pub fn get(&self, capability: Capability) -> Option<&str> {
        match capability {
            Capability::Text => self.text.as_deref(),
            Capability::Image => self.image.as_deref(),
            Capability::Audio => self.audio.as_deref(),
            Capability::Video => self.video.as_deref(),
            Capability::Embedding => self.embedding.as_deref(),
        }
    }
}

/// Credentials and tunables for a single vendor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Custom API base URL (overrides the adapter default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Per-attempt timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Maximum attempts per request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Default model per capability.
    pub models: DefaultModels,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl ProviderConfig {
    /// Create a config holding only an API key.
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// All provider configurations, one per supported vendor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub gemini: ProviderConfig,
    pub openrouter: ProviderConfig,
}

impl ProvidersConfig {
    /// Get a provider config by id (e.g. `"anthropic"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openai" => Some(&self.openai),
            "anthropic" => Some(&self.anthropic),
            "gemini" => Some(&self.gemini),
            "openrouter" => Some(&self.openrouter),
            _ => None,
        }
    }

    /// Mutable lookup by id.
    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut ProviderConfig> {
        match name {
            "openai" => Some(&mut self.openai),
            "anthropic" => Some(&mut self.anthropic),
            "gemini" => Some(&mut self.gemini),
            "openrouter" => Some(&mut self.openrouter),
            _ => None,
        }
    }

    /// Provider ids known to the config file.
    pub fn names() -> &'static [&'static str] {
        &["openai", "anthropic", "gemini", "openrouter"]
    }
}

// ─────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────

/// Command defaults used when the CLI gets no explicit flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultsConfig {
    /// Provider id used per capability.
    pub text_provider: String,
    pub image_provider: String,
    pub audio_provider: String,
    pub video_provider: String,
    pub embedding_provider: String,
    /// Directory for saved media when no output path is given.
    pub output_dir: String,
    /// Cost ceiling in USD for text requests; `0` disables the guard.
    pub max_cost: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            text_provider: "openai".to_string(),
            image_provider: "openai".to_string(),
            audio_provider: "openai".to_string(),
            video_provider: "gemini".to_string(),
            embedding_provider: "openai".to_string(),
            output_dir: "./genroute-output".to_string(),
            max_cost: 0.0,
        }
    }
}

impl DefaultsConfig {
    pub fn provider_for(&self, capability: Capability) -> &str {
        match capability {
            Capability::Text => &self.text_provider,
            Capability::Image => &self.image_provider,
            Capability::Audio => &self.audio_provider,
            Capability::Video => &self.video_provider,
            Capability::Embedding => &self.embedding_provider,
        }
    }
}

// ─────────────────────────────────────────────
// Pricing
// ─────────────────────────────────────────────

/// USD per million tokens.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

/// TTL'd snapshot of per-model prices. Replaced wholesale on refresh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingCache {
    /// Epoch milliseconds of the last refresh.
    pub last_updated: i64,
    pub ttl_hours: f64,
    pub models: HashMap<String, ModelPricing>,
}

impl PricingCache {
    /// Valid iff `now - last_updated < ttl_hours * 3_600_000`.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        let ttl_ms = self.ttl_hours * 3_600_000.0;
        ((now_ms - self.last_updated) as f64) < ttl_ms
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(chrono::Utc::now().timestamp_millis())
    }
}

/// Pricing refresh settings plus the persisted cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingConfig {
    pub ttl_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<PricingCache>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24.0,
            cache: None,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_models_lookup() {
        let models = DefaultModels {
            text: Some("gpt-4o".into()),
            ..Default::default()
        };
        assert_eq!(models.get(Capability::Text), Some("gpt-4o"));
        assert_eq!(models.get(Capability::Image), None);
    }

    #[test]
    fn test_provider_config_camel_case() {
        let raw = r#"{"apiKey":"k","timeoutMs":5000,"maxRetries":2,"models":{"image":"dall-e-3"}}"#;
        let cfg: ProviderConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.api_key, "k");
        assert_eq!(cfg.timeout_ms, Some(5000));
        assert_eq!(cfg.max_retries, Some(2));
        assert_eq!(cfg.models.image.as_deref(), Some("dall-e-3"));
        assert!(cfg.is_configured());
    }

    #[test]
    fn test_get_by_name() {
        let mut providers = ProvidersConfig::default();
        providers.gemini.api_key = "g".into();
        assert_eq!(providers.get_by_name("gemini").unwrap().api_key, "g");
        assert!(providers.get_by_name("nope").is_none());
        assert_eq!(ProvidersConfig::names().len(), 4);
    }

    #[test]
    fn test_cache_stale_one_ms_past_ttl() {
        let now = 1_700_000_000_000;
        let cache = PricingCache {
            last_updated: now - 24 * 3_600_000 - 1,
            ttl_hours: 24.0,
            models: HashMap::new(),
        };
        assert!(!cache.is_valid_at(now));
    }

    #[test]
    fn test_cache_fresh_when_just_updated() {
        let now = 1_700_000_000_000;
        let cache = PricingCache {
            last_updated: now,
            ttl_hours: 24.0,
            models: HashMap::new(),
        };
        assert!(cache.is_valid_at(now));
    }

    #[test]
    fn test_cache_stale_exactly_at_ttl() {
        let now = 1_700_000_000_000;
        let cache = PricingCache {
            last_updated: now - 3_600_000,
            ttl_hours: 1.0,
            models: HashMap::new(),
        };
        assert!(!cache.is_valid_at(now));
    }

    #[test]
    fn test_defaults_provider_for() {
        let defaults = DefaultsConfig::default();
        assert_eq!(defaults.provider_for(Capability::Video), "gemini");
        assert_eq!(defaults.provider_for(Capability::Text), "openai");
        assert_eq!(defaults.max_cost, 0.0);
    }
}
