//! Config loader — reads `~/.genroute/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.genroute/config.json`
//! 3. Environment variables `GENROUTE_<SECTION>__<FIELD>` (override JSON)
//! 4. Vendor env vars (`OPENAI_API_KEY`, …) for keys that are still empty

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, ProviderConfig, ProvidersConfig};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the given path (or the default one) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> Config {
    apply_env_overrides(read_config_file(path))
}

/// Parse the file only; no env overrides.
pub(crate) fn read_config_file(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `GENROUTE_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `GENROUTE_PROVIDERS__<NAME>__API_KEY` → `providers.<name>.api_key`
/// - `GENROUTE_PROVIDERS__<NAME>__API_BASE` → `providers.<name>.api_base`
/// - `GENROUTE_PROVIDERS__<NAME>__TIMEOUT_MS` → `providers.<name>.timeout_ms`
/// - `GENROUTE_PROVIDERS__<NAME>__MAX_RETRIES` → `providers.<name>.max_retries`
/// - `GENROUTE_DEFAULTS__OUTPUT_DIR` → `defaults.output_dir`
/// - `GENROUTE_DEFAULTS__MAX_COST` → `defaults.max_cost`
/// - `GENROUTE_PRICING__TTL_HOURS` → `pricing.ttl_hours`
fn apply_env_overrides(mut config: Config) -> Config {
    for name in ProvidersConfig::names() {
        if let Some(provider) = config.providers.get_by_name_mut(name) {
            apply_provider_env(provider, &name.to_uppercase());
        }
    }

    if let Ok(val) = std::env::var("GENROUTE_DEFAULTS__OUTPUT_DIR") {
        config.defaults.output_dir = val;
    }
    if let Ok(val) = std::env::var("GENROUTE_DEFAULTS__MAX_COST") {
        if let Ok(c) = val.parse::<f64>() {
            config.defaults.max_cost = c;
        }
    }
    if let Ok(val) = std::env::var("GENROUTE_PRICING__TTL_HOURS") {
        if let Ok(h) = val.parse::<f64>() {
            config.pricing.ttl_hours = h;
        }
    }

    config
}

/// Apply env var overrides for a single provider.
fn apply_provider_env(provider: &mut ProviderConfig, name: &str) {
    if let Ok(val) = std::env::var(format!("GENROUTE_PROVIDERS__{name}__API_KEY")) {
        provider.api_key = val;
    }
    if let Ok(val) = std::env::var(format!("GENROUTE_PROVIDERS__{name}__API_BASE")) {
        provider.api_base = Some(val);
    }
    if let Ok(val) = std::env::var(format!("GENROUTE_PROVIDERS__{name}__TIMEOUT_MS")) {
        if let Ok(ms) = val.parse::<u64>() {
            provider.timeout_ms = Some(ms);
        }
    }
    if let Ok(val) = std::env::var(format!("GENROUTE_PROVIDERS__{name}__MAX_RETRIES")) {
        if let Ok(n) = val.parse::<u32>() {
            provider.max_retries = Some(n);
        }
    }

    // Vendor's own variable as a last resort.
    if provider.api_key.is_empty() {
        if let Ok(val) = std::env::var(format!("{name}_API_KEY")) {
            provider.api_key = val;
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
