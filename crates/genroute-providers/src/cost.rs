//! Pre-flight cost estimation and the spending guard.
//!
//! An estimate prices the tokenized prompt plus an assumed completion length
//! against the cached per-model prices. Unknown models fall back to
//! [`DEFAULT_PRICING`] and are flagged as estimates. The guard runs before
//! any vendor call and is never retried.

use tracing::{debug, info, warn};

use genroute_core::config::{ConfigStore, ModelPricing, PricingCache};
use genroute_core::types::CostEstimate;
use genroute_core::utils::now_millis;
use genroute_core::{GenError, Result};

use crate::pricing::PricingSource;
use crate::tokenizer::count_tokens;

/// USD per million tokens assumed for models missing from the cache.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input: 10.0,
    output: 30.0,
};

/// Completion length assumed when the request sets no `max_tokens`.
pub const DEFAULT_OUTPUT_TOKENS: usize = 1000;

const PER_MILLION: f64 = 1_000_000.0;

/// Cache key for `model` served by `provider`: `vendor/model`.
///
/// Ids that already carry a vendor prefix (OpenRouter style) are kept as-is.
pub fn qualified_model_id(provider: &str, model: &str) -> String {
    if model.contains('/') {
        return model.to_string();
    }
    let vendor = match provider {
        "gemini" => "google",
        other => other,
    };
    format!("{vendor}/{model}")
}

/// `id` without a trailing release date (`-20250514` or `-2024-08-06`).
///
/// Vendors pin dated snapshots while the catalogue lists the undated alias.
fn without_date_suffix(id: &str) -> Option<&str> {
    let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
    let (head, last) = id.rsplit_once('-')?;
    if digits(last, 8) {
        return Some(head);
    }
    let (head, month) = head.rsplit_once('-')?;
    let (head, year) = head.rsplit_once('-')?;
    (digits(year, 4) && digits(month, 2) && digits(last, 2)).then_some(head)
}

/// Cached price for `qualified_id` (or its undated alias), else the default.
/// The flag is `true` when the default was used.
pub fn lookup_pricing(cache: Option<&PricingCache>, qualified_id: &str) -> (ModelPricing, bool) {
    let found = cache.and_then(|c| {
        c.models.get(qualified_id).or_else(|| {
            without_date_suffix(qualified_id).and_then(|alias| c.models.get(alias))
        })
    });
    match found {
        Some(pricing) => (*pricing, false),
        None => (DEFAULT_PRICING, true),
    }
}

/// Price known token counts.
pub fn price_tokens(
    model: &str,
    input_tokens: usize,
    output_tokens: usize,
    pricing: ModelPricing,
    is_estimate: bool,
) -> CostEstimate {
    let input_cost = input_tokens as f64 * pricing.input / PER_MILLION;
    let output_cost = output_tokens as f64 * pricing.output / PER_MILLION;
    CostEstimate {
        model: model.to_string(),
        input_tokens,
        output_tokens,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
        is_estimate,
    }
}

/// Estimate the cost of sending `prompt` to `provider`'s `model`.
pub fn estimate_cost(
    prompt: &str,
    provider: &str,
    model: &str,
    output_tokens: Option<usize>,
    cache: Option<&PricingCache>,
) -> CostEstimate {
    let qualified = qualified_model_id(provider, model);
    let (pricing, is_estimate) = lookup_pricing(cache, &qualified);
    let input_tokens = count_tokens(prompt, model);
    let estimate = price_tokens(
        &qualified,
        input_tokens,
        output_tokens.unwrap_or(DEFAULT_OUTPUT_TOKENS),
        pricing,
        is_estimate,
    );
    debug!(
        model = %qualified,
        input_tokens,
        output_tokens = estimate.output_tokens,
        total = estimate.total_cost,
        is_estimate,
        "cost estimated"
    );
    estimate
}

/// Fail with `CostLimitExceeded` when `ceiling > 0` and the estimate is
/// above it. A ceiling of zero means unlimited.
pub fn check_cost_limit(estimate: &CostEstimate, ceiling: f64) -> Result<()> {
    if ceiling > 0.0 && estimate.total_cost > ceiling {
        warn!(
            model = %estimate.model,
            estimate = estimate.total_cost,
            ceiling,
            "cost limit exceeded"
        );
        return Err(GenError::CostLimitExceeded {
            model: estimate.model.clone(),
            estimate: estimate.total_cost,
            ceiling,
        });
    }
    Ok(())
}

/// Fetch fresh prices, replace the cache wholesale and persist it.
pub async fn refresh_pricing(
    store: &mut dyn ConfigStore,
    source: &dyn PricingSource,
    credential: Option<&str>,
) -> Result<PricingCache> {
    let models = source.fetch(credential).await?;
    let cache = PricingCache {
        last_updated: now_millis(),
        ttl_hours: store.pricing_ttl_hours(),
        models,
    };
    store.set_pricing_cache(cache.clone());
    store.persist()?;
    info!(source = source.name(), models = cache.models.len(), "pricing cache refreshed");
    Ok(cache)
}

/// The cached prices when still valid, otherwise a refreshed snapshot.
pub async fn ensure_pricing_available(
    store: &mut dyn ConfigStore,
    source: &dyn PricingSource,
    credential: Option<&str>,
) -> Result<PricingCache> {
    if let Some(cache) = store.pricing_cache().filter(|c| c.is_valid()) {
        debug!(models = cache.models.len(), "pricing cache is fresh");
        return Ok(cache);
    }
    refresh_pricing(store, source, credential).await
}

/// Estimate + ceiling check for one request.
#[derive(Clone, Debug)]
pub struct CostGuard {
    ceiling: f64,
}

impl CostGuard {
    pub fn new(ceiling: f64) -> Self {
        Self { ceiling }
    }

    /// Whether any ceiling is set.
    pub fn is_active(&self) -> bool {
        self.ceiling > 0.0
    }

    /// Estimate the request and reject it if it is over the ceiling.
    pub fn check(
        &self,
        prompt: &str,
        provider: &str,
        model: &str,
        output_tokens: Option<usize>,
        cache: Option<&PricingCache>,
    ) -> Result<CostEstimate> {
        let estimate = estimate_cost(prompt, provider, model, output_tokens, cache);
        check_cost_limit(&estimate, self.ceiling)?;
        Ok(estimate)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
