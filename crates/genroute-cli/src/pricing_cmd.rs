//! `genroute pricing` — pricing cache management and cost estimates.
//!
//! - `genroute pricing refresh` — fetch the catalogue and persist it
//! - `genroute pricing show [FILTER]` — cached per-model prices
//! - `genroute pricing estimate PROMPT` — estimate a text request

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use genroute_core::config::{ConfigStore, PricingCache};
use genroute_core::types::Capability;
use genroute_core::utils::now_millis;
use genroute_providers::cost::refresh_pricing;
use genroute_providers::{estimate_cost, OpenRouterPricingSource};

use crate::generate::Target;
use crate::helpers::format_estimate;
use crate::App;

#[derive(Subcommand)]
pub enum PricingCommands {
    /// Fetch current prices and replace the cache
    Refresh,

    /// Show cached prices (USD per million tokens)
    Show {
        /// Only models whose id contains this text
        filter: Option<String>,

        /// Maximum rows to print
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Estimate what a text request would cost
    Estimate {
        prompt: String,

        #[command(flatten)]
        target: Target,

        /// Expected output tokens
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}

pub async fn dispatch(app: &mut App, cmd: PricingCommands) -> Result<()> {
    match cmd {
        PricingCommands::Refresh => refresh(app).await,
        PricingCommands::Show { filter, limit } => {
            show(app, filter.as_deref(), limit);
            Ok(())
        }
        PricingCommands::Estimate {
            prompt,
            target,
            max_tokens,
        } => estimate(app, &prompt, &target, max_tokens),
    }
}

/// The catalogue source plus the OpenRouter key, if any.
///
/// A custom OpenRouter `apiBase` in the config also redirects pricing.
pub fn pricing_source(app: &App) -> (OpenRouterPricingSource, Option<String>) {
    let openrouter = app.store.provider("openrouter").unwrap_or_default();
    let source = match openrouter.api_base.as_deref() {
        Some(base) => OpenRouterPricingSource::new(base),
        None => OpenRouterPricingSource::default(),
    };
    let credential = Some(openrouter.api_key).filter(|k| !k.is_empty());
    (source, credential)
}

async fn refresh(app: &mut App) -> Result<()> {
    let (source, credential) = pricing_source(app);
    let cache = refresh_pricing(&mut app.store, &source, credential.as_deref()).await?;

    if app.json {
        println!(
            "{}",
            serde_json::json!({ "models": cache.models.len(), "lastUpdated": cache.last_updated })
        );
    } else {
        println!(
            "  {} cached prices for {} models",
            "✓".green(),
            cache.models.len()
        );
    }
    Ok(())
}

/// `fresh, 3.2h old` / `stale, 30.0h old`.
fn cache_age(cache: &PricingCache, now_ms: i64) -> String {
    let hours = (now_ms - cache.last_updated).max(0) as f64 / 3_600_000.0;
    let state = if cache.is_valid_at(now_ms) { "fresh" } else { "stale" };
    format!("{state}, {hours:.1}h old")
}

/// Cached rows matching `filter`, sorted by id.
fn matching_rows<'a>(cache: &'a PricingCache, filter: Option<&str>) -> Vec<(&'a str, f64, f64)> {
    let mut rows: Vec<_> = cache
        .models
        .iter()
        .filter(|(id, _)| filter.map_or(true, |f| id.contains(f)))
        .map(|(id, p)| (id.as_str(), p.input, p.output))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));
    rows
}

fn show(app: &App, filter: Option<&str>, limit: usize) {
    let Some(cache) = app.store.pricing_cache() else {
        println!(
            "  {} no pricing cache yet; run `genroute pricing refresh`",
            "·".dimmed()
        );
        return;
    };
    let rows = matching_rows(&cache, filter);

    if app.json {
        let models: Vec<serde_json::Value> = rows
            .iter()
            .take(limit)
            .map(|(id, input, output)| {
                serde_json::json!({ "model": id, "input": input, "output": output })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "lastUpdated": cache.last_updated,
                "valid": cache.is_valid(),
                "models": models,
            })
        );
        return;
    }

    println!();
    println!(
        "{} {}",
        "Pricing cache".cyan().bold(),
        format!("({})", cache_age(&cache, now_millis())).dimmed()
    );
    println!();
    println!("  {:<48} {:>10} {:>10}", "model".bold(), "in/1M".bold(), "out/1M".bold());
    for (id, input, output) in rows.iter().take(limit) {
        println!("  {:<48} {:>10.4} {:>10.4}", id, input, output);
    }
    if rows.len() > limit {
        println!("  {}", format!("… {} more", rows.len() - limit).dimmed());
    }
    println!();
}

fn estimate(app: &App, prompt: &str, target: &Target, max_tokens: Option<usize>) -> Result<()> {
    let provider_id = target
        .provider
        .as_deref()
        .unwrap_or_else(|| app.config().defaults.provider_for(Capability::Text));
    let config = app.store.provider(provider_id);
    let provider = app.registry.get(provider_id, config.as_ref())?;
    let model = provider.resolve_model(Capability::Text, target.model.as_deref())?;

    let cache = app.store.pricing_cache();
    let estimate = estimate_cost(prompt, provider_id, &model, max_tokens, cache.as_ref());

    if app.json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
    } else {
        println!("  {}", format_estimate(&estimate));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use genroute_core::config::ModelPricing;

    use super::*;

    fn cache_with(ids: &[&str], last_updated: i64) -> PricingCache {
        PricingCache {
            last_updated,
            ttl_hours: 24.0,
            models: ids
                .iter()
                .map(|id| (id.to_string(), ModelPricing { input: 1.0, output: 2.0 }))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn rows_are_sorted_and_filtered() {
        let cache = cache_with(&["openai/gpt-4o", "anthropic/claude", "openai/gpt-4o-mini"], 0);
        let all = matching_rows(&cache, None);
        assert_eq!(all[0].0, "anthropic/claude");
        assert_eq!(all.len(), 3);

        let openai = matching_rows(&cache, Some("openai/"));
        assert_eq!(
            openai.iter().map(|r| r.0).collect::<Vec<_>>(),
            vec!["openai/gpt-4o", "openai/gpt-4o-mini"]
        );
    }

    #[test]
    fn cache_age_reports_state() {
        let cache = cache_with(&[], 0);
        assert_eq!(cache_age(&cache, 2 * 3_600_000), "fresh, 2.0h old");
        assert_eq!(cache_age(&cache, 30 * 3_600_000), "stale, 30.0h old");
    }
}
