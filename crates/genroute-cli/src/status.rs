//! `genroute status` — show configuration and provider status.
//!
//! - Config path, output directory, cost ceiling
//! - Default provider per capability
//! - API key status per registered provider
//! - Pricing cache freshness

use anyhow::Result;
use colored::Colorize;

use genroute_core::config::ConfigStore;
use genroute_core::types::Capability;

use crate::helpers::{expand_tilde, key_status};
use crate::App;

fn found(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}

/// Run the status command.
pub fn run(app: &App) -> Result<()> {
    let config = app.config();
    let config_path = app.store.path();

    if app.json {
        let defaults: serde_json::Map<String, serde_json::Value> = Capability::ALL
            .iter()
            .map(|cap| {
                (
                    cap.to_string(),
                    serde_json::Value::from(config.defaults.provider_for(*cap)),
                )
            })
            .collect();
        let providers: serde_json::Map<String, serde_json::Value> = app
            .registry
            .list()
            .into_iter()
            .map(|id| {
                let configured = app.store.provider(id).is_some_and(|c| c.is_configured());
                (id.to_string(), serde_json::Value::from(configured))
            })
            .collect();
        let cache = app.store.pricing_cache();
        let value = serde_json::json!({
            "configPath": config_path.display().to_string(),
            "configExists": config_path.exists(),
            "outputDir": config.defaults.output_dir,
            "maxCost": config.defaults.max_cost,
            "defaultProviders": defaults,
            "providers": providers,
            "pricingCache": cache.map(|c| serde_json::json!({
                "models": c.models.len(),
                "valid": c.is_valid(),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("{}", "genroute status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        found(config_path.exists())
    );

    let output_dir = expand_tilde(&config.defaults.output_dir);
    println!(
        "  {:<18} {} {}",
        "Output dir:".bold(),
        output_dir.display(),
        found(output_dir.exists())
    );

    let ceiling = if config.defaults.max_cost > 0.0 {
        format!("${:.4}", config.defaults.max_cost)
    } else {
        "unlimited".dimmed().to_string()
    };
    println!("  {:<18} {}", "Max cost:".bold(), ceiling);

    println!();
    println!("  {}", "Defaults:".bold());
    for cap in Capability::ALL {
        println!("    {:<20} {}", cap.as_str(), config.defaults.provider_for(cap));
    }

    println!();
    println!("  {}", "Providers:".bold());
    for id in app.registry.list() {
        let name = app.registry.describe(id).map_or(id, |m| m.display_name);
        let configured = app.store.provider(id).is_some_and(|c| c.is_configured());
        println!("    {:<20} {}", name, key_status(configured));
    }

    println!();
    let pricing = match app.store.pricing_cache() {
        Some(cache) if cache.is_valid() => {
            format!("{} {} models", "✓".green(), cache.models.len())
        }
        Some(cache) => format!("{} {} models (stale)", "!".yellow(), cache.models.len()),
        None => format!("{}", "· empty".dimmed()),
    };
    println!("  {:<18} {}", "Pricing cache:".bold(), pricing);
    println!();

    Ok(())
}
