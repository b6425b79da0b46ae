//! `genroute providers` — registry discovery and credential checks.
//!
//! - `genroute providers list [--capability CAP]` — registered adapters
//! - `genroute providers info <ID>` — capabilities and default models
//! - `genroute providers check [ID]` — validate configured API keys

use anyhow::{bail, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use futures_util::future::join_all;

use genroute_core::config::ConfigStore;
use genroute_core::types::Capability;

use crate::helpers::key_status;
use crate::App;

/// Capability names accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CapabilityArg {
    Text,
    Image,
    Audio,
    Video,
    Embedding,
}

impl From<CapabilityArg> for Capability {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::Text => Capability::Text,
            CapabilityArg::Image => Capability::Image,
            CapabilityArg::Audio => Capability::Audio,
            CapabilityArg::Video => Capability::Video,
            CapabilityArg::Embedding => Capability::Embedding,
        }
    }
}

#[derive(Subcommand)]
pub enum ProvidersCommands {
    /// List registered providers
    List {
        /// Only providers supporting this capability
        #[arg(short, long, value_enum)]
        capability: Option<CapabilityArg>,
    },

    /// Show one provider's capabilities and default models
    Info {
        /// Provider id, e.g. "openai"
        id: String,
    },

    /// Validate API keys with a lightweight authenticated call
    Check {
        /// Only check this provider
        id: Option<String>,
    },
}

pub async fn dispatch(app: &App, cmd: ProvidersCommands) -> Result<()> {
    match cmd {
        ProvidersCommands::List { capability } => list(app, capability.map(Capability::from)),
        ProvidersCommands::Info { id } => info(app, &id),
        ProvidersCommands::Check { id } => check(app, id.as_deref()).await,
    }
}

fn capability_list(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(Capability::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn list(app: &App, capability: Option<Capability>) -> Result<()> {
    let ids = match capability {
        Some(cap) => app.registry.providers_supporting(cap),
        None => app.registry.list(),
    };

    if app.json {
        let entries: Vec<serde_json::Value> = ids
            .iter()
            .filter_map(|id| app.registry.describe(id))
            .map(|meta| {
                serde_json::json!({
                    "id": meta.id,
                    "displayName": meta.display_name,
                    "version": meta.version,
                    "capabilities": meta.capabilities,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!();
    println!("{}", "Providers".cyan().bold());
    println!();
    for id in ids {
        let Some(meta) = app.registry.describe(id) else {
            continue;
        };
        let configured = app
            .store
            .provider(id)
            .is_some_and(|c| c.is_configured());
        println!(
            "  {:<12} {:<16} {:<36} {}",
            id.bold(),
            meta.display_name,
            capability_list(meta.capabilities).dimmed(),
            key_status(configured)
        );
    }
    println!();
    Ok(())
}

fn info(app: &App, id: &str) -> Result<()> {
    let Some(meta) = app.registry.describe(id) else {
        bail!("unknown provider '{id}'");
    };
    let config = app.store.provider(id);
    let provider = app.registry.get(id, config.as_ref())?;

    let defaults: Vec<(Capability, String)> = meta
        .capabilities
        .iter()
        .map(|cap| {
            let model = provider
                .resolve_model(*cap, None)
                .unwrap_or_else(|_| "-".to_string());
            (*cap, model)
        })
        .collect();

    if app.json {
        let models: serde_json::Map<String, serde_json::Value> = defaults
            .iter()
            .map(|(cap, model)| (cap.to_string(), serde_json::Value::from(model.as_str())))
            .collect();
        let value = serde_json::json!({
            "id": meta.id,
            "displayName": meta.display_name,
            "version": meta.version,
            "capabilities": meta.capabilities,
            "defaultModels": models,
            "configured": config.as_ref().is_some_and(|c| c.is_configured()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("{} {}", meta.display_name.cyan().bold(), format!("v{}", meta.version).dimmed());
    println!();
    println!("  {:<14} {}", "Id:".bold(), meta.id);
    println!(
        "  {:<14} {}",
        "API key:".bold(),
        key_status(config.as_ref().is_some_and(|c| c.is_configured()))
    );
    if let Some(base) = config.as_ref().and_then(|c| c.api_base.as_deref()) {
        println!("  {:<14} {}", "API base:".bold(), base);
    }
    println!("  {}", "Default models:".bold());
    for (cap, model) in defaults {
        println!("    {:<12} {}", cap.as_str(), model);
    }
    println!();
    Ok(())
}

async fn check(app: &App, only: Option<&str>) -> Result<()> {
    let ids: Vec<&str> = match only {
        Some(id) if app.registry.is_registered(id) => vec![id],
        Some(id) => bail!("unknown provider '{id}'"),
        None => app.registry.list(),
    };

    let mut targets = Vec::new();
    for id in ids {
        match app.store.provider(id).filter(|c| c.is_configured()) {
            Some(config) => targets.push((id, app.registry.get(id, Some(&config))?)),
            None => println!("  {:<12} {}", id, key_status(false)),
        }
    }

    let results = join_all(targets.iter().map(|(id, provider)| async move {
        (*id, provider.validate_credentials().await)
    }))
    .await;

    let mut failed = 0;
    for (id, ok) in results {
        if ok {
            println!("  {:<12} {} credentials valid", id, "✓".green());
        } else {
            failed += 1;
            println!("  {:<12} {} credentials rejected or unreachable", id, "✗".red());
        }
    }

    if failed > 0 {
        bail!("{failed} provider(s) failed the credential check");
    }
    Ok(())
}
