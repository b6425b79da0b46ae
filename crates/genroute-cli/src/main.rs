//! genroute CLI — entry point.
//!
//! # Commands
//!
//! - `genroute generate-text|generate-image|generate-audio|generate-video PROMPT`
//! - `genroute embed TEXT` — embedding vector
//! - `genroute providers list|info|check` — registry discovery and key checks
//! - `genroute pricing refresh|show|estimate` — pricing cache and cost estimates
//! - `genroute status` — configuration overview
//! - `genroute init` — write a default config file

mod generate;
mod helpers;
mod init;
mod pricing_cmd;
mod providers_cmd;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use genroute_core::config::{Config, FileConfigStore};
use genroute_providers::ProviderRegistry;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// genroute — one command line for text, image, audio and video generation
#[derive(Parser)]
#[command(name = "genroute", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Print results as a JSON envelope
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Config file (defaults to ~/.genroute/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate text from a prompt
    GenerateText(generate::TextArgs),

    /// Generate one or more images
    GenerateImage(generate::ImageArgs),

    /// Synthesize speech from text
    GenerateAudio(generate::AudioArgs),

    /// Generate a video clip
    GenerateVideo(generate::VideoArgs),

    /// Compute an embedding vector
    Embed(generate::EmbedArgs),

    /// Inspect registered providers
    Providers {
        #[command(subcommand)]
        action: providers_cmd::ProvidersCommands,
    },

    /// Manage the pricing cache
    Pricing {
        #[command(subcommand)]
        action: pricing_cmd::PricingCommands,
    },

    /// Show configuration and provider status
    Status,

    /// Write a default config file
    Init,
}

// ─────────────────────────────────────────────
// Shared command context
// ─────────────────────────────────────────────

/// State every command runs against: the loaded config store and the
/// provider registry.
pub struct App {
    pub store: FileConfigStore,
    pub registry: ProviderRegistry,
    pub json: bool,
}

impl App {
    pub fn config(&self) -> &Config {
        self.store.config()
    }
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        if e.downcast_ref::<helpers::AlreadyReported>().is_none() {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut app = App {
        store: FileConfigStore::load(cli.config.as_deref()),
        registry: ProviderRegistry::with_builtin_providers(),
        json: cli.json,
    };

    match cli.command {
        Commands::GenerateText(args) => generate::text(&mut app, args).await,
        Commands::GenerateImage(args) => generate::image(&app, args).await,
        Commands::GenerateAudio(args) => generate::audio(&app, args).await,
        Commands::GenerateVideo(args) => generate::video(&app, args).await,
        Commands::Embed(args) => generate::embed(&app, args).await,
        Commands::Providers { action } => providers_cmd::dispatch(&app, action).await,
        Commands::Pricing { action } => pricing_cmd::dispatch(&mut app, action).await,
        Commands::Status => status::run(&app),
        Commands::Init => init::run(app.store.path()),
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("genroute=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
