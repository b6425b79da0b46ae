//! `genroute generate-*` and `genroute embed` — capability commands.
//!
//! Each command picks a provider (flag → configured default), fetches the
//! live adapter from the registry and calls the matching capability trait.
//! Text requests go through the cost guard first when a ceiling is set.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;
use tracing::{info, warn};

use genroute_core::config::ConfigStore;
use genroute_core::types::{
    AudioRequest, Capability, CostEstimate, EmbeddingRequest, ImageRequest, TextRequest,
    VideoRequest,
};
use genroute_core::GenError;
use genroute_providers::{ensure_pricing_available, CostGuard, Provider};

use crate::helpers::{emit, format_estimate, output_path, print_saved};
use crate::pricing_cmd::pricing_source;
use crate::App;

// ─────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────

/// Provider/model selection shared by every command.
#[derive(Args, Clone, Debug)]
pub struct Target {
    /// Provider id (defaults to the configured one for this capability)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model id (defaults to the provider's configured or built-in default)
    #[arg(short, long)]
    pub model: Option<String>,
}

#[derive(Args, Debug)]
pub struct TextArgs {
    pub prompt: String,

    #[command(flatten)]
    pub target: Target,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    #[arg(short, long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print tokens as they arrive
    #[arg(long, default_value_t = false)]
    pub stream: bool,

    /// Cost ceiling in USD for this request (0 disables the guard)
    #[arg(long)]
    pub max_cost: Option<f64>,
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    pub prompt: String,

    #[command(flatten)]
    pub target: Target,

    /// e.g. 1024x1024
    #[arg(long)]
    pub size: Option<String>,

    #[arg(long)]
    pub quality: Option<String>,

    #[arg(long)]
    pub style: Option<String>,

    /// Number of images
    #[arg(short = 'n', long = "count")]
    pub n: Option<u32>,

    /// Output file; several images get _0, _1, … suffixes
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AudioArgs {
    /// Text to speak
    pub text: String,

    #[command(flatten)]
    pub target: Target,

    #[arg(long)]
    pub voice: Option<String>,

    /// Container format, e.g. mp3, wav, opus
    #[arg(long)]
    pub format: Option<String>,

    #[arg(long)]
    pub speed: Option<f64>,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VideoArgs {
    pub prompt: String,

    #[command(flatten)]
    pub target: Target,

    /// e.g. 16:9
    #[arg(long)]
    pub aspect_ratio: Option<String>,

    /// Clip length in seconds
    #[arg(long)]
    pub duration: Option<u32>,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EmbedArgs {
    pub text: String,

    #[command(flatten)]
    pub target: Target,
}

// ─────────────────────────────────────────────
// Provider selection
// ─────────────────────────────────────────────

/// Live adapter for `capability`, initialized from the config store.
pub fn select_provider(
    app: &App,
    capability: Capability,
    requested: Option<&str>,
) -> Result<(String, Arc<dyn Provider>)> {
    let id = requested
        .unwrap_or_else(|| app.config().defaults.provider_for(capability))
        .to_string();
    let config = app.store.provider(&id);
    let provider = app.registry.get(&id, config.as_ref())?;

    if !provider.supports(capability) {
        return Err(GenError::UnsupportedCapability {
            provider: id,
            capability,
        }
        .into());
    }
    info!(provider = %id, %capability, "provider selected");
    Ok((id, provider))
}

fn unsupported(id: &str, capability: Capability) -> GenError {
    GenError::UnsupportedCapability {
        provider: id.to_string(),
        capability,
    }
}

// ─────────────────────────────────────────────
// Cost guard
// ─────────────────────────────────────────────

/// Estimate the request and fail if it is over `ceiling`.
///
/// A pricing refresh failure is not fatal: the stale cache (or the default
/// prices) is used instead.
pub async fn guard_cost(
    app: &mut App,
    provider_id: &str,
    model: &str,
    request: &TextRequest,
    ceiling: f64,
) -> Result<CostEstimate> {
    let (source, credential) = pricing_source(app);
    let refreshed =
        ensure_pricing_available(&mut app.store, &source, credential.as_deref()).await;
    let cache = match refreshed {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(error = %e, "pricing refresh failed, using cached prices");
            eprintln!(
                "{} pricing refresh failed ({e}); using cached or default prices",
                "!".yellow()
            );
            app.store.pricing_cache()
        }
    };

    let prompt = match request.system_prompt.as_deref() {
        Some(system) => format!("{system}\n{}", request.prompt),
        None => request.prompt.clone(),
    };
    let estimate = CostGuard::new(ceiling).check(
        &prompt,
        provider_id,
        model,
        request.max_tokens.map(|t| t as usize),
        cache.as_ref(),
    )?;
    info!(estimate = estimate.total_cost, ceiling, "cost within limit");
    Ok(estimate)
}

// ─────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────

pub async fn text(app: &mut App, args: TextArgs) -> Result<()> {
    let (id, provider) = select_provider(app, Capability::Text, args.target.provider.as_deref())?;
    let generator = provider
        .as_text()
        .ok_or_else(|| unsupported(&id, Capability::Text))?;

    let request = TextRequest {
        prompt: args.prompt,
        model: args.target.model,
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        system_prompt: args.system,
    };

    let ceiling = args.max_cost.unwrap_or(app.config().defaults.max_cost);
    if ceiling > 0.0 {
        let model = provider.resolve_model(Capability::Text, request.model.as_deref())?;
        let estimate = guard_cost(app, &id, &model, &request, ceiling).await?;
        if !app.json {
            eprintln!("{} {}", "estimate:".dimmed(), format_estimate(&estimate).dimmed());
        }
    }

    if args.stream {
        let mut stream = generator.stream_text(&request).await?;
        let mut stdout = std::io::stdout();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            write!(stdout, "{chunk}").context("failed to write to stdout")?;
            stdout.flush().context("failed to flush stdout")?;
        }
        println!();
        return Ok(());
    }

    let result = generator.generate_text(&request).await;
    emit(app.json, result, |text| println!("{text}"))
}

pub async fn image(app: &App, args: ImageArgs) -> Result<()> {
    let (id, provider) = select_provider(app, Capability::Image, args.target.provider.as_deref())?;
    let generator = provider
        .as_image()
        .ok_or_else(|| unsupported(&id, Capability::Image))?;

    let request = ImageRequest {
        prompt: args.prompt,
        model: args.target.model,
        size: args.size,
        quality: args.quality,
        style: args.style,
        n: args.n,
        output_path: Some(output_path(
            args.output.as_deref(),
            &app.config().defaults.output_dir,
            "image",
            "png",
        )),
    };

    let result = generator.generate_image(&request).await.map(|mut resp| {
        // Saved images don't need their base64 echoed back.
        for image in resp.payload.iter_mut().filter(|i| i.file_path.is_some()) {
            image.b64_json = None;
        }
        resp
    });
    emit(app.json, result, |images| {
        for image in images {
            match (&image.file_path, &image.url) {
                (Some(path), _) => print_saved(path, None),
                (None, Some(url)) => println!("  {} {}", "→".cyan(), url),
                (None, None) => {}
            }
            if let Some(revised) = &image.revised_prompt {
                println!("    {}", revised.dimmed());
            }
        }
    })
}

pub async fn audio(app: &App, args: AudioArgs) -> Result<()> {
    let (id, provider) = select_provider(app, Capability::Audio, args.target.provider.as_deref())?;
    let generator = provider
        .as_audio()
        .ok_or_else(|| unsupported(&id, Capability::Audio))?;

    let ext = args.format.clone().unwrap_or_else(|| "mp3".to_string());
    let request = AudioRequest {
        prompt: args.text,
        model: args.target.model,
        voice: args.voice,
        format: args.format,
        speed: args.speed,
        output_path: Some(output_path(
            args.output.as_deref(),
            &app.config().defaults.output_dir,
            "audio",
            &ext,
        )),
    };

    let result = generator.generate_audio(&request).await;
    emit(app.json, result, |media| {
        if let Some(path) = &media.file_path {
            print_saved(path, media.size_bytes);
        }
    })
}

pub async fn video(app: &App, args: VideoArgs) -> Result<()> {
    let (id, provider) = select_provider(app, Capability::Video, args.target.provider.as_deref())?;
    let generator = provider
        .as_video()
        .ok_or_else(|| unsupported(&id, Capability::Video))?;

    let request = VideoRequest {
        prompt: args.prompt,
        model: args.target.model,
        aspect_ratio: args.aspect_ratio,
        duration_seconds: args.duration,
        output_path: Some(output_path(
            args.output.as_deref(),
            &app.config().defaults.output_dir,
            "video",
            "mp4",
        )),
    };

    if !app.json {
        eprintln!("{}", "video generation can take a few minutes…".dimmed());
    }
    let result = generator.generate_video(&request).await;
    emit(app.json, result, |media| {
        if let Some(path) = &media.file_path {
            print_saved(path, media.size_bytes);
        }
    })
}

pub async fn embed(app: &App, args: EmbedArgs) -> Result<()> {
    let (id, provider) =
        select_provider(app, Capability::Embedding, args.target.provider.as_deref())?;
    let generator = provider
        .as_embedding()
        .ok_or_else(|| unsupported(&id, Capability::Embedding))?;

    let request = EmbeddingRequest {
        prompt: args.text,
        model: args.target.model,
    };

    let result = generator.embed(&request).await;
    emit(app.json, result, |vectors| {
        for vector in vectors {
            let preview: Vec<String> = vector.iter().take(6).map(|v| format!("{v:.4}")).collect();
            println!(
                "  {} {} dims [{}, …]",
                "✓".green(),
                vector.len(),
                preview.join(", ")
            );
        }
    })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use genroute_core::config::{Config, FileConfigStore};
    use genroute_providers::ProviderRegistry;

    fn app(config: Config) -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::from_config(config, dir.path().join("config.json"));
        let app = App {
            store,
            registry: ProviderRegistry::with_builtin_providers(),
            json: false,
        };
        (dir, app)
    }

    #[test]
    fn test_select_uses_configured_default() {
        let mut config = Config::default();
        config.defaults.text_provider = "anthropic".into();
        config.providers.anthropic.api_key = "k".into();
        let (_dir, app) = app(config);

        let (id, provider) = select_provider(&app, Capability::Text, None).unwrap();
        assert_eq!(id, "anthropic");
        assert!(provider.is_initialized());
    }

    #[test]
    fn test_select_rejects_unsupported_capability() {
        let (_dir, app) = app(Config::default());
        let err = select_provider(&app, Capability::Video, Some("anthropic"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not support video"));
    }

    #[test]
    fn test_select_unknown_provider() {
        let (_dir, app) = app(Config::default());
        let err = select_provider(&app, Capability::Text, Some("acme"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown provider 'acme'"));
    }

    #[tokio::test]
    async fn test_guard_uses_fresh_cache_and_rejects_over_ceiling() {
        let mut config = Config::default();
        config.pricing.cache = Some(genroute_core::config::PricingCache {
            last_updated: genroute_core::utils::now_millis(),
            ttl_hours: 24.0,
            models: [(
                "openai/gpt-4o".to_string(),
                genroute_core::config::ModelPricing {
                    input: 5.0,
                    output: 15.0,
                },
            )]
            .into_iter()
            .collect(),
        });
        let (_dir, mut app) = app(config);

        let request = TextRequest {
            max_tokens: Some(1000),
            ..TextRequest::new("hello")
        };
        let err = guard_cost(&mut app, "openai", "gpt-4o", &request, 0.01)
            .await
            .unwrap_err();
        let gen_err = err.downcast_ref::<GenError>().unwrap();
        assert!(matches!(gen_err, GenError::CostLimitExceeded { .. }));

        let ok = guard_cost(&mut app, "openai", "gpt-4o", &request, 1.0)
            .await
            .unwrap();
        assert!(!ok.is_estimate);
    }
}
