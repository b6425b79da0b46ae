//! Shared CLI helpers — path expansion, result printing, JSON envelopes.

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use genroute_core::types::{CostEstimate, GenerationResponse, ResponseEnvelope, ResponseMeta, Usage};
use genroute_core::utils::file_stamp;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Output path for a media result: the explicit one (tilde-expanded), else a
/// timestamped file in the configured output directory.
pub fn output_path(explicit: Option<&Path>, output_dir: &str, kind: &str, ext: &str) -> PathBuf {
    match explicit {
        Some(path) => expand_tilde(&path.to_string_lossy()),
        None => expand_tilde(output_dir).join(format!("{kind}_{}.{ext}", file_stamp())),
    }
}

/// A failure whose details are already on stdout (the `--json` envelope).
/// `main` exits non-zero for it without printing again.
#[derive(Debug, thiserror::Error)]
#[error("failure already reported in the JSON envelope")]
pub struct AlreadyReported;

/// Print `result` and turn a failure into the command's error.
///
/// With `--json` the envelope goes to stdout either way and a failure comes
/// back as [`AlreadyReported`]; without it `show` renders the payload.
pub fn emit<T, F>(
    json: bool,
    result: genroute_core::Result<GenerationResponse<T>>,
    show: F,
) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T),
{
    if json {
        let failed = result.is_err();
        let envelope = ResponseEnvelope::from(result);
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        if failed {
            return Err(AlreadyReported.into());
        }
        return Ok(());
    }

    let response = result?;
    show(&response.payload);
    print_footer(response.meta.as_ref(), response.usage.as_ref());
    Ok(())
}

/// Dimmed one-line summary: model, provider, duration, token usage.
pub fn print_footer(meta: Option<&ResponseMeta>, usage: Option<&Usage>) {
    let mut parts = Vec::new();
    if let Some(meta) = meta {
        parts.push(format!("{} via {}", meta.model, meta.provider));
        parts.push(format!("{}ms", meta.duration_ms));
    }
    if let Some(usage) = usage {
        parts.push(format!(
            "{} tokens ({} in / {} out)",
            usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
        ));
    }
    if !parts.is_empty() {
        eprintln!("{}", parts.join(" · ").dimmed());
    }
}

/// One-line cost estimate, flagged when the price was defaulted.
pub fn format_estimate(estimate: &CostEstimate) -> String {
    let mut line = format!(
        "${:.6} for {} ({} in + {} out tokens)",
        estimate.total_cost, estimate.model, estimate.input_tokens, estimate.output_tokens
    );
    if estimate.is_estimate {
        line.push_str(" [default pricing]");
    }
    line
}

pub fn print_saved(path: &Path, size_bytes: Option<usize>) {
    match size_bytes {
        Some(size) => println!("  {} saved {} ({} bytes)", "✓".green(), path.display(), size),
        None => println!("  {} saved {}", "✓".green(), path.display()),
    }
}

/// `✓ (key set)` / `· not configured`.
pub fn key_status(configured: bool) -> String {
    if configured {
        format!("{} (key set)", "✓".green())
    } else {
        format!("{}", "· not configured".dimmed())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_home() {
        let result = expand_tilde("~/foo/bar");
        assert!(result.ends_with("foo/bar"));
        assert!(!result.starts_with("~"));
    }

    #[test]
    fn expand_tilde_no_tilde() {
        let result = expand_tilde("/absolute/path");
        assert_eq!(result, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn output_path_prefers_explicit() {
        let explicit = PathBuf::from("/tmp/cat.png");
        assert_eq!(
            output_path(Some(&explicit), "./out", "image", "png"),
            explicit
        );
    }

    #[test]
    fn output_path_defaults_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(None, &dir.path().to_string_lossy(), "audio", "mp3");
        assert_eq!(path.parent(), Some(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("audio_"));
        assert!(name.ends_with(".mp3"));
    }

    #[test]
    fn format_estimate_flags_default_pricing() {
        let estimate = CostEstimate {
            model: "openai/x".into(),
            input_tokens: 10,
            output_tokens: 1000,
            input_cost: 0.0001,
            output_cost: 0.03,
            total_cost: 0.0301,
            is_estimate: true,
        };
        let line = format_estimate(&estimate);
        assert!(line.contains("$0.030100"));
        assert!(line.contains("default pricing"));
    }

    #[test]
    fn emit_propagates_failure() {
        let result: genroute_core::Result<GenerationResponse<String>> =
            Err(genroute_core::GenError::UnknownProvider("x".into()));
        let err = emit(false, result, |_| {}).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
        assert!(err.downcast_ref::<AlreadyReported>().is_none());
    }

    #[test]
    fn emit_json_failure_is_reported_once() {
        let result: genroute_core::Result<GenerationResponse<String>> =
            Err(genroute_core::GenError::UnknownProvider("x".into()));
        let err = emit(true, result, |_| panic!("payload printer must not run")).unwrap_err();
        assert!(err.downcast_ref::<AlreadyReported>().is_some());
    }

    #[test]
    fn emit_json_success_is_ok() {
        let result: genroute_core::Result<GenerationResponse<String>> =
            Ok(GenerationResponse::new("hi".to_string()));
        assert!(emit(true, result, |_| {}).is_ok());
    }
}
