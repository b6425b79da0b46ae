//! `genroute init` — write a default config file and the output directory.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use genroute_core::config::{save_config, Config};

use crate::helpers::expand_tilde;

/// Run the init command. An existing config file is left untouched.
pub fn run(config_path: &Path) -> Result<()> {
    println!();
    println!("{}", "genroute setup".cyan().bold());
    println!();

    let config = if config_path.exists() {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            config_path.display()
        );
        genroute_core::config::load_config(Some(config_path))
    } else {
        let config = Config::default();
        save_config(&config, Some(config_path))?;
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
        config
    };

    let output_dir = expand_tilde(&config.defaults.output_dir);
    std::fs::create_dir_all(&output_dir)?;
    println!("  {} output dir at {}", "✓".green(), output_dir.display());

    println!();
    println!(
        "{}",
        "  Add API keys to the config or set OPENAI_API_KEY, ANTHROPIC_API_KEY,".green()
    );
    println!(
        "{}",
        "  GEMINI_API_KEY, OPENROUTER_API_KEY; then run `genroute providers check`.".green()
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_existing_config_and_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        // Relative output dir would land in the test's cwd; point it inside the tempdir.
        let mut config = Config::default();
        config.defaults.output_dir = dir.path().join("out").to_string_lossy().to_string();
        save_config(&config, Some(&path)).unwrap();

        run(&path).unwrap();
        assert!(dir.path().join("out").is_dir());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("outputDir"));
    }
}
