//! Configuration system — schema, loading, env var overrides, and the
//! store the generation core persists pricing through.
//!
//! # Usage
//! ```no_run
//! use genroute_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Text provider: {}", cfg.defaults.text_provider);
//! ```

pub mod loader;
pub mod schema;
pub mod store;

// Re-export key types
pub use loader::{get_config_path, load_config, save_config};
pub use schema::{Config, DefaultModels, ModelPricing, PricingCache, ProviderConfig};
pub use store::{ConfigStore, FileConfigStore};
