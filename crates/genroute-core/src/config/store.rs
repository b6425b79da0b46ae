//! Config store — the narrow interface the generation core reads config
//! through and persists pricing refreshes with.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::loader::{get_config_path, load_config, save_config};
use super::schema::{Config, PricingCache, ProviderConfig};
use crate::error::{GenError, Result};

/// Read access to provider configs plus the pricing-cache write path.
pub trait ConfigStore: Send {
    /// Config for one provider id, if the store knows it.
    fn provider(&self, id: &str) -> Option<ProviderConfig>;

    /// Configured TTL for freshly fetched pricing.
    fn pricing_ttl_hours(&self) -> f64;

    fn pricing_cache(&self) -> Option<PricingCache>;

    /// Replace the cache wholesale. Not persisted until [`persist`](Self::persist).
    fn set_pricing_cache(&mut self, cache: PricingCache);

    fn persist(&self) -> Result<()>;
}

/// [`ConfigStore`] backed by the JSON config file.
#[derive(Debug)]
pub struct FileConfigStore {
    config: Config,
    path: PathBuf,
}

impl FileConfigStore {
    /// Load from `path` (or the default location), env overrides included.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
        Self {
            config: load_config(Some(&path)),
            path,
        }
    }

    pub fn from_config(config: Config, path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            path: path.into(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn provider(&self, id: &str) -> Option<ProviderConfig> {
        self.config.providers.get_by_name(id).cloned()
    }

    fn pricing_ttl_hours(&self) -> f64 {
        self.config.pricing.ttl_hours
    }

    fn pricing_cache(&self) -> Option<PricingCache> {
        self.config.pricing.cache.clone()
    }

    fn set_pricing_cache(&mut self, cache: PricingCache) {
        self.config.pricing.cache = Some(cache);
    }

    /// Writes the pricing cache back into the file on disk.
    ///
    /// The file is re-read first so env-var overrides (API keys in
    /// particular) never leak into the persisted JSON.
    fn persist(&self) -> Result<()> {
        let mut on_disk = super::loader::read_config_file(&self.path);
        on_disk.pricing.cache = self.config.pricing.cache.clone();
        save_config(&on_disk, Some(&self.path))
            .map_err(|e| {
                GenError::Config(format!("failed to persist {}: {e}", self.path.display()))
            })?;
        debug!(path = %self.path.display(), "pricing cache persisted");
        Ok(())
    }
}
