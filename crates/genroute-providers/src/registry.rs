//! Provider registry — factories by id plus the live adapter instances.
//!
//! The registry is an ordinary value built by the entry point and passed by
//! reference. Each id maps to at most one live adapter for the registry's
//! lifetime; the first `get` that supplies a config initializes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use genroute_core::config::ProviderConfig;
use genroute_core::types::{Capability, ProviderMeta};
use genroute_core::{GenError, Result};

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;
use crate::openrouter::OpenRouterProvider;
use crate::traits::Provider;

/// Zero-argument adapter constructor.
pub type ProviderFactory = Box<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

#[derive(Default)]
pub struct ProviderRegistry {
    factories: Vec<(String, ProviderFactory)>,
    instances: Mutex<HashMap<String, Arc<dyn Provider>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every bundled vendor adapter.
    pub fn with_builtin_providers() -> Self {
        let mut registry = Self::new();
        registry.register("openai", || Arc::new(OpenAiProvider::new()) as Arc<dyn Provider>);
        registry.register("anthropic", || {
            Arc::new(AnthropicProvider::new()) as Arc<dyn Provider>
        });
        registry.register("gemini", || Arc::new(GeminiProvider::new()) as Arc<dyn Provider>);
        registry.register("openrouter", || {
            Arc::new(OpenRouterProvider::new()) as Arc<dyn Provider>
        });
        registry
    }

    /// Install `factory` under `id`. Re-registering replaces the factory but
    /// keeps the id's position in [`list`](Self::list).
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        let id = id.into();
        let factory: ProviderFactory = Box::new(factory);
        match self.factories.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => {
                debug!(provider = %id, "replacing provider factory");
                slot.1 = factory;
            }
            None => self.factories.push((id, factory)),
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.factory(id).is_some()
    }

    fn factory(&self, id: &str) -> Option<&ProviderFactory> {
        self.factories
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, f)| f)
    }

    /// The live adapter for `id`, building (and initializing, when `config`
    /// is given) it on first use.
    ///
    /// A cached instance is returned as-is; a later config is ignored.
    pub fn get(&self, id: &str, config: Option<&ProviderConfig>) -> Result<Arc<dyn Provider>> {
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = instances.get(id) {
            return Ok(Arc::clone(existing));
        }

        let factory = self
            .factory(id)
            .ok_or_else(|| GenError::UnknownProvider(id.to_string()))?;
        let provider = factory();
        if let Some(config) = config {
            provider.initialize(Arc::new(config.clone()));
        }
        info!(provider = id, initialized = provider.is_initialized(), "provider instance created");
        instances.insert(id.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Registered ids in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.factories.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Static metadata for `id` without touching the live instances.
    pub fn describe(&self, id: &str) -> Option<&'static ProviderMeta> {
        self.factory(id).map(|factory| factory().meta())
    }

    /// Every registered id whose adapter declares `capability`.
    ///
    /// Builds a throwaway adapter per factory; meant for discovery output.
    pub fn providers_supporting(&self, capability: Capability) -> Vec<&str> {
        self.factories
            .iter()
            .filter(|(_, factory)| factory().supports(capability))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builtin_order() {
        let registry = ProviderRegistry::with_builtin_providers();
        assert_eq!(
            registry.list(),
            vec!["openai", "anthropic", "gemini", "openrouter"]
        );
    }

    #[test]
    fn test_get_returns_same_instance() {
        let registry = ProviderRegistry::with_builtin_providers();
        for id in registry.list() {
            let a = registry.get(id, None).unwrap();
            let b = registry.get(id, None).unwrap();
            assert!(Arc::ptr_eq(&a, &b), "{id}");
        }
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::with_builtin_providers();
        let err = registry.get("nope", None).err().unwrap();
        assert!(matches!(err, GenError::UnknownProvider(ref id) if id == "nope"));
        assert!(registry.describe("nope").is_none());
    }

    #[test]
    fn test_factory_runs_once_per_id() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let mut registry = ProviderRegistry::new();
        registry.register("openai", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(OpenAiProvider::new()) as Arc<dyn Provider>
        });

        for _ in 0..3 {
            registry.get("openai", None).unwrap();
        }
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_initialization_wins() {
        let registry = ProviderRegistry::with_builtin_providers();
        let first = registry
            .get("openai", Some(&ProviderConfig::with_key("first")))
            .unwrap();
        assert!(first.is_initialized());

        let again = registry
            .get("openai", Some(&ProviderConfig::with_key("second")))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_get_without_config_leaves_uninitialized() {
        let registry = ProviderRegistry::with_builtin_providers();
        assert!(!registry.get("gemini", None).unwrap().is_initialized());
    }

    #[test]
    fn test_register_overwrites_in_place() {
        let mut registry = ProviderRegistry::with_builtin_providers();
        registry.register("openai", || Arc::new(GeminiProvider::new()) as Arc<dyn Provider>);
        assert_eq!(registry.list()[0], "openai");
        assert_eq!(registry.list().len(), 4);
        assert_eq!(registry.describe("openai").unwrap().id, "gemini");
    }

    #[test]
    fn test_describe_does_not_create_instance() {
        let registry = ProviderRegistry::with_builtin_providers();
        let meta = registry.describe("anthropic").unwrap();
        assert_eq!(meta.display_name, "Anthropic");
        assert!(registry.instances.lock().unwrap().is_empty());
    }

    #[test]
    fn test_providers_supporting() {
        let registry = ProviderRegistry::with_builtin_providers();
        assert_eq!(
            registry.providers_supporting(Capability::Text),
            vec!["openai", "anthropic", "gemini", "openrouter"]
        );
        assert_eq!(registry.providers_supporting(Capability::Video), vec!["gemini"]);
        assert_eq!(registry.providers_supporting(Capability::Audio), vec!["openai"]);
        assert_eq!(registry.providers_supporting(Capability::Embedding), vec!["openai"]);
    }
}
