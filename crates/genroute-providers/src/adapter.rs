//! Shared adapter plumbing.
//!
//! [`AdapterCore`] holds the state every vendor adapter needs — metadata,
//! built-in models, the config set by `initialize`, the HTTP client — and
//! implements the checks and HTTP execution paths they all share. Adapters
//! embed one and delegate to it.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use genroute_core::config::ProviderConfig;
use genroute_core::media::{indexed_filename, save_media, MediaData, SaveOptions};
use genroute_core::types::{Capability, ImageResult, ProviderMeta, ResponseMeta};
use genroute_core::utils::truncate_string;
use genroute_core::{GenError, Result};

use crate::retry::{execute_with_retry, RetryPolicy, DEFAULT_BACKOFF_UNIT};

/// Raw bodies quoted in error messages are capped at this many characters.
pub const MAX_ERROR_BODY: usize = 500;

/// Built-in default models, first entry per capability wins.
pub type BuiltinModels = &'static [(Capability, &'static [&'static str])];

pub struct AdapterCore {
    meta: &'static ProviderMeta,
    builtin_models: BuiltinModels,
    default_api_base: &'static str,
    config: RwLock<Option<Arc<ProviderConfig>>>,
    client: Client,
    backoff_unit: Duration,
}

impl std::fmt::Debug for AdapterCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterCore")
            .field("provider", &self.meta.id)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl AdapterCore {
    pub fn new(
        meta: &'static ProviderMeta,
        builtin_models: BuiltinModels,
        default_api_base: &'static str,
    ) -> Self {
        Self {
            meta,
            builtin_models,
            default_api_base,
            config: RwLock::new(None),
            client: Client::new(),
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    /// Override the retry backoff step (tests use a tiny one).
    pub fn set_backoff_unit(&mut self, unit: Duration) {
        self.backoff_unit = unit;
    }

    pub fn meta(&self) -> &'static ProviderMeta {
        self.meta
    }

    pub fn id(&self) -> &'static str {
        self.meta.id
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Lifecycle ──

    /// Store `config`; a second call replaces the first.
    pub fn initialize(&self, config: Arc<ProviderConfig>) {
        let mut slot = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            debug!(provider = self.meta.id, "re-initializing provider");
        } else {
            info!(provider = self.meta.id, "provider initialized");
        }
        *slot = Some(config);
    }

    pub fn is_initialized(&self) -> bool {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The stored config, or `NotInitialized`.
    pub fn ensure_initialized(&self) -> Result<Arc<ProviderConfig>> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| GenError::NotInitialized(self.meta.id.to_string()))
    }

    pub fn ensure_capability(&self, capability: Capability) -> Result<()> {
        if self.meta.supports(capability) {
            Ok(())
        } else {
            Err(GenError::UnsupportedCapability {
                provider: self.meta.id.to_string(),
                capability,
            })
        }
    }

    /// Initialization check first, then the capability check.
    pub fn prepare(&self, capability: Capability) -> Result<Arc<ProviderConfig>> {
        let config = self.ensure_initialized()?;
        self.ensure_capability(capability)?;
        Ok(config)
    }

    /// Requested model → configured default → first built-in default.
    pub fn resolve_model(&self, capability: Capability, requested: Option<&str>) -> Result<String> {
        if let Some(model) = requested {
            return Ok(model.to_string());
        }

        let config = self.config.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(model) = config.as_ref().and_then(|c| c.models.get(capability)) {
            return Ok(model.to_string());
        }

        self.builtin_models
            .iter()
            .find(|(cap, _)| *cap == capability)
            .and_then(|(_, models)| models.first())
            .map(|m| m.to_string())
            .ok_or_else(|| GenError::NoModelAvailable {
                provider: self.meta.id.to_string(),
                capability,
            })
    }

    /// Built-in models for one capability (for `providers info`).
    pub fn builtin_models(&self, capability: Capability) -> &'static [&'static str] {
        self.builtin_models
            .iter()
            .find(|(cap, _)| *cap == capability)
            .map(|(_, models)| *models)
            .unwrap_or(&[])
    }

    // ── HTTP ──

    /// Configured base URL, else the adapter default, without a trailing slash.
    pub fn api_base(&self, config: &ProviderConfig) -> String {
        config
            .api_base
            .as_deref()
            .unwrap_or(self.default_api_base)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn retry_policy(&self, config: &ProviderConfig) -> RetryPolicy {
        RetryPolicy::from_config(config).with_backoff_unit(self.backoff_unit)
    }

    fn extra_headers(&self, config: &ProviderConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(ref extra) = config.extra_headers {
            for (key, value) in extra {
                match (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(val)) => {
                        headers.insert(name, val);
                    }
                    _ => warn!(provider = self.meta.id, header = %key, "invalid extra header"),
                }
            }
        }
        headers
    }

    /// Issue the request built by `build` through the retry executor and
    /// return the response body.
    ///
    /// Each attempt covers sending, the status check and reading the whole
    /// body, so a stalled body hits the per-attempt deadline and is retried
    /// like any other transport failure. Transport errors, timeouts and
    /// non-2xx statuses are retried; parsing the body is left to the caller.
    pub async fn send_with_retry<F>(&self, config: &ProviderConfig, build: F) -> Result<String>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.attempt_with_retry(config, build, |response| self.read_body(response))
            .await
    }

    /// [`send_with_retry`](Self::send_with_retry) for binary payloads.
    pub async fn send_with_retry_bytes<F>(
        &self,
        config: &ProviderConfig,
        build: F,
    ) -> Result<Vec<u8>>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.attempt_with_retry(config, build, |response| self.read_bytes(response))
            .await
    }

    async fn attempt_with_retry<F, R, Fut, T>(
        &self,
        config: &ProviderConfig,
        build: F,
        read: R,
    ) -> Result<T>
    where
        F: Fn(&Client) -> RequestBuilder,
        R: Fn(Response) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = self.retry_policy(config);
        let headers = self.extra_headers(config);
        let read = &read;
        execute_with_retry(&policy, self.meta.id, || {
            let request = build(&self.client).headers(headers.clone());
            async move {
                let response = self.check_status(self.transport(request.send().await)?).await?;
                read(response).await
            }
        })
        .await
    }

    /// Single attempt with the per-attempt deadline, used for streaming.
    pub async fn send_once<F>(&self, config: &ProviderConfig, build: F) -> Result<Response>
    where
        F: FnOnce(&Client) -> RequestBuilder,
    {
        let policy = self.retry_policy(config);
        let request = build(&self.client).headers(self.extra_headers(config));
        let response = tokio::time::timeout(policy.timeout, request.send())
            .await
            .map_err(|_| {
                GenError::provider(
                    self.meta.id,
                    format!("request timed out after {}ms", policy.timeout.as_millis()),
                )
            })?;
        self.check_status(self.transport(response)?).await
    }

    /// Authenticated request for `validate_credentials`. Never errors.
    pub async fn check_credentials<F>(&self, build: F) -> bool
    where
        F: FnOnce(&Client, &ProviderConfig) -> RequestBuilder,
    {
        let Ok(config) = self.ensure_initialized() else {
            return false;
        };
        match self.send_once(&config, |client| build(client, &config)).await {
            Ok(_) => true,
            Err(e) => {
                debug!(provider = self.meta.id, error = %e, "credential check failed");
                false
            }
        }
    }

    fn transport(&self, result: reqwest::Result<Response>) -> Result<Response> {
        result.map_err(|e| GenError::provider(self.meta.id, format!("request failed: {e}")))
    }

    async fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        Err(GenError::http(
            self.meta.id,
            status.as_u16(),
            truncate_string(&body, MAX_ERROR_BODY),
        ))
    }

    // ── Response parsing ──

    pub async fn read_body(&self, response: Response) -> Result<String> {
        response
            .text()
            .await
            .map_err(|e| GenError::provider(self.meta.id, format!("failed to read response: {e}")))
    }

    pub async fn read_bytes(&self, response: Response) -> Result<Vec<u8>> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| GenError::provider(self.meta.id, format!("failed to read response: {e}")))
    }

    /// Deserialize `raw`, quoting it (capped) on failure.
    pub fn parse_json<T: DeserializeOwned>(&self, raw: &str) -> Result<T> {
        serde_json::from_str(raw).map_err(|e| {
            GenError::provider(
                self.meta.id,
                format!(
                    "unexpected response ({e}): {}",
                    truncate_string(raw, MAX_ERROR_BODY)
                ),
            )
        })
    }

    /// Error for a parsed response that lacks `what`.
    pub fn shape_error(&self, what: &str, raw: &str) -> GenError {
        GenError::provider(
            self.meta.id,
            format!(
                "response missing {what}: {}",
                truncate_string(raw, MAX_ERROR_BODY)
            ),
        )
    }

    pub fn response_meta(&self, model: &str, started: Instant) -> ResponseMeta {
        ResponseMeta {
            model: model.to_string(),
            provider: self.meta.id.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Save every base64 image to `output_path`, suffixing names when there are
/// several. Images that only carry a URL are left untouched.
pub fn save_images(
    images: &mut [ImageResult],
    output_path: &Path,
    default_format: &str,
) -> Result<()> {
    let base = SaveOptions::for_path(output_path, "image", default_format);
    let name = base
        .filename
        .clone()
        .unwrap_or_else(|| format!("image.{}", base.format));
    let total = images.len();

    for (index, image) in images.iter_mut().enumerate() {
        let Some(b64) = image.b64_json.clone() else {
            continue;
        };
        let opts = SaveOptions {
            filename: Some(indexed_filename(&name, index, total)),
            ..base.clone()
        };
        image.file_path = Some(save_media(MediaData::Base64(b64), &opts)?);
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
