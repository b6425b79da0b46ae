//! Published per-model token prices.
//!
//! The cost guard only needs "prices by fully-qualified model id"; a
//! [`PricingSource`] provides them. The bundled source reads OpenRouter's
//! public model catalogue, which lists per-token USD prices as strings.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use genroute_core::config::ModelPricing;
use genroute_core::utils::truncate_string;
use genroute_core::{GenError, Result};

use crate::adapter::MAX_ERROR_BODY;
use crate::retry::{execute_with_retry, RetryPolicy};

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const PER_MILLION: f64 = 1_000_000.0;

#[async_trait]
pub trait PricingSource: Send + Sync {
    /// Label used in logs and errors.
    fn name(&self) -> &'static str;

    /// Prices in USD per million tokens, keyed by `vendor/model`.
    async fn fetch(&self, credential: Option<&str>) -> Result<HashMap<String, ModelPricing>>;
}

#[derive(Debug, Deserialize)]
struct CatalogueResponse {
    data: Option<Vec<CatalogueModel>>,
}

#[derive(Debug, Deserialize)]
struct CatalogueModel {
    id: String,
    pricing: Option<CataloguePricing>,
}

#[derive(Debug, Deserialize)]
struct CataloguePricing {
    prompt: Option<String>,
    completion: Option<String>,
}

/// Per-token price string → USD per million tokens. Negative or unparsable
/// prices (variable-priced routers) are dropped.
fn per_million(raw: Option<&str>) -> Option<f64> {
    let per_token: f64 = raw?.trim().parse().ok()?;
    (per_token >= 0.0).then(|| per_token * PER_MILLION)
}

/// OpenRouter `GET /models`.
pub struct OpenRouterPricingSource {
    client: Client,
    api_base: String,
    policy: RetryPolicy,
}

impl Default for OpenRouterPricingSource {
    fn default() -> Self {
        Self::new(OPENROUTER_API_BASE)
    }
}

impl OpenRouterPricingSource {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn fetch_once(&self, url: &str, credential: Option<&str>) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(key) = credential.filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GenError::provider("pricing", format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenError::provider("pricing", format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(GenError::http(
                "pricing",
                status.as_u16(),
                truncate_string(&body, MAX_ERROR_BODY),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl PricingSource for OpenRouterPricingSource {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn fetch(&self, credential: Option<&str>) -> Result<HashMap<String, ModelPricing>> {
        let url = format!("{}/models", self.api_base);
        debug!(source = self.name(), url = %url, "fetching model pricing");

        let raw = execute_with_retry(&self.policy, "pricing", || self.fetch_once(&url, credential))
            .await?;
        let parsed: CatalogueResponse = serde_json::from_str(&raw).map_err(|e| {
            GenError::provider(
                "pricing",
                format!(
                    "unexpected response ({e}): {}",
                    truncate_string(&raw, MAX_ERROR_BODY)
                ),
            )
        })?;
        let Some(models) = parsed.data else {
            return Err(GenError::provider(
                "pricing",
                format!("response missing data: {}", truncate_string(&raw, MAX_ERROR_BODY)),
            ));
        };

        let prices: HashMap<String, ModelPricing> = models
            .into_iter()
            .filter_map(|m| {
                let pricing = m.pricing?;
                Some((
                    m.id,
                    ModelPricing {
                        input: per_million(pricing.prompt.as_deref())?,
                        output: per_million(pricing.completion.as_deref())?,
                    },
                ))
            })
            .collect();

        info!(source = self.name(), models = prices.len(), "pricing fetched");
        Ok(prices)
    }
}

/// Retry policy with a short backoff, for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        timeout: std::time::Duration::from_secs(5),
        backoff_unit: std::time::Duration::from_millis(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_per_million_conversion() {
        assert!((per_million(Some("0.0000025")).unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(per_million(Some("0")), Some(0.0));
        assert_eq!(per_million(Some("-1")), None);
        assert_eq!(per_million(Some("n/a")), None);
        assert_eq!(per_million(None), None);
    }

    #[tokio::test]
    async fn test_fetch_parses_catalogue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("Authorization", "Bearer or-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {
                        "id": "openai/gpt-4o-mini",
                        "pricing": {"prompt": "0.00000015", "completion": "0.0000006"}
                    },
                    {"id": "openrouter/auto", "pricing": {"prompt": "-1", "completion": "-1"}},
                    {"id": "no/pricing"}
                ]
            })))
            .mount(&server)
            .await;

        let source = OpenRouterPricingSource::new(server.uri()).with_retry_policy(fast_policy());
        let prices = source.fetch(Some("or-key")).await.unwrap();

        assert_eq!(prices.len(), 1);
        let p = prices["openai/gpt-4o-mini"];
        assert!((p.input - 0.15).abs() < 1e-9);
        assert!((p.output - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fetch_missing_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "x"})),
            )
            .mount(&server)
            .await;

        let source = OpenRouterPricingSource::new(server.uri()).with_retry_policy(fast_policy());
        let err = source.fetch(None).await.unwrap_err();
        assert!(err.to_string().contains("missing data"));
    }

    #[tokio::test]
    async fn test_fetch_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let source = OpenRouterPricingSource::new(server.uri()).with_retry_policy(fast_policy());
        let err = source.fetch(None).await.unwrap_err();
        assert_eq!(err.status(), Some(502));
    }
}
