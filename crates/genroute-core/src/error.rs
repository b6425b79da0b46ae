//! Error kinds shared by the registry, adapters, and cost guard.

use thiserror::Error;

use crate::types::Capability;

/// Every failure the generation core can surface.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("provider '{0}' is not initialized; supply a config first")]
    NotInitialized(String),

    #[error("provider '{provider}' does not support {capability} generation")]
    UnsupportedCapability {
        provider: String,
        capability: Capability,
    },

    #[error("no {capability} model available for provider '{provider}'")]
    NoModelAvailable {
        provider: String,
        capability: Capability,
    },

    /// Vendor-tagged failure: transport errors, non-2xx responses, and
    /// payloads that lack the expected shape.
    #[error("{provider} error{}: {message}", status_suffix(.status))]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error(
        "estimated cost ${estimate:.6} for '{model}' exceeds the limit of ${ceiling:.6}"
    )]
    CostLimitExceeded {
        model: String,
        estimate: f64,
        ceiling: f64,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GenError {
    /// Build a vendor-tagged error without an HTTP status.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        GenError::Provider {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Build a vendor-tagged error carrying an HTTP status.
    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        GenError::Provider {
            provider: provider.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// HTTP status, if this error came from a vendor response.
    pub fn status(&self) -> Option<u16> {
        match self {
            GenError::Provider { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, GenError>;
