use thiserror::Error;

use crate::models::provider::ProviderKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Longest upstream error body kept in an error message.
const MAX_BODY_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn platform(msg: impl Into<String>) -> Self {
        Error::Platform(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}

/// Failure of a single provider, as seen by the fallback orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{0}")]
    Config(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Network(String),

    #[error("model {model} unavailable (HTTP {status}): {body}")]
    Decommissioned {
        model: String,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    EmptyResponse(String),
}

impl ProviderError {
    pub fn missing_credential(provider: ProviderKind) -> Self {
        ProviderError::Config(format!("{} api key is not configured", provider))
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ProviderError::Config(msg.into())
    }

    pub fn status(status: u16, body: impl AsRef<str>) -> Self {
        ProviderError::Status {
            status,
            body: truncate_body(body.as_ref()),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        ProviderError::Network(msg.into())
    }

    pub fn empty_response(msg: impl Into<String>) -> Self {
        ProviderError::EmptyResponse(msg.into())
    }

    /// Stable machine-readable class of the failure.
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderError::Config(_) => "config_error",
            ProviderError::Status { .. } | ProviderError::Network(_) => "transport_error",
            ProviderError::Decommissioned { .. } => "decommissioned_model",
            ProviderError::EmptyResponse(_) => "empty_response",
        }
    }

    /// `<tag>:<detail>` form embedded in client-facing error strings.
    pub fn tagged(&self) -> String {
        format!("{}:{}", self.tag(), self)
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
    truncated.push_str("...");
    truncated
}

/// Request-level failure returned by the gateway to its caller.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("rate_limited")]
    RateLimited,

    #[error("invalid_request:{0}")]
    InvalidRequest(String),

    #[error("{}_error:{}", .provider, .source.tagged())]
    Provider {
        provider: ProviderKind,
        source: ProviderError,
    },

    #[error("{}_error_no_fallback:{}", .provider, .source.tagged())]
    NoFallback {
        provider: ProviderKind,
        source: ProviderError,
    },

    #[error(
        "both_providers_failed:{}={};{}={}",
        .primary_provider, .primary.tagged(), .secondary_provider, .secondary.tagged()
    )]
    BothFailed {
        primary_provider: ProviderKind,
        primary: ProviderError,
        secondary_provider: ProviderKind,
        secondary: ProviderError,
    },

    #[error("server_error:{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        GatewayError::InvalidRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }

    /// HTTP status reflecting who is responsible: client, upstream or server.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::RateLimited => 429,
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::Provider { .. } | GatewayError::NoFallback { .. } => 502,
            GatewayError::BothFailed { .. } | GatewayError::Internal(_) => 500,
        }
    }
}
