use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::provider::ProviderKind;
use crate::models::rate_limiter::RateLimiterConfig;
use crate::models::resolver::ModelSelection;
use crate::models::{gemini, groq};
use crate::platform::AppPaths;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "chatrelay.toml";
pub const ENV_PREFIX: &str = "CHATRELAY";

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub rate_limiting: RateLimitingConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed browser origins; empty allows any origin.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            cors_origins: Vec::new(),
            request_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub groq: ProviderConfig,
    pub gemini: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Groq => &self.groq,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Groq => &mut self.groq,
            ProviderKind::Gemini => &mut self.gemini,
        }
    }
}

/// Per-provider overrides. Unset fields use the provider's built-ins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_models: Option<Vec<String>>,
}

impl ProviderConfig {
    /// Blank keys count as missing.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    pub fn base_url(&self, kind: ProviderKind) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            match kind {
                ProviderKind::Groq => groq::DEFAULT_BASE_URL,
                ProviderKind::Gemini => gemini::DEFAULT_BASE_URL,
            }
            .to_string()
        })
    }

    pub fn selection(&self, kind: ProviderKind) -> ModelSelection {
        let mut selection = ModelSelection::builtin(kind);
        if let Some(model) = &self.default_model {
            selection.default_model = model.trim().to_string();
        }
        if let Some(models) = &self.speed_models {
            selection.speed = models.clone();
        }
        if let Some(models) = &self.quality_models {
            selection.quality = models.clone();
        }
        selection
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub window_secs: u64,
    pub max_requests: u32,
    pub ttl_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 600,
            max_requests: 60,
            ttl_secs: 660,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite file; defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(AppPaths::new()?.database_file()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Daily rolling log files are written here when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl AppConfig {
    /// Layers the optional TOML file and `CHATRELAY__SECTION__KEY`
    /// environment variables over the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_source = match path {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                config::File::from(path).required(true)
            }
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        config.apply_env_secrets(|name| std::env::var(name).ok());
        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Fills missing API keys from `GROQ_API_KEY` / `GEMINI_API_KEY`.
    pub fn apply_env_secrets<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for kind in ProviderKind::ALL {
            let provider = self.providers.get_mut(kind);
            if provider.api_key().is_some() {
                continue;
            }
            let var = format!("{}_API_KEY", kind.as_str().to_uppercase());
            if let Some(key) = lookup(&var).filter(|k| !k.trim().is_empty()) {
                debug!("Using {} from environment", var);
                provider.api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for kind in ProviderKind::ALL {
            let provider = self.providers.get(kind);

            if provider.selection(kind).default_model.is_empty() {
                return Err(Error::validation(format!(
                    "Provider {} has empty default_model",
                    kind
                )));
            }

            let base_url = provider.base_url(kind);
            let parsed = url::Url::parse(&base_url).map_err(|e| {
                Error::validation(format!("Provider {} has invalid base_url {}: {}", kind, base_url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::validation(format!(
                    "Provider {} base_url must be http(s): {}",
                    kind, base_url
                )));
            }
        }

        if self.rate_limiting.window_secs == 0 {
            return Err(Error::validation("Rate limiting window must be positive"));
        }
        if self.rate_limiting.ttl_secs < self.rate_limiting.window_secs {
            return Err(Error::validation(
                "Rate limiting ttl_secs must not be shorter than window_secs",
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(Error::validation("Request timeout must be positive"));
        }

        Ok(())
    }

    pub fn to_rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            enable_rate_limiting: self.rate_limiting.enabled,
            window: Duration::from_secs(self.rate_limiting.window_secs),
            max_requests: self.rate_limiting.max_requests,
            ttl: Duration::from_secs(self.rate_limiting.ttl_secs),
        }
    }

    /// Effective configuration as TOML with API keys masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        for kind in ProviderKind::ALL {
            let provider = redacted.providers.get_mut(kind);
            if provider.api_key.is_some() {
                provider.api_key = Some(REDACTED.to_string());
            }
        }

        toml::to_string_pretty(&redacted)
            .map_err(|e| Error::Config(config::ConfigError::Message(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8787);
        assert!(config.rate_limiting.enabled);
        assert_eq!(config.rate_limiting.max_requests, 60);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);

        let selection = config.providers.groq.selection(ProviderKind::Groq);
        assert_eq!(selection.default_model, "llama-3.1-8b-instant");
        assert_eq!(
            config.providers.gemini.base_url(ProviderKind::Gemini),
            "https://generativelanguage.googleapis.com/v1beta"
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.rate_limiting.ttl_secs = 300;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rate_limiting.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.providers.groq.base_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.providers.gemini.default_model = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chatrelay.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9000

[providers.groq]
api_key = "gsk-test"
quality_models = ["custom-70b"]

[rate_limiting]
max_requests = 5

[storage]
backend = "memory"
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.providers.groq.api_key(), Some("gsk-test".to_string()));
        assert_eq!(config.rate_limiting.max_requests, 5);
        assert_eq!(config.rate_limiting.window_secs, 600);
        assert_eq!(config.storage.backend, StorageBackend::Memory);

        let selection = config.providers.groq.selection(ProviderKind::Groq);
        assert_eq!(selection.quality, vec!["custom-70b".to_string()]);
        assert_eq!(selection.speed[0], "llama-3.1-8b-instant");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(AppConfig::load(Some(&temp_dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_env_secrets_fill_only_missing_keys() {
        let env: HashMap<&str, &str> = [("GROQ_API_KEY", "from-env"), ("GEMINI_API_KEY", "gem-env")]
            .into_iter()
            .collect();

        let mut config = AppConfig::default();
        config.providers.gemini.api_key = Some("from-file".to_string());
        config.apply_env_secrets(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.providers.groq.api_key(), Some("from-env".to_string()));
        assert_eq!(config.providers.gemini.api_key(), Some("from-file".to_string()));
    }

    #[test]
    fn test_redacted_toml_hides_keys() {
        let mut config = AppConfig::default();
        config.providers.groq.api_key = Some("gsk-secret".to_string());

        let rendered = config.to_redacted_toml().unwrap();
        assert!(!rendered.contains("gsk-secret"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("[rate_limiting]"));
    }

    #[test]
    fn test_rate_limiter_conversion() {
        let config = AppConfig::default();
        let limiter = config.to_rate_limiter_config();
        assert!(limiter.enable_rate_limiting);
        assert_eq!(limiter.window, Duration::from_secs(600));
        assert_eq!(limiter.ttl, Duration::from_secs(660));
    }
}
