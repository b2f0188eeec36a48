use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info};

use crate::app::config::{AppConfig, StorageBackend};
use crate::error::Result;
use crate::models::{
    FallbackOrchestrator, GeminiProvider, GroqProvider, ProviderClient, ProviderKind, RateLimiter,
};
use crate::storage::{KvStore, MemoryKvStore, SqliteStore};

/// Everything a request handler needs, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn KvStore>,
    rate_limiter: RateLimiter,
    orchestrator: Arc<FallbackOrchestrator>,
}

impl AppState {
    /// Opens the configured store and wires providers around it.
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing application state");

        let store: Arc<dyn KvStore> = match config.storage.backend {
            StorageBackend::Sqlite => {
                let path = config.storage.database_path()?;
                Arc::new(SqliteStore::open(&path).await?)
            }
            StorageBackend::Memory => {
                info!("Using in-memory key-value store; counters reset on restart");
                Arc::new(MemoryKvStore::new())
            }
        };

        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn KvStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.server.request_timeout())
            .build()?;

        let groq_config = config.providers.get(ProviderKind::Groq);
        let groq = GroqProvider::with_base_url(
            http.clone(),
            groq_config.api_key(),
            groq_config.base_url(ProviderKind::Groq),
        );

        let gemini_config = config.providers.get(ProviderKind::Gemini);
        let gemini = GeminiProvider::with_base_url(
            http,
            gemini_config.api_key(),
            gemini_config.base_url(ProviderKind::Gemini),
        );

        let orchestrator = FallbackOrchestrator::new(
            ProviderClient::new(Arc::new(groq), groq_config.selection(ProviderKind::Groq)),
            ProviderClient::new(Arc::new(gemini), gemini_config.selection(ProviderKind::Gemini)),
        );

        let rate_limiter = RateLimiter::new(store.clone(), config.to_rate_limiter_config());

        debug!(
            store = store.backend_name(),
            groq_configured = groq_config.api_key().is_some(),
            gemini_configured = gemini_config.api_key().is_some(),
            "Application state ready"
        );

        Ok(Self {
            store,
            rate_limiter,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_backed_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.path = Some(temp_dir.path().join("state.db"));
        config.providers.groq.api_key = Some("gsk-test".to_string());

        let state = AppState::new(config).await.unwrap();
        assert_eq!(state.store().backend_name(), "sqlite");
        assert!(state.orchestrator().client(ProviderKind::Groq).is_configured());
        assert!(!state.orchestrator().client(ProviderKind::Gemini).is_configured());
        state.store().ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;

        let state = AppState::new(config).await.unwrap();
        assert_eq!(state.store().backend_name(), "memory");
    }
}
