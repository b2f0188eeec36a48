use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::{GatewayError, ProviderError};
use crate::models::client::{ProviderClient, ProviderModels};
use crate::models::provider::{ChatRequest, NormalizedResponse, ProviderKind, ProviderSelection};

/// One provider call made while serving a request.
#[derive(Debug, Clone)]
pub struct FallbackAttempt {
    pub provider: ProviderKind,
    /// Model that answered; unknown when the call failed.
    pub model: Option<String>,
    pub attempt_number: usize,
    pub error: Option<String>,
    pub response_time_ms: u64,
    pub success: bool,
}

/// Routes a request to Groq, Gemini, or Groq-then-Gemini.
pub struct FallbackOrchestrator {
    groq: ProviderClient,
    gemini: ProviderClient,
}

impl FallbackOrchestrator {
    pub fn new(groq: ProviderClient, gemini: ProviderClient) -> Self {
        Self { groq, gemini }
    }

    pub fn client(&self, kind: ProviderKind) -> &ProviderClient {
        match kind {
            ProviderKind::Groq => &self.groq,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    pub async fn describe(&self) -> Vec<ProviderModels> {
        let groq = self.groq.describe().await;
        let gemini = self.gemini.describe().await;
        vec![groq, gemini]
    }

    pub async fn send_with_fallback(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<(NormalizedResponse, Vec<FallbackAttempt>), GatewayError> {
        let mut attempts = Vec::new();

        let result = match request.provider {
            ProviderSelection::Groq => self
                .try_provider(&self.groq, request, &mut attempts)
                .await
                .map_err(|source| GatewayError::Provider {
                    provider: ProviderKind::Groq,
                    source,
                }),
            ProviderSelection::Gemini => self
                .try_provider(&self.gemini, request, &mut attempts)
                .await
                .map_err(|source| GatewayError::Provider {
                    provider: ProviderKind::Gemini,
                    source,
                }),
            ProviderSelection::Auto => self.auto(request, &mut attempts).await,
        };

        match result {
            Ok(response) => {
                info!(
                    provider = %response.provider,
                    model = %response.model,
                    attempts = attempts.len(),
                    "Request served"
                );
                Ok((response, attempts))
            }
            Err(e) => {
                error!(attempts = attempts.len(), error = %e, "Request failed");
                Err(e)
            }
        }
    }

    async fn auto(
        &self,
        request: &ChatRequest,
        attempts: &mut Vec<FallbackAttempt>,
    ) -> std::result::Result<NormalizedResponse, GatewayError> {
        let primary = match self.try_provider(&self.groq, request, attempts).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        if !request.fallback_enabled() || !self.gemini.is_configured() {
            warn!(
                fallback_enabled = request.fallback_enabled(),
                gemini_configured = self.gemini.is_configured(),
                "Groq failed and no fallback is available"
            );
            return Err(GatewayError::NoFallback {
                provider: ProviderKind::Groq,
                source: primary,
            });
        }

        info!(error = %primary.tagged(), "Groq failed, falling back to Gemini");
        self.try_provider(&self.gemini, request, attempts)
            .await
            .map_err(|secondary| GatewayError::BothFailed {
                primary_provider: ProviderKind::Groq,
                primary,
                secondary_provider: ProviderKind::Gemini,
                secondary,
            })
    }

    async fn try_provider(
        &self,
        client: &ProviderClient,
        request: &ChatRequest,
        attempts: &mut Vec<FallbackAttempt>,
    ) -> std::result::Result<NormalizedResponse, ProviderError> {
        let start_time = Instant::now();
        let result = client.call(request).await;

        attempts.push(FallbackAttempt {
            provider: client.kind(),
            model: result.as_ref().ok().map(|r| r.model.clone()),
            attempt_number: attempts.len() + 1,
            error: result.as_ref().err().map(ProviderError::tagged),
            response_time_ms: start_time.elapsed().as_millis() as u64,
            success: result.is_ok(),
        });

        result
    }
}
