use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::models::provider::{ChatRequest, ModelProvider, NormalizedResponse, Preset, ProviderKind};
use crate::models::resolver::{ModelResolver, ModelSelection};
use crate::models::translate;

/// Bad-request bodies that mean "this model id is gone".
const DECOMMISSION_PATTERN: &str =
    r"(?i)decommission|no longer (supported|available)|not[ _]found|does not exist|is not supported";

fn decommission_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(DECOMMISSION_PATTERN).expect("decommission pattern is valid"))
}

/// Reclassifies an upstream status error as `Decommissioned` when the model
/// itself is no longer served.
pub fn classify(error: ProviderError, model: &str) -> ProviderError {
    match error {
        ProviderError::Status { status, body }
            if status == 404 || status == 410 || (status == 400 && decommission_pattern().is_match(&body)) =>
        {
            ProviderError::Decommissioned {
                model: model.to_string(),
                status,
                body,
            }
        }
        other => other,
    }
}

/// Calls one provider: resolve a model, send, and on a decommissioned model
/// re-resolve and retry exactly once.
pub struct ProviderClient {
    provider: Arc<dyn ModelProvider>,
    resolver: ModelResolver,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn ModelProvider>, selection: ModelSelection) -> Self {
        Self {
            provider,
            resolver: ModelResolver::new(selection),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    pub async fn call(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<NormalizedResponse, ProviderError> {
        let kind = self.kind();
        if !self.is_configured() {
            return Err(ProviderError::missing_credential(kind));
        }

        let model = self
            .resolver
            .resolve(&*self.provider, request.model.as_deref(), request.preset)
            .await;

        let failed_model = match self.attempt(&model, request, 1).await {
            Ok(text) => return Ok(NormalizedResponse::new(text, kind, model)),
            Err(ProviderError::Decommissioned { model, status, body }) => {
                warn!(
                    provider = %kind,
                    model = %model,
                    status,
                    "Model appears decommissioned, re-resolving"
                );
                model
            }
            Err(e) => return Err(e),
        };

        let retry_model = self
            .resolver
            .re_resolve(&*self.provider, request.preset, &failed_model)
            .await;

        match self.attempt(&retry_model, request, 2).await {
            Ok(text) => Ok(NormalizedResponse::new(text, kind, retry_model)),
            // A second decommission is no longer grounds for another retry.
            Err(ProviderError::Decommissioned { status, body, .. }) => {
                Err(ProviderError::Status { status, body })
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt(
        &self,
        model: &str,
        request: &ChatRequest,
        attempt: u32,
    ) -> std::result::Result<String, ProviderError> {
        let kind = self.kind();
        let start_time = Instant::now();
        debug!(provider = %kind, model = %model, attempt, "Calling upstream");

        let result = self
            .provider
            .send_message(model, request)
            .await
            .map_err(|e| classify(e, model))
            .and_then(translate::extract_text);

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(provider = %kind, model = %model, attempt, elapsed_ms, "Upstream call succeeded"),
            Err(e) => warn!(
                provider = %kind,
                model = %model,
                attempt,
                elapsed_ms,
                error = %e.tagged(),
                "Upstream call failed"
            ),
        }
        result
    }

    /// Live catalog and the model each preset currently resolves to.
    pub async fn describe(&self) -> ProviderModels {
        let catalog = self.resolver.fetch_catalog(&*self.provider).await;
        let resolved = Preset::ALL
            .iter()
            .map(|preset| (*preset, self.resolver.select(None, *preset, &catalog)))
            .collect();
        ProviderModels {
            provider: self.kind(),
            configured: self.is_configured(),
            catalog,
            resolved,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderModels {
    pub provider: ProviderKind,
    pub configured: bool,
    pub catalog: Vec<String>,
    pub resolved: BTreeMap<Preset, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::groq::GroqProvider;
    use crate::models::provider::{Message, ProviderSelection};
    use mockito::Matcher;
    use reqwest::Client;
    use serde_json::json;

    fn groq_client(base_url: &str, api_key: Option<&str>) -> ProviderClient {
        let provider = GroqProvider::with_base_url(
            Client::new(),
            api_key.map(str::to_string),
            base_url.to_string(),
        );
        ProviderClient::new(Arc::new(provider), ModelSelection::builtin(ProviderKind::Groq))
    }

    fn completion(text: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]}).to_string()
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify(ProviderError::status(404, "whatever"), "old-model");
        assert_eq!(err.tag(), "decommissioned_model");
        let err = classify(ProviderError::status(410, "gone"), "old-model");
        assert_eq!(err.tag(), "decommissioned_model");
    }

    #[test]
    fn test_classify_bad_request_patterns() {
        let bodies = [
            r#"{"error":{"message":"The model `llama2-70b-4096` has been decommissioned"}}"#,
            r#"{"error":{"code":"model_not_found"}}"#,
            "Model Does Not Exist",
            "models/gemini-pro is not found for API version v1beta",
            "This model is no longer supported",
        ];
        for body in bodies {
            assert_eq!(
                classify(ProviderError::status(400, body), "m").tag(),
                "decommissioned_model",
                "body: {}",
                body
            );
        }

        let err = classify(ProviderError::status(400, "max_tokens too large"), "m");
        assert_eq!(err.tag(), "transport_error");
        let err = classify(ProviderError::status(500, "model not found"), "m");
        assert_eq!(err.tag(), "transport_error");
    }

    #[tokio::test]
    async fn test_missing_credential_short_circuits() {
        let mut server = mockito::Server::new_async().await;
        let catalog = server.mock("GET", "/models").expect(0).create_async().await;

        let client = groq_client(&server.url(), None);
        let err = client.call(&ChatRequest::new(vec![Message::user("hi")])).await.unwrap_err();

        assert_eq!(err.tag(), "config_error");
        catalog.assert_async().await;
    }

    #[tokio::test]
    async fn test_decommissioned_model_retries_once_with_new_model() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(json!({"data": [{"id": "llama-old"}, {"id": "llama-3.1-8b-instant"}]}).to_string())
            .expect(2)
            .create_async()
            .await;
        let stale = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "llama-old"})))
            .with_status(404)
            .with_body(r#"{"error":{"message":"model not found"}}"#)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "llama-3.1-8b-instant"})))
            .with_status(200)
            .with_body(completion("recovered"))
            .expect(1)
            .create_async()
            .await;

        let request = ChatRequest::new(vec![Message::user("hi")])
            .with_provider(ProviderSelection::Groq)
            .with_model("llama-old");
        let response = groq_client(&server.url(), Some("key")).call(&request).await.unwrap();

        assert_eq!(response.text, "recovered");
        assert_eq!(response.model, "llama-3.1-8b-instant");
        stale.assert_async().await;
        fresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_second_decommission_is_terminal_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(json!({"data": [{"id": "llama-3.1-8b-instant"}, {"id": "llama3-8b-8192"}]}).to_string())
            .create_async()
            .await;
        let completions = server
            .mock("POST", "/chat/completions")
            .with_status(404)
            .with_body("gone")
            .expect(2)
            .create_async()
            .await;

        let err = groq_client(&server.url(), Some("key"))
            .call(&ChatRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::status(404, "gone"));
        completions.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(500)
            .create_async()
            .await;
        let completions = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "llama-3.1-8b-instant"})))
            .with_status(503)
            .with_body("overloaded")
            .expect(1)
            .create_async()
            .await;

        let err = groq_client(&server.url(), Some("key"))
            .call(&ChatRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();

        assert_eq!(err.tag(), "transport_error");
        completions.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_answer_is_empty_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(json!({"data": [{"id": "llama-3.1-8b-instant"}]}).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("   "))
            .create_async()
            .await;

        let err = groq_client(&server.url(), Some("key"))
            .call(&ChatRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert_eq!(err.tag(), "empty_response");
    }
}
