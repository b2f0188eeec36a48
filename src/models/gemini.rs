use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::models::provider::{ChatRequest, ModelProvider, ProviderKind};
use crate::models::translate::{self, GeminiResponse, NativeResponse};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: Client, api_key: Option<String>, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn api_key(&self) -> std::result::Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_credential(ProviderKind::Gemini))
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("pageSize", "1000")])
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(status, body));
        }

        let list: GeminiModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::network(format!("invalid model list: {}", e)))?;

        Ok(list
            .models
            .into_iter()
            .filter(GeminiModel::can_generate)
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect())
    }

    async fn send_message(
        &self,
        model: &str,
        request: &ChatRequest,
    ) -> std::result::Result<NativeResponse, ProviderError> {
        let api_key = self.api_key()?;
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let body = translate::to_gemini(request);

        debug!("Sending request to Gemini: model={}, contents={}", model, body.contents.len());

        let start_time = Instant::now();
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        debug!("Gemini request completed in {:?}", start_time.elapsed());

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            warn!("Gemini API error: {} - {}", status, text);
            return Err(ProviderError::status(status.as_u16(), text));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::empty_response(format!("unparsable gemini response: {}", e))
        })?;

        Ok(NativeResponse::Gemini(parsed))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Option<Vec<String>>,
}

impl GeminiModel {
    /// Embedding-only models advertise methods without `generateContent`.
    fn can_generate(&self) -> bool {
        self.supported_generation_methods
            .as_ref()
            .map_or(true, |methods| methods.iter().any(|m| m == "generateContent"))
    }
}
