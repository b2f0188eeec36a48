use async_trait::async_trait;
use reqwest::{Client, header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE}};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, error};

use crate::error::ProviderError;
use crate::models::provider::{ChatRequest, ModelProvider, ProviderKind};
use crate::models::translate::{self, GroqResponse, NativeResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq's OpenAI-compatible chat-completions API.
pub struct GroqProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GroqProvider {
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

    fn create_headers(&self) -> std::result::Result<HeaderMap, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_credential(ProviderKind::Groq))?;

        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| ProviderError::config(format!("invalid groq api key format: {}", e)))?;
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }
}

#[async_trait]
impl ModelProvider for GroqProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.create_headers()?)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(status, body));
        }

        let list: GroqModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::network(format!("invalid model list: {}", e)))?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    async fn send_message(
        &self,
        model: &str,
        request: &ChatRequest,
    ) -> std::result::Result<NativeResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.create_headers()?;
        let body = translate::to_groq(request, model);

        debug!("Sending request to Groq: model={}, messages={}", model, body.messages.len());

        let start_time = Instant::now();
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        debug!("Groq request completed in {:?}", start_time.elapsed());

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            error!("Groq API error: {} - {}", status, text);
            return Err(ProviderError::status(status.as_u16(), text));
        }

        let parsed: GroqResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::empty_response(format!("unparsable groq response: {}", e))
        })?;

        Ok(NativeResponse::Groq(parsed))
    }
}

#[derive(Debug, Deserialize)]
struct GroqModelList {
    #[serde(default)]
    data: Vec<GroqModel>,
}

#[derive(Debug, Deserialize)]
struct GroqModel {
    id: String,
}
