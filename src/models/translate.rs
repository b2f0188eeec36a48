//! Conversion between the common chat shape and each upstream's native shape.
//!
//! Groq speaks the OpenAI chat-completions dialect, so its request is a
//! field-for-field copy. Gemini has no system role and uses `user`/`model`
//! turns, so system content is folded into the next user turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::models::provider::{ChatRequest, MessageRole};

/// Sampling temperature sent to Groq when the caller gives none.
pub const DEFAULT_GROQ_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroqRequest {
    pub model: String,
    pub messages: Vec<GroqMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroqMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroqResponse {
    #[serde(default)]
    pub choices: Vec<GroqChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroqChoice {
    #[serde(default)]
    pub message: Option<GroqResponseMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroqResponseMessage {
    #[serde(default)]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeminiRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiContent {
    pub role: GeminiRole,
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: GeminiRole, text: String) -> Self {
        Self {
            role,
            parts: vec![GeminiPart { text }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiResponseContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiResponseContent {
    #[serde(default)]
    pub parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiResponsePart {
    #[serde(default)]
    pub text: Option<Value>,
}

/// Parsed upstream answer, one variant per provider.
#[derive(Debug, Clone)]
pub enum NativeResponse {
    Groq(GroqResponse),
    Gemini(GeminiResponse),
}

pub fn to_groq(request: &ChatRequest, model: &str) -> GroqRequest {
    GroqRequest {
        model: model.to_string(),
        messages: request
            .messages
            .iter()
            .map(|m| GroqMessage {
                role: m.role.as_str(),
                content: m.content.clone(),
            })
            .collect(),
        temperature: request.temperature.unwrap_or(DEFAULT_GROQ_TEMPERATURE),
        max_tokens: request.max_tokens,
        stream: false,
    }
}

pub fn to_gemini(request: &ChatRequest) -> GeminiRequest {
    let mut contents = Vec::new();
    let mut pending_system: Option<String> = None;

    for message in &request.messages {
        match message.role {
            MessageRole::System => {
                pending_system = Some(match pending_system.take() {
                    Some(prefix) => format!("{}\n{}", prefix, message.content),
                    None => message.content.clone(),
                });
            }
            MessageRole::Assistant => {
                contents.push(GeminiContent::text(GeminiRole::Model, message.content.clone()));
            }
            MessageRole::User => {
                let text = match pending_system.take() {
                    Some(prefix) => format!("{}\n\n{}", prefix, message.content),
                    None => message.content.clone(),
                };
                contents.push(GeminiContent::text(GeminiRole::User, text));
            }
        }
    }

    // No user turn followed the system content.
    if let Some(prefix) = pending_system {
        contents.push(GeminiContent::text(GeminiRole::User, prefix));
    }

    let generation_config = if request.temperature.is_some() || request.max_tokens.is_some() {
        Some(GeminiGenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
        })
    } else {
        None
    };

    GeminiRequest {
        contents,
        generation_config,
    }
}

/// Pulls the answer text out of a native response.
///
/// Missing, non-string, or blank text is an `EmptyResponse` failure.
pub fn extract_text(response: NativeResponse) -> std::result::Result<String, ProviderError> {
    let text = match response {
        NativeResponse::Groq(response) => response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .and_then(|content| content.as_str().map(str::to_string))
            .ok_or_else(|| ProviderError::empty_response("no message content in first choice"))?,
        NativeResponse::Gemini(response) => {
            let parts = response
                .candidates
                .into_iter()
                .next()
                .and_then(|candidate| candidate.content)
                .map(|content| content.parts)
                .ok_or_else(|| ProviderError::empty_response("no content in first candidate"))?;
            parts
                .iter()
                .filter_map(|part| part.text.as_ref().and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::empty_response("upstream returned blank text"));
    }
    Ok(text.to_string())
}
