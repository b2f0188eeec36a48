use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::provider::{ModelProvider, Preset, ProviderKind};

pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const GROQ_SPEED_MODELS: &[&str] = &[
    "llama-3.1-8b-instant",
    "llama3-8b-8192",
    "gemma2-9b-it",
];
pub const GROQ_QUALITY_MODELS: &[&str] = &[
    "llama-3.3-70b-versatile",
    "llama-3.1-70b-versatile",
    "llama3-70b-8192",
    "mixtral-8x7b-32768",
];

pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const GEMINI_SPEED_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
];
pub const GEMINI_QUALITY_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-1.5-pro",
    "gemini-2.0-flash",
];

/// Static model preferences for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub default_model: String,
    pub speed: Vec<String>,
    pub quality: Vec<String>,
}

impl ModelSelection {
    pub fn builtin(provider: ProviderKind) -> Self {
        let (default_model, speed, quality) = match provider {
            ProviderKind::Groq => (GROQ_DEFAULT_MODEL, GROQ_SPEED_MODELS, GROQ_QUALITY_MODELS),
            ProviderKind::Gemini => (
                GEMINI_DEFAULT_MODEL,
                GEMINI_SPEED_MODELS,
                GEMINI_QUALITY_MODELS,
            ),
        };
        Self {
            default_model: default_model.to_string(),
            speed: speed.iter().map(|s| s.to_string()).collect(),
            quality: quality.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn priority(&self, preset: Preset) -> &[String] {
        match preset {
            Preset::Speed => &self.speed,
            Preset::Quality => &self.quality,
        }
    }
}

/// Picks a model id from a live catalog.
///
/// An explicit request present in the catalog wins, then the first priority
/// entry present in the catalog, then the head of the catalog, then the
/// provider default. Always yields an id.
pub fn select_model(
    requested: Option<&str>,
    priority: &[String],
    catalog: &[String],
    default_model: &str,
) -> String {
    let in_catalog = |id: &str| catalog.iter().any(|m| m == id);

    if let Some(requested) = requested {
        if in_catalog(requested) {
            return requested.to_string();
        }
    }

    priority
        .iter()
        .find(|id| in_catalog(id))
        .or_else(|| catalog.first())
        .cloned()
        .unwrap_or_else(|| default_model.to_string())
}

pub struct ModelResolver {
    selection: ModelSelection,
}

impl ModelResolver {
    pub fn new(selection: ModelSelection) -> Self {
        Self { selection }
    }

    pub fn selection(&self) -> &ModelSelection {
        &self.selection
    }

    pub async fn resolve(
        &self,
        provider: &dyn ModelProvider,
        requested: Option<&str>,
        preset: Preset,
    ) -> String {
        let catalog = self.fetch_catalog(provider).await;
        let model = self.select(requested, preset, &catalog);
        debug!(
            provider = %provider.kind(),
            requested = requested.unwrap_or("-"),
            %preset,
            catalog_size = catalog.len(),
            model = %model,
            "Resolved model"
        );
        model
    }

    /// Resolution after `failed` stopped being served: the explicit request
    /// is ignored and `failed` is removed from the catalog.
    pub async fn re_resolve(
        &self,
        provider: &dyn ModelProvider,
        preset: Preset,
        failed: &str,
    ) -> String {
        let catalog: Vec<String> = self
            .fetch_catalog(provider)
            .await
            .into_iter()
            .filter(|id| id != failed)
            .collect();
        let model = self.select(None, preset, &catalog);
        debug!(
            provider = %provider.kind(),
            failed = %failed,
            model = %model,
            "Re-resolved model after decommission"
        );
        model
    }

    pub fn select(&self, requested: Option<&str>, preset: Preset, catalog: &[String]) -> String {
        select_model(
            requested,
            self.selection.priority(preset),
            catalog,
            &self.selection.default_model,
        )
    }

    /// Live catalog; any failure degrades to an empty list.
    pub async fn fetch_catalog(&self, provider: &dyn ModelProvider) -> Vec<String> {
        if !provider.is_configured() {
            return Vec::new();
        }
        match provider.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(provider = %provider.kind(), error = %e, "Model catalog unavailable");
                Vec::new()
            }
        }
    }
}
