pub mod client;
pub mod fallback;
pub mod gemini;
pub mod groq;
pub mod provider;
pub mod rate_limiter;
pub mod resolver;
pub mod translate;

pub use client::{ProviderClient, ProviderModels};
pub use fallback::{FallbackAttempt, FallbackOrchestrator};
pub use gemini::GeminiProvider;
pub use groq::GroqProvider;
pub use provider::{
    ChatEnvelope, ChatRequest, Message, MessageRole, ModelProvider, NormalizedResponse, Preset,
    ProviderKind, ProviderSelection,
};
pub use rate_limiter::{RateDecision, RateLimiter, RateLimiterConfig};
pub use resolver::{ModelResolver, ModelSelection};
