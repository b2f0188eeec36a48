pub mod config;
pub mod state;

pub use config::{AppConfig, ProviderConfig, StorageBackend};
pub use state::AppState;
