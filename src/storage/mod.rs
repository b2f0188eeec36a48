// Durable state shared across requests

pub mod database;
pub mod kv;

pub use database::SqliteStore;
pub use kv::{KvStore, MemoryKvStore};
