pub mod api;
pub mod app;
pub mod cli;
pub mod error;
pub mod models;
pub mod platform;
pub mod storage;

pub use error::{Error, Result};
