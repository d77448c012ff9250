//! Stellar Common Library
//!
//! Client, data model and configuration shared by the Stellar Burgers
//! contract test harness.

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod observer;
pub mod types;

// Re-export commonly used types
pub use client::{ApiClient, ApiRequest, Method};
pub use config::BackendConfig;
pub use error::{Error, Result};
pub use identity::{unique_email, DEFAULT_NAME, DEFAULT_PASSWORD};
pub use observer::{
    Exchange, ExchangeObserver, FanOutObserver, NoopObserver, RecordingObserver, TracingObserver,
};
pub use types::{ApiResult, IngredientCatalog, TestUser};
