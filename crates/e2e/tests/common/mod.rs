//! Shared helpers for integration tests

#![allow(dead_code)]

pub mod mock_backend;

pub use mock_backend::{MockBackend, DEFAULT_INGREDIENTS};

use stellar_common::{ApiClient, BackendConfig};
use stellar_e2e::CleanupConfig;

/// Client pointed at a mock backend
pub fn client_for(backend: &MockBackend) -> ApiClient {
    ApiClient::new(&BackendConfig::new(&backend.base_url)).expect("Failed to build client")
}

/// Cleanup budget with a short pause so retry tests stay quick
pub fn fast_cleanup() -> CleanupConfig {
    CleanupConfig {
        attempts: 3,
        delay_ms: 40,
    }
}

/// API root on a local port nothing listens on
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("Failed to get address").port();
    drop(listener);
    format!("http://127.0.0.1:{}/api", port)
}
