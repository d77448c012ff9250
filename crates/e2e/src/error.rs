//! Error types for the contract test harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Client error: {0}")]
    Client(#[from] stellar_common::Error),

    #[error("Precondition failed during {step}: status {status}, body: {body}")]
    Precondition {
        step: String,
        status: u16,
        body: String,
    },

    #[error("Cleanup of {email} failed after {attempts} attempt(s): status {status}, body: {body}")]
    CleanupFailed {
        email: String,
        attempts: u32,
        status: String,
        body: String,
    },

    #[error("{precondition}; rollback failed: {cleanup}")]
    SetupRollbackFailed {
        precondition: Box<E2eError>,
        cleanup: Box<E2eError>,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Backend unavailable at {0}")]
    BackendUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl E2eError {
    /// Precondition failure carrying the offending response
    pub fn precondition(step: impl Into<String>, result: &stellar_common::ApiResult) -> Self {
        E2eError::Precondition {
            step: step.into(),
            status: result.status,
            body: result.text.clone(),
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
