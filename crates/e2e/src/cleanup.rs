//! Reliable removal of accounts created by scenarios
//!
//! Deletion is attempted with the token captured during setup first. When
//! that token no longer works (for example after a password or email change)
//! a fresh one is obtained by logging in again. Each round that fails is
//! followed by a fixed pause; nothing here ever returns an error, the
//! outcome is carried by [`CleanupReport`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use stellar_common::{ApiClient, ApiResult};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::E2eError;

/// Status codes accepted for `DELETE /auth/user`
pub const DELETE_ACCEPTED: [u16; 2] = [200, 202];

/// Retry budget for the cleanup protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Rounds to try before giving up (at least one always runs)
    pub attempts: u32,

    /// Pause between failed rounds, in milliseconds
    pub delay_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 500,
        }
    }
}

impl CleanupConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// What happened while trying to delete an account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: bool,
    /// Rounds actually run
    pub attempts: u32,
    /// Most recent response that did not count as a deletion
    pub last_response: Option<ApiResult>,
    /// Most recent transport failure
    pub last_error: Option<String>,
}

impl CleanupReport {
    /// Convert a failed report into an error naming the account
    pub fn into_error(self, email: &str) -> E2eError {
        let (status, body) = match (&self.last_response, &self.last_error) {
            (Some(res), _) => (res.status.to_string(), res.text.clone()),
            (None, Some(err)) => ("none".to_string(), err.clone()),
            (None, None) => ("none".to_string(), String::new()),
        };
        E2eError::CleanupFailed {
            email: email.to_string(),
            attempts: self.attempts,
            status,
            body,
        }
    }

    fn note_response(&mut self, result: ApiResult) {
        self.last_response = Some(result);
    }

    fn note_error(&mut self, error: &stellar_common::Error) {
        self.last_error = Some(error.to_string());
    }
}

/// Delete an account, returning whether the backend confirmed it
pub async fn delete_user_safely(
    client: &ApiClient,
    email: &str,
    password: &str,
    token: Option<&str>,
    config: CleanupConfig,
) -> bool {
    run_cleanup(client, email, password, token, config)
        .await
        .deleted
}

/// Run the cleanup protocol and report every detail of the outcome
pub async fn run_cleanup(
    client: &ApiClient,
    email: &str,
    password: &str,
    token: Option<&str>,
    config: CleanupConfig,
) -> CleanupReport {
    let rounds = config.attempts.max(1);
    let known = token.map(str::trim).filter(|t| !t.is_empty());
    let mut report = CleanupReport::default();

    for round in 1..=rounds {
        report.attempts = round;

        if let Some(known) = known {
            if try_delete(client, known, &mut report).await {
                info!("Deleted {} with the setup token", email);
                report.deleted = true;
                return report;
            }
        }

        if let Some(fresh) = fresh_token(client, email, password, &mut report).await {
            if try_delete(client, &fresh, &mut report).await {
                info!("Deleted {} after re-authenticating", email);
                report.deleted = true;
                return report;
            }
        }

        if round < rounds {
            warn!(
                "Cleanup of {} failed (round {}/{}), retrying in {} ms",
                email, round, rounds, config.delay_ms
            );
            sleep(config.delay()).await;
        }
    }

    warn!("Giving up on deleting {} after {} round(s)", email, rounds);
    report
}

async fn try_delete(client: &ApiClient, token: &str, report: &mut CleanupReport) -> bool {
    match client.delete_user(token).await {
        Ok(result) if result.succeeded_with(&DELETE_ACCEPTED) => true,
        Ok(result) => {
            debug!("Delete rejected: {}", result.describe());
            report.note_response(result);
            false
        }
        Err(e) => {
            debug!("Delete request failed: {}", e);
            report.note_error(&e);
            false
        }
    }
}

async fn fresh_token(
    client: &ApiClient,
    email: &str,
    password: &str,
    report: &mut CleanupReport,
) -> Option<String> {
    match client.login(email, password).await {
        Ok(result) if result.status == 200 => match result.access_token() {
            Some(token) => Some(token),
            None => {
                report.note_response(result);
                None
            }
        },
        Ok(result) => {
            debug!("Re-authentication rejected: {}", result.describe());
            report.note_response(result);
            None
        }
        Err(e) => {
            report.note_error(&e);
            None
        }
    }
}
