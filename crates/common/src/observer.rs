//! Request/response observation hook
//!
//! The client reports every exchange to an [`ExchangeObserver`]. Reporting
//! backends plug in here; the default observer discards everything.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::types::ApiResult;

/// One request and what came back for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// Step label, e.g. `POST /auth/login`
    pub step: String,
    /// JSON payload sent, if any
    pub request: Option<Value>,
    /// Normalized response, absent on transport failure
    pub response: Option<ApiResult>,
    /// Transport error text, if the request never got a response
    pub error: Option<String>,
}

/// Receives every exchange performed by a client
pub trait ExchangeObserver: Send + Sync {
    fn observe(&self, exchange: &Exchange);
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExchangeObserver for NoopObserver {
    fn observe(&self, _exchange: &Exchange) {}
}

/// Observer that keeps exchanges in memory until drained
#[derive(Debug, Default)]
pub struct RecordingObserver {
    exchanges: Mutex<Vec<Exchange>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Exchange> {
        std::mem::take(&mut *self.exchanges.lock())
    }

    pub fn len(&self) -> usize {
        self.exchanges.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.lock().is_empty()
    }
}

impl ExchangeObserver for RecordingObserver {
    fn observe(&self, exchange: &Exchange) {
        self.exchanges.lock().push(exchange.clone());
    }
}

/// Observer that logs each exchange at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExchangeObserver for TracingObserver {
    fn observe(&self, exchange: &Exchange) {
        let request = exchange
            .request
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        match (&exchange.response, &exchange.error) {
            (Some(response), _) => debug!(
                step = %exchange.step,
                request = %request,
                "{}",
                response.describe()
            ),
            (None, Some(error)) => debug!(
                step = %exchange.step,
                request = %request,
                "no response: {}",
                error
            ),
            (None, None) => debug!(step = %exchange.step, request = %request, "no response"),
        }
    }
}

/// Forwards every exchange to each inner observer in order
#[derive(Default, Clone)]
pub struct FanOutObserver {
    observers: Vec<Arc<dyn ExchangeObserver>>,
}

impl FanOutObserver {
    pub fn new(observers: Vec<Arc<dyn ExchangeObserver>>) -> Self {
        Self { observers }
    }
}

impl ExchangeObserver for FanOutObserver {
    fn observe(&self, exchange: &Exchange) {
        for observer in &self.observers {
            observer.observe(exchange);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_drains() {
        let observer = RecordingObserver::new();
        observer.observe(&Exchange {
            step: "GET /ingredients".to_string(),
            request: None,
            response: None,
            error: Some("connection refused".to_string()),
        });
        assert_eq!(observer.len(), 1);

        let taken = observer.take();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].step, "GET /ingredients");
        assert!(observer.is_empty());
    }

    #[test]
    fn test_fan_out_reaches_every_observer() {
        let first = Arc::new(RecordingObserver::new());
        let second = Arc::new(RecordingObserver::new());
        let fan_out = FanOutObserver::new(vec![
            first.clone() as Arc<dyn ExchangeObserver>,
            Arc::new(TracingObserver),
            second.clone(),
        ]);

        fan_out.observe(&Exchange {
            step: "DELETE /auth/user".to_string(),
            request: None,
            response: None,
            error: None,
        });

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
