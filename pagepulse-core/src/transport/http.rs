//! HTTP beacon delivery
//!
//! Each payload becomes one POST to the configured endpoint, spawned on the
//! current tokio runtime. The response is never read: delivery success is not
//! observable and nothing is retried. A host that is about to shut its runtime
//! down calls [`HttpBeacon::settle`] so queued sends are not cancelled.

use std::cell::RefCell;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tokio::task::JoinHandle;

use super::{Beacon, DeliveryMode};
use crate::config::TrackerConfig;
use crate::error::{Error, Result};

pub struct HttpBeacon {
    http_client: reqwest::Client,
    endpoint: String,
    /// Sends a host may wait on before exiting
    in_flight: RefCell<Vec<JoinHandle<()>>>,
}

impl HttpBeacon {
    /// Create a beacon from configuration
    ///
    /// Returns an error if no endpoint is configured or the client cannot be built.
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        config.validate()?;

        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("tracker.endpoint is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            in_flight: RefCell::new(Vec::new()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of sends that have not completed yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .borrow()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Wait for every send that is still running, whatever its mode.
    pub async fn settle(&self) {
        let pending: Vec<JoinHandle<()>> = self.in_flight.borrow_mut().drain(..).collect();
        for handle in pending {
            let _ = handle.await;
        }
    }
}

impl Beacon for HttpBeacon {
    fn submit(&self, body: Vec<u8>, mode: DeliveryMode) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Transport(format!("no async runtime for beacon: {}", e)))?;

        let request = self.http_client.post(&self.endpoint).body(body);
        let endpoint = self.endpoint.clone();

        let handle = runtime.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(endpoint = %endpoint, ?mode, error = %e, "Beacon not delivered");
            }
        });

        let mut in_flight = self.in_flight.borrow_mut();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_requires_endpoint() {
        let config = TrackerConfig::default();
        assert!(HttpBeacon::new(&config).is_err());
    }

    #[test]
    fn test_beacon_with_valid_config() {
        let config = TrackerConfig {
            endpoint: Some("https://collect.example.com/e".to_string()),
            ..Default::default()
        };
        let beacon = HttpBeacon::new(&config).unwrap();
        assert_eq!(beacon.endpoint(), "https://collect.example.com/e");
    }

    #[test]
    fn test_submit_outside_runtime_fails_without_panicking() {
        let config = TrackerConfig {
            endpoint: Some("https://collect.example.com/e".to_string()),
            ..Default::default()
        };
        let beacon = HttpBeacon::new(&config).unwrap();

        let result = beacon.submit(b"{}".to_vec(), DeliveryMode::Standard);
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_settle_waits_for_standard_and_beacon_sends() {
        // Nothing listens on the discard port, so each send fails fast
        let config = TrackerConfig {
            endpoint: Some("http://127.0.0.1:9/e".to_string()),
            request_timeout_secs: 2,
            ..Default::default()
        };
        let beacon = HttpBeacon::new(&config).unwrap();

        beacon.submit(b"{}".to_vec(), DeliveryMode::Standard).unwrap();
        beacon.submit(b"{}".to_vec(), DeliveryMode::Beacon).unwrap();
        assert_eq!(beacon.in_flight(), 2);

        beacon.settle().await;
        assert_eq!(beacon.in_flight(), 0);
    }
}
