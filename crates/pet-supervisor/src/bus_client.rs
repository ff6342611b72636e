use pet_core::settings::bus_base_url;
use pet_core::{EventName, EventRequest};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(1);
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Loopback client for the agent's bus. Every call is bounded and reports
/// failure as `false`.
#[derive(Debug, Clone)]
pub struct BusClient {
    base_url: String,
    http: reqwest::Client,
}

impl BusClient {
    pub fn new(port: u16) -> Self {
        Self::with_base_url(bus_base_url(port))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn health(&self) -> bool {
        let result = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                debug!(event = "bus_health_failed", error = %err);
                false
            }
        }
    }

    /// Any response counts as accepted; the agent exits on its own shortly after.
    pub async fn shutdown(&self) -> bool {
        let result = self
            .http
            .post(format!("{}/shutdown", self.base_url))
            .timeout(SHUTDOWN_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(_) => true,
            Err(err) => {
                debug!(event = "bus_shutdown_failed", error = %err);
                false
            }
        }
    }

    pub async fn send_event(&self, event: EventName) -> bool {
        let body = EventRequest {
            event: event.as_str().to_string(),
        };
        let result = self
            .http
            .post(format!("{}/event", self.base_url))
            .timeout(EVENT_TIMEOUT)
            .json(&body)
            .send()
            .await;
        match result {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(event = "bus_send_failed", name = %event, error = %err);
                false
            }
        }
    }
}
