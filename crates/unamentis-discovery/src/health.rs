//! Liveness probing of gateway `/health` endpoints

use crate::error::{DiscoveryError, Result};
use crate::types::DEFAULT_SERVER_NAME;
use reqwest::Client;
use std::time::Duration;
use tracing::trace;

/// Response of a successful health probe
#[derive(Debug, Clone)]
pub struct HealthResponse {
    /// HTTP status code (always 2xx)
    pub status: u16,

    /// Response body, if it could be read
    pub body: Option<String>,
}

impl HealthResponse {
    /// Name reported by the gateway, if the body carries one
    pub fn reported_name(&self) -> Option<String> {
        self.body.as_deref().and_then(reported_name)
    }

    /// Name reported by the gateway, or the default
    pub fn server_name(&self) -> String {
        self.reported_name()
            .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string())
    }
}

/// Reads `server_name`, then `name`, from a JSON health body.
fn reported_name(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["server_name", "name"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Display name for a health body; falls back to `"UnaMentis Server"` when the
/// body is missing, unparsable, or carries neither field.
pub fn server_name_from_body(body: Option<&str>) -> String {
    body.and_then(reported_name)
        .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string())
}

/// Issues health probes over one shared HTTP client.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: Client,
}

impl HealthChecker {
    /// Creates a checker with its own client
    pub fn new() -> Result<Self> {
        // Gateways live on the LAN; never route probes through a proxy.
        let client = Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| DiscoveryError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Creates a checker on an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// GETs `url`; any 2xx status is healthy.
    pub async fn check(&self, url: &str, timeout: Duration) -> Result<HealthResponse> {
        let timeout_ms = timeout.as_millis() as u64;
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DiscoveryError::from_request(e, timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            trace!(url, status = status.as_u16(), "Health probe rejected");
            return Err(DiscoveryError::HealthCheckFailed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await.ok();
        Ok(HealthResponse {
            status: status.as_u16(),
            body,
        })
    }

    /// Convenience wrapper returning only the verdict
    pub async fn is_healthy(&self, url: &str, timeout: Duration) -> bool {
        self.check(url, timeout).await.is_ok()
    }
}
