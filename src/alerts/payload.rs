//! Alertmanager webhook payload.
//!
//! Only the fields the control loop reads are modelled; everything else in
//! the payload is ignored. Missing fields take defaults so that a partial
//! alert is still processed.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Alert name raised when a node's disk is nearly full.
pub const HIGH_DISK_USAGE: &str = "HighDiskUsage";
/// Alert name raised when a worker's CPU is saturated.
pub const HIGH_CPU_LOAD: &str = "HighCPULoad";

const UNKNOWN_INSTANCE: &str = "unknown";

/// Body of an Alertmanager webhook request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// State of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
    #[serde(other)]
    Unknown,
}

/// A single alert.
#[derive(Debug, Clone, Deserialize)]
pub struct Alert {
    #[serde(default = "unknown_status")]
    pub status: AlertStatus,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn unknown_status() -> AlertStatus {
    AlertStatus::Unknown
}

impl Alert {
    pub fn name(&self) -> Option<&str> {
        self.labels.get("alertname").map(String::as_str)
    }

    /// The `instance` label, or `"unknown"` when absent.
    pub fn instance(&self) -> &str {
        self.labels
            .get("instance")
            .map(String::as_str)
            .unwrap_or(UNKNOWN_INSTANCE)
    }
}

impl WebhookPayload {
    /// Decodes a request body.
    ///
    /// An empty body is a payload with no alerts.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }
}
