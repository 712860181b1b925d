//! Types for discovered gateways and the discovery state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Display name used when a gateway does not report one.
pub const DEFAULT_SERVER_NAME: &str = "UnaMentis Server";

/// Path of the liveness endpoint on every gateway.
pub const HEALTH_PATH: &str = "/health";

/// Returns `http://{host}:{port}`.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

/// Returns `http://{host}:{port}/health`.
pub fn health_url(host: &str, port: u16) -> String {
    format!("{}{}", base_url(host, port), HEALTH_PATH)
}

/// A gateway located by one of the discovery paths.
///
/// Two servers are distinct entities even when they share host and port;
/// equality compares ids only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredServer {
    /// Unique identifier
    pub id: String,

    /// Display name (e.g., "My Mac")
    pub name: String,

    /// Hostname or IP address
    pub host: String,

    /// Gateway port
    pub port: u16,

    /// How the gateway was located
    pub discovery_method: DiscoveryMethod,

    /// Free-form key/value metadata (TXT records, probe details)
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// When this server was discovered
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredServer {
    /// Creates a new discovered server with a fresh id
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        discovery_method: DiscoveryMethod,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            host: host.into(),
            port,
            discovery_method,
            metadata: HashMap::new(),
            discovered_at: Utc::now(),
        }
    }

    /// Adds a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replaces all metadata
    pub fn with_metadata_map(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns `http://{host}:{port}`
    pub fn base_url(&self) -> String {
        base_url(&self.host, self.port)
    }

    /// Returns the liveness URL
    pub fn health_url(&self) -> String {
        health_url(&self.host, self.port)
    }

    /// Checks host and port invariants
    pub fn validate(&self) -> Result<(), String> {
        validate_endpoint(&self.host, self.port)
    }
}

impl PartialEq for DiscoveredServer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DiscoveredServer {}

/// Checks that a host/port pair can address a gateway.
pub fn validate_endpoint(host: &str, port: u16) -> Result<(), String> {
    if host.trim().is_empty() {
        return Err("host cannot be empty".to_string());
    }

    if port == 0 {
        return Err("port cannot be 0".to_string());
    }

    Ok(())
}

/// How a gateway was located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryMethod {
    /// Re-validated last known-good address
    Cached,

    /// Local service advertisement (mDNS)
    Nsd,

    /// Subnet probing
    SubnetScan,

    /// Host and port entered by the user
    Manual,

    /// Manual entry imported from a QR code. Never produced by discovery itself.
    QrCode,
}

impl DiscoveryMethod {
    /// Returns the wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::Cached => "CACHED",
            DiscoveryMethod::Nsd => "NSD",
            DiscoveryMethod::SubnetScan => "SUBNET_SCAN",
            DiscoveryMethod::Manual => "MANUAL",
            DiscoveryMethod::QrCode => "QR_CODE",
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovery strategy in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryTier {
    Cached,
    Nsd,
    SubnetScan,
}

impl DiscoveryTier {
    /// All tiers in the order they are attempted
    pub const ALL: [DiscoveryTier; 3] = [
        DiscoveryTier::Cached,
        DiscoveryTier::Nsd,
        DiscoveryTier::SubnetScan,
    ];

    /// Attempt order; lower runs first
    pub fn priority(&self) -> u8 {
        match self {
            DiscoveryTier::Cached => 1,
            DiscoveryTier::Nsd => 2,
            DiscoveryTier::SubnetScan => 3,
        }
    }

    /// Fixed time budget in milliseconds
    pub fn timeout_ms(&self) -> u64 {
        match self {
            DiscoveryTier::Cached => 2_000,
            DiscoveryTier::Nsd => 3_000,
            DiscoveryTier::SubnetScan => 10_000,
        }
    }

    /// Fixed time budget
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms())
    }

    /// Method tag carried by servers this tier produces
    pub fn method(&self) -> DiscoveryMethod {
        match self {
            DiscoveryTier::Cached => DiscoveryMethod::Cached,
            DiscoveryTier::Nsd => DiscoveryMethod::Nsd,
            DiscoveryTier::SubnetScan => DiscoveryMethod::SubnetScan,
        }
    }
}

impl fmt::Display for DiscoveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// Observable state of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DiscoveryState {
    /// Nothing in progress
    #[default]
    Idle,

    /// A run has started
    Discovering,

    /// A specific tier is running
    TryingTier { tier: DiscoveryTier },

    /// A verified gateway is in use
    Connected { server: DiscoveredServer },

    /// Every tier came up empty; the user should enter host and port
    ManualConfigRequired,

    /// Manual configuration failed
    Failed { message: String },
}

impl DiscoveryState {
    /// True only while a run is in flight
    pub fn is_discovering(&self) -> bool {
        matches!(
            self,
            DiscoveryState::Discovering | DiscoveryState::TryingTier { .. }
        )
    }

    /// True only when connected
    pub fn is_connected(&self) -> bool {
        matches!(self, DiscoveryState::Connected { .. })
    }
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryState::Idle => write!(f, "Idle"),
            DiscoveryState::Discovering => write!(f, "Discovering"),
            DiscoveryState::TryingTier { tier } => write!(f, "Trying {}", tier),
            DiscoveryState::Connected { server } => {
                write!(f, "Connected to {} at {}", server.name, server.base_url())
            }
            DiscoveryState::ManualConfigRequired => write!(f, "Manual configuration required"),
            DiscoveryState::Failed { message } => write!(f, "Failed: {}", message),
        }
    }
}
