//! Configuration types for gateway discovery

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Ports probed by the subnet scan, in probe order.
pub const DEFAULT_SCAN_PORTS: [u16; 3] = [11400, 8766, 11434];

/// Service type advertised by the gateway over mDNS.
pub const DEFAULT_SERVICE_TYPE: &str = "_unamentis._tcp.local.";

/// Configuration for the tiered gateway discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// mDNS service type browsed by the NSD tier
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Timeout for the health check that verifies a tier's candidate (milliseconds)
    #[serde(default = "default_health_timeout")]
    pub health_timeout_ms: u64,

    /// Subnet scan settings
    #[serde(default)]
    pub subnet: SubnetScanConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            health_timeout_ms: default_health_timeout(),
            subnet: SubnetScanConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Returns the candidate health check timeout as a Duration
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.service_type.is_empty() {
            return Err("service_type cannot be empty".to_string());
        }

        if self.health_timeout_ms == 0 {
            return Err("health_timeout_ms cannot be 0".to_string());
        }

        self.subnet.validate()
    }
}

/// Subnet scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetScanConfig {
    /// Ports tried on every host, in order
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// Hosts probed across all ports before the sweep starts
    #[serde(default = "default_priority_hosts")]
    pub priority_hosts: Vec<String>,

    /// Sweep the local /24 after the priority hosts
    #[serde(default = "default_sweep_enabled")]
    pub sweep_enabled: bool,

    /// First host octet of the sweep
    #[serde(default = "default_sweep_first")]
    pub sweep_first: u8,

    /// Last host octet of the sweep (inclusive)
    #[serde(default = "default_sweep_last")]
    pub sweep_last: u8,

    /// Timeout for a single host/port probe (milliseconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Hosts probed concurrently during the sweep
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// Address whose /24 is swept; detected from the routing interface when unset
    #[serde(default)]
    pub local_address: Option<Ipv4Addr>,
}

impl Default for SubnetScanConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            priority_hosts: default_priority_hosts(),
            sweep_enabled: default_sweep_enabled(),
            sweep_first: default_sweep_first(),
            sweep_last: default_sweep_last(),
            probe_timeout_ms: default_probe_timeout(),
            max_concurrent_probes: default_max_concurrent_probes(),
            local_address: None,
        }
    }
}

impl SubnetScanConfig {
    /// Returns the per-probe timeout as a Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ports.is_empty() {
            return Err("at least one scan port must be configured".to_string());
        }

        if self.ports.contains(&0) {
            return Err("scan ports cannot contain 0".to_string());
        }

        if self.sweep_first == 0 || self.sweep_first > self.sweep_last {
            return Err(format!(
                "invalid sweep range {}..={}",
                self.sweep_first, self.sweep_last
            ));
        }

        if self.probe_timeout_ms == 0 {
            return Err("probe_timeout_ms cannot be 0".to_string());
        }

        if self.max_concurrent_probes == 0 {
            return Err("max_concurrent_probes cannot be 0".to_string());
        }

        Ok(())
    }
}

// Default configuration values
fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

fn default_health_timeout() -> u64 {
    2000
}

fn default_ports() -> Vec<u16> {
    DEFAULT_SCAN_PORTS.to_vec()
}

fn default_priority_hosts() -> Vec<String> {
    // Gateway running on the same machine
    vec!["127.0.0.1".to_string()]
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_first() -> u8 {
    1
}

fn default_sweep_last() -> u8 {
    254
}

fn default_probe_timeout() -> u64 {
    500
}

fn default_max_concurrent_probes() -> usize {
    32
}
