//! Subnet scan tier: probes local addresses for a gateway `/health` endpoint
//!
//! The scan runs in two phases:
//! 1. every priority host across all candidate ports, sequentially
//! 2. a sweep of the local /24, hosts dispatched in ascending order with
//!    bounded concurrency, each host trying the ports in declared order
//!
//! The first healthy responder wins and the remaining probes are dropped.

use crate::error::{DiscoveryError, Result};
use crate::health::HealthChecker;
use crate::source::{CancelSlot, DiscoverySource};
use crate::types::{health_url, DiscoveredServer, DiscoveryMethod, DiscoveryTier};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use unamentis_core::discovery_config::SubnetScanConfig;

pub use unamentis_core::discovery_config::DEFAULT_SCAN_PORTS;

/// Where the sweep takes its /24 from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAddress {
    /// The interface that routes off-host
    Detect,
    /// A fixed address
    Fixed(Ipv4Addr),
    /// No usable IPv4 address; the sweep fails with `NetworkUnavailable`
    Unavailable,
}

impl LocalAddress {
    async fn resolve(self) -> Option<Ipv4Addr> {
        match self {
            LocalAddress::Detect => local_ipv4().await,
            LocalAddress::Fixed(addr) => Some(addr),
            LocalAddress::Unavailable => None,
        }
    }
}

/// Third tier: brute-force probing of the local network.
pub struct SubnetScanDiscovery {
    health: HealthChecker,
    config: SubnetScanConfig,
    local: LocalAddress,
    cancel: CancelSlot,
}

impl SubnetScanDiscovery {
    pub fn new(config: SubnetScanConfig, health: HealthChecker) -> Self {
        let local = config
            .local_address
            .map_or(LocalAddress::Detect, LocalAddress::Fixed);
        Self {
            health,
            config,
            local,
            cancel: CancelSlot::new(),
        }
    }

    /// Overrides how the sweep finds the local address.
    pub fn with_local_address(mut self, local: LocalAddress) -> Self {
        self.local = local;
        self
    }

    /// Candidate ports, in probe order
    pub fn ports(&self) -> &[u16] {
        &self.config.ports
    }

    /// Probes one host/port. Anything but a 2xx answer yields `None`.
    pub async fn probe_host(&self, host: &str, port: u16) -> Option<DiscoveredServer> {
        let url = health_url(host, port);
        match self.health.check(&url, self.config.probe_timeout()).await {
            Ok(response) => Some(DiscoveredServer::new(
                response.server_name(),
                host,
                port,
                DiscoveryMethod::SubnetScan,
            )),
            Err(e) => {
                trace!(url = %url, error = %e, "Probe missed");
                None
            }
        }
    }

    /// Tries every candidate port on `host` in order.
    async fn probe_ports(&self, host: &str, token: &CancellationToken) -> Option<DiscoveredServer> {
        for (index, &port) in self.config.ports.iter().enumerate() {
            if token.is_cancelled() {
                return None;
            }
            if let Some(server) = self.probe_host(host, port).await {
                return Some(server.with_metadata("port_index", index.to_string()));
            }
        }
        None
    }

    async fn scan(&self, token: &CancellationToken) -> Result<Option<DiscoveredServer>> {
        for host in &self.config.priority_hosts {
            debug!(host = %host, "Probing priority host");
            if let Some(server) = self.probe_ports(host, token).await {
                return Ok(Some(server.with_metadata("probe", "priority")));
            }
            if token.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
        }

        if !self.config.sweep_enabled {
            return Ok(None);
        }

        let local = self.local.resolve().await.ok_or_else(|| {
            DiscoveryError::NetworkUnavailable("no local IPv4 address to sweep from".to_string())
        })?;
        let hosts = sweep_hosts(
            local,
            self.config.sweep_first,
            self.config.sweep_last,
            &self.config.priority_hosts,
        );
        info!(
            local = %local,
            hosts = hosts.len(),
            ports = ?self.config.ports,
            "Sweeping local subnet"
        );

        let mut probes = stream::iter(hosts)
            .map(|host| async move { self.probe_ports(&host, token).await })
            .buffer_unordered(self.config.max_concurrent_probes);

        while let Some(result) = probes.next().await {
            if let Some(server) = result {
                return Ok(Some(server.with_metadata("probe", "sweep")));
            }
            if token.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl DiscoverySource for SubnetScanDiscovery {
    fn tier(&self) -> DiscoveryTier {
        DiscoveryTier::SubnetScan
    }

    async fn discover(
        &self,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<DiscoveredServer>> {
        let token = self.cancel.begin(cancel);

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(DiscoveryError::Cancelled),
            result = tokio::time::timeout(budget, self.scan(&token)) => match result {
                Ok(Ok(Some(server))) => {
                    info!(name = %server.name, url = %server.base_url(), "Gateway found by subnet scan");
                    Ok(Some(server))
                }
                Ok(other) => other,
                Err(_) => {
                    debug!(budget_ms = budget.as_millis() as u64, "Subnet scan budget exhausted");
                    Ok(None)
                }
            },
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Address of the interface that routes off-host. No packets are sent.
async fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).await.ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(addr) if !addr.is_unspecified() && !addr.is_loopback() => Some(addr),
        _ => None,
    }
}

/// Hosts of `local`'s /24 in `first..=last`, excluding `local` and `skip`.
pub fn sweep_hosts(local: Ipv4Addr, first: u8, last: u8, skip: &[String]) -> Vec<String> {
    let [a, b, c, _] = local.octets();
    (first..=last)
        .map(|d| Ipv4Addr::new(a, b, c, d))
        .filter(|addr| *addr != local)
        .map(|addr| addr.to_string())
        .filter(|host| !skip.contains(host))
        .collect()
}
