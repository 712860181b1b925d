//! Local service advertisement tier (mDNS / DNS-SD)

use crate::error::{DiscoveryError, Result};
use crate::source::{CancelSlot, DiscoverySource};
use crate::types::{DiscoveredServer, DiscoveryMethod, DiscoveryTier, DEFAULT_SERVER_NAME};
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A responder resolved by a service browser
#[derive(Debug, Clone)]
pub struct ResolvedService {
    /// Full DNS-SD name (e.g., "Desk._unamentis._tcp.local.")
    pub fullname: String,

    /// Advertised hostname (e.g., "desk.local.")
    pub hostname: String,

    pub addresses: Vec<IpAddr>,
    pub port: u16,

    /// TXT record properties
    pub properties: HashMap<String, String>,
}

impl ResolvedService {
    /// Preferred address to connect to: IPv4 first, then any address, then
    /// the advertised hostname.
    pub fn host(&self) -> String {
        self.addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| self.addresses.first())
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| self.hostname.trim_end_matches('.').to_string())
    }

    /// Instance label with the service type suffix removed
    pub fn instance_name(&self, service_type: &str) -> String {
        self.fullname
            .strip_suffix(service_type)
            .unwrap_or(&self.fullname)
            .trim_end_matches('.')
            .to_string()
    }
}

/// Local-network browsing primitive
#[async_trait]
pub trait ServiceBrowser: Send + Sync {
    /// Browses for `service_type` until the first responder resolves.
    /// Returns `Ok(None)` if the browse ends without one.
    async fn resolve_first(&self, service_type: &str) -> Result<Option<ResolvedService>>;
}

/// `ServiceBrowser` backed by an `mdns-sd` daemon per browse
#[derive(Debug, Default, Clone, Copy)]
pub struct MdnsBrowser;

/// Shuts the daemon down however the browse future ends
struct DaemonGuard {
    daemon: ServiceDaemon,
    service_type: String,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.daemon.stop_browse(&self.service_type);
        let _ = self.daemon.shutdown();
    }
}

#[async_trait]
impl ServiceBrowser for MdnsBrowser {
    async fn resolve_first(&self, service_type: &str) -> Result<Option<ResolvedService>> {
        let daemon =
            ServiceDaemon::new().map_err(|e| DiscoveryError::MdnsInitFailed(e.to_string()))?;
        let guard = DaemonGuard {
            daemon,
            service_type: service_type.to_string(),
        };

        let receiver = guard
            .daemon
            .browse(service_type)
            .map_err(|e| DiscoveryError::BrowseFailed {
                service_type: service_type.to_string(),
                reason: e.to_string(),
            })?;

        while let Ok(event) = receiver.recv_async().await {
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    debug!(
                        service = info.get_fullname(),
                        hostname = info.get_hostname(),
                        port = info.get_port(),
                        "Service resolved"
                    );
                    return Ok(Some(convert_service_info(&info)));
                }
                ServiceEvent::SearchStarted(typ) => debug!(typ = typ, "Search started"),
                ServiceEvent::ServiceFound(typ, fullname) => {
                    debug!(typ = typ, service = fullname, "Service found, resolving")
                }
                _ => {}
            }
        }

        Ok(None)
    }
}

fn convert_service_info(info: &ServiceInfo) -> ResolvedService {
    let properties = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    ResolvedService {
        fullname: info.get_fullname().to_string(),
        hostname: info.get_hostname().to_string(),
        addresses: info.get_addresses().iter().copied().collect(),
        port: info.get_port(),
        properties,
    }
}

/// Second tier: finds a gateway advertising itself on the local network.
pub struct LocalServiceDiscovery {
    browser: Arc<dyn ServiceBrowser>,
    service_type: String,
    cancel: CancelSlot,
}

impl LocalServiceDiscovery {
    /// Browses with mDNS
    pub fn new(service_type: impl Into<String>) -> Self {
        Self::with_browser(service_type, Arc::new(MdnsBrowser))
    }

    pub fn with_browser(service_type: impl Into<String>, browser: Arc<dyn ServiceBrowser>) -> Self {
        Self {
            browser,
            service_type: service_type.into(),
            cancel: CancelSlot::new(),
        }
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    fn to_server(&self, service: ResolvedService) -> DiscoveredServer {
        let name = service
            .properties
            .get("name")
            .cloned()
            .filter(|name| !name.is_empty())
            .or_else(|| Some(service.instance_name(&self.service_type)).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());

        let mut metadata = service.properties.clone();
        metadata.insert("service_type".to_string(), self.service_type.clone());
        metadata.insert("fullname".to_string(), service.fullname.clone());

        DiscoveredServer::new(name, service.host(), service.port, DiscoveryMethod::Nsd)
            .with_metadata_map(metadata)
    }
}

#[async_trait]
impl DiscoverySource for LocalServiceDiscovery {
    fn tier(&self) -> DiscoveryTier {
        DiscoveryTier::Nsd
    }

    async fn discover(
        &self,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<DiscoveredServer>> {
        let token = self.cancel.begin(cancel);
        debug!(service_type = %self.service_type, budget_ms = budget.as_millis() as u64, "Browsing");

        let browse = tokio::time::timeout(budget, self.browser.resolve_first(&self.service_type));
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Service browse cancelled");
                Ok(None)
            }
            result = browse => match result {
                Err(_) => {
                    debug!(service_type = %self.service_type, "No responder before timeout");
                    Ok(None)
                }
                Ok(Ok(Some(service))) => {
                    let server = self.to_server(service);
                    info!(name = %server.name, url = %server.base_url(), "Gateway advertised on local network");
                    Ok(Some(server))
                }
                Ok(Ok(None)) => Ok(None),
                Ok(Err(e)) => Err(e),
            },
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}
