//! Translates discovery results into the application's server configuration.

use crate::manager::DeviceDiscoveryManager;
use crate::types::DiscoveredServer;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;
use unamentis_core::{ServerConfig, ServerConfigStore, ServerType};

/// Thin adapter between the orchestrator and a `ServerConfigStore`.
pub struct ServerConfigBridge {
    manager: Arc<DeviceDiscoveryManager>,
    store: Arc<dyn ServerConfigStore>,
}

impl ServerConfigBridge {
    pub fn new(manager: Arc<DeviceDiscoveryManager>, store: Arc<dyn ServerConfigStore>) -> Self {
        Self { manager, store }
    }

    pub fn manager(&self) -> &Arc<DeviceDiscoveryManager> {
        &self.manager
    }

    /// Runs discovery and registers the gateway it finds.
    pub async fn connect_with_auto_discovery(&self) -> Option<ServerConfig> {
        let server = self.manager.start_discovery().await?;
        self.register(&server)
    }

    /// Configures a gateway by address and registers it on success.
    pub async fn configure_server_manually(
        &self,
        host: &str,
        port: u16,
        name: Option<&str>,
    ) -> Option<ServerConfig> {
        let server = self.manager.configure_manually(host, port, name).await?;
        self.register(&server)
    }

    pub async fn retry_auto_discovery(&self) -> Option<DiscoveredServer> {
        self.manager.retry_discovery().await
    }

    pub fn cancel_discovery(&self) {
        self.manager.cancel_discovery();
    }

    pub fn clear_discovery_cache(&self) -> crate::Result<()> {
        self.manager.clear_cache()
    }

    pub fn start_discovery_in_background(&self) -> JoinHandle<Option<DiscoveredServer>> {
        self.manager.start_discovery_in_background()
    }

    fn register(&self, server: &DiscoveredServer) -> Option<ServerConfig> {
        let config = to_server_config(server);
        match self.store.register(config.clone()) {
            Ok(()) => Some(config),
            Err(e) => {
                error!(error = %e, url = %server.base_url(), "Failed to register discovered gateway");
                None
            }
        }
    }
}

/// Maps a discovered gateway onto an application server record.
pub fn to_server_config(server: &DiscoveredServer) -> ServerConfig {
    ServerConfig::builder()
        .name(server.name.clone())
        .host(server.host.clone())
        .port(server.port)
        .server_type(ServerType::Gateway)
        .tag(server.discovery_method.as_str().to_lowercase())
        .build()
}
