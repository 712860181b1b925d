//! Application configuration store that discovered gateways are registered into.

use crate::error::{Result, StoreError};
use crate::types::ServerConfig;
use parking_lot::RwLock;
use tracing::{debug, info};

/// Store of server configuration records consumed by the rest of the application.
pub trait ServerConfigStore: Send + Sync {
    /// Registers a server. A record addressing the same endpoint is replaced.
    fn register(&self, server: ServerConfig) -> Result<()>;

    /// Returns all registered servers.
    fn servers(&self) -> Vec<ServerConfig>;

    /// Removes a server by id.
    fn remove(&self, id: &str) -> Option<ServerConfig>;
}

/// Process-local `ServerConfigStore`.
#[derive(Debug, Default)]
pub struct InMemoryServerConfigStore {
    servers: RwLock<Vec<ServerConfig>>,
}

impl InMemoryServerConfigStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerConfigStore for InMemoryServerConfigStore {
    fn register(&self, server: ServerConfig) -> Result<()> {
        server.validate().map_err(|reason| StoreError::InvalidServer {
            name: server.name.clone(),
            reason,
        })?;

        let mut servers = self.servers.write();
        if let Some(existing) = servers.iter_mut().find(|s| s.same_endpoint(&server)) {
            debug!(host = %server.host, port = server.port, "Replacing registered server");
            *existing = server;
        } else {
            info!(
                name = %server.name,
                host = %server.host,
                port = server.port,
                server_type = %server.server_type,
                "Registered server"
            );
            servers.push(server);
        }
        Ok(())
    }

    fn servers(&self) -> Vec<ServerConfig> {
        self.servers.read().clone()
    }

    fn remove(&self, id: &str) -> Option<ServerConfig> {
        let mut servers = self.servers.write();
        let index = servers.iter().position(|s| s.id == id)?;
        Some(servers.remove(index))
    }
}
