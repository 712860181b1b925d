//! Cached tier: re-validates the last known-good gateway address

use crate::error::{DiscoveryError, Result};
use crate::health::HealthChecker;
use crate::source::{CancelSlot, DiscoverySource};
use crate::types::{DiscoveredServer, DiscoveryMethod, DiscoveryTier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The single persisted gateway record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedServerRecord {
    pub host: String,
    pub port: u16,
    pub name: String,

    /// How the gateway was originally found
    pub method: DiscoveryMethod,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    pub saved_at: DateTime<Utc>,
}

impl CachedServerRecord {
    /// Snapshot of a server for persistence
    pub fn from_server(server: &DiscoveredServer) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            name: server.name.clone(),
            method: server.discovery_method,
            metadata: server.metadata.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Rebuilds a server from the record, tagged `CACHED`
    pub fn to_server(&self) -> DiscoveredServer {
        DiscoveredServer::new(
            self.name.clone(),
            self.host.clone(),
            self.port,
            DiscoveryMethod::Cached,
        )
        .with_metadata_map(self.metadata.clone())
    }
}

/// Key-value persistence for the cached record. Absence is a valid state.
pub trait CacheStore: Send + Sync {
    fn load(&self) -> Result<Option<CachedServerRecord>>;
    fn save(&self, record: &CachedServerRecord) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the record as a JSON file
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self) -> Result<Option<CachedServerRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, record: &CachedServerRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the record in memory only
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    record: RwLock<Option<CachedServerRecord>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self) -> Result<Option<CachedServerRecord>> {
        Ok(self.record.read().clone())
    }

    fn save(&self, record: &CachedServerRecord) -> Result<()> {
        *self.record.write() = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.write() = None;
        Ok(())
    }
}

/// First tier: reuses the last gateway that passed verification.
///
/// A record that fails its probe is kept; only `clear_cache` removes it.
pub struct CachedServerDiscovery {
    store: Arc<dyn CacheStore>,
    health: HealthChecker,
    cancel: CancelSlot,
}

impl CachedServerDiscovery {
    pub fn new(store: Arc<dyn CacheStore>, health: HealthChecker) -> Self {
        Self {
            store,
            health,
            cancel: CancelSlot::new(),
        }
    }

    /// Returns the persisted record. Unreadable records count as absent.
    pub fn cached_record(&self) -> Option<CachedServerRecord> {
        match self.store.load() {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cached gateway record");
                None
            }
        }
    }

    /// Overwrites the persisted record
    pub fn save_to_cache(&self, server: &DiscoveredServer) -> Result<()> {
        self.store.save(&CachedServerRecord::from_server(server))?;
        debug!(host = %server.host, port = server.port, "Cached gateway address");
        Ok(())
    }

    /// Deletes the persisted record
    pub fn clear_cache(&self) -> Result<()> {
        self.store.clear()?;
        info!("Cleared cached gateway address");
        Ok(())
    }
}

#[async_trait]
impl DiscoverySource for CachedServerDiscovery {
    fn tier(&self) -> DiscoveryTier {
        DiscoveryTier::Cached
    }

    async fn discover(
        &self,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<DiscoveredServer>> {
        let token = self.cancel.begin(cancel);

        let Some(record) = self.cached_record() else {
            debug!("No cached gateway address");
            return Ok(None);
        };

        let server = record.to_server();
        let url = server.health_url();
        debug!(url = %url, "Probing cached gateway");

        tokio::select! {
            _ = token.cancelled() => Err(DiscoveryError::Cancelled),
            result = self.health.check(&url, budget) => match result {
                Ok(_) => Ok(Some(server)),
                Err(e) => {
                    debug!(url = %url, error = %e, "Cached gateway did not answer");
                    Ok(None)
                }
            },
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}
