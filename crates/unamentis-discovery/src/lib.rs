//! Tiered discovery of the UnaMentis gateway on the local network
//!
//! The gateway's address may be unknown, may have changed, or may be
//! unreachable through any single mechanism. This crate tries three
//! strategies in a fixed order, each bounded by its own timeout:
//!
//! 1. **Cached**: re-validate the last known-good address (2s)
//! 2. **NSD**: browse for the `_unamentis._tcp` mDNS advertisement (3s)
//! 3. **Subnet scan**: probe priority hosts, then the local /24 (10s)
//!
//! Every candidate is health-checked by the orchestrator before it is
//! trusted. A failing tier never aborts the search; only cancellation does.
//! When every tier comes up empty the state becomes `ManualConfigRequired`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use unamentis_core::discovery_config::DiscoveryConfig;
//! use unamentis_discovery::{DeviceDiscoveryManager, FileCacheStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(FileCacheStore::new("/tmp/unamentis/gateway.json"));
//!     let manager = DeviceDiscoveryManager::from_config(&DiscoveryConfig::default(), store)?;
//!
//!     if let Some(server) = manager.start_discovery().await {
//!         println!("Gateway at {}", server.base_url());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cache;
pub mod error;
pub mod health;
pub mod manager;
pub mod nsd;
pub mod source;
pub mod subnet;
pub mod types;

pub use bridge::ServerConfigBridge;
pub use cache::{CacheStore, CachedServerDiscovery, CachedServerRecord, FileCacheStore, MemoryCacheStore};
pub use error::{DiscoveryError, Result};
pub use health::{HealthChecker, HealthResponse};
pub use manager::DeviceDiscoveryManager;
pub use nsd::{LocalServiceDiscovery, MdnsBrowser, ResolvedService, ServiceBrowser};
pub use source::DiscoverySource;
pub use subnet::{LocalAddress, SubnetScanDiscovery};
pub use types::{DiscoveredServer, DiscoveryMethod, DiscoveryState, DiscoveryTier};
