//! Shared fixtures for discovery integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use unamentis_discovery::{
    CacheStore, CachedServerDiscovery, DeviceDiscoveryManager, DiscoveredServer, DiscoveryError,
    DiscoveryMethod, DiscoverySource, DiscoveryTier, HealthChecker, MemoryCacheStore, Result,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What a scripted source does when asked to discover
#[derive(Clone)]
pub enum Behavior {
    /// Return this result immediately
    Return(Option<DiscoveredServer>),
    /// Fail with a recoverable error
    Fail,
    /// Fail with `Cancelled`
    Cancelled,
    /// Block until cancelled, then return `Cancelled`
    Hang,
}

/// Tiers in the order their sources were invoked
pub type CallLog = Arc<Mutex<Vec<DiscoveryTier>>>;

pub struct ScriptedSource {
    tier: DiscoveryTier,
    behavior: Behavior,
    calls: CallLog,
    cancels: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(tier: DiscoveryTier, behavior: Behavior, calls: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            tier,
            behavior,
            calls: calls.clone(),
            cancels: AtomicUsize::new(0),
        })
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoverySource for ScriptedSource {
    fn tier(&self) -> DiscoveryTier {
        self.tier
    }

    async fn discover(
        &self,
        _budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<DiscoveredServer>> {
        self.calls.lock().push(self.tier);
        match &self.behavior {
            Behavior::Return(result) => Ok(result.clone()),
            Behavior::Fail => Err(DiscoveryError::NetworkUnavailable(format!(
                "{} source exploded",
                self.tier
            ))),
            Behavior::Cancelled => Err(DiscoveryError::Cancelled),
            Behavior::Hang => {
                cancel.cancelled().await;
                Err(DiscoveryError::Cancelled)
            }
        }
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Starts a mock gateway answering `/health` with `status`
pub async fn gateway(status: u16) -> MockServer {
    gateway_with_body(status, "").await
}

pub async fn gateway_with_body(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

/// A candidate pointing at `mock`
pub fn candidate(mock: &MockServer, method: DiscoveryMethod) -> DiscoveredServer {
    let addr = mock.address();
    DiscoveredServer::new("Desk", addr.ip().to_string(), addr.port(), method)
}

pub struct Harness {
    pub manager: Arc<DeviceDiscoveryManager>,
    pub store: Arc<MemoryCacheStore>,
    pub calls: CallLog,
    pub sources: Vec<Arc<ScriptedSource>>,
}

/// Orchestrator over three scripted sources (CACHED, NSD, SUBNET_SCAN) and
/// an in-memory cache.
pub fn harness(cached: Behavior, nsd: Behavior, subnet: Behavior) -> Harness {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(MemoryCacheStore::new());
    let health = HealthChecker::new().expect("http client");
    let cache = Arc::new(CachedServerDiscovery::new(
        store.clone() as Arc<dyn CacheStore>,
        health.clone(),
    ));

    // Registered out of order on purpose; the manager sorts by priority.
    let sources = vec![
        ScriptedSource::new(DiscoveryTier::SubnetScan, subnet, &calls),
        ScriptedSource::new(DiscoveryTier::Cached, cached, &calls),
        ScriptedSource::new(DiscoveryTier::Nsd, nsd, &calls),
    ];
    let dyn_sources: Vec<Arc<dyn DiscoverySource>> = sources
        .iter()
        .map(|s| s.clone() as Arc<dyn DiscoverySource>)
        .collect();

    let manager = Arc::new(DeviceDiscoveryManager::new(
        cache,
        dyn_sources,
        health,
        Duration::from_secs(2),
    ));

    Harness {
        manager,
        store,
        calls,
        sources,
    }
}

impl Harness {
    pub fn calls(&self) -> Vec<DiscoveryTier> {
        self.calls.lock().clone()
    }
}
