//! Tiered discovery orchestrator
//!
//! Drives the sources in ascending tier priority, verifies every candidate
//! with its own health check, and owns the observable state machine:
//!
//! ```text
//! Idle -> Discovering -> TryingTier(CACHED) -> TryingTier(NSD) -> TryingTier(SUBNET_SCAN)
//!                               |                    |                    |
//!                               +--------------------+--------------------+--> Connected(server)
//!                                                                         +--> ManualConfigRequired
//! any tier --Cancelled--> Idle
//! configure_manually --> Connected(server) | Failed(message)
//! ```

use crate::cache::{CacheStore, CachedServerDiscovery};
use crate::error::{DiscoveryError, Result};
use crate::health::HealthChecker;
use crate::nsd::LocalServiceDiscovery;
use crate::source::DiscoverySource;
use crate::subnet::SubnetScanDiscovery;
use crate::types::{
    health_url, validate_endpoint, DiscoveredServer, DiscoveryMethod, DiscoveryState,
    DEFAULT_SERVER_NAME,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unamentis_core::discovery_config::DiscoveryConfig;

/// Orchestrates the discovery tiers. Construct one per application session.
pub struct DeviceDiscoveryManager {
    cache: Arc<CachedServerDiscovery>,

    /// Sources sorted by tier priority
    sources: Vec<Arc<dyn DiscoverySource>>,

    health: HealthChecker,
    health_timeout: Duration,

    state: watch::Sender<DiscoveryState>,
    progress: watch::Sender<f32>,
    connected_server: watch::Sender<Option<DiscoveredServer>>,
    discovered_servers: watch::Sender<Vec<DiscoveredServer>>,

    /// Parent of every run token handed out since the last cancel
    session: Mutex<CancellationToken>,

    /// Serializes `start_discovery`
    run_lock: tokio::sync::Mutex<()>,
}

impl DeviceDiscoveryManager {
    /// Creates an orchestrator over explicit sources.
    ///
    /// `cache` receives every verified server; it is usually also one of
    /// `sources`.
    pub fn new(
        cache: Arc<CachedServerDiscovery>,
        mut sources: Vec<Arc<dyn DiscoverySource>>,
        health: HealthChecker,
        health_timeout: Duration,
    ) -> Self {
        sources.sort_by_key(|source| source.tier().priority());

        Self {
            cache,
            sources,
            health,
            health_timeout,
            state: watch::Sender::new(DiscoveryState::Idle),
            progress: watch::Sender::new(0.0),
            connected_server: watch::Sender::new(None),
            discovered_servers: watch::Sender::new(Vec::new()),
            session: Mutex::new(CancellationToken::new()),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates an orchestrator with the production CACHED, NSD, and
    /// SUBNET_SCAN sources sharing one HTTP client.
    pub fn from_config(config: &DiscoveryConfig, store: Arc<dyn CacheStore>) -> Result<Self> {
        config.validate().map_err(DiscoveryError::InvalidConfig)?;

        let health = HealthChecker::new()?;
        let cache = Arc::new(CachedServerDiscovery::new(store, health.clone()));
        let sources: Vec<Arc<dyn DiscoverySource>> = vec![
            cache.clone(),
            Arc::new(LocalServiceDiscovery::new(config.service_type.clone())),
            Arc::new(SubnetScanDiscovery::new(config.subnet.clone(), health.clone())),
        ];

        info!(
            service_type = %config.service_type,
            ports = ?config.subnet.ports,
            "Discovery manager created"
        );

        Ok(Self::new(cache, sources, health, config.health_timeout()))
    }

    /// Current state
    pub fn state(&self) -> DiscoveryState {
        self.state.borrow().clone()
    }

    /// Progress of the current run, 0.0 to 1.0
    pub fn progress(&self) -> f32 {
        *self.progress.borrow()
    }

    /// Verified server in use, if any
    pub fn connected_server(&self) -> Option<DiscoveredServer> {
        self.connected_server.borrow().clone()
    }

    /// Every verified server seen this session
    pub fn discovered_servers(&self) -> Vec<DiscoveredServer> {
        self.discovered_servers.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DiscoveryState> {
        self.state.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    pub fn subscribe_connected_server(&self) -> watch::Receiver<Option<DiscoveredServer>> {
        self.connected_server.subscribe()
    }

    /// Cached tier, for direct access to the persisted record
    pub fn cache(&self) -> &CachedServerDiscovery {
        &self.cache
    }

    /// Runs the tiers in priority order until one yields a healthy gateway.
    ///
    /// Returns `None` when every tier came up empty (state
    /// `ManualConfigRequired`) or when the run was cancelled (state `Idle`,
    /// unless it was cancelled before it started).
    ///
    /// The run is bound to the current session when this is called, so a
    /// `cancel_discovery` issued before the future first polls, or while it
    /// waits behind another run, still cancels it.
    pub fn start_discovery(&self) -> impl Future<Output = Option<DiscoveredServer>> + Send + '_ {
        let token = self.run_token();
        self.run(token)
    }

    async fn run(&self, token: CancellationToken) -> Option<DiscoveredServer> {
        let _run = self.run_lock.lock().await;
        if token.is_cancelled() {
            // Cancelled before it ran; the state belongs to whoever ran last
            debug!("Discovery cancelled before it started");
            return None;
        }
        let started = Instant::now();

        info!("Starting gateway discovery");
        self.set_state(DiscoveryState::Discovering);
        self.progress.send_replace(0.0);

        let total = self.sources.len().max(1) as f32;
        for (index, source) in self.sources.iter().enumerate() {
            if token.is_cancelled() {
                return self.abort_cancelled();
            }

            let tier = source.tier();
            self.set_state(DiscoveryState::TryingTier { tier });
            self.progress.send_replace(index as f32 / total);

            let tier_started = Instant::now();
            let candidate = match source.discover(tier.timeout(), &token).await {
                Ok(Some(server)) => server,
                Ok(None) => {
                    if token.is_cancelled() {
                        return self.abort_cancelled();
                    }
                    debug!(tier = %tier, elapsed_ms = tier_started.elapsed().as_millis() as u64, "Tier found nothing");
                    continue;
                }
                Err(DiscoveryError::Cancelled) => return self.abort_cancelled(),
                Err(e) => {
                    if token.is_cancelled() {
                        return self.abort_cancelled();
                    }
                    warn!(tier = %tier, error = %e, "Discovery tier failed, trying next tier");
                    continue;
                }
            };

            match self.verify(&candidate, &token).await {
                Ok(()) => {
                    info!(
                        tier = %tier,
                        name = %candidate.name,
                        url = %candidate.base_url(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Gateway discovered"
                    );
                    self.mark_connected(&candidate);
                    self.persist(&candidate);
                    self.progress.send_replace(1.0);
                    return Some(candidate);
                }
                Err(DiscoveryError::Cancelled) => return self.abort_cancelled(),
                Err(e) => {
                    warn!(
                        tier = %tier,
                        url = %candidate.health_url(),
                        error = %e,
                        "Discarding candidate that failed verification"
                    );
                }
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "No gateway found, manual configuration required"
        );
        self.set_state(DiscoveryState::ManualConfigRequired);
        self.progress.send_replace(1.0);
        None
    }

    /// Spawns `start_discovery` on the runtime.
    pub fn start_discovery_in_background(self: &Arc<Self>) -> JoinHandle<Option<DiscoveredServer>> {
        let manager = Arc::clone(self);
        let token = self.run_token();
        tokio::spawn(async move { manager.run(token).await })
    }

    /// Cancels every pending or in-flight run and every source, whatever the
    /// state. Runs started afterwards are unaffected.
    pub fn cancel_discovery(&self) {
        debug!("Cancelling discovery");
        let previous = std::mem::replace(&mut *self.session.lock(), CancellationToken::new());
        previous.cancel();
        for source in &self.sources {
            source.cancel();
        }
    }

    /// Cancels any in-flight run, then starts a fresh one.
    pub async fn retry_discovery(&self) -> Option<DiscoveredServer> {
        info!("Retrying gateway discovery");
        self.cancel_discovery();
        self.start_discovery().await
    }

    /// Verifies `host:port` directly, bypassing every tier.
    ///
    /// Any discovery run is cancelled first and no run can start until the
    /// manual check settles. The name is `name` if given, else the name the
    /// gateway reports, else the default.
    pub async fn configure_manually(
        &self,
        host: &str,
        port: u16,
        name: Option<&str>,
    ) -> Option<DiscoveredServer> {
        self.cancel_discovery();
        let _run = self.run_lock.lock().await;

        let host = host.trim();
        if let Err(reason) = validate_endpoint(host, port) {
            return self.fail(format!("Invalid server address: {}", reason));
        }

        info!(host, port, "Configuring gateway manually");
        let url = health_url(host, port);
        match self.health.check(&url, self.health_timeout).await {
            Ok(response) => {
                let name = name
                    .map(str::to_string)
                    .or_else(|| response.reported_name())
                    .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());
                let server = DiscoveredServer::new(name, host, port, DiscoveryMethod::Manual);

                self.persist(&server);
                self.mark_connected(&server);
                Some(server)
            }
            Err(e) => self.fail(format!("Could not reach server at {}:{}: {}", host, port, e)),
        }
    }

    /// Deletes the cached record and returns to `Idle`.
    ///
    /// The session's `discovered_servers` history is left intact.
    pub fn clear_cache(&self) -> Result<()> {
        let result = self.cache.clear_cache();
        self.connected_server.send_replace(None);
        self.set_state(DiscoveryState::Idle);
        result
    }

    fn run_token(&self) -> CancellationToken {
        self.session.lock().child_token()
    }

    async fn verify(&self, candidate: &DiscoveredServer, token: &CancellationToken) -> Result<()> {
        let url = candidate.health_url();
        tokio::select! {
            _ = token.cancelled() => Err(DiscoveryError::Cancelled),
            result = self.health.check(&url, self.health_timeout) => result.map(|_| ()),
        }
    }

    fn mark_connected(&self, server: &DiscoveredServer) {
        self.connected_server.send_replace(Some(server.clone()));
        self.discovered_servers
            .send_modify(|servers| servers.push(server.clone()));
        self.set_state(DiscoveryState::Connected {
            server: server.clone(),
        });
    }

    fn persist(&self, server: &DiscoveredServer) {
        if let Err(e) = self.cache.save_to_cache(server) {
            warn!(error = %e, "Failed to cache gateway address");
        }
    }

    fn abort_cancelled(&self) -> Option<DiscoveredServer> {
        info!("Discovery cancelled");
        self.set_state(DiscoveryState::Idle);
        None
    }

    fn fail(&self, message: String) -> Option<DiscoveredServer> {
        warn!(message = %message, "Manual configuration failed");
        self.set_state(DiscoveryState::Failed { message });
        None
    }

    fn set_state(&self, state: DiscoveryState) {
        debug!(state = %state, "Discovery state changed");
        self.state.send_replace(state);
    }
}
