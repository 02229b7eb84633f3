//! Server discovery service.
//!
//! # Responsibilities
//! - Hold the current base URL and hand it out
//! - Re-probe the current URL before reusing it
//! - Run full discovery (cache replay → network scan → static fallback)
//! - Ensure at most one discovery is in flight; concurrent callers share it
//! - Persist newly confirmed URLs to the working-URL cache
//!
//! # Design Decisions
//! - The current URL is an immutable value swapped atomically (`ArcSwapOption`)
//! - The in-flight discovery is a `Shared` future behind a mutex; joining is a clone
//! - A drop guard releases the in-flight slot when the run ends; a run whose
//!   callers all went away is resumed by the next caller instead of restarted
//! - A discovery superseded by `force_redetect` may finish but never overwrites
//!   the newer result
//! - Discovery never fails; the static fallback always produces a URL

use arc_swap::ArcSwapOption;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::DiscoveryConfig;
use crate::discovery::cache::WorkingUrlCache;
use crate::discovery::candidate::{normalize_base_url, ServerCandidate};
use crate::discovery::scan;
use crate::health::Probe;
use crate::observability::metrics;
use crate::store::{keys, TokenStore};

type SharedDiscovery = Shared<BoxFuture<'static, String>>;

struct InFlight {
    generation: u64,
    forced: bool,
    result: SharedDiscovery,
}

/// Where a discovered base URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Cache,
    Scan,
    Fallback,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::Cache => "cache",
            DiscoverySource::Scan => "scan",
            DiscoverySource::Fallback => "fallback",
        }
    }
}

/// Owns discovery state for the whole process.
///
/// Construct once, wrap in `Arc`, and share with every request pipeline.
pub struct ServerDiscoveryService {
    config: DiscoveryConfig,
    probe: Arc<dyn Probe>,
    store: Arc<dyn TokenStore>,
    current: ArcSwapOption<ServerCandidate>,
    cache: Mutex<WorkingUrlCache>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
    fallback_url: String,
}

impl ServerDiscoveryService {
    pub fn new(config: DiscoveryConfig, probe: Arc<dyn Probe>, store: Arc<dyn TokenStore>) -> Self {
        let fallback_url =
            normalize_base_url(&config.fallback_url).unwrap_or_else(|| config.fallback_url.clone());
        let cache = WorkingUrlCache::new(config.cache_capacity);

        Self {
            config,
            probe,
            store,
            current: ArcSwapOption::empty(),
            cache: Mutex::new(cache),
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            fallback_url,
        }
    }

    /// Hydrate the working-URL cache from the store. Returns the entry count.
    pub async fn load_cache(&self) -> usize {
        let raw = match self.store.get(keys::WORKING_URLS).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read working URL cache");
                return 0;
            }
        };

        match WorkingUrlCache::from_json(&raw, self.config.cache_capacity) {
            Ok(loaded) => {
                let count = loaded.len();
                *self.lock_cache() = loaded;
                tracing::info!(entries = count, "Loaded working URL cache");
                count
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring corrupt working URL cache");
                0
            }
        }
    }

    /// Current base URL without probing or waiting.
    pub fn current_base_url(&self) -> Option<String> {
        self.current.load().as_ref().map(|c| c.base_url.clone())
    }

    /// Current candidate, including when it last answered a probe.
    pub fn current_candidate(&self) -> Option<ServerCandidate> {
        self.current.load_full().map(|c| (*c).clone())
    }

    /// Snapshot of the working-URL cache, most recent first.
    pub fn cached_urls(&self) -> Vec<String> {
        self.lock_cache().urls()
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    /// Return a working base URL, discovering one if needed. Never fails.
    pub async fn discover(self: &Arc<Self>) -> String {
        let snapshot = self.current.load_full();
        if let Some(current) = snapshot.as_ref() {
            if self.probe.probe(&current.base_url).await.reachable {
                // Only refresh the timestamp if nobody replaced the URL meanwhile.
                let confirmed = ServerCandidate::confirmed(current.base_url.clone());
                let _ = self
                    .current
                    .compare_and_swap(&snapshot, Some(Arc::new(confirmed)));
                return current.base_url.clone();
            }
            tracing::info!(base_url = %current.base_url, "Current server unreachable, rediscovering");
        }

        self.join_or_start(false).await
    }

    /// Forget the current URL and run full discovery regardless of its state.
    pub async fn force_redetect(self: &Arc<Self>) -> String {
        tracing::info!("Forcing server re-detection");
        self.current.store(None);
        self.join_or_start(true).await
    }

    /// Record a URL confirmed by other means (e.g. entered by the user).
    pub async fn remember(&self, url: &str) -> Option<String> {
        let url = normalize_base_url(url)?;
        self.promote(&url).await;
        self.current
            .store(Some(Arc::new(ServerCandidate::confirmed(url.clone()))));
        Some(url)
    }

    fn join_or_start(self: &Arc<Self>, forced: bool) -> SharedDiscovery {
        let (result, superseded) = {
            let mut slot = self.lock_in_flight();

            if let Some(in_flight) = slot.as_ref() {
                // A forced redetect only joins another forced run; a plain
                // discovery started before the failure may have the stale answer.
                if !forced || in_flight.forced {
                    tracing::debug!(generation = in_flight.generation, "Joining in-flight discovery");
                    return in_flight.result.clone();
                }
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let this = Arc::clone(self);
            let result = async move { this.run_discovery(generation).await }
                .boxed()
                .shared();

            let superseded = slot.replace(InFlight {
                generation,
                forced,
                result: result.clone(),
            });
            (result, superseded)
        };

        // Dropping an abandoned run fires its guard, which takes the slot lock.
        drop(superseded);
        result
    }

    async fn run_discovery(&self, generation: u64) -> String {
        let _guard = InFlightGuard {
            service: self,
            generation,
        };

        let (url, source) = self.locate().await;
        metrics::record_discovery(source.as_str());

        if self.generation.load(Ordering::SeqCst) == generation {
            let candidate = match source {
                DiscoverySource::Fallback => ServerCandidate::unconfirmed(url.clone()),
                _ => ServerCandidate::confirmed(url.clone()),
            };
            self.current.store(Some(Arc::new(candidate)));
        } else {
            tracing::debug!(generation, base_url = %url, "Discovery superseded, not publishing");
        }

        tracing::info!(base_url = %url, source = source.as_str(), "Server discovered");
        url
    }

    async fn locate(&self) -> (String, DiscoverySource) {
        // 1. Cached replay
        let cached = self.cached_urls();
        for url in &cached {
            if self.probe.probe(url).await.reachable {
                self.promote(url).await;
                return (url.clone(), DiscoverySource::Cache);
            }
        }

        // 2. Network scan
        let prefix = scan::network_prefix(&self.config);
        let tried: HashSet<String> = cached.into_iter().collect();
        let candidates = scan::candidates(&prefix, &self.config, &tried);
        tracing::debug!(prefix = %prefix, candidates = candidates.len(), "Scanning local network");

        if let Some(url) = scan::scan(
            self.probe.as_ref(),
            &candidates,
            self.config.batch_size,
            self.config.batch_pause(),
        )
        .await
        {
            self.promote(&url).await;
            return (url, DiscoverySource::Scan);
        }

        // 3. Static fallback
        tracing::warn!(fallback = %self.fallback_url, "No server reachable, using fallback");
        (self.fallback_url.clone(), DiscoverySource::Fallback)
    }

    async fn promote(&self, url: &str) {
        let json = {
            let mut cache = self.lock_cache();
            cache.promote(url);
            cache.to_json()
        };

        if let Err(e) = self.store.set(keys::WORKING_URLS, &json).await {
            tracing::warn!(error = %e, "Failed to persist working URL cache");
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, WorkingUrlCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ServerDiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDiscoveryService")
            .field("current", &self.current_base_url())
            .field("fallback_url", &self.fallback_url)
            .field("cached", &self.lock_cache().len())
            .finish()
    }
}

/// Releases the in-flight slot when a discovery run ends, however it ends.
struct InFlightGuard<'a> {
    service: &'a ServerDiscoveryService,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.service.lock_in_flight();
        if slot.as_ref().map(|f| f.generation) == Some(self.generation) {
            *slot = None;
        }
    }
}
