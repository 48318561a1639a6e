//! Time-bounded cache of the discovered tool set.
//!
//! The whole cache state is one immutable [`CacheState`] value behind an
//! [`ArcSwap`], so the snapshot, its timestamp and the failure marker are
//! always read together. Readers never lock:
//!
//! - a fresh snapshot is returned straight from the swap;
//! - with no snapshot and a failure inside the cooldown window the call fails
//!   fast instead of queueing on the refresh lock;
//! - otherwise the caller takes the refresh lock, re-checks, and at most one
//!   caller at a time performs the remote fetch.
//!
//! A failed or abandoned refresh discards the previous snapshot, records the
//! failure time and invalidates the discovery session.

use arc_swap::ArcSwap;
use rmcp::model::Tool;
use scopeguard::ScopeGuard;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::{DiscoveryError, ToolFetchError};
use super::lifecycle::ClientLifecycleManager;
use super::snapshot::ToolSetSnapshot;
use super::transport::{DiscoveryConnector, DiscoverySession};
use crate::core::clock::{Clock, TokioClock};
use crate::core::config::DiscoveryConfig;

/// Expiry policy for cached tool sets.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// How long a successful fetch is served.
    pub ttl: Duration,
    /// How long a failed fetch blocks new attempts when no data is cached.
    pub failure_cooldown: Duration,
    /// Upper bound on one fetch; exceeding it counts as a failed fetch.
    pub fetch_timeout: Duration,
}

impl From<&DiscoveryConfig> for CachePolicy {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            ttl: config.cache_ttl,
            failure_cooldown: config.failure_cooldown,
            fetch_timeout: config.fetch_timeout,
        }
    }
}

/// Everything the cache knows, published as one value.
#[derive(Debug)]
enum CacheState {
    /// Nothing fetched yet.
    Empty,
    /// Last fetch succeeded. Fresh or stale depending on its age.
    Ready(Arc<ToolSetSnapshot>),
    /// Last fetch failed; any earlier snapshot was discarded.
    Failed { at: Instant },
}

enum Lookup {
    Hit(Arc<ToolSetSnapshot>),
    CoolingDown { retry_after: Duration },
    Refresh,
}

impl CacheState {
    fn lookup(&self, now: Instant, clock: &dyn Clock, policy: &CachePolicy) -> Lookup {
        match self {
            Self::Ready(snapshot) if clock.elapsed(snapshot.fetched_at(), now) < policy.ttl => {
                Lookup::Hit(Arc::clone(snapshot))
            }
            Self::Failed { at } => {
                let since = clock.elapsed(*at, now);
                if since < policy.failure_cooldown {
                    Lookup::CoolingDown {
                        retry_after: policy.failure_cooldown - since,
                    }
                } else {
                    Lookup::Refresh
                }
            }
            Self::Ready(_) | Self::Empty => Lookup::Refresh,
        }
    }
}

/// Observable cache condition, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Empty,
    Fresh { tools: usize, age: Duration },
    Stale { tools: usize, stale_for: Duration },
    Failed { since: Duration },
}

pub struct ToolCache<C: DiscoveryConnector> {
    lifecycle: Arc<ClientLifecycleManager<C>>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
    state: ArcSwap<CacheState>,
    refresh_lock: Mutex<()>,
}

impl<C: DiscoveryConnector> ToolCache<C> {
    pub fn new(lifecycle: Arc<ClientLifecycleManager<C>>, policy: CachePolicy) -> Self {
        Self::with_clock(lifecycle, policy, Arc::new(TokioClock))
    }

    pub fn with_clock(
        lifecycle: Arc<ClientLifecycleManager<C>>,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lifecycle,
            clock,
            policy,
            state: ArcSwap::from_pointee(CacheState::Empty),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn lifecycle(&self) -> &Arc<ClientLifecycleManager<C>> {
        &self.lifecycle
    }

    /// Return the current tool set, refreshing it if it has expired.
    ///
    /// Cancelling `cancel` while waiting for the refresh lock leaves the cache
    /// untouched; cancelling during the remote fetch counts as a failed fetch.
    #[instrument(skip_all)]
    pub async fn get_current(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ToolSetSnapshot>, ToolFetchError> {
        match self.lookup() {
            Lookup::Hit(snapshot) => {
                debug!("Tool cache hit ({} tools)", snapshot.len());
                return Ok(snapshot);
            }
            Lookup::CoolingDown { retry_after } => {
                debug!("Tool cache cooling down, {:?} left", retry_after);
                return Err(self.cooling_down(retry_after));
            }
            Lookup::Refresh => {}
        }

        self.refresh(cancel).await
    }

    /// Describe the cache without touching it.
    pub fn status(&self) -> CacheStatus {
        let now = self.clock.now();
        match self.state.load().as_ref() {
            CacheState::Empty => CacheStatus::Empty,
            CacheState::Ready(snapshot) => {
                let age = self.clock.elapsed(snapshot.fetched_at(), now);
                if age < self.policy.ttl {
                    CacheStatus::Fresh {
                        tools: snapshot.len(),
                        age,
                    }
                } else {
                    CacheStatus::Stale {
                        tools: snapshot.len(),
                        stale_for: age - self.policy.ttl,
                    }
                }
            }
            CacheState::Failed { at } => CacheStatus::Failed {
                since: self.clock.elapsed(*at, now),
            },
        }
    }

    fn lookup(&self) -> Lookup {
        let now = self.clock.now();
        self.state
            .load()
            .lookup(now, self.clock.as_ref(), &self.policy)
    }

    fn cooling_down(&self, retry_after: Duration) -> ToolFetchError {
        ToolFetchError::CoolingDown {
            cooldown: self.policy.failure_cooldown,
            retry_after,
        }
    }

    async fn refresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ToolSetSnapshot>, ToolFetchError> {
        let _lock = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolFetchError::Cancelled),
            guard = self.refresh_lock.lock() => guard,
        };

        // Whoever held the lock before us may have settled the question.
        match self.lookup() {
            Lookup::Hit(snapshot) => return Ok(snapshot),
            Lookup::CoolingDown { retry_after } => return Err(self.cooling_down(retry_after)),
            Lookup::Refresh => {}
        }
        if cancel.is_cancelled() {
            return Err(ToolFetchError::Cancelled);
        }

        // Dropped mid-fetch: record the attempt as failed. Declared after the
        // lock guard so it runs while the lock is still held.
        let abandoned = scopeguard::guard((), |()| self.abandon());

        let timeout = self.policy.fetch_timeout;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolFetchError::Cancelled),
            result = tokio::time::timeout(timeout, self.fetch()) => match result {
                Ok(fetched) => fetched.map_err(ToolFetchError::from),
                Err(_) => Err(ToolFetchError::Timeout { timeout }),
            },
        };
        ScopeGuard::into_inner(abandoned);

        match outcome {
            Ok(tools) => {
                let snapshot = Arc::new(ToolSetSnapshot::new(tools, self.clock.now()));
                self.state
                    .store(Arc::new(CacheState::Ready(Arc::clone(&snapshot))));
                info!(
                    "Tool cache refreshed: {} tools from {}",
                    snapshot.len(),
                    self.lifecycle.endpoint()
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    "Tool fetch from {} failed: {}",
                    self.lifecycle.endpoint(),
                    e
                );
                self.record_failure();

                // Dropped while invalidating: finish the invalidation detached.
                let invalidating = scopeguard::guard((), |()| self.spawn_invalidate());
                self.lifecycle.invalidate().await;
                ScopeGuard::into_inner(invalidating);
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<Tool>, DiscoveryError> {
        let session = self.lifecycle.get_handle().await?;
        session.list_tools().await
    }

    fn record_failure(&self) {
        self.state.store(Arc::new(CacheState::Failed {
            at: self.clock.now(),
        }));
    }

    fn abandon(&self) {
        warn!("Tool fetch abandoned before completion; treating as failed");
        self.record_failure();
        self.spawn_invalidate();
    }

    fn spawn_invalidate(&self) {
        let lifecycle = Arc::clone(&self.lifecycle);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { lifecycle.invalidate().await });
            }
            Err(_) => warn!("No tokio runtime available to invalidate discovery session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::discovery::testing::{FakeConnector, FakeState};
    use tokio_test::{assert_err, assert_ok};

    const TTL: Duration = Duration::from_secs(300);
    const COOLDOWN: Duration = Duration::from_secs(10);
    const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

    const POLICY: CachePolicy = CachePolicy {
        ttl: TTL,
        failure_cooldown: COOLDOWN,
        fetch_timeout: FETCH_TIMEOUT,
    };

    /// Clock moved by hand, independent of tokio's timer.
    struct ManualClock {
        start: Instant,
        offset: std::sync::Mutex<Duration>,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }
    }

    fn cache_with_tools(count: usize) -> (Arc<ToolCache<FakeConnector>>, Arc<FakeState>) {
        let connector = FakeConnector::with_tools(count);
        let state = Arc::clone(&connector.state);
        let lifecycle = Arc::new(ClientLifecycleManager::new(connector, "http://dab:5000/mcp"));
        let cache = ToolCache::new(lifecycle, POLICY);
        (Arc::new(cache), state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_then_cache_hit() {
        let (cache, fake) = cache_with_tools(3);
        let cancel = CancellationToken::new();

        let first = assert_ok!(cache.get_current(&cancel).await);
        assert_eq!(first.len(), 3);
        assert_eq!(fake.list_calls(), 1);

        let second = assert_ok!(cache.get_current(&cancel).await);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fake.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_served_until_ttl_then_refreshed() {
        let (cache, fake) = cache_with_tools(2);
        let cancel = CancellationToken::new();
        let first = assert_ok!(cache.get_current(&cancel).await);

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        let still = assert_ok!(cache.get_current(&cancel).await);
        assert!(Arc::ptr_eq(&first, &still));
        assert_eq!(fake.list_calls(), 1);
        assert!(matches!(cache.status(), CacheStatus::Fresh { tools: 2, .. }));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(cache.status(), CacheStatus::Stale { tools: 2, .. }));
        let refreshed = assert_ok!(cache.get_current(&cancel).await);
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(fake.list_calls(), 2);
        assert_eq!(fake.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_fast_fails_during_cooldown() {
        let (cache, fake) = cache_with_tools(3);
        let cancel = CancellationToken::new();
        fake.set_fail_list(true);

        let err = assert_err!(cache.get_current(&cancel).await);
        assert!(matches!(err, ToolFetchError::Discovery(DiscoveryError::Rpc(_))));
        assert_eq!(fake.closed(), vec![1]);
        assert!(!cache.lifecycle().has_session());

        tokio::time::advance(COOLDOWN / 2).await;
        let err = assert_err!(cache.get_current(&cancel).await);
        assert!(matches!(err, ToolFetchError::CoolingDown { .. }));
        assert_eq!(fake.list_calls(), 1);
        assert_eq!(fake.connects(), 1);

        tokio::time::advance(COOLDOWN).await;
        fake.set_fail_list(false);
        let snapshot = assert_ok!(cache.get_current(&cancel).await);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(fake.list_calls(), 2);
        assert_eq!(fake.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_discards_stale_snapshot() {
        let (cache, fake) = cache_with_tools(1);
        let cancel = CancellationToken::new();
        assert_ok!(cache.get_current(&cancel).await);

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        fake.set_fail_list(true);
        assert_err!(cache.get_current(&cancel).await);
        assert!(matches!(cache.status(), CacheStatus::Failed { .. }));

        let err = assert_err!(cache.get_current(&cancel).await);
        assert!(matches!(err, ToolFetchError::CoolingDown { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_recorded() {
        let (cache, fake) = cache_with_tools(1);
        fake.set_fail_connect(true);

        let err = assert_err!(cache.get_current(&CancellationToken::new()).await);
        assert_eq!(err.error_type(), "ConnectError");
        assert_eq!(fake.list_calls(), 0);
        assert!(matches!(cache.status(), CacheStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let (cache, fake) = cache_with_tools(3);
        fake.set_list_delay(Duration::from_millis(200));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_current(&CancellationToken::new()).await })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(fake.list_calls(), 1);
        assert!(results.iter().all(|s| Arc::ptr_eq(s, &results[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure() {
        let (cache, fake) = cache_with_tools(3);
        fake.set_list_delay(Duration::from_millis(200));
        fake.set_fail_list(true);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_current(&CancellationToken::new()).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_err());
        }
        assert_eq!(fake.list_calls(), 1);
        assert_eq!(fake.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_refresh_leaves_state() {
        let (cache, fake) = cache_with_tools(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = assert_err!(cache.get_current(&cancel).await);
        assert!(matches!(err, ToolFetchError::Cancelled));
        assert_eq!(cache.status(), CacheStatus::Empty);
        assert_eq!(fake.list_calls(), 0);

        assert_ok!(cache.get_current(&CancellationToken::new()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch_counts_as_failure() {
        let (cache, fake) = cache_with_tools(1);
        fake.set_list_delay(Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = assert_err!(cache.get_current(&cancel).await);
        assert!(matches!(err, ToolFetchError::Cancelled));
        assert!(matches!(cache.status(), CacheStatus::Failed { .. }));
        assert_eq!(fake.closed(), vec![1]);

        let err = assert_err!(cache.get_current(&CancellationToken::new()).await);
        assert!(matches!(err, ToolFetchError::CoolingDown { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_refresh_releases_lock_and_records_failure() {
        let (cache, fake) = cache_with_tools(1);
        fake.set_list_delay(Duration::from_secs(5));

        let timed_out = tokio::time::timeout(
            Duration::from_secs(1),
            cache.get_current(&CancellationToken::new()),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(matches!(cache.status(), CacheStatus::Failed { .. }));

        // Let the spawned invalidation run.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fake.closed(), vec![1]);

        tokio::time::advance(COOLDOWN).await;
        fake.set_list_delay(Duration::ZERO);
        assert_ok!(cache.get_current(&CancellationToken::new()).await);
        assert_eq!(fake.connects(), 2);
    }

    #[tokio::test]
    async fn test_expiry_follows_injected_clock() {
        let connector = FakeConnector::with_tools(2);
        let fake = Arc::clone(&connector.state);
        let lifecycle = Arc::new(ClientLifecycleManager::new(connector, "http://dab:5000/mcp"));
        let clock = Arc::new(ManualClock {
            start: Instant::now(),
            offset: std::sync::Mutex::new(Duration::ZERO),
        });
        let cache = ToolCache::with_clock(lifecycle, POLICY, clock.clone());
        let cancel = CancellationToken::new();

        let first = assert_ok!(cache.get_current(&cancel).await);
        clock.advance(TTL - Duration::from_secs(1));
        assert!(Arc::ptr_eq(&first, &assert_ok!(cache.get_current(&cancel).await)));
        assert_eq!(fake.list_calls(), 1);

        clock.advance(Duration::from_secs(2));
        assert_eq!(
            cache.status(),
            CacheStatus::Stale {
                tools: 2,
                stale_for: Duration::from_secs(1)
            }
        );
        assert_ok!(cache.get_current(&cancel).await);
        assert_eq!(fake.list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_listing_times_out_as_failure() {
        let (cache, fake) = cache_with_tools(1);
        fake.set_list_delay(Duration::from_secs(3600));
        let started = Instant::now();

        let err = assert_err!(cache.get_current(&CancellationToken::new()).await);
        assert!(matches!(err, ToolFetchError::Timeout { timeout } if timeout == FETCH_TIMEOUT));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(matches!(cache.status(), CacheStatus::Failed { .. }));
        assert_eq!(fake.closed(), vec![1]);

        let err = assert_err!(cache.get_current(&CancellationToken::new()).await);
        assert!(matches!(err, ToolFetchError::CoolingDown { .. }));
        assert_eq!(fake.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_while_invalidating_still_invalidates() {
        let (cache, fake) = cache_with_tools(1);
        fake.set_list_delay(Duration::from_secs(2));
        fake.set_fail_list(true);

        // Hold the lifecycle lock from t=1s to t=11s with a slow reconnect.
        let lifecycle = Arc::clone(cache.lifecycle());
        let reconnect_state = Arc::clone(&fake);
        let reconnect = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            lifecycle.invalidate().await;
            reconnect_state.set_connect_delay(Duration::from_secs(10));
            lifecycle.get_handle().await.map(|s| s.id)
        });

        // The listing fails at t=2s; the caller gives up at t=3s while the
        // failed refresh is still waiting to invalidate.
        let gave_up = tokio::time::timeout(
            Duration::from_secs(3),
            cache.get_current(&CancellationToken::new()),
        )
        .await;
        assert!(gave_up.is_err());
        assert!(matches!(cache.status(), CacheStatus::Failed { .. }));

        assert_eq!(reconnect.await.unwrap().unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fake.closed(), vec![1, 2]);
        assert!(!cache.lifecycle().has_session());
    }
}
