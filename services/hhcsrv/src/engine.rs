//! Poll cycle engine
//!
//! Walks the point registry once per scheduled tick, decodes every polled point,
//! updates the value cache and notifies subscribers once per productive tick.
//!
//! State machine: `Idle` (no subscribers) → `Scheduled` (timer armed) → `Polling`
//! (tick in flight) → `Scheduled`. A timer fire that finds a tick still in flight is
//! skipped. When no tick succeeds within the staleness window every cached value is
//! invalidated and subscribers are told once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use errors::HeatResult;
use parking_lot::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ValueCache;
use crate::codec::{decode, DecodedValue};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::constants::{DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_STALE_FACTOR, MIN_IO_TIMEOUT_SECS};
use crate::planner::{plan_reads, PlanOptions};
use crate::point::Point;
use crate::registry::PointRegistry;
use crate::subscriber::{Observer, SubscriberRegistry, SubscriptionHandle, UpdateEvent};
use crate::transport::RegisterTransport;

// ============================================================================
// Options, state and statistics
// ============================================================================

/// Function used for single-register writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteFunction {
    /// FC16 for every write
    #[default]
    Multiple,
    /// FC06 when the payload is one register
    Single,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub scan_interval: Duration,
    /// Silence after which cached values are invalidated
    pub stale_after: Duration,
    pub connect_timeout: Duration,
    pub plan: PlanOptions,
    pub write_function: WriteFunction,
}

impl EngineOptions {
    /// Options derived from a scan interval, clamped to at least one second
    pub fn with_interval(scan_interval: Duration) -> Self {
        let scan_interval = scan_interval.max(Duration::from_secs(1));
        Self {
            scan_interval,
            stale_after: scan_interval * DEFAULT_STALE_FACTOR,
            connect_timeout: io_timeout(scan_interval),
            plan: PlanOptions::default(),
            write_function: WriteFunction::default(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::with_interval(Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS))
    }
}

/// Connect/request timeout for a scan interval: one second less than the interval,
/// never below the floor.
pub fn io_timeout(scan_interval: Duration) -> Duration {
    scan_interval
        .saturating_sub(Duration::from_secs(1))
        .max(Duration::from_secs(MIN_IO_TIMEOUT_SECS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Scheduled,
    Polling,
}

/// Result of one poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Connected and walked the registry; `decoded` points refreshed
    Completed { decoded: usize, failed: usize },
    /// No connection, or not a single point could be decoded
    Failed,
    /// Another tick was still in flight
    Skipped,
}

/// Poll statistics
#[derive(Debug, Clone, Default)]
pub struct PollStats {
    pub ticks_total: u64,
    pub ticks_successful: u64,
    pub ticks_failed: u64,
    pub ticks_skipped: u64,
    pub points_decoded: u64,
    pub point_failures: u64,
    pub stale_invalidations: u64,
    pub last_tick_duration: Option<Duration>,
    pub last_success: Option<Instant>,
}

// ============================================================================
// Engine
// ============================================================================

struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}

#[derive(Debug, Default)]
struct Liveness {
    /// When the scheduler was last armed
    armed_at: Option<Instant>,
    last_success: Option<Instant>,
    /// Invalidation already happened for the current silence
    stale: bool,
}

pub(crate) struct EngineInner {
    pub(crate) registry: PointRegistry,
    pub(crate) connection: ConnectionManager,
    pub(crate) cache: ValueCache,
    pub(crate) subscribers: SubscriberRegistry,
    pub(crate) options: EngineOptions,
    polling: AtomicBool,
    scheduler: tokio::sync::Mutex<Option<SchedulerHandle>>,
    scheduled: AtomicBool,
    liveness: Mutex<Liveness>,
    stats: RwLock<PollStats>,
}

/// Resets the re-entrancy flag when a tick ends, however it ends
struct PollingGuard<'a>(&'a AtomicBool);

impl Drop for PollingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to a running engine; clones share it.
#[derive(Clone)]
pub struct PollEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl PollEngine {
    pub fn new(
        registry: PointRegistry,
        transport: Box<dyn RegisterTransport>,
        options: EngineOptions,
    ) -> Self {
        let connection = ConnectionManager::new(transport, options.connect_timeout);
        info!(
            "Poll engine for {} with {} points every {:?}",
            connection.endpoint(),
            registry.len(),
            options.scan_interval
        );
        Self {
            inner: Arc::new(EngineInner {
                registry,
                connection,
                cache: ValueCache::new(),
                subscribers: SubscriberRegistry::new(),
                options,
                polling: AtomicBool::new(false),
                scheduler: tokio::sync::Mutex::new(None),
                scheduled: AtomicBool::new(false),
                liveness: Mutex::new(Liveness::default()),
                stats: RwLock::new(PollStats::default()),
            }),
        }
    }

    /// Register an observer; the first one arms the scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn subscribe(&self, observer: Arc<dyn Observer>) -> SubscriptionHandle {
        let mut scheduler = self.inner.scheduler.lock().await;
        let (handle, _) = self.inner.subscribers.add(observer);
        if scheduler.is_none() {
            *scheduler = Some(self.start_scheduler());
        }
        handle
    }

    /// Remove an observer; the last one stops the scheduler and closes the connection.
    ///
    /// Returns false for an unknown handle.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut scheduler = self.inner.scheduler.lock().await;
        match self.inner.subscribers.remove(handle) {
            None => false,
            Some(0) => {
                if let Some(running) = scheduler.take() {
                    running.stop().await;
                }
                self.inner.scheduled.store(false, Ordering::Release);
                if let Err(e) = self.inner.connection.close().await {
                    warn!("Closing {} failed: {}", self.inner.connection.endpoint(), e);
                }
                info!("Last subscriber left, polling stopped");
                true
            },
            Some(_) => true,
        }
    }

    /// Run one tick immediately, honouring the re-entrancy guard.
    pub async fn tick_now(&self) -> TickOutcome {
        self.inner.run_tick(None).await
    }

    /// Invalidate cached values if the staleness window elapsed.
    ///
    /// Runs on every timer fire; returns true when this call invalidated.
    pub fn check_staleness(&self) -> bool {
        self.inner.check_staleness()
    }

    /// Current decoded value; `Unavailable` for unknown or never-decoded points
    pub fn get_value(&self, key: &str) -> DecodedValue {
        self.inner.cache.get(key)
    }

    pub fn get_all_values(&self) -> HashMap<String, DecodedValue> {
        self.inner.cache.snapshot()
    }

    pub fn state(&self) -> PollState {
        if self.inner.polling.load(Ordering::Acquire) {
            PollState::Polling
        } else if self.inner.scheduled.load(Ordering::Acquire) {
            PollState::Scheduled
        } else {
            PollState::Idle
        }
    }

    pub fn stats(&self) -> PollStats {
        self.inner.stats.read().clone()
    }

    pub fn registry(&self) -> &PointRegistry {
        &self.inner.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn start_scheduler(&self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        {
            let mut liveness = self.inner.liveness.lock();
            liveness.armed_at = Some(Instant::now());
            liveness.stale = false;
        }
        self.inner.scheduled.store(true, Ordering::Release);
        let task = tokio::spawn(run_scheduler(Arc::clone(&self.inner), cancel.clone()));
        info!(
            "Polling {} every {:?}",
            self.inner.connection.endpoint(),
            self.inner.options.scan_interval
        );
        SchedulerHandle { cancel, task }
    }
}

impl std::fmt::Debug for PollEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollEngine")
            .field("connection", &self.inner.connection)
            .field("points", &self.inner.registry.len())
            .field("state", &self.state())
            .finish()
    }
}

async fn run_scheduler(inner: Arc<EngineInner>, cancel: CancellationToken) {
    let mut ticker = interval(inner.options.scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                inner.check_staleness();
                let inner = Arc::clone(&inner);
                let cancel = cancel.clone();
                ticks.spawn(async move {
                    inner.run_tick(Some(&cancel)).await;
                });
            },
            Some(done) = ticks.join_next(), if !ticks.is_empty() => {
                if let Err(e) = done {
                    warn!("Poll tick task failed: {}", e);
                }
            },
        }
    }

    // In-flight ticks notice the cancellation between reads
    while ticks.join_next().await.is_some() {}
    debug!("Scheduler stopped");
}

impl EngineInner {
    async fn run_tick(&self, cancel: Option<&CancellationToken>) -> TickOutcome {
        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Poll tick skipped: previous tick still running");
            self.stats.write().ticks_skipped += 1;
            return TickOutcome::Skipped;
        }
        let _guard = PollingGuard(&self.polling);

        let started = Instant::now();
        let outcome = self.poll_registry(cancel).await;
        let elapsed = started.elapsed();

        let mut stats = self.stats.write();
        stats.ticks_total += 1;
        stats.last_tick_duration = Some(elapsed);
        match outcome {
            TickOutcome::Completed { decoded, failed } => {
                stats.points_decoded += decoded as u64;
                stats.point_failures += failed as u64;
                if decoded > 0 {
                    stats.ticks_successful += 1;
                    stats.last_success = Some(Instant::now());
                }
            },
            TickOutcome::Failed => stats.ticks_failed += 1,
            TickOutcome::Skipped => {},
        }
        drop(stats);

        debug!("Poll tick finished in {:?}: {:?}", elapsed, outcome);
        outcome
    }

    async fn poll_registry(&self, cancel: Option<&CancellationToken>) -> TickOutcome {
        if let Err(e) = self.connection.ensure_connected().await {
            warn!("Poll tick failed, no connection: {}", e);
            return TickOutcome::Failed;
        }

        let plan = plan_reads(self.registry.polled(), &self.options.plan);
        let mut decoded: Vec<(String, DecodedValue)> = Vec::new();
        let mut failed = 0usize;

        'batches: for batch in &plan {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!("Poll tick cancelled");
                return TickOutcome::Failed;
            }

            let result = self
                .connection
                .read_holding_registers(batch.unit_id, batch.start, batch.count)
                .await;
            match result {
                Ok(words) => {
                    for point in &batch.points {
                        match batch.slice(point, &words) {
                            Some(w) => decoded.push((point.key.clone(), decode(&point.rule, w))),
                            None => {
                                warn!("Short response for {}", point.key);
                                failed += 1;
                            },
                        }
                    }
                },
                Err(e) if e.is_connect_failure() => {
                    warn!("Poll tick aborted, reconnect failed: {}", e);
                    failed += batch.points.len();
                    break;
                },
                Err(e) if batch.points.len() > 1 => {
                    warn!(
                        "Range read unit {} addr {}+{} failed: {}; reading points one by one",
                        batch.unit_id, batch.start, batch.count, e
                    );
                    for (index, point) in batch.points.iter().enumerate() {
                        match self.read_point(point).await {
                            Ok(value) => decoded.push((point.key.clone(), value)),
                            Err(e) if e.is_connect_failure() => {
                                warn!("Poll tick aborted, reconnect failed: {}", e);
                                failed += batch.points.len() - index;
                                break 'batches;
                            },
                            Err(e) => {
                                warn!("Read of {} failed: {}", point.key, e);
                                failed += 1;
                            },
                        }
                    }
                },
                Err(e) => {
                    let key = batch.points.first().map_or("?", |p| p.key.as_str());
                    warn!("Read of {} failed: {}", key, e);
                    failed += 1;
                },
            }
        }

        if decoded.is_empty() {
            if failed > 0 {
                warn!("Poll tick decoded no point ({} failures)", failed);
                return TickOutcome::Failed;
            }
            // Nothing polled: the device was never asked, so liveness is unchanged
            return TickOutcome::Completed {
                decoded: 0,
                failed: 0,
            };
        }

        let count = decoded.len();
        let updated: Vec<String> = decoded.iter().map(|(k, _)| k.clone()).collect();
        self.cache.replace_many(decoded);
        {
            let mut liveness = self.liveness.lock();
            liveness.last_success = Some(Instant::now());
            liveness.stale = false;
        }
        self.subscribers.notify(&UpdateEvent::Poll { updated });
        TickOutcome::Completed {
            decoded: count,
            failed,
        }
    }

    async fn read_point(&self, point: &Point) -> HeatResult<DecodedValue> {
        let words = self
            .connection
            .read_holding_registers(point.unit_id, point.address, point.width)
            .await?;
        Ok(decode(&point.rule, &words))
    }

    fn check_staleness(&self) -> bool {
        {
            let mut liveness = self.liveness.lock();
            let Some(since) = liveness.last_success.or(liveness.armed_at) else {
                return false;
            };
            if liveness.stale || since.elapsed() < self.options.stale_after {
                return false;
            }
            liveness.stale = true;
        }

        let changed = self.cache.invalidate_all();
        self.stats.write().stale_invalidations += 1;
        warn!(
            "No successful poll of {} within {:?}, {} values invalidated",
            self.connection.endpoint(),
            self.options.stale_after,
            changed
        );
        self.subscribers.notify(&UpdateEvent::Stale);
        true
    }
}
