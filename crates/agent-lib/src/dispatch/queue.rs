//! Bounded dispatch queue
//!
//! Signals are queued without blocking the polling cycle and delivered by a
//! single worker with a cap on in-flight requests. When the queue is full new
//! signals are dropped.

use super::SignalSink;
use crate::health::{Component, HealthRegistry};
use crate::models::ScalingSignal;
use crate::observability::AgentMetrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the dispatch queue
#[derive(Debug, Clone)]
pub struct DispatchQueueConfig {
    /// Maximum number of queued signals (default: 1024)
    pub capacity: usize,
    /// Maximum number of in-flight dispatches (default: 16)
    pub concurrency: usize,
}

/// Upper bound on queued signals
pub const MAX_CAPACITY: usize = 1 << 20;

/// Upper bound on in-flight dispatches
pub const MAX_CONCURRENCY: u32 = 4096;

impl Default for DispatchQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            concurrency: 16,
        }
    }
}

impl DispatchQueueConfig {
    /// Queue capacity clamped to `1..=MAX_CAPACITY`
    pub fn effective_capacity(&self) -> usize {
        self.capacity.clamp(1, MAX_CAPACITY)
    }

    /// Concurrency clamped to `1..=MAX_CONCURRENCY`
    pub fn effective_concurrency(&self) -> u32 {
        u32::try_from(self.concurrency)
            .unwrap_or(MAX_CONCURRENCY)
            .clamp(1, MAX_CONCURRENCY)
    }
}

/// Counters for dispatch outcomes
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Cloneable submission side of the queue
#[derive(Clone)]
pub struct DispatchHandle {
    sender: mpsc::Sender<ScalingSignal>,
    stats: Arc<DispatchStats>,
    metrics: AgentMetrics,
}

impl DispatchHandle {
    /// Queue a signal for delivery without waiting
    ///
    /// Returns false when the signal was dropped.
    pub fn submit(&self, signal: ScalingSignal) -> bool {
        match self.sender.try_send(signal) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_signals_submitted();
                true
            }
            Err(mpsc::error::TrySendError::Full(signal)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_signals_dropped();
                warn!(
                    service = %signal.service_name,
                    "Dispatch queue full, dropping signal"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(signal)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_signals_dropped();
                warn!(
                    service = %signal.service_name,
                    "Dispatch queue closed, dropping signal"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }
}

/// Queue plus the worker draining it
pub struct DispatchQueue {
    handle: DispatchHandle,
    worker: JoinHandle<()>,
}

impl DispatchQueue {
    /// Start the queue worker on the current runtime
    pub fn start(
        sink: Arc<dyn SignalSink>,
        config: DispatchQueueConfig,
        health: HealthRegistry,
        metrics: AgentMetrics,
    ) -> Self {
        let capacity = config.effective_capacity();
        let concurrency = config.effective_concurrency();
        if capacity != config.capacity || concurrency as usize != config.concurrency {
            warn!(
                requested_capacity = config.capacity,
                requested_concurrency = config.concurrency,
                capacity = capacity,
                concurrency = concurrency,
                "Dispatch queue settings out of range, clamped"
            );
        }

        let (sender, receiver) = mpsc::channel(capacity);
        let stats = Arc::new(DispatchStats::default());

        let worker = tokio::spawn(run_worker(
            receiver,
            sink,
            concurrency,
            stats.clone(),
            health,
            metrics.clone(),
        ));

        Self {
            handle: DispatchHandle {
                sender,
                stats,
                metrics,
            },
            worker,
        }
    }

    /// Get a submission handle
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.handle.stats()
    }

    /// Stop accepting signals and wait for queued and in-flight ones
    ///
    /// Handles cloned from this queue keep it open until they are dropped.
    pub async fn shutdown(self) {
        let Self { handle, worker } = self;
        drop(handle);

        if let Err(e) = worker.await {
            error!(error = %e, "Dispatch worker failed");
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<ScalingSignal>,
    sink: Arc<dyn SignalSink>,
    concurrency: u32,
    stats: Arc<DispatchStats>,
    health: HealthRegistry,
    metrics: AgentMetrics,
) {
    info!(concurrency = concurrency, "Starting dispatch worker");

    let permits = Arc::new(Semaphore::new(concurrency as usize));

    while let Some(signal) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let sink = sink.clone();
        let stats = stats.clone();
        let health = health.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let _permit = permit;
            deliver(sink.as_ref(), signal, &stats, &health, &metrics).await;
        });
    }

    // Every permit back means every spawned delivery has finished
    let _ = permits.acquire_many(concurrency).await;
    info!(
        dispatched = stats.dispatched(),
        failed = stats.failed(),
        "Dispatch worker drained"
    );
}

async fn deliver(
    sink: &dyn SignalSink,
    signal: ScalingSignal,
    stats: &DispatchStats,
    health: &HealthRegistry,
    metrics: &AgentMetrics,
) {
    match sink.dispatch(&signal).await {
        Ok(()) => {
            stats.dispatched.fetch_add(1, Ordering::Relaxed);
            metrics.inc_signals_dispatched();
            health.set_healthy(Component::Dispatcher).await;
            debug!(service = %signal.service_name, "Dispatched scaling signal");
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            metrics.inc_dispatch_errors();
            health
                .set_degraded(Component::Dispatcher, e.to_string())
                .await;
            error!(
                service = %signal.service_name,
                service_id = %signal.service_id,
                error = %e,
                "Unable to send stats"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::models::{BasedStats, CurrentStats};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn signal(name: &str) -> ScalingSignal {
        ScalingSignal {
            service_id: format!("{}-id", name),
            service_name: name.to_string(),
            current: CurrentStats {
                cpu_percentage: 10.0,
                memory_percentage: 20.0,
                replicas: 1,
            },
            based: BasedStats {
                cpu_percentage: 50.0,
                memory_percentage: 0.0,
                min: 1,
                max: 3,
            },
        }
    }

    /// Sink recording delivered signals, failing for names in `reject`
    struct RecordingSink {
        delivered: Mutex<Vec<ScalingSignal>>,
        reject: Vec<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                reject: Vec::new(),
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SignalSink for RecordingSink {
        async fn dispatch(&self, signal: &ScalingSignal) -> Result<(), DispatchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.reject.contains(&signal.service_name) {
                return Err(DispatchError::Rejected {
                    status: "503 Service Unavailable".to_string(),
                    body: "overloaded".to_string(),
                });
            }
            self.delivered.lock().await.push(signal.clone());
            Ok(())
        }
    }

    fn registry() -> HealthRegistry {
        HealthRegistry::new()
    }

    #[test]
    fn test_dispatch_queue_config_default() {
        let config = DispatchQueueConfig::default();
        assert_eq!(config.capacity, 1024);
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.effective_capacity(), 1024);
        assert_eq!(config.effective_concurrency(), 16);
    }

    #[test]
    fn test_dispatch_queue_config_clamped() {
        let zero = DispatchQueueConfig {
            capacity: 0,
            concurrency: 0,
        };
        assert_eq!(zero.effective_capacity(), 1);
        assert_eq!(zero.effective_concurrency(), 1);

        // 2^32 must not wrap to zero permits
        let huge = DispatchQueueConfig {
            capacity: usize::MAX,
            concurrency: (u32::MAX as usize).saturating_add(1),
        };
        assert_eq!(huge.effective_capacity(), MAX_CAPACITY);
        assert_eq!(huge.effective_concurrency(), MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_oversized_concurrency_still_drains() {
        let mut sink = RecordingSink::new();
        sink.delay = Duration::from_millis(20);
        let sink = Arc::new(sink);

        let queue = DispatchQueue::start(
            sink.clone(),
            DispatchQueueConfig {
                capacity: 8,
                concurrency: (u32::MAX as usize).saturating_add(1),
            },
            registry(),
            AgentMetrics::new(),
        );

        let handle = queue.handle();
        assert!(handle.submit(signal("api")));
        assert!(handle.submit(signal("web")));
        drop(handle);

        queue.shutdown().await;
        assert_eq!(sink.delivered.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_signals() {
        let sink = Arc::new(RecordingSink::new());
        let queue = DispatchQueue::start(
            sink.clone(),
            DispatchQueueConfig::default(),
            registry(),
            AgentMetrics::new(),
        );

        let handle = queue.handle();
        assert!(handle.submit(signal("api")));
        assert!(handle.submit(signal("web")));
        drop(handle);

        let stats = queue.stats();
        queue.shutdown().await;

        assert_eq!(stats.submitted(), 2);
        assert_eq!(stats.dispatched(), 2);
        assert_eq!(sink.delivered.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_dispatch_does_not_block_others() {
        let mut sink = RecordingSink::new();
        sink.reject = vec!["api".to_string()];
        let sink = Arc::new(sink);
        let health = registry();

        let queue = DispatchQueue::start(
            sink.clone(),
            DispatchQueueConfig {
                capacity: 8,
                concurrency: 1,
            },
            health.clone(),
            AgentMetrics::new(),
        );

        let handle = queue.handle();
        handle.submit(signal("api"));
        handle.submit(signal("web"));
        drop(handle);

        let stats = queue.stats();
        queue.shutdown().await;

        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.dispatched(), 1);
        let delivered = sink.delivered.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].service_name, "web");

        // A later success restores the dispatcher
        let report = health.health().await;
        assert!(report.components[&Component::Dispatcher]
            .status
            .is_operational());
    }

    #[tokio::test]
    async fn test_full_queue_drops_signal() {
        let mut sink = RecordingSink::new();
        sink.delay = Duration::from_millis(200);
        let sink = Arc::new(sink);

        let queue = DispatchQueue::start(
            sink.clone(),
            DispatchQueueConfig {
                capacity: 1,
                concurrency: 1,
            },
            registry(),
            AgentMetrics::new(),
        );
        let handle = queue.handle();

        // Fill the in-flight slot and the single queue slot
        assert!(handle.submit(signal("a")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.submit(signal("b")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.submit(signal("c")));

        let accepted_after_full = handle.submit(signal("d"));
        drop(handle);

        let stats = queue.stats();
        queue.shutdown().await;

        assert!(!accepted_after_full);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.dispatched(), 3);
    }

    #[tokio::test]
    async fn test_concurrency_is_capped() {
        let mut sink = RecordingSink::new();
        sink.delay = Duration::from_millis(20);
        let sink = Arc::new(sink);

        let queue = DispatchQueue::start(
            sink.clone(),
            DispatchQueueConfig {
                capacity: 64,
                concurrency: 2,
            },
            registry(),
            AgentMetrics::new(),
        );

        let handle = queue.handle();
        for i in 0..10 {
            handle.submit(signal(&format!("svc{}", i)));
        }
        drop(handle);
        queue.shutdown().await;

        assert_eq!(sink.delivered.lock().await.len(), 10);
        assert!(sink.max_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
