//! Invalidation notifications.
//!
//! Invalidations publish an event for other processes and in-process
//! listeners. Events go through a bounded queue drained by a fixed set of
//! worker tasks. A full queue drops the event and reports `QueueFull`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use cacheward_core::cache::ResourceType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification queue is full")]
    QueueFull,
    #[error("Notification queue is closed")]
    Closed,
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Published after every successful invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Operation label, e.g. `entity:job:7` or `pattern:job:*`.
    pub operation: String,
    pub resources: Vec<ResourceType>,
    pub removed: u64,
    pub timestamp: DateTime<Utc>,
}

impl InvalidationEvent {
    pub fn new(operation: impl Into<String>, resources: Vec<ResourceType>, removed: u64) -> Self {
        Self {
            operation: operation.into(),
            resources,
            removed,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for invalidation events.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &InvalidationEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &InvalidationEvent) -> Result<(), NotifyError> {
        tracing::info!(
            operation = %event.operation,
            removed = event.removed,
            resources = ?event.resources,
            "cache invalidated"
        );
        Ok(())
    }
}

/// Fans events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<InvalidationEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn deliver(&self, event: &InvalidationEvent) -> Result<(), NotifyError> {
        // No subscribers is not a failure.
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        tracing::trace!(receivers, "invalidation event broadcast");
        Ok(())
    }
}

/// Publishes events as JSON on a Redis channel.
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisSink {
    pool: deadpool_redis::Pool,
    channel: String,
}

#[cfg(feature = "redis")]
impl RedisSink {
    pub fn new(pool: deadpool_redis::Pool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl NotificationSink for RedisSink {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn deliver(&self, event: &InvalidationEvent) -> Result<(), NotifyError> {
        use redis::AsyncCommands;

        let payload =
            serde_json::to_string(event).map_err(|e| NotifyError::Delivery(e.to_string()))?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        let _: i64 = conn
            .publish(&self.channel, payload)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Bounded queue plus worker tasks delivering to one sink.
pub struct NotificationQueue {
    sender: Mutex<Option<mpsc::Sender<InvalidationEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    sink_name: &'static str,
}

impl NotificationQueue {
    /// Starts `workers` tasks draining a queue of `capacity` events.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(sink: Arc<dyn NotificationSink>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let sink_name = sink.name();

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let sink = Arc::clone(&sink);
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(event) = next else { break };
                        match sink.deliver(&event).await {
                            Ok(()) => {
                                counters.delivered.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => {
                                counters.failed.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(
                                    worker,
                                    sink = sink.name(),
                                    operation = %event.operation,
                                    error = %err,
                                    "invalidation event not delivered"
                                );
                            }
                        }
                    }
                    tracing::debug!(worker, "notification worker stopped");
                })
            })
            .collect();

        tracing::info!(
            sink = sink_name,
            workers = workers.max(1),
            capacity = capacity.max(1),
            "notification queue started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            counters,
            sink_name,
        }
    }

    /// Queues an event without waiting.
    ///
    /// # Errors
    ///
    /// `QueueFull` when the backlog is at capacity (the event is dropped),
    /// `Closed` after shutdown.
    pub fn enqueue(&self, event: InvalidationEvent) -> Result<(), NotifyError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(NotifyError::Closed);
        };

        match sender.try_send(event) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(operation = %event.operation, "notification queue full, event dropped");
                Err(NotifyError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(NotifyError::Closed),
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stops accepting events, delivers the backlog and waits for the workers.
    pub async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "notification worker panicked");
            }
        }
        tracing::info!(sink = self.sink_name, stats = ?self.stats(), "notification queue drained");
    }
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("sink", &self.sink_name)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    fn event(operation: &str) -> InvalidationEvent {
        InvalidationEvent::new(operation, vec![ResourceType::Job], 1)
    }

    struct CountingSink {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl NotificationSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, _event: &InvalidationEvent) -> Result<(), NotifyError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct GatedSink {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl NotificationSink for GatedSink {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn deliver(&self, _event: &InvalidationEvent) -> Result<(), NotifyError> {
            let _permit = self.gate.acquire().await.map_err(|_| NotifyError::Closed)?;
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl NotificationSink for BrokenSink {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn deliver(&self, _event: &InvalidationEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_backlog() {
        let sink = Arc::new(CountingSink {
            seen: AtomicUsize::new(0),
        });
        let queue = NotificationQueue::start(sink.clone(), 3, 64);

        for i in 0..20 {
            queue.enqueue(event(&format!("key:{i}"))).unwrap();
        }
        queue.shutdown().await;

        assert_eq!(sink.seen.load(Ordering::SeqCst), 20);
        assert_eq!(
            queue.stats(),
            QueueStats {
                enqueued: 20,
                delivered: 20,
                dropped: 0,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let gate = Arc::new(Semaphore::new(0));
        let queue = NotificationQueue::start(
            Arc::new(GatedSink {
                gate: Arc::clone(&gate),
            }),
            1,
            1,
        );

        let results: Vec<_> = (0..3).map(|i| queue.enqueue(event(&i.to_string()))).collect();
        assert_eq!(results[2], Err(NotifyError::QueueFull));

        gate.add_permits(10);
        queue.shutdown().await;

        let stats = queue.stats();
        assert!(stats.dropped >= 1);
        assert_eq!(stats.enqueued + stats.dropped, 3);
        assert_eq!(stats.delivered, stats.enqueued);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_closed() {
        let queue = NotificationQueue::start(Arc::new(LogSink), 1, 4);
        queue.shutdown().await;

        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(event("late")), Err(NotifyError::Closed));
    }

    #[tokio::test]
    async fn test_failed_deliveries_are_counted() {
        let queue = NotificationQueue::start(Arc::new(BrokenSink), 2, 8);
        queue.enqueue(event("a")).unwrap();
        queue.enqueue(event("b")).unwrap();
        queue.shutdown().await;

        let stats = queue.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn test_broadcast_subscribers_receive_events() {
        let sink = BroadcastSink::new(16);
        let mut subscriber = sink.subscribe();
        let queue = NotificationQueue::start(Arc::new(sink), 1, 4);

        queue.enqueue(event("entity:job:7")).unwrap();
        let received = subscriber.recv().await.unwrap();
        assert_eq!(received.operation, "entity:job:7");
        assert_eq!(received.resources, vec![ResourceType::Job]);

        queue.shutdown().await;
    }

    #[test]
    fn test_event_serializes_resources_as_strings() {
        let json = serde_json::to_value(event("x")).unwrap();
        assert_eq!(json["resources"], serde_json::json!(["job"]));
    }
}
