//! Append-only audit log with a retry queue
//!
//! Writes go straight to the event store. A failed write is kept in an
//! in-process queue and retried by a background task, so the ledger
//! converges even when the store was briefly unavailable.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::event::LifecycleEvent;
use crate::db::EventStore;
use crate::types::{GateError, Result};

/// What a failed event write does to the request that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AuditWriteMode {
    /// Log, queue for retry, and report the transition as successful
    #[default]
    BestEffort,
    /// Queue for retry and fail the request
    Strict,
}

impl AuditWriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditWriteMode::BestEffort => "best-effort",
            AuditWriteMode::Strict => "strict",
        }
    }
}

/// The lifecycle ledger
pub struct AuditLog {
    store: Arc<dyn EventStore>,
    mode: AuditWriteMode,
    pending: Mutex<VecDeque<LifecycleEvent>>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn EventStore>, mode: AuditWriteMode) -> Self {
        Self {
            store,
            mode,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn mode(&self) -> AuditWriteMode {
        self.mode
    }

    /// Append an event. Only the lifecycle engine records events.
    pub(crate) async fn record(&self, event: LifecycleEvent) -> Result<()> {
        let Err(e) = self.store.append_lifecycle_event(&event).await else {
            return Ok(());
        };

        error!(
            event_id = %event.id,
            passport_id = %event.passport_id,
            error = %e,
            "Failed to write lifecycle event, queued for retry"
        );
        self.pending.lock().await.push_back(event);

        match self.mode {
            AuditWriteMode::BestEffort => Ok(()),
            AuditWriteMode::Strict => Err(GateError::Persistence(format!(
                "lifecycle event not recorded: {}",
                e
            ))),
        }
    }

    /// Events for a passport in chronological order, including any still
    /// waiting in the retry queue
    pub async fn get_passport_events(&self, passport_id: &str) -> Result<Vec<LifecycleEvent>> {
        let mut events = self.store.list_lifecycle_events(passport_id).await?;

        let queued: Vec<LifecycleEvent> = {
            let pending = self.pending.lock().await;
            pending
                .iter()
                .filter(|e| e.passport_id == passport_id && !events.iter().any(|s| s.id == e.id))
                .cloned()
                .collect()
        };
        events.extend(queued);

        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    /// Retry queued writes in order. Stops at the first failure and keeps
    /// it at the head of the queue. Returns how many were written.
    pub async fn flush_pending(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let mut written = 0;

        while let Some(event) = pending.pop_front() {
            if let Err(e) = self.store.append_lifecycle_event(&event).await {
                warn!(
                    event_id = %event.id,
                    remaining = pending.len() + 1,
                    error = %e,
                    "Lifecycle event retry failed"
                );
                pending.push_front(event);
                break;
            }
            written += 1;
        }

        written
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Spawn the task that drains the retry queue every `interval`
pub fn spawn_audit_retry_task(
    audit: Arc<AuditLog>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if audit.pending_count().await == 0 {
                continue;
            }
            let written = audit.flush_pending().await;
            if written > 0 {
                info!(written = written, "Flushed queued lifecycle events");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::lifecycle::PassportStatus;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Event store that fails while `down` is set
    struct FlakyStore {
        inner: MemoryStore,
        down: AtomicBool,
    }

    #[async_trait::async_trait]
    impl EventStore for FlakyStore {
        async fn append_lifecycle_event(&self, event: &LifecycleEvent) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GateError::Persistence("store down".into()));
            }
            self.inner.append_lifecycle_event(event).await
        }

        async fn list_lifecycle_events(&self, passport_id: &str) -> Result<Vec<LifecycleEvent>> {
            self.inner.list_lifecycle_events(passport_id).await
        }
    }

    fn flaky(down: bool) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            down: AtomicBool::new(down),
        })
    }

    fn shipped(passport_id: &str) -> LifecycleEvent {
        LifecycleEvent::for_transition(
            passport_id,
            PassportStatus::Active,
            PassportStatus::Shipped,
            "system",
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_best_effort_queues_and_flushes() {
        let store = flaky(true);
        let audit = AuditLog::new(store.clone(), AuditWriteMode::BestEffort);

        audit.record(shipped("p-1")).await.unwrap();
        assert_eq!(audit.pending_count().await, 1);
        // Still visible while queued
        assert_eq!(audit.get_passport_events("p-1").await.unwrap().len(), 1);

        assert_eq!(audit.flush_pending().await, 0);
        assert_eq!(audit.pending_count().await, 1);

        store.down.store(false, Ordering::SeqCst);
        assert_eq!(audit.flush_pending().await, 1);
        assert_eq!(audit.pending_count().await, 0);
        assert_eq!(audit.get_passport_events("p-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_fails_but_queues() {
        let audit = AuditLog::new(flaky(true), AuditWriteMode::Strict);
        let err = audit.record(shipped("p-1")).await.unwrap_err();
        assert!(matches!(err, GateError::Persistence(_)));
        assert_eq!(audit.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_events_are_per_passport() {
        let audit = AuditLog::new(flaky(false), AuditWriteMode::default());
        audit.record(shipped("p-1")).await.unwrap();
        audit.record(shipped("p-2")).await.unwrap();
        audit.record(shipped("p-1")).await.unwrap();

        assert_eq!(audit.get_passport_events("p-1").await.unwrap().len(), 2);
        assert_eq!(audit.get_passport_events("p-2").await.unwrap().len(), 1);
        assert!(audit.get_passport_events("p-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_task_drains_queue() {
        let store = flaky(true);
        let audit = Arc::new(AuditLog::new(store.clone(), AuditWriteMode::BestEffort));
        audit.record(shipped("p-1")).await.unwrap();

        let handle = spawn_audit_retry_task(audit.clone(), Duration::from_millis(20));
        store.down.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(audit.pending_count().await, 0);
        handle.abort();
    }
}
