//! Unread badge counter.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::notification::{IngestEvent, IngestSource};

/// Counts notifications that arrived live since the last reset.
///
/// Fed from the ingestor's event broadcast. Backlog batches never count and
/// merges into existing records never count; only newly created records do.
#[derive(Debug)]
pub struct BadgeCounter {
    count: watch::Sender<u64>,
}

impl Default for BadgeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl BadgeCounter {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    pub fn count(&self) -> u64 {
        *self.count.borrow()
    }

    /// Receiver that observes every change of the count.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.count.subscribe()
    }

    /// Apply one ingestor event. Returns the new count.
    pub fn record(&self, event: &IngestEvent) -> u64 {
        if let IngestEvent::Stored {
            source, inserted, ..
        } = event
            && *source != IngestSource::Backlog
            && *inserted > 0
        {
            let inserted = *inserted as u64;
            self.count.send_modify(|count| *count = count.saturating_add(inserted));
        }
        self.count()
    }

    pub fn reset(&self) {
        self.count.send_replace(0);
    }

    /// Consume `events` until the sender side closes.
    pub async fn follow(self: Arc<Self>, mut events: broadcast::Receiver<IngestEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.record(&event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Badge counter lagged behind ingestor events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Ingestor event channel closed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Notification, NotificationKind};

    fn stored(source: IngestSource, inserted: usize) -> IngestEvent {
        let n = Notification::new(NotificationKind::PostLike)
            .with_reference(1, None)
            .with_sender(2);
        IngestEvent::Stored {
            source,
            inserted,
            notifications: vec![n; inserted.max(1)].into(),
        }
    }

    #[test]
    fn test_counts_live_inserts_only() {
        let badge = BadgeCounter::new();
        badge.record(&stored(IngestSource::Backlog, 5));
        assert_eq!(badge.count(), 0);

        badge.record(&stored(IngestSource::Live, 1));
        badge.record(&stored(IngestSource::Generic, 2));
        badge.record(&stored(IngestSource::Live, 0));
        assert_eq!(badge.count(), 3);

        badge.reset();
        assert_eq!(badge.count(), 0);
    }

    #[tokio::test]
    async fn test_follow_until_closed() {
        let badge = Arc::new(BadgeCounter::new());
        let (tx, rx) = broadcast::channel(8);
        let task = tokio::spawn(badge.clone().follow(rx));

        tx.send(stored(IngestSource::Live, 2)).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(badge.count(), 2);
    }
}
