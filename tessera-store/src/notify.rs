//! In-process delivery of change notifications.
//!
//! Subscribers are plain callbacks invoked on the store's worker. While
//! the hub is suspended (bulk import), notifications coalesce into one
//! pending batch that flushes on resume, so listeners observe the import
//! as a single change.

use tessera_types::ChangeNotification;
use tracing::debug;

type Subscriber = Box<dyn Fn(&ChangeNotification) + Send>;

/// Fan-out point for change notifications.
#[derive(Default)]
pub struct NotificationHub {
    subscribers: Vec<Subscriber>,
    suspended: u32,
    pending: Option<ChangeNotification>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber.
    pub fn subscribe(&mut self, subscriber: impl Fn(&ChangeNotification) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Publishes a notification, or merges it into the pending batch while
    /// suspended. Empty notifications are dropped.
    pub fn publish(&mut self, notification: ChangeNotification) {
        if notification.is_empty() {
            return;
        }
        if self.suspended > 0 {
            match &mut self.pending {
                Some(pending) => pending.merge(&notification),
                None => self.pending = Some(notification),
            }
            return;
        }
        self.deliver(&notification);
    }

    /// Suspends delivery. Nestable; delivery resumes when every suspension
    /// has been released.
    pub fn suspend(&mut self) {
        self.suspended += 1;
    }

    /// Releases one suspension; flushes the coalesced batch when the last
    /// one is released.
    pub fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
        if self.suspended == 0 {
            if let Some(batch) = self.pending.take() {
                debug!(
                    added = batch.added.len(),
                    deleted = batch.deleted.len(),
                    changed = batch.changed.len(),
                    "flushing coalesced notification batch"
                );
                self.deliver(&batch);
            }
        }
    }

    /// True while delivery is suspended.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended > 0
    }

    fn deliver(&self, notification: &ChangeNotification) {
        for subscriber in &self.subscribers {
            subscriber(notification);
        }
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscribers", &self.subscribers.len())
            .field("suspended", &self.suspended)
            .field("pending", &self.pending)
            .finish()
    }
}
