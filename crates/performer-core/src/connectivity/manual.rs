//! In-memory connectivity source driven by explicit status changes.

use super::{ConnectivitySource, ConnectivityStatus, StatusCallback, SubscriptionId, Subscribers};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A connectivity source whose status is set by its owner.
///
/// Used as the deterministic double in tests and for simulating an offline
/// start from the command line.
pub struct ManualConnectivitySource {
    status: Mutex<ConnectivityStatus>,
    subscribers: Subscribers,
}

impl ManualConnectivitySource {
    pub fn new(initial: ConnectivityStatus) -> Self {
        Self {
            status: Mutex::new(initial),
            subscribers: Subscribers::default(),
        }
    }

    /// Change the status, notifying subscribers only if it actually changed.
    pub fn set_status(&self, status: ConnectivityStatus) {
        {
            let mut current = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == status {
                return;
            }
            *current = status;
        }
        debug!("Manual connectivity source now {}", status);
        self.subscribers.notify(status);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl ConnectivitySource for ManualConnectivitySource {
    fn current_status(&self) -> ConnectivityStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, on_change: StatusCallback) -> SubscriptionId {
        self.subscribers.add(on_change)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_status_notifies_only_on_change() {
        let source = ManualConnectivitySource::new(ConnectivityStatus::Disconnected);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        source.subscribe(Arc::new(move |status| log.lock().unwrap().push(status)));

        source.set_status(ConnectivityStatus::Disconnected);
        source.set_status(ConnectivityStatus::Connected);
        source.set_status(ConnectivityStatus::Connected);
        source.set_status(ConnectivityStatus::Disconnected);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectivityStatus::Connected, ConnectivityStatus::Disconnected]
        );
        assert_eq!(source.current_status(), ConnectivityStatus::Disconnected);
    }

    #[test]
    fn test_unsubscribe() {
        let source = ManualConnectivitySource::new(ConnectivityStatus::Disconnected);
        let id = source.subscribe(Arc::new(|_| {}));
        assert_eq!(source.subscriber_count(), 1);
        source.unsubscribe(id);
        source.unsubscribe(id);
        assert_eq!(source.subscriber_count(), 0);
    }
}
