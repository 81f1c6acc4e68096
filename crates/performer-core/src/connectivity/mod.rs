//! Connectivity observation.
//!
//! This module provides:
//! - The `ConnectivitySource` seam a platform reachability signal plugs into
//! - `ConnectivityMonitor`, which waits for connectivity with a deadline
//! - A manual source for tests and simulations
//! - An HTTP probe source for headless processes

mod manual;
mod monitor;
mod probe;

pub use manual::ManualConnectivitySource;
pub use monitor::ConnectivityMonitor;
pub use probe::{ProbeConnectivitySource, ProbeSettings};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Network reachability as reported by a connectivity source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityStatus {
    Connected,
    Disconnected,
}

impl ConnectivityStatus {
    pub fn is_connected(self) -> bool {
        self == ConnectivityStatus::Connected
    }
}

impl std::fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityStatus::Connected => write!(f, "connected"),
            ConnectivityStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Handle returned by [`ConnectivitySource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked with the new status on every change.
pub type StatusCallback = Arc<dyn Fn(ConnectivityStatus) + Send + Sync>;

/// A platform signal for network reachability.
///
/// Implementations own the status; observers only read it. Callbacks must be
/// invoked without holding any lock the implementation also takes in
/// `subscribe`/`unsubscribe`, and never from inside those two methods.
pub trait ConnectivitySource: Send + Sync {
    /// Latest known status. Must not block.
    fn current_status(&self) -> ConnectivityStatus;

    /// Register `on_change` for status changes.
    fn subscribe(&self, on_change: StatusCallback) -> SubscriptionId;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Subscriber registry shared by the bundled sources.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<SubscriptionId, StatusCallback>>,
}

impl Subscribers {
    pub(crate) fn add(&self, on_change: StatusCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, on_change);
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every callback with `status`. The registry lock is released first.
    pub(crate) fn notify(&self, status: ConnectivityStatus) {
        let callbacks: Vec<StatusCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(status);
        }
    }
}
