//! ConnectivityMonitor - wait for connectivity with a deadline.
//!
//! Every call to [`ConnectivityMonitor::wait_for_connectivity`] that finds the
//! network down registers its own `PendingWait`. A connectivity event resolves
//! all of them; each deadline resolves only its own. Resolution goes through a
//! compare-and-set on the wait's resolved flag, so whichever trigger comes
//! second is a no-op.

use super::{ConnectivitySource, ConnectivityStatus, SubscriptionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// One outstanding wait for connectivity.
struct PendingWait {
    deadline: Instant,
    resolved: AtomicBool,
    slot: Option<oneshot::Sender<bool>>,
}

impl PendingWait {
    fn new(deadline: Instant, slot: oneshot::Sender<bool>) -> Self {
        Self {
            deadline,
            resolved: AtomicBool::new(false),
            slot: Some(slot),
        }
    }

    /// Resolve with `connected`. Returns false if already resolved.
    fn resolve(&mut self, connected: bool) -> bool {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        debug!(
            "Resolving connectivity wait (connected={}, {:?} before deadline)",
            connected,
            self.deadline.saturating_duration_since(Instant::now())
        );
        if let Some(slot) = self.slot.take() {
            // The receiver is gone if the waiting future was dropped.
            let _ = slot.send(connected);
        }
        true
    }
}

/// Monitor state. Only ever touched with the registry mutex held.
#[derive(Default)]
struct WaitRegistry {
    next_id: u64,
    waiters: HashMap<u64, PendingWait>,
    subscription: Option<SubscriptionId>,
}

impl WaitRegistry {
    fn resolve_one(&mut self, id: u64, connected: bool) -> bool {
        match self.waiters.remove(&id) {
            Some(mut wait) => wait.resolve(connected),
            None => false,
        }
    }

    fn resolve_all(&mut self, connected: bool) -> usize {
        self.waiters
            .drain()
            .map(|(_, mut wait)| wait.resolve(connected))
            .filter(|resolved| *resolved)
            .count()
    }
}

type SharedRegistry = Arc<Mutex<WaitRegistry>>;

/// Roughly 30 years; stands in for deadlines that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, WaitRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observes a [`ConnectivitySource`] and lets callers wait for connectivity.
pub struct ConnectivityMonitor {
    source: Arc<dyn ConnectivitySource>,
    registry: SharedRegistry,
}

impl ConnectivityMonitor {
    pub fn new(source: Arc<dyn ConnectivitySource>) -> Self {
        Self {
            source,
            registry: Arc::new(Mutex::new(WaitRegistry::default())),
        }
    }

    /// Latest known status. Non-blocking, no side effects.
    pub fn status(&self) -> ConnectivityStatus {
        self.source.current_status()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Number of waits that have not been resolved yet.
    pub fn pending_waits(&self) -> usize {
        lock(&self.registry).waiters.len()
    }

    /// Whether the monitor currently holds a subscription on its source.
    pub fn is_subscribed(&self) -> bool {
        lock(&self.registry).subscription.is_some()
    }

    /// Wait until the source reports connectivity or `timeout` elapses.
    ///
    /// Returns `true` immediately if already connected. Otherwise returns
    /// `true` if a connectivity event arrived first and `false` if the
    /// deadline did. Dropping the returned future abandons the wait cleanly.
    pub async fn wait_for_connectivity(&self, timeout: Duration) -> bool {
        if self.is_connected() {
            return true;
        }

        let deadline = deadline_after(timeout);
        let (id, mut receiver) = self.register(deadline);
        let _guard = WaitGuard { monitor: self, id };

        // The status may have flipped before our subscription existed.
        if self.is_connected() {
            lock(&self.registry).resolve_one(id, true);
        }

        let connected = tokio::select! {
            result = &mut receiver => result.unwrap_or(false),
            _ = tokio::time::sleep_until(deadline) => {
                let timed_out = lock(&self.registry).resolve_one(id, false);
                if timed_out {
                    debug!("Connectivity wait {} timed out after {:?}", id, timeout);
                }
                // Whoever resolved first has already filled the slot.
                receiver.await.unwrap_or(false)
            }
        };

        debug!("Connectivity wait {} resolved: connected={}", id, connected);
        connected
    }

    fn register(&self, deadline: Instant) -> (u64, oneshot::Receiver<bool>) {
        let (sender, receiver) = oneshot::channel();
        let mut registry = lock(&self.registry);

        let id = registry.next_id;
        registry.next_id += 1;
        registry.waiters.insert(id, PendingWait::new(deadline, sender));

        if registry.subscription.is_none() {
            let shared = Arc::clone(&self.registry);
            let subscription = self.source.subscribe(Arc::new(move |status| {
                if status.is_connected() {
                    let resolved = lock(&shared).resolve_all(true);
                    if resolved > 0 {
                        debug!("Connectivity restored, released {} waiter(s)", resolved);
                    }
                }
            }));
            registry.subscription = Some(subscription);
            debug!("Subscribed to connectivity changes");
        }

        debug!(
            "Registered connectivity wait {} ({} pending)",
            id,
            registry.waiters.len()
        );
        (id, receiver)
    }

    /// Forget wait `id` if still pending and drop the subscription once idle.
    fn finish(&self, id: u64) {
        let mut registry = lock(&self.registry);
        if registry.waiters.remove(&id).is_some() {
            debug!("Connectivity wait {} abandoned before resolution", id);
        }
        if registry.waiters.is_empty() {
            if let Some(subscription) = registry.subscription.take() {
                self.source.unsubscribe(subscription);
                debug!("Unsubscribed from connectivity changes");
            }
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        registry.resolve_all(false);
        if let Some(subscription) = registry.subscription.take() {
            self.source.unsubscribe(subscription);
        }
    }
}

/// Cleans up a wait however its future ends.
struct WaitGuard<'a> {
    monitor: &'a ConnectivityMonitor,
    id: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.monitor.finish(self.id);
    }
}
