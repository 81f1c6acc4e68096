//! Loading state machine for a single fetch attempt.
//!
//! `start()` moves `Idle` to `Loading` and launches two tasks: one that shows
//! a "no network" hint if the device is still offline after a short delay,
//! and one that runs the fetch through the [`OperationGate`]. Every write to
//! the state is a check-and-set performed inside the watch channel's lock, so
//! once `Success` or `Failure` is reached nothing can overwrite it.

use crate::cancel::CancellationToken;
use crate::config::{GateConfig, LoaderSettings};
use crate::error::Result;
use crate::gate::{GateOutcome, OperationGate, OutcomeKind};
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Visible progress of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingState<T> {
    /// Nothing started yet.
    Idle,
    /// Fetch in progress, optionally with the "no network" hint.
    Loading { show_no_network_hint: bool },
    /// Terminal: the fetch produced a value.
    Success(T),
    /// Terminal: the fetch did not produce a value.
    Failure { message: String },
}

impl<T> LoadingState<T> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadingState::Success(_) | LoadingState::Failure { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadingState::Loading { .. })
    }
}

/// The fetch the state machine drives.
#[async_trait]
pub trait FetchOperation<T>: Send + Sync {
    async fn fetch(&self) -> Result<T>;
}

/// Adapter turning an async closure into a [`FetchOperation`].
pub struct FnOperation<F>(F);

/// Wrap `f` so it can be handed to a [`LoadingStateMachine`].
pub fn from_fn<F>(f: F) -> FnOperation<F> {
    FnOperation(f)
}

#[async_trait]
impl<T, F, Fut> FetchOperation<T> for FnOperation<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
    T: Send + 'static,
{
    async fn fetch(&self) -> Result<T> {
        (self.0)().await
    }
}

/// Timing for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingTiming {
    /// Maximum wait for connectivity before failing.
    pub fetch_timeout: Duration,
    /// Delay before the "no network" hint may appear.
    pub hint_delay: Duration,
}

impl Default for LoadingTiming {
    fn default() -> Self {
        Self {
            fetch_timeout: GateConfig::FETCH_TIMEOUT,
            hint_delay: GateConfig::NO_NETWORK_HINT_DELAY,
        }
    }
}

impl From<&LoaderSettings> for LoadingTiming {
    fn from(settings: &LoaderSettings) -> Self {
        Self {
            fetch_timeout: settings.fetch_timeout(),
            hint_delay: settings.hint_delay(),
        }
    }
}

/// Why the last attempt ended, kept even though the rendered message is generic.
#[derive(Debug, Default)]
struct AttemptRecord {
    outcome: Option<OutcomeKind>,
    error: Option<String>,
}

/// Drives one fetch attempt from `Idle` to `Success` or `Failure`.
///
/// The machine owns its state; observers get read-only receivers from
/// [`subscribe`](Self::subscribe). Dropping the machine aborts its tasks.
pub struct LoadingStateMachine<T> {
    gate: OperationGate,
    operation: Arc<dyn FetchOperation<T>>,
    timing: LoadingTiming,
    state: Arc<watch::Sender<LoadingState<T>>>,
    record: Arc<Mutex<AttemptRecord>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T> LoadingStateMachine<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(
        gate: OperationGate,
        operation: Arc<dyn FetchOperation<T>>,
        timing: LoadingTiming,
    ) -> Self {
        let (state, _) = watch::channel(LoadingState::Idle);
        Self {
            gate,
            operation,
            timing,
            state: Arc::new(state),
            record: Arc::new(Mutex::new(AttemptRecord::default())),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn timing(&self) -> LoadingTiming {
        self.timing
    }

    /// Begin the attempt. Only the first call from `Idle` has any effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let started = self.state.send_if_modified(|state| {
            if matches!(state, LoadingState::Idle) {
                *state = LoadingState::Loading {
                    show_no_network_hint: false,
                };
                true
            } else {
                false
            }
        });
        if !started {
            debug!("Loading already started, ignoring start()");
            return;
        }

        let hint = tokio::spawn(Self::hint_task(
            Arc::clone(&self.state),
            self.gate.clone(),
            self.timing.hint_delay,
        ));
        let fetch = tokio::spawn(Self::fetch_task(
            Arc::clone(&self.state),
            Arc::clone(&self.record),
            self.gate.clone(),
            Arc::clone(&self.operation),
            self.cancel.clone(),
            self.timing.fetch_timeout,
        ));

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([hint, fetch]);
    }

    /// Request cancellation. Takes effect at the gate's next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Receive every state change. Receivers cannot modify the state.
    pub fn subscribe(&self) -> watch::Receiver<LoadingState<T>> {
        self.state.subscribe()
    }

    /// How the attempt ended, once it has.
    pub fn last_outcome(&self) -> Option<OutcomeKind> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcome
    }

    /// The operation's own error message if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error
            .clone()
    }

    async fn hint_task(
        state: Arc<watch::Sender<LoadingState<T>>>,
        gate: OperationGate,
        delay: Duration,
    ) {
        tokio::time::sleep(delay).await;
        if gate.monitor().is_connected() {
            return;
        }

        let shown = state.send_if_modified(|state| match state {
            LoadingState::Loading {
                show_no_network_hint,
            } if !*show_no_network_hint => {
                *show_no_network_hint = true;
                true
            }
            _ => false,
        });
        if shown {
            info!("Still offline after {:?}, showing no-network hint", delay);
        }
    }

    async fn fetch_task(
        state: Arc<watch::Sender<LoadingState<T>>>,
        record: Arc<Mutex<AttemptRecord>>,
        gate: OperationGate,
        operation: Arc<dyn FetchOperation<T>>,
        cancel: CancellationToken,
        timeout: Duration,
    ) {
        let outcome = gate.perform(timeout, &cancel, || operation.fetch()).await;
        let kind = outcome.kind();

        let (next, error) = match outcome {
            GateOutcome::Success(value) => (LoadingState::Success(value), None),
            GateOutcome::OperationFailed(err) => {
                warn!("Fetch failed: {}", err);
                (Self::failure(), Some(err.to_string()))
            }
            GateOutcome::Timeout | GateOutcome::Cancelled => {
                warn!("Fetch did not run: {}", kind);
                (Self::failure(), None)
            }
        };

        // Record first so observers woken by the terminal state can read it.
        {
            let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
            record.outcome = Some(kind);
            record.error = error;
        }

        let applied = state.send_if_modified(move |state| {
            if state.is_terminal() {
                false
            } else {
                *state = next;
                true
            }
        });
        if applied {
            debug!("Loading finished: {}", kind);
        }
    }

    fn failure() -> LoadingState<T> {
        LoadingState::Failure {
            message: GateConfig::FAILURE_MESSAGE.to_string(),
        }
    }
}

impl<T> LoadingStateMachine<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Snapshot of the current state.
    pub fn state(&self) -> LoadingState<T> {
        self.state.borrow().clone()
    }

    /// Wait until the attempt reaches `Success` or `Failure`.
    pub async fn wait_for_terminal(&self) -> LoadingState<T> {
        let mut receiver = self.state.subscribe();
        let terminal = match receiver.wait_for(LoadingState::is_terminal).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        terminal.unwrap_or_else(|| self.state())
    }
}

impl<T> Drop for LoadingStateMachine<T> {
    fn drop(&mut self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityMonitor, ConnectivityStatus, ManualConnectivitySource};
    use crate::error::PerformerError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn machine_with(
        initial: ConnectivityStatus,
        timing: LoadingTiming,
        operation: Arc<dyn FetchOperation<String>>,
    ) -> (Arc<ManualConnectivitySource>, LoadingStateMachine<String>) {
        let source = Arc::new(ManualConnectivitySource::new(initial));
        let monitor = Arc::new(ConnectivityMonitor::new(source.clone()));
        let machine = LoadingStateMachine::new(OperationGate::new(monitor), operation, timing);
        (source, machine)
    }

    fn slow_fetch(latency: Duration, calls: Arc<AtomicU32>) -> Arc<dyn FetchOperation<String>> {
        Arc::new(from_fn(move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(latency).await;
                Ok("image".to_string())
            }
        }))
    }

    fn near(elapsed: Duration, expected: Duration) -> bool {
        elapsed >= expected && elapsed < expected + Duration::from_millis(5)
    }

    async fn record_until_terminal(
        receiver: &mut watch::Receiver<LoadingState<String>>,
        start: Instant,
    ) -> Vec<(Duration, LoadingState<String>)> {
        let mut seen = Vec::new();
        loop {
            receiver.changed().await.unwrap();
            let state = receiver.borrow_and_update().clone();
            let done = state.is_terminal();
            seen.push((start.elapsed(), state));
            if done {
                return seen;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_sequence_shows_hint_then_fails() {
        let calls = Arc::new(AtomicU32::new(0));
        let (_source, machine) = machine_with(
            ConnectivityStatus::Disconnected,
            LoadingTiming::default(),
            slow_fetch(Duration::from_secs(3), calls.clone()),
        );
        let mut receiver = machine.subscribe();
        let start = Instant::now();

        machine.start();
        let seen = record_until_terminal(&mut receiver, start).await;

        assert_eq!(seen.len(), 3, "unexpected transitions: {:?}", seen);
        assert_eq!(
            seen[0].1,
            LoadingState::Loading {
                show_no_network_hint: false
            }
        );
        assert!(near(seen[0].0, Duration::ZERO));
        assert_eq!(
            seen[1].1,
            LoadingState::Loading {
                show_no_network_hint: true
            }
        );
        assert!(near(seen[1].0, Duration::from_millis(500)));
        assert_eq!(
            seen[2].1,
            LoadingState::Failure {
                message: "Download failed.".to_string()
            }
        );
        assert!(near(seen[2].0, Duration::from_secs(2)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!receiver.has_changed().unwrap());
        assert_eq!(machine.last_outcome(), Some(OutcomeKind::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_restored_mid_wait_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let (source, machine) = machine_with(
            ConnectivityStatus::Disconnected,
            LoadingTiming::default(),
            slow_fetch(Duration::from_millis(100), calls.clone()),
        );
        let flipper = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            flipper.set_status(ConnectivityStatus::Connected);
        });

        let start = Instant::now();
        machine.start();
        let terminal = machine.wait_for_terminal().await;

        assert_eq!(terminal, LoadingState::Success("image".to_string()));
        assert!(near(start.elapsed(), Duration::from_millis(1100)));
        assert_eq!(machine.last_outcome(), Some(OutcomeKind::Success));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_fetch_never_shows_hint() {
        let calls = Arc::new(AtomicU32::new(0));
        let (_source, machine) = machine_with(
            ConnectivityStatus::Connected,
            LoadingTiming::default(),
            slow_fetch(Duration::from_secs(1), calls),
        );
        let mut receiver = machine.subscribe();

        machine.start();
        let seen = record_until_terminal(&mut receiver, Instant::now()).await;

        let states: Vec<_> = seen.into_iter().map(|(_, state)| state).collect();
        assert_eq!(
            states,
            vec![
                LoadingState::Loading {
                    show_no_network_hint: false
                },
                LoadingState::Success("image".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hint_after_terminal_is_ignored() {
        let timing = LoadingTiming {
            fetch_timeout: Duration::from_millis(100),
            hint_delay: Duration::from_millis(500),
        };
        let (_source, machine) = machine_with(
            ConnectivityStatus::Disconnected,
            timing,
            slow_fetch(Duration::ZERO, Arc::new(AtomicU32::new(0))),
        );
        let mut receiver = machine.subscribe();

        machine.start();
        let seen = record_until_terminal(&mut receiver, Instant::now()).await;
        assert!(matches!(seen.last(), Some((_, LoadingState::Failure { .. }))));

        // Still offline when the hint task wakes, but the state is terminal.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!receiver.has_changed().unwrap());
        assert!(matches!(machine.state(), LoadingState::Failure { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_is_kept_internally() {
        let operation: Arc<dyn FetchOperation<String>> = Arc::new(from_fn(|| async {
            Err::<String, _>(PerformerError::Http {
                status: 404,
                url: "https://example.com/missing.png".to_string(),
            })
        }));
        let (_source, machine) =
            machine_with(ConnectivityStatus::Connected, LoadingTiming::default(), operation);

        machine.start();
        let terminal = machine.wait_for_terminal().await;

        assert_eq!(
            terminal,
            LoadingState::Failure {
                message: "Download failed.".to_string()
            }
        );
        assert_eq!(machine.last_outcome(), Some(OutcomeKind::OperationFailed));
        assert_eq!(
            machine.last_error().as_deref(),
            Some("HTTP 404 from https://example.com/missing.png")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_fails_as_cancelled() {
        let calls = Arc::new(AtomicU32::new(0));
        let (_source, machine) = machine_with(
            ConnectivityStatus::Connected,
            LoadingTiming::default(),
            slow_fetch(Duration::ZERO, calls.clone()),
        );

        machine.cancel();
        machine.start();
        let terminal = machine.wait_for_terminal().await;

        assert!(matches!(terminal, LoadingState::Failure { .. }));
        assert_eq!(machine.last_outcome(), Some(OutcomeKind::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_single_shot() {
        let calls = Arc::new(AtomicU32::new(0));
        let (_source, machine) = machine_with(
            ConnectivityStatus::Connected,
            LoadingTiming::default(),
            slow_fetch(Duration::from_millis(10), calls.clone()),
        );
        assert_eq!(machine.state(), LoadingState::Idle);

        machine.start();
        machine.start();
        machine.wait_for_terminal().await;
        machine.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(machine.state(), LoadingState::Success("image".to_string()));
    }

    #[test]
    fn test_state_predicates() {
        assert!(LoadingState::Success(1).is_terminal());
        assert!(LoadingState::<u8>::Failure {
            message: String::new()
        }
        .is_terminal());
        assert!(!LoadingState::<u8>::Idle.is_terminal());
        assert!(LoadingState::<u8>::Loading {
            show_no_network_hint: true
        }
        .is_loading());
    }
}
