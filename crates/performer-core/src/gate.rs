//! OperationGate - run an operation only once the network is reachable.
//!
//! `perform` decides between running immediately, waiting for connectivity
//! and then running, or giving up with `Timeout`. Cancellation is checked at
//! entry and again after the wait. The timeout bounds only the wait; an
//! operation that has started always runs to completion.

use crate::cancel::CancellationToken;
use crate::connectivity::ConnectivityMonitor;
use crate::error::PerformerError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a single [`OperationGate::perform`] call.
#[derive(Debug)]
pub enum GateOutcome<T, E> {
    /// The operation ran and returned a value.
    Success(T),
    /// Cancellation was requested before the operation started.
    Cancelled,
    /// Connectivity did not arrive within the timeout; the operation never ran.
    Timeout,
    /// The operation ran and failed.
    OperationFailed(E),
}

/// Discriminant of a [`GateOutcome`], kept after the payload is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Cancelled,
    Timeout,
    OperationFailed,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::Cancelled => write!(f, "cancelled"),
            OutcomeKind::Timeout => write!(f, "timeout"),
            OutcomeKind::OperationFailed => write!(f, "operation failed"),
        }
    }
}

impl<T, E> GateOutcome<T, E> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            GateOutcome::Success(_) => OutcomeKind::Success,
            GateOutcome::Cancelled => OutcomeKind::Cancelled,
            GateOutcome::Timeout => OutcomeKind::Timeout,
            GateOutcome::OperationFailed(_) => OutcomeKind::OperationFailed,
        }
    }

    fn from_result(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => GateOutcome::Success(value),
            Err(err) => GateOutcome::OperationFailed(err),
        }
    }
}

impl<T, E: Into<PerformerError>> GateOutcome<T, E> {
    /// Flatten into a library `Result`, reporting `timeout` for `Timeout`.
    pub fn into_result(self, timeout: Duration) -> Result<T, PerformerError> {
        match self {
            GateOutcome::Success(value) => Ok(value),
            GateOutcome::Cancelled => Err(PerformerError::Cancelled),
            GateOutcome::Timeout => Err(PerformerError::Timeout(timeout)),
            GateOutcome::OperationFailed(err) => Err(err.into()),
        }
    }
}

/// Runs operations behind a connectivity check.
///
/// Cloning shares the underlying monitor.
#[derive(Clone)]
pub struct OperationGate {
    monitor: Arc<ConnectivityMonitor>,
}

impl OperationGate {
    pub fn new(monitor: Arc<ConnectivityMonitor>) -> Self {
        Self { monitor }
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// Run `operation` once connectivity is available, waiting at most `timeout`.
    ///
    /// `operation` is invoked at most once.
    pub async fn perform<T, E, F, Fut>(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        operation: F,
    ) -> GateOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if cancel.is_cancelled() {
            debug!("Gate entered after cancellation, skipping operation");
            return GateOutcome::Cancelled;
        }

        if self.monitor.is_connected() {
            return GateOutcome::from_result(operation().await);
        }

        debug!("Not connected, waiting up to {:?} for connectivity", timeout);
        if !self.monitor.wait_for_connectivity(timeout).await {
            warn!("Network unavailable after {:?}, giving up", timeout);
            return GateOutcome::Timeout;
        }

        if cancel.is_cancelled() {
            debug!("Cancelled while waiting for connectivity");
            return GateOutcome::Cancelled;
        }

        GateOutcome::from_result(operation().await)
    }
}
