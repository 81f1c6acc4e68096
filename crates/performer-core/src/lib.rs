//! Performer Core - connectivity-gated operations for network fetches.
//!
//! This crate runs a network operation only once the device is reachable,
//! waiting a bounded time for connectivity before giving up, and exposes the
//! progress of a single fetch attempt as an observable loading state.
//!
//! # Example
//!
//! ```rust,ignore
//! use performer_core::{LoaderBuilder, LoadingState};
//!
//! #[tokio::main]
//! async fn main() -> performer_core::Result<()> {
//!     let loader = LoaderBuilder::new()
//!         .image_url("https://example.com/cat.png")
//!         .build()
//!         .await?;
//!
//!     let mut states = loader.subscribe();
//!     loader.start();
//!     while states.changed().await.is_ok() {
//!         let state = states.borrow_and_update().clone();
//!         println!("{:?}", state);
//!         if state.is_terminal() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod cancel;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod loading;

// Re-export commonly used types
pub use builder::{ImageLoader, LoaderBuilder};
pub use cancel::{CancellationToken, CancelledError};
pub use config::{GateConfig, HttpConfig, LoaderSettings, ProbeConfig};
pub use connectivity::{
    ConnectivityMonitor, ConnectivitySource, ConnectivityStatus, ManualConnectivitySource,
    ProbeConnectivitySource, ProbeSettings, StatusCallback, SubscriptionId,
};
pub use error::{PerformerError, Result};
pub use fetch::{FetchedImage, HttpFetcher, ImageFormat};
pub use gate::{GateOutcome, OperationGate, OutcomeKind};
pub use loading::{from_fn, FetchOperation, LoadingState, LoadingStateMachine, LoadingTiming};
