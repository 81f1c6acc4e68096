//! Performer - fetch one image once the network is reachable.
//!
//! Prints each loading state as it changes and exits non-zero if the fetch
//! fails. Ctrl-C requests cancellation of the attempt.

mod report;

use anyhow::{bail, Result};
use clap::Parser;
use performer_core::{
    ConnectivityStatus, LoaderBuilder, LoaderSettings, LoadingState, ManualConnectivitySource,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "performer")]
#[command(about = "Fetch an image, waiting briefly for network connectivity")]
struct Args {
    /// Image URL (http or https)
    url: String,

    /// Maximum wait for connectivity, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Delay before the "no network" hint, in milliseconds
    #[arg(long)]
    hint_delay_ms: Option<u64>,

    /// JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulate being offline for this many milliseconds instead of probing
    #[arg(long)]
    offline_for_ms: Option<u64>,

    /// Write the fetched image to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn settings(&self) -> Result<LoaderSettings> {
        let mut settings = match &self.config {
            Some(path) => LoaderSettings::from_file(path)?,
            None => LoaderSettings::default(),
        };
        if let Some(ms) = self.timeout_ms {
            settings.fetch_timeout_ms = ms;
        }
        if let Some(ms) = self.hint_delay_ms {
            settings.hint_delay_ms = ms;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let settings = args.settings()?;
    debug!("Settings: {:?}", settings);

    let mut builder = LoaderBuilder::new()
        .image_url(args.url.as_str())
        .settings(settings);

    if let Some(offline_ms) = args.offline_for_ms {
        info!("Simulating {}ms without network", offline_ms);
        let source = Arc::new(ManualConnectivitySource::new(ConnectivityStatus::Disconnected));
        let flipper = Arc::clone(&source);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(offline_ms)).await;
            info!("Simulated network is back");
            flipper.set_status(ConnectivityStatus::Connected);
        });
        builder = builder.connectivity_source(source);
    }

    let loader = builder.build().await?;

    let mut states = loader.subscribe();
    loader.start();

    let mut cancel_requested = false;
    let terminal = loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break loader.state();
                }
                let state = states.borrow_and_update().clone();
                println!("{}", report::describe(&state));
                if state.is_terminal() {
                    break state;
                }
            }
            signal = tokio::signal::ctrl_c(), if !cancel_requested => {
                signal?;
                warn!("Interrupted, cancelling");
                cancel_requested = true;
                loader.cancel();
            }
        }
    };

    match terminal {
        LoadingState::Success(image) => {
            if let Some(path) = &args.output {
                report::write_image(path, &image).await?;
                info!("Saved {} bytes to {}", image.len(), path.display());
            }
            Ok(())
        }
        LoadingState::Failure { message } => {
            let outcome = loader
                .last_outcome()
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            match loader.last_error() {
                Some(cause) => bail!("{} ({}: {})", message, outcome, cause),
                None => bail!("{} ({})", message, outcome),
            }
        }
        other => bail!("Loader stopped before finishing: {}", report::describe(&other)),
    }
}
