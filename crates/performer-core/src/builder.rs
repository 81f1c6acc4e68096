//! Builder for wiring an image loader.

use crate::config::LoaderSettings;
use crate::connectivity::{
    ConnectivityMonitor, ConnectivitySource, ProbeConnectivitySource, ProbeSettings,
};
use crate::error::{PerformerError, Result};
use crate::fetch::{FetchedImage, HttpFetcher};
use crate::gate::OperationGate;
use crate::loading::{LoadingStateMachine, LoadingTiming};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Loading state machine that fetches one image over HTTP.
pub type ImageLoader = LoadingStateMachine<FetchedImage>;

/// Builder for configuring an [`ImageLoader`].
///
/// # Example
///
/// ```rust,ignore
/// use performer_core::LoaderBuilder;
///
/// let loader = LoaderBuilder::new()
///     .image_url("https://example.com/cat.png")
///     .build()
///     .await?;
/// loader.start();
/// let state = loader.wait_for_terminal().await;
/// ```
#[derive(Default)]
pub struct LoaderBuilder {
    image_url: Option<String>,
    source: Option<Arc<dyn ConnectivitySource>>,
    settings: LoaderSettings,
}

impl LoaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The image to fetch. Required; must be an `http` or `https` URL.
    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Use a specific connectivity source.
    ///
    /// Default: a [`ProbeConnectivitySource`] built from the settings, probed
    /// once and then monitored in the background.
    pub fn connectivity_source(mut self, source: Arc<dyn ConnectivitySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Override timing and probe settings.
    ///
    /// Default: [`LoaderSettings::default`]
    pub fn settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validate the configuration and assemble the loader. The loader is
    /// returned `Idle`; call `start()` to begin the attempt.
    pub async fn build(self) -> Result<ImageLoader> {
        self.settings.validate()?;
        let url = Self::parse_image_url(self.image_url.as_deref())?;

        let source: Arc<dyn ConnectivitySource> = match self.source {
            Some(source) => source,
            None => {
                let probe = Arc::new(ProbeConnectivitySource::new(ProbeSettings::from(
                    &self.settings,
                ))?);
                let status = probe.check_now().await;
                debug!("Initial connectivity: {}", status);
                probe.start_monitoring();
                probe
            }
        };

        let monitor = Arc::new(ConnectivityMonitor::new(source));
        let gate = OperationGate::new(monitor);
        let fetcher = HttpFetcher::new(url)?;

        Ok(LoadingStateMachine::new(
            gate,
            Arc::new(fetcher),
            LoadingTiming::from(&self.settings),
        ))
    }

    fn parse_image_url(raw: Option<&str>) -> Result<Url> {
        let raw = raw.ok_or_else(|| PerformerError::Config {
            message: "an image URL is required".to_string(),
        })?;
        let url = Url::parse(raw)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(PerformerError::Config {
                message: format!("unsupported URL scheme '{}': {}", other, raw),
            }),
        }
    }
}
