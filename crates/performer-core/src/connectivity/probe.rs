//! HTTP probe connectivity source.
//!
//! A headless process has no OS reachability callback, so reachability is
//! inferred by probing lightweight endpoints:
//! - `HEAD` each probe URL in order; the first reachable one means connected
//! - status is stored atomically and subscribers hear about every change
//! - a background loop re-checks quickly while offline and slowly while online

use super::{ConnectivitySource, ConnectivityStatus, StatusCallback, SubscriptionId, Subscribers};
use crate::cancel::CancellationToken;
use crate::config::{HttpConfig, LoaderSettings, ProbeConfig};
use crate::error::{PerformerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for connectivity probing.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// URLs to probe (in order of preference).
    pub probe_urls: Vec<String>,
    /// Timeout for each probe request.
    pub probe_timeout: Duration,
    /// How often to re-check while offline.
    pub offline_recheck_interval: Duration,
    /// How often to verify while online.
    pub online_verify_interval: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            probe_urls: ProbeConfig::PROBE_URLS.iter().map(|s| s.to_string()).collect(),
            probe_timeout: ProbeConfig::PROBE_TIMEOUT,
            offline_recheck_interval: ProbeConfig::OFFLINE_RECHECK_INTERVAL,
            online_verify_interval: ProbeConfig::ONLINE_VERIFY_INTERVAL,
        }
    }
}

impl From<&LoaderSettings> for ProbeSettings {
    fn from(settings: &LoaderSettings) -> Self {
        Self {
            probe_urls: settings.probe_urls.clone(),
            probe_timeout: settings.probe_timeout(),
            offline_recheck_interval: settings.offline_recheck_interval(),
            online_verify_interval: settings.online_verify_interval(),
        }
    }
}

/// Connectivity source backed by periodic HTTP probes.
///
/// Starts out disconnected until the first successful probe.
pub struct ProbeConnectivitySource {
    client: reqwest::Client,
    settings: ProbeSettings,
    connected: AtomicBool,
    subscribers: Subscribers,
    /// Last time any probe was attempted.
    last_check: Mutex<Option<Instant>>,
    /// Stops the background loop; present while monitoring.
    monitoring: Mutex<Option<CancellationToken>>,
}

impl ProbeConnectivitySource {
    pub fn new(settings: ProbeSettings) -> Result<Self> {
        if settings.probe_urls.is_empty() {
            return Err(PerformerError::Config {
                message: "at least one probe URL is required".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(settings.probe_timeout)
            .user_agent(HttpConfig::USER_AGENT)
            .build()
            .map_err(|e| PerformerError::Network {
                message: format!("Failed to create probe client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            settings,
            connected: AtomicBool::new(false),
            subscribers: Subscribers::default(),
            last_check: Mutex::new(None),
            monitoring: Mutex::new(None),
        })
    }

    /// Probe now and publish the result.
    pub async fn check_now(&self) -> ConnectivityStatus {
        *self.last_check.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        for url in &self.settings.probe_urls {
            if self.probe_url(url).await {
                self.publish(ConnectivityStatus::Connected);
                return ConnectivityStatus::Connected;
            }
            debug!("Probe failed for {}", url);
        }

        self.publish(ConnectivityStatus::Disconnected);
        ConnectivityStatus::Disconnected
    }

    /// Time since the last probe, if any.
    pub fn since_last_check(&self) -> Option<Duration> {
        self.last_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.elapsed())
    }

    /// Start the background probe loop. A second call is a no-op.
    pub fn start_monitoring(self: &Arc<Self>) {
        let token = {
            let mut monitoring = self.monitoring.lock().unwrap_or_else(PoisonError::into_inner);
            if monitoring.is_some() {
                debug!("Background probing already active");
                return;
            }
            let token = CancellationToken::new();
            *monitoring = Some(token.clone());
            token
        };

        // The loop must not keep the source alive on its own.
        let source = Arc::downgrade(self);
        tokio::spawn(async move {
            info!("Starting background connectivity probing");
            loop {
                let interval = match source.upgrade() {
                    Some(source) => source.next_interval(),
                    None => break,
                };

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                match source.upgrade() {
                    Some(source) => {
                        debug!("Background connectivity check");
                        source.check_now().await;
                    }
                    None => break,
                }
            }
            info!("Background connectivity probing stopped");
        });
    }

    /// Stop the background probe loop.
    pub fn stop_monitoring(&self) {
        if let Some(token) = self
            .monitoring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn next_interval(&self) -> Duration {
        if self.connected.load(Ordering::SeqCst) {
            self.settings.online_verify_interval
        } else {
            self.settings.offline_recheck_interval
        }
    }

    fn publish(&self, status: ConnectivityStatus) {
        let was_connected = self.connected.swap(status.is_connected(), Ordering::SeqCst);
        if was_connected == status.is_connected() {
            return;
        }

        if status.is_connected() {
            info!("Network connectivity restored");
        } else {
            warn!("Network connectivity lost - all probe URLs failed");
        }
        self.subscribers.notify(status);
    }

    /// HEAD `url`; success, redirects and 403 all prove the network works.
    async fn probe_url(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                status.is_success() || status.is_redirection() || status.as_u16() == 403
            }
            Err(e) => {
                debug!("Probe request failed: {}", e);
                false
            }
        }
    }
}

impl ConnectivitySource for ProbeConnectivitySource {
    fn current_status(&self) -> ConnectivityStatus {
        if self.connected.load(Ordering::SeqCst) {
            ConnectivityStatus::Connected
        } else {
            ConnectivityStatus::Disconnected
        }
    }

    fn subscribe(&self, on_change: StatusCallback) -> SubscriptionId {
        self.subscribers.add(on_change)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(id);
    }
}

impl Drop for ProbeConnectivitySource {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}
