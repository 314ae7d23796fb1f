//! Chat API HTTP client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_core::ChatRequest;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::StreamError;
use crate::stream::{self, StreamHandle, StreamHandler};

/// Timeout for a single health probe.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the streaming chat API.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    config: ClientConfig,
    available: Arc<AtomicBool>,
}

impl ChatClient {
    /// Create a client. No request is made until a stream is opened or the
    /// health check runs.
    pub fn new(config: ClientConfig) -> Result<Self, StreamError> {
        if config.api_url.trim().is_empty() {
            return Err(StreamError::Config("api_url must not be empty".to_string()));
        }

        // No overall timeout: a streamed reply may take arbitrarily long.
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(StreamError::Http)?;

        Ok(Self {
            http,
            config,
            available: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open a stream for `request`, delivering its outcome to `handler`.
    ///
    /// Returns immediately; the request and the read loop run on a task of
    /// the current tokio runtime. Every call produces an independent stream.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn open<H: StreamHandler>(&self, request: ChatRequest, handler: H) -> StreamHandle {
        stream::spawn(self.http.clone(), self.config.chat_url(), request, handler)
    }

    /// Result of the last health check.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Perform a health check against the API.
    ///
    /// `Ok(true)` iff a response with a success status was received.
    pub async fn health_check(&self) -> Result<bool, StreamError> {
        let url = self.config.health_url();
        debug!("Health check: {}", url);

        match self.http.get(&url).timeout(HEALTH_CHECK_TIMEOUT).send().await {
            Ok(resp) => {
                let ok = resp.status().is_success();
                self.available.store(ok, Ordering::SeqCst);
                Ok(ok)
            }
            Err(e) => {
                self.available.store(false, Ordering::SeqCst);
                Err(StreamError::Http(e))
            }
        }
    }

    /// Probe the API now and then every `interval` on a background task.
    ///
    /// [`is_available`](Self::is_available) tracks the latest probe. Only
    /// transitions between available and unavailable are logged. Abort the
    /// returned handle to stop probing.
    pub fn start_health_monitor(&self, interval: Duration) -> JoinHandle<()> {
        let client = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<bool> = None;

            loop {
                ticker.tick().await;

                let available = match client.health_check().await {
                    Ok(ok) => ok,
                    Err(e) => {
                        debug!("Health probe failed: {}", e);
                        false
                    }
                };

                match (last, available) {
                    (Some(true), false) => {
                        warn!("Chat API at {} became unavailable", client.config.api_url)
                    }
                    (Some(false), true) => {
                        info!("Chat API at {} is available again", client.config.api_url)
                    }
                    (None, _) => info!(available, "Chat API initial health probe"),
                    _ => {}
                }
                last = Some(available);
            }
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .field("available", &self.is_available())
            .finish()
    }
}
