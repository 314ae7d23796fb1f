//! Configuration types for chat-stream.

use std::env;
use std::time::Duration;

/// Default base URL of the chat API.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for connecting to the chat API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the API (e.g., "http://localhost:8000").
    pub api_url: String,
    /// Time allowed to establish a connection. Streams themselves have no
    /// overall timeout since a reply may take arbitrarily long.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// - `CHAT_API_URL` - Base URL (default: http://localhost:8000)
    /// - `CHAT_CONNECT_TIMEOUT_SECS` - Connect timeout in seconds (default: 10)
    pub fn from_env() -> Self {
        let api_url = env::var("CHAT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let connect_timeout = env::var("CHAT_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        Self::new(api_url).with_connect_timeout(connect_timeout)
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Get the streaming chat endpoint URL.
    pub fn chat_url(&self) -> String {
        format!("{}/chat", self.api_url)
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.api_url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}
