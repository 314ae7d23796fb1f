//! Configuration for a chat session.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chat_stream::ClientConfig;

/// Default location of the conversation database.
pub const DEFAULT_DB_PATH: &str = "chat_history.db";

/// Configuration for a [`ChatSession`](crate::ChatSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Base URL of the chat API.
    pub api_url: String,

    /// SQLite file holding conversations.
    pub db_path: PathBuf,

    /// Time allowed to connect to the API.
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            api_url: client.api_url,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            connect_timeout: client.connect_timeout,
        }
    }
}

impl SessionConfig {
    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `CHAT_API_URL` - API base URL (default: http://localhost:8000)
    /// - `CHAT_DB_PATH` - Conversation database (default: chat_history.db)
    /// - `CHAT_CONNECT_TIMEOUT_SECS` - Connect timeout (default: 10)
    pub fn from_env() -> Self {
        let client = ClientConfig::from_env();

        let db_path = env::var("CHAT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        Self {
            api_url: client.api_url,
            db_path,
            connect_timeout: client.connect_timeout,
        }
    }

    /// Create a new config builder.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Stream client settings derived from this config.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.api_url.clone()).with_connect_timeout(self.connect_timeout)
    }
}

/// Builder for SessionConfig.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the API URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Set the database path.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Build the config.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
