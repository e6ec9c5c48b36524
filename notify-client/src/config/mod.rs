//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::inbox::DEFAULT_PAGE_SIZE;
use crate::logging::LoggingOptions;
use crate::notification::preview::DEFAULT_COMMENT_PAGE_SIZE;
use crate::notification::{IngestorConfig, ReconnectPolicy};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://notifications.db?mode=rwc";
pub const DEFAULT_CAP_PER_USER: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend root; API paths are resolved against it.
    pub base_url: String,
    pub database_url: String,
    /// Stored notifications kept per user. `0` keeps everything.
    pub cap_per_user: usize,
    /// Records read from the store when an inbox is opened.
    pub preload_limit: usize,
    pub comment_page_size: usize,
    pub inbox_page_size: usize,
    /// Timeout for REST calls. The push connection has none.
    pub request_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
    pub log_filter: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            cap_per_user: DEFAULT_CAP_PER_USER,
            preload_limit: DEFAULT_CAP_PER_USER,
            comment_page_size: DEFAULT_COMMENT_PAGE_SIZE,
            inbox_page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: 30,
            reconnect: ReconnectPolicy::default(),
            log_filter: None,
            log_dir: None,
        }
    }
}

impl ClientConfig {
    /// Overlay environment variables, loading a `.env` file first if present.
    ///
    /// Supported env vars:
    /// - `NOTIFY_BASE_URL`
    /// - `DATABASE_URL`
    /// - `NOTIFY_CAP_PER_USER`
    /// - `NOTIFY_LOG`
    pub fn apply_env(mut self) -> Self {
        dotenvy::dotenv().ok();

        if let Ok(base_url) = std::env::var("NOTIFY_BASE_URL")
            && !base_url.trim().is_empty()
        {
            self.base_url = base_url;
        }

        if let Ok(database_url) = std::env::var("DATABASE_URL")
            && !database_url.trim().is_empty()
        {
            self.database_url = database_url;
        }

        if let Ok(cap) = std::env::var("NOTIFY_CAP_PER_USER")
            && let Ok(parsed) = cap.trim().parse::<usize>()
        {
            self.cap_per_user = parsed;
        }

        if let Ok(filter) = std::env::var("NOTIFY_LOG")
            && !filter.trim().is_empty()
        {
            self.log_filter = Some(filter);
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        crate::api::parse_base_url(&self.base_url)?;

        if self.database_url.trim().is_empty() {
            return Err(Error::config("database_url must not be empty"));
        }
        if self.comment_page_size == 0 {
            return Err(Error::config("comment_page_size must be positive"));
        }
        if self.inbox_page_size == 0 {
            return Err(Error::config("inbox_page_size must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be positive"));
        }
        if self.reconnect.is_enabled()
            && self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms
        {
            return Err(Error::config(
                "reconnect.initial_delay_ms exceeds reconnect.max_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ingestor_config(&self) -> IngestorConfig {
        IngestorConfig {
            cap_per_user: self.cap_per_user,
            comment_page_size: self.comment_page_size,
            reconnect: self.reconnect.clone(),
            ..IngestorConfig::default()
        }
    }

    pub fn logging_options(&self, ansi: bool) -> LoggingOptions {
        LoggingOptions {
            filter: self.log_filter.clone(),
            log_dir: self.log_dir.clone(),
            ansi,
        }
    }
}
