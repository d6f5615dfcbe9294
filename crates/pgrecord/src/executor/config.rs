//! Executor configuration.

use crate::error::{OrmError, OrmResult};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::time::Duration;

/// Where to connect. Two equal parameter sets share one executor in a
/// [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectParams {
    /// `postgres://` URL or key/value connection string.
    pub url: String,
    #[serde(default)]
    pub application_name: Option<String>,
}

impl ConnectParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            application_name: None,
        }
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Read `DATABASE_URL` (and optionally `PGRECORD_APPLICATION_NAME`),
    /// loading a `.env` file first when one exists.
    pub fn from_env() -> OrmResult<Self> {
        let _ = dotenvy::dotenv();
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| OrmError::Config("DATABASE_URL is not set".to_string()))?;
        let mut params = Self::new(url);
        if let Ok(name) = std::env::var("PGRECORD_APPLICATION_NAME") {
            params = params.application_name(name);
        }
        Ok(params)
    }

    /// Driver configuration for these parameters.
    pub fn pg_config(&self) -> OrmResult<tokio_postgres::Config> {
        let mut config = self
            .url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| OrmError::Config(format!("invalid connection string: {e}")))?;
        if let Some(name) = &self.application_name {
            config.application_name(name);
        }
        Ok(config)
    }
}

/// Whether failing statements are echoed to stderr with their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeveloperContext {
    /// On when stderr is a terminal.
    #[default]
    Auto,
    On,
    Off,
}

impl DeveloperContext {
    pub fn enabled(self) -> bool {
        match self {
            DeveloperContext::On => true,
            DeveloperContext::Off => false,
            DeveloperContext::Auto => std::io::stderr().is_terminal(),
        }
    }
}

/// Retry and diagnostics settings of an [`Executor`](crate::Executor).
///
/// Deserializes from any serde format; missing keys take their defaults:
///
/// ```toml
/// max_reconnects = 3
/// reconnect_delay_ms = 0
/// developer_context = "auto"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Reconnect attempts after a transient failure before giving up.
    pub max_reconnects: u32,
    /// Pause before each reconnect.
    pub reconnect_delay_ms: u64,
    pub developer_context: DeveloperContext,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_reconnects: 3,
            reconnect_delay_ms: 0,
            developer_context: DeveloperContext::Auto,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnects = n;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn developer_context(mut self, mode: DeveloperContext) -> Self {
        self.developer_context = mode;
        self
    }

    pub fn reconnect_delay_duration(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
