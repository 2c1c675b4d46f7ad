//! Application configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing_subscriber::filter::Directive;

/// Logging output format
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Logging {
    /// Additional filtering directives
    #[serde(default, deserialize_with = "Logging::deserialize_filters")]
    pub filters: Vec<Directive>,

    /// Logging format
    #[serde(default)]
    pub format: LogFormat,
}

impl Logging {
    fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<Directive>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let dirs: Vec<String> = Deserialize::deserialize(deserializer)?;
        dirs.into_iter()
            .map(|dir| dir.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Local session cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    /// File keeping the cached session between runs
    #[serde(default = "Session::default_path")]
    pub path: PathBuf,
}

impl Session {
    fn default_path() -> PathBuf {
        "session.toml".into()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

/// Identity provider and document store backend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Backend {
    /// Everything is lost when the process ends
    Memory {
        #[serde(default = "Backend::default_poll_interval")]
        poll_interval_ms: u64,
    },
    /// SQLite database file
    SqLite {
        path: PathBuf,
        #[serde(default = "Backend::default_max_connections")]
        max_connections: u32,
        /// Runs pending migrations on start
        #[serde(default = "Backend::default_migrate")]
        migrate: bool,
        #[serde(default = "Backend::default_poll_interval")]
        poll_interval_ms: u64,
    },
}

impl Backend {
    fn default_max_connections() -> u32 {
        4
    }

    fn default_migrate() -> bool {
        true
    }

    fn default_poll_interval() -> u64 {
        1000
    }

    /// How often live queries check for writes made by other processes
    pub fn poll_interval(&self) -> Duration {
        let millis = match self {
            Self::Memory { poll_interval_ms } => *poll_interval_ms,
            Self::SqLite {
                poll_interval_ms, ..
            } => *poll_interval_ms,
        };
        Duration::from_millis(millis)
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::SqLite {
            path: "roster.db".into(),
            max_connections: Self::default_max_connections(),
            migrate: Self::default_migrate(),
            poll_interval_ms: Self::default_poll_interval(),
        }
    }
}

/// Top level application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: Logging,

    /// Session cache configuration
    #[serde(default)]
    pub session: Session,

    /// Backend configuration
    #[serde(default)]
    pub backend: Backend,
}
