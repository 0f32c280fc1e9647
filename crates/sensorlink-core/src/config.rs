//! Runner configuration
//!
//! Everything a batch run needs to know that is not part of the protocol:
//! which port, which files, and how long to wait at each step. Loaded from
//! JSON; every field has a default so a config file only lists overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::batch::{BatchOptions, DEFAULT_INTER_SAMPLE_DELAY_MS};
use crate::protocol::{
    PollPolicy, SessionConfig, DEFAULT_BANNER_WAIT_MS, DEFAULT_BAUD_RATE,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_POST_SEND_PAUSE_MS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_RESPONSE_DEADLINE_MS, DEFAULT_SETTLE_DELAY_MS,
};

/// Default results file name
pub const DEFAULT_OUTPUT_PATH: &str = "predictions_results.csv";

/// Errors while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`RunnerConfig`]
    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Serial port name or `tcp://host:port`
    #[serde(alias = "address")]
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Per-read timeout while assembling a line
    pub read_timeout_ms: u64,
    /// Wait after opening, for boards that reset on connect
    pub settle_delay_ms: u64,
    /// Extra wait for the startup banner
    pub banner_wait_ms: u64,
    /// Pause between sending a vector and the first poll
    pub post_send_pause_ms: u64,
    /// Sleep between empty polls
    pub poll_interval_ms: u64,
    /// Time allowed for a reply
    pub response_deadline_ms: u64,
    /// Pause between samples
    pub inter_sample_delay_ms: u64,
    /// Samples CSV
    #[serde(alias = "csv_path")]
    pub input_path: Option<PathBuf>,
    /// Results CSV
    pub output_path: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            banner_wait_ms: DEFAULT_BANNER_WAIT_MS,
            post_send_pause_ms: DEFAULT_POST_SEND_PAUSE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            response_deadline_ms: DEFAULT_RESPONSE_DEADLINE_MS,
            inter_sample_delay_ms: DEFAULT_INTER_SAMPLE_DELAY_MS,
            input_path: None,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
        }
    }
}

impl RunnerConfig {
    /// Load a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the device can never work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        if self.response_deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "response_deadline_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Session settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            address: self.port.clone(),
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            banner_wait: Duration::from_millis(self.banner_wait_ms),
        }
    }

    /// Exchange timing
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            post_send_pause: Duration::from_millis(self.post_send_pause_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            response_deadline: Duration::from_millis(self.response_deadline_ms),
        }
    }

    /// Batch settings
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            policy: self.poll_policy(),
            inter_sample_delay: Duration::from_millis(self.inter_sample_delay_ms),
        }
    }
}
