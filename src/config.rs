// src/config.rs
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};

use crate::injector::SubmitTiming;

pub const DEFAULT_SETTINGS_PATH: &str = "bridge-settings.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub settings_path: PathBuf,
    pub timing: SubmitTiming,
}

impl BridgeConfig {
    /// Read configuration from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any variable source. Unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = SubmitTiming::default();
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .context(format!("{key} must be a number of milliseconds, got '{raw}'")),
                None => Ok(default),
            }
        };

        let poll_interval = millis("AETHER_POLL_INTERVAL_MS", defaults.poll_interval)?;
        ensure!(!poll_interval.is_zero(), "AETHER_POLL_INTERVAL_MS must be greater than zero");

        Ok(Self {
            settings_path: lookup("AETHER_SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH)),
            timing: SubmitTiming {
                poll_interval,
                timeout: millis("AETHER_SUBMIT_TIMEOUT_MS", defaults.timeout)?,
                settle_delay: millis("AETHER_SETTLE_DELAY_MS", defaults.settle_delay)?,
            },
        })
    }
}
