//! File-backed defaults

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::readiness::PollSettings;

/// Settings read from `config.toml`; command-line flags override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where to keep lock and log files
    pub work_dir: PathBuf,

    /// Time given to the proxy command to clean up once proxying is complete
    #[serde(with = "duration_secs")]
    pub grace_period: Duration,

    /// Delay between ControlMaster readiness checks
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Number of ControlMaster readiness checks before giving up
    pub poll_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let poll = PollSettings::default();
        Self {
            work_dir: PathBuf::from("."),
            grace_period: Duration::from_secs(300),
            poll_interval: poll.interval,
            poll_attempts: poll.max_attempts,
        }
    }
}

impl Settings {
    /// Readiness polling parameters
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            max_attempts: self.poll_attempts,
        }
    }
}
