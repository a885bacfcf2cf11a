// SPDX-License-Identifier: Apache-2.0

//! Configuration for the game log scheduler.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};

/// Configuration for the game log scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Directory holding one sub-directory per game server port
    pub root_path: PathBuf,
    /// Path between the port directory and the log type directory
    pub relative_path: PathBuf,
    /// Day new sources start reading from
    pub start_day: NaiveDate,
    /// Time between scan cycles
    pub process_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("/data/game"),
            relative_path: PathBuf::from("log"),
            start_day: Local::now().date_naive(),
            process_interval: Duration::from_secs(10),
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.root_path.as_os_str().is_empty() {
            return Err("Log root path must be specified".to_string());
        }

        if self.process_interval.is_zero() {
            return Err("Process interval must be greater than zero".to_string());
        }

        Ok(())
    }
}
