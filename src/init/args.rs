// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::{Args, ValueEnum};

use crate::exporters::collector::CollectorExporterConfig;
use crate::init::parse;
use crate::receivers::gamelog::SchedulerConfig;
use crate::receivers::gamelog::persistence::DEFAULT_MAX_CONNECTIONS;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Root directory of the game server logs, one sub-directory per port
    #[arg(long, env = "LOGSHIP_LOG_ROOT_PATH")]
    pub log_root_path: PathBuf,

    /// Path from a port directory to the log type directories
    #[arg(long, env = "LOGSHIP_LOG_RELATIVE_PATH", default_value = "log")]
    pub log_relative_path: PathBuf,

    /// Time between log scans
    #[arg(
        long,
        env = "LOGSHIP_PROCESS_INTERVAL",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub process_interval: Duration,

    /// First day (YYYY-MM-DD) to read for newly registered sources, defaults to today
    #[arg(long, env = "LOGSHIP_START_DAY", value_parser = parse::parse_day)]
    pub start_day: Option<NaiveDate>,

    /// Sinks every batch is delivered to, in order
    #[arg(
        value_enum,
        long,
        env = "LOGSHIP_EXPORTERS",
        value_delimiter = ',',
        default_value = "console"
    )]
    pub exporters: Vec<Exporter>,

    #[command(flatten)]
    pub collector: CollectorArgs,

    /// Substitute zero for unparsable numeric fields instead of failing
    #[arg(long, env = "LOGSHIP_IGNORE_FIELD_ERRORS", default_value = "false")]
    pub ignore_field_errors: bool,

    /// JSON event configuration
    #[arg(long, env = "LOGSHIP_EVENT_CONFIG")]
    pub event_config: PathBuf,

    /// Server list file, one `operator server port` entry per line
    #[arg(long, env = "LOGSHIP_SERVER_LIST")]
    pub server_list: PathBuf,

    /// Re-read the server list on this interval (minimum 60s)
    #[arg(
        long,
        env = "LOGSHIP_SERVER_LIST_RELOAD_INTERVAL",
        value_parser = humantime::parse_duration
    )]
    pub server_list_reload_interval: Option<Duration>,

    /// Position store: `sqlite://<file>`, `<file>.json` or `memory`
    #[arg(
        long,
        env = "LOGSHIP_POSITION_STORE",
        default_value = "sqlite://logship-positions.db"
    )]
    pub position_store: String,

    /// Maximum connections in the position store pool
    #[arg(long, env = "LOGSHIP_POSITION_STORE_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub position_store_max_connections: u32,

    /// How long to wait for in-flight scans on shutdown
    #[arg(
        long,
        env = "LOGSHIP_SHUTDOWN_GRACE_PERIOD",
        default_value = "2s",
        value_parser = humantime::parse_duration
    )]
    pub shutdown_grace_period: Duration,
}

#[derive(Debug, Args, Clone)]
pub struct CollectorArgs {
    /// Collector URL batches are POSTed to
    #[arg(long, env = "LOGSHIP_COLLECTOR_ENDPOINT")]
    pub collector_endpoint: Option<String>,

    /// Destination application id sent with every request
    #[arg(long, env = "LOGSHIP_COLLECTOR_APP_ID")]
    pub collector_app_id: Option<String>,

    /// Collector request timeout
    #[arg(
        long,
        env = "LOGSHIP_COLLECTOR_TIMEOUT",
        default_value = "3s",
        value_parser = humantime::parse_duration
    )]
    pub collector_timeout: Duration,

    /// Tries per batch before giving up, including the first
    #[arg(long, env = "LOGSHIP_COLLECTOR_MAX_ATTEMPTS", default_value = "3")]
    pub collector_max_attempts: u32,

    /// Delay between tries
    #[arg(
        long,
        env = "LOGSHIP_COLLECTOR_RETRY_BACKOFF",
        default_value = "1s",
        value_parser = humantime::parse_duration
    )]
    pub collector_retry_backoff: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Exporter {
    Console,
    Http,
}

impl AgentRun {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            root_path: self.log_root_path.clone(),
            relative_path: self.log_relative_path.clone(),
            start_day: self
                .start_day
                .unwrap_or_else(|| Local::now().date_naive()),
            process_interval: self.process_interval,
        }
    }
}

impl CollectorArgs {
    pub fn to_config(&self) -> CollectorExporterConfig {
        CollectorExporterConfig {
            endpoint: self.collector_endpoint.clone().unwrap_or_default(),
            app_id: self.collector_app_id.clone().unwrap_or_default(),
            timeout: self.collector_timeout,
            max_attempts: self.collector_max_attempts,
            retry_backoff: self.collector_retry_backoff,
        }
    }
}
