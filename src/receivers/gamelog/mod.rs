// SPDX-License-Identifier: Apache-2.0

//! Game server log receiver.
//!
//! Tails per-server, per-day log files laid out as
//! `root/port/relative/logType/{operator}_{server}_{logName}.{YYYY-MM-DD}` and
//! hands completed lines to a batch handler.
//!
//! Features:
//! - Byte-offset cursors persisted after every delivered batch
//! - Day-by-day catch up from a stale cursor
//! - Dynamic, idempotent source registration
//! - Tab-separated field parsing driven by declarative event configs

pub mod config;
pub mod error;
pub mod parser;
pub mod persistence;
pub mod scheduler;
pub mod source;
pub mod tailer;

pub use config::SchedulerConfig;
pub use error::{Error, Result};
pub use persistence::{
    AnyPositionStore, JsonFilePositionStore, MemoryPositionStore, PositionStore,
    SqlitePositionStore,
};
pub use scheduler::{BatchHandler, Registration, Scheduler, Task};
pub use source::{Cursor, DAY_FORMAT, ServerConfig, SourceIdentity};
pub use tailer::{LineBatch, SegmentReader};
