// SPDX-License-Identifier: Apache-2.0

//! Source identities and the persisted read cursor.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Day suffix used by the game servers when naming log files
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// One tailed log stream: `(operator, server, log name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub operator: i64,
    pub server: i64,
    pub log_name: String,
}

impl SourceIdentity {
    pub fn new(operator: i64, server: i64, log_name: impl Into<String>) -> Self {
        Self {
            operator,
            server,
            log_name: log_name.into(),
        }
    }

    /// Stable key used by the position store and the task registry
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.operator, self.server, self.log_name)
    }
}

impl Display for SourceIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.operator, self.server, self.log_name)
    }
}

/// A game server entry from the server list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub operator: i64,
    pub server: i64,
    pub port: String,
}

/// Persisted read position for one source.
///
/// `byte_offset` always points just past the last delivered line of the file
/// for `last_execute_day`. Moving to a new day resets it to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub identity: SourceIdentity,
    pub log_type: String,
    pub last_execute_day: NaiveDate,
    pub byte_offset: u64,
    pub total_rows: u64,
}

impl Cursor {
    /// Fresh cursor seeded at the start of `start_day`
    pub fn new(identity: SourceIdentity, log_type: impl Into<String>, start_day: NaiveDate) -> Self {
        Self {
            identity,
            log_type: log_type.into(),
            last_execute_day: start_day,
            byte_offset: 0,
            total_rows: 0,
        }
    }

    pub fn key(&self) -> String {
        self.identity.key()
    }

    /// Move to `day`, rewinding to the start of that day's file
    pub fn roll_to(&mut self, day: NaiveDate) {
        self.last_execute_day = day;
        self.byte_offset = 0;
    }

    /// Record a delivered batch
    pub fn commit(&mut self, offset: u64, rows: usize) {
        self.byte_offset = offset;
        self.total_rows += rows as u64;
    }

    /// `root/port/relative/logType/{operator}_{server}_{logName}.{YYYY-MM-DD}`
    pub fn file_path(&self, root: &Path, relative: &Path, port: &str, day: NaiveDate) -> PathBuf {
        root.join(port)
            .join(relative)
            .join(&self.log_type)
            .join(format!("{}.{}", self.identity.key(), day.format(DAY_FORMAT)))
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},pos={},total={}",
            self.identity,
            self.log_type,
            self.last_execute_day.format(DAY_FORMAT),
            self.byte_offset,
            self.total_rows
        )
    }
}
