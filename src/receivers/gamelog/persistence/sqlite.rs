// SPDX-License-Identifier: Apache-2.0

//! Relational position store backed by a bounded sqlx connection pool.

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

use crate::receivers::gamelog::error::{Error, Result};
use crate::receivers::gamelog::persistence::PositionStore;
use crate::receivers::gamelog::source::{Cursor, DAY_FORMAT, SourceIdentity};

/// Default size of the position store connection pool
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const CONNECTION_MAX_LIFETIME: Duration = Duration::from_secs(60);

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS log_position (
    id TEXT PRIMARY KEY NOT NULL,
    operator INTEGER NOT NULL,
    server INTEGER NOT NULL,
    log TEXT NOT NULL,
    log_type TEXT NOT NULL,
    last_execute TEXT NOT NULL,
    position INTEGER NOT NULL,
    total_rows INTEGER NOT NULL
)";

const SELECT_ONE: &str = "SELECT operator, server, log, log_type, last_execute, position, total_rows
    FROM log_position WHERE id = ?1";

const UPSERT: &str = "INSERT INTO log_position
    (id, operator, server, log, log_type, last_execute, position, total_rows)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(id) DO UPDATE SET
        last_execute = excluded.last_execute,
        position = excluded.position,
        total_rows = excluded.total_rows";

pub struct SqlitePositionStore {
    pool: SqlitePool,
}

impl SqlitePositionStore {
    /// Connect to `url` (e.g. `sqlite://positions.db`), creating the database
    /// file and the `log_position` table when missing
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .max_lifetime(CONNECTION_MAX_LIFETIME)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(url, max_connections, "Connected to position store");
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PositionStore for SqlitePositionStore {
    async fn load(&self, identity: &SourceIdentity) -> Result<Option<Cursor>> {
        let row = sqlx::query(SELECT_ONE)
            .bind(identity.key())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| cursor_from_row(&row)).transpose()
    }

    async fn save(&self, cursor: &Cursor) -> Result<()> {
        let position = i64::try_from(cursor.byte_offset)
            .map_err(|_| Error::Persistence(format!("offset out of range: {}", cursor)))?;
        let total_rows = i64::try_from(cursor.total_rows)
            .map_err(|_| Error::Persistence(format!("row count out of range: {}", cursor)))?;

        sqlx::query(UPSERT)
            .bind(cursor.key())
            .bind(cursor.identity.operator)
            .bind(cursor.identity.server)
            .bind(&cursor.identity.log_name)
            .bind(&cursor.log_type)
            .bind(cursor.last_execute_day.format(DAY_FORMAT).to_string())
            .bind(position)
            .bind(total_rows)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn cursor_from_row(row: &SqliteRow) -> Result<Cursor> {
    let last_execute: String = row.try_get("last_execute")?;
    let last_execute_day = NaiveDate::parse_from_str(&last_execute, DAY_FORMAT)
        .map_err(|e| Error::Persistence(format!("invalid last_execute {}: {}", last_execute, e)))?;

    let position: i64 = row.try_get("position")?;
    let total_rows: i64 = row.try_get("total_rows")?;

    Ok(Cursor {
        identity: SourceIdentity::new(
            row.try_get::<i64, _>("operator")?,
            row.try_get::<i64, _>("server")?,
            row.try_get::<String, _>("log")?,
        ),
        log_type: row.try_get("log_type")?,
        last_execute_day,
        byte_offset: u64::try_from(position)
            .map_err(|_| Error::Persistence(format!("negative position {}", position)))?,
        total_rows: u64::try_from(total_rows)
            .map_err(|_| Error::Persistence(format!("negative total_rows {}", total_rows)))?,
    })
}
