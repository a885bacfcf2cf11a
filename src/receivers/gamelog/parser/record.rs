// SPDX-License-Identifier: Apache-2.0

//! Turns one tab-separated log line into a collector event.

use chrono::{DateTime, Local, Utc};
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::receivers::gamelog::error::{Error, Result};
use crate::receivers::gamelog::parser::{EventConfig, FieldType, UploadKind};

/// Envelope fields at the top level, everything else under `properties`
pub type Record = Map<String, Value>;

pub const TIME_FIELD: &str = "#time";
pub const TYPE_FIELD: &str = "#type";
pub const EVENT_NAME_FIELD: &str = "#event_name";
pub const ACCOUNT_ID_FIELD: &str = "#account_id";
pub const PROPERTIES_FIELD: &str = "properties";
pub const USER_ID_PROPERTY: &str = "userId";

/// Strings longer than this are cut at the nearest char boundary below it
pub const MAX_STRING_BYTES: usize = 1024;

/// Any field named `server` is shipped with this value instead of the log's
pub const SERVER_PLACEHOLDER: &str = "9999";

const SERVER_FIELD: &str = "server";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const ACCOUNT_NONE: &str = "-1";

/// Split a raw line into its columns
pub fn split_columns(line: &str) -> Vec<&str> {
    line.split('\t').collect()
}

/// Column index of a `${n}` key. `Ok(None)` for ordinary keys.
pub fn template_index(name: &str) -> Result<Option<usize>> {
    if !name.starts_with("${") {
        return Ok(None);
    }

    name.strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .and_then(|n| n.parse::<usize>().ok())
        .map(Some)
        .ok_or_else(|| Error::Config(format!("malformed property key template: {}", name)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser {
    ignore_field_errors: bool,
}

impl RecordParser {
    /// With `ignore_field_errors`, unparsable numbers become zero and bad
    /// integer arrays are omitted instead of failing the line
    pub fn new(ignore_field_errors: bool) -> Self {
        Self {
            ignore_field_errors,
        }
    }

    /// Parse `columns` against `config`.
    ///
    /// Returns `Ok(None)` when the line must be dropped: the time field is
    /// unparsable, or a date lies in the future.
    pub fn parse(&self, config: &EventConfig, columns: &[&str]) -> Result<Option<Record>> {
        self.parse_at(config, columns, Utc::now())
    }

    /// Same as `parse`, with an explicit notion of "now"
    pub fn parse_at(
        &self,
        config: &EventConfig,
        columns: &[&str],
        now: DateTime<Utc>,
    ) -> Result<Option<Record>> {
        let mut record = Record::new();
        record.insert(TYPE_FIELD.to_string(), Value::from(config.upload_kind.as_str()));
        let mut properties = Map::new();

        for (name, spec) in &config.fields {
            let Some(raw) = column(columns, spec.index) else {
                warn!(
                    event = %config.name,
                    field = %name,
                    index = spec.index,
                    columns = columns.len(),
                    "Column index out of range, skipping field"
                );
                continue;
            };
            let raw = if name == SERVER_FIELD {
                SERVER_PLACEHOLDER
            } else {
                raw
            };

            let value = match spec.field_type {
                FieldType::String => Value::from(truncate(raw, MAX_STRING_BYTES)),
                FieldType::Int => match raw.parse::<i64>() {
                    Ok(v) => Value::from(v),
                    Err(e) => self.substitute(config, name, raw, &e, Value::from(0))?,
                },
                FieldType::Float => match raw.parse::<f64>().ok().and_then(Number::from_f64) {
                    Some(n) => Value::Number(n),
                    None => self.substitute(config, name, raw, &"invalid float", Value::from(0.0))?,
                },
                FieldType::Date => {
                    let timestamp = match parse_millis(raw) {
                        Some(ts) => ts,
                        None if name == TIME_FIELD => {
                            warn!(
                                event = %config.name,
                                value = raw,
                                line = %columns.join("\t"),
                                "Unparsable time field, dropping line"
                            );
                            return Ok(None);
                        }
                        None => {
                            self.substitute(config, name, raw, &"invalid timestamp", Value::Null)?;
                            DateTime::<Utc>::UNIX_EPOCH
                        }
                    };
                    if timestamp > now {
                        warn!(
                            event = %config.name,
                            field = %name,
                            value = raw,
                            line = %columns.join("\t"),
                            "Timestamp is in the future, dropping line"
                        );
                        return Ok(None);
                    }
                    Value::from(
                        timestamp
                            .with_timezone(&Local)
                            .format(TIME_FORMAT)
                            .to_string(),
                    )
                }
                FieldType::Bool => Value::Bool(parse_bool(raw)),
                FieldType::IntArray => match serde_json::from_str::<Vec<i64>>(raw) {
                    Ok(v) => Value::from(v),
                    Err(e) if self.ignore_field_errors => {
                        debug!(event = %config.name, field = %name, value = raw, error = %e, "Omitting unparsable integer array");
                        continue;
                    }
                    Err(e) => return Err(field_error(config, name, raw, &e)),
                },
            };

            if name.starts_with('#') {
                record.insert(name.clone(), value);
            } else if let Some(index) = template_index(name)? {
                match column(columns, index) {
                    Some(key) => {
                        properties.insert(key.to_string(), value);
                    }
                    None => warn!(
                        event = %config.name,
                        field = %name,
                        columns = columns.len(),
                        "Property key column out of range, skipping field"
                    ),
                }
            } else {
                properties.insert(name.clone(), value);
            }
        }

        if !properties.is_empty() {
            record.insert(PROPERTIES_FIELD.to_string(), Value::Object(properties));
        }

        Ok(Some(record))
    }

    fn substitute(
        &self,
        config: &EventConfig,
        name: &str,
        raw: &str,
        err: &dyn std::fmt::Display,
        zero: Value,
    ) -> Result<Value> {
        if self.ignore_field_errors {
            debug!(event = %config.name, field = %name, value = raw, error = %err, "Substituting zero for unparsable field");
            Ok(zero)
        } else {
            Err(field_error(config, name, raw, err))
        }
    }
}

/// Stamp `#type`, the event name for tracked events, and the `userId`
/// derived from `#account_id` for `track`, `user_set` and `user_setOnce`
pub fn apply_default_properties(config: &EventConfig, record: &mut Record) {
    record.insert(TYPE_FIELD.to_string(), Value::from(config.upload_kind.as_str()));

    if config.upload_kind == UploadKind::Track {
        record.insert(EVENT_NAME_FIELD.to_string(), Value::from(config.name.as_str()));
    }
    if !config.upload_kind.sets_user_id() {
        return;
    }

    let Some(user_id) = record
        .get(ACCOUNT_ID_FIELD)
        .and_then(Value::as_str)
        .and_then(derive_user_id)
    else {
        return;
    };

    if let Value::Object(properties) = record
        .entry(PROPERTIES_FIELD)
        .or_insert_with(|| Value::Object(Map::new()))
    {
        properties.insert(USER_ID_PROPERTY.to_string(), Value::from(user_id));
    }
}

/// `1001_23456.s1` becomes `1001`. Empty and `-1` accounts have no user id.
pub fn derive_user_id(account: &str) -> Option<String> {
    if account.is_empty() || account == ACCOUNT_NONE {
        return None;
    }

    let account = account.rfind('.').map_or(account, |i| &account[..i]);
    let user = match account.rfind('_') {
        Some(i) if i > 0 => &account[..i],
        _ => account,
    };
    Some(user.to_string())
}

fn column<'a>(columns: &[&'a str], index: usize) -> Option<&'a str> {
    index.checked_sub(1).and_then(|i| columns.get(i)).copied()
}

fn parse_millis(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn field_error(config: &EventConfig, name: &str, raw: &str, err: &dyn std::fmt::Display) -> Error {
    Error::Field(format!(
        "event {} field {}: cannot parse {:?}: {}",
        config.name, name, raw, err
    ))
}
