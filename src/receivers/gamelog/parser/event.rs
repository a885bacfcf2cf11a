// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::receivers::gamelog::parser::FieldMapping;

/// How the collector applies an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadKind {
    #[serde(rename = "track")]
    Track,
    #[serde(rename = "user_set")]
    UserSet,
    #[serde(rename = "user_setOnce")]
    UserSetOnce,
    #[serde(rename = "user_add")]
    UserAdd,
    #[serde(rename = "user_append")]
    UserAppend,
    #[serde(rename = "user_unset")]
    UserUnset,
    #[serde(rename = "user_del")]
    UserDel,
}

impl UploadKind {
    /// Value stamped into the `#type` envelope field
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::Track => "track",
            UploadKind::UserSet => "user_set",
            UploadKind::UserSetOnce => "user_setOnce",
            UploadKind::UserAdd => "user_add",
            UploadKind::UserAppend => "user_append",
            UploadKind::UserUnset => "user_unset",
            UploadKind::UserDel => "user_del",
        }
    }

    /// User property operations, as opposed to tracked events
    pub fn is_user_operation(&self) -> bool {
        !matches!(self, UploadKind::Track)
    }

    /// Kinds that carry a derived `userId` property
    pub fn sets_user_id(&self) -> bool {
        matches!(
            self,
            UploadKind::Track | UploadKind::UserSet | UploadKind::UserSetOnce
        )
    }
}

/// One named analytics event derived from a game log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Event name reported to the collector
    pub name: String,
    /// Game log name the event is parsed from, e.g. `ItemRecord`
    pub record_name: String,
    /// Log directory type, e.g. `tlog` or `flog`
    pub source_log_type: String,
    pub upload_kind: UploadKind,
    #[serde(default)]
    pub fields: FieldMapping,
}

/// Event configs grouped by record name. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    by_record: BTreeMap<String, Vec<Arc<EventConfig>>>,
}

impl EventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, config: EventConfig) {
        self.by_record
            .entry(config.record_name.clone())
            .or_default()
            .push(Arc::new(config));
    }

    /// Every config parsed from `record_name`, in insertion order
    pub fn get(&self, record_name: &str) -> &[Arc<EventConfig>] {
        self.by_record
            .get(record_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Record names paired with the log type of their first config
    pub fn sources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_record.iter().filter_map(|(record, configs)| {
            configs
                .first()
                .map(|c| (record.as_str(), c.source_log_type.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.by_record.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_record.is_empty()
    }
}

impl FromIterator<EventConfig> for EventCatalog {
    fn from_iter<T: IntoIterator<Item = EventConfig>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for config in iter {
            catalog.insert(config);
        }
        catalog
    }
}
