// SPDX-License-Identifier: Apache-2.0

//! Loads the event catalog from its JSON artifact:
//!
//! ```json
//! {
//!   "common_fields": { "#time": { "index": 1, "type": "date" } },
//!   "events": [
//!     {
//!       "name": "item_pickup",
//!       "record_name": "ItemRecord",
//!       "source_log_type": "tlog",
//!       "upload_kind": "track",
//!       "fields": { "item": { "index": 4, "type": "int" } }
//!     }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::receivers::gamelog::parser::{EventCatalog, EventConfig, FieldMapping, template_index};
use crate::receivers::gamelog::{Error, Result};

#[derive(Debug, Deserialize)]
struct EventConfigFile {
    /// Fields shared by every event
    #[serde(default)]
    common_fields: FieldMapping,
    events: Vec<EventConfig>,
}

pub fn load_catalog(path: &Path) -> Result<EventCatalog> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("unable to read {}: {}", path.display(), e)))?;
    let catalog = parse_catalog(&content)?;

    info!(
        path = ?path,
        events = catalog.len(),
        "Loaded event configuration"
    );
    Ok(catalog)
}

/// Merge common fields into every event and group events by record name.
///
/// User operations only receive the `#` prefixed common fields. An event's
/// own fields take precedence over common ones.
pub fn parse_catalog(content: &str) -> Result<EventCatalog> {
    let file: EventConfigFile = serde_json::from_str(content)?;

    let mut catalog = EventCatalog::new();
    for mut event in file.events {
        if event.name.is_empty() || event.record_name.is_empty() {
            return Err(Error::Config(
                "every event needs a name and a record_name".to_string(),
            ));
        }

        let mut fields: FieldMapping = file
            .common_fields
            .iter()
            .filter(|(name, _)| !event.upload_kind.is_user_operation() || name.starts_with('#'))
            .map(|(name, spec)| (name.clone(), *spec))
            .collect();
        fields.append(&mut event.fields);

        for name in fields.keys() {
            template_index(name)?;
        }

        event.fields = fields;
        catalog.insert(event);
    }

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::gamelog::parser::{FieldSpec, FieldType, UploadKind};

    const CONFIG: &str = r##"{
        "common_fields": {
            "#time": {"index": 1, "type": "date"},
            "#account_id": {"index": 2, "type": "string"},
            "server": {"index": 3, "type": "string"}
        },
        "events": [
            {
                "name": "item_pickup",
                "record_name": "ItemRecord",
                "source_log_type": "tlog",
                "upload_kind": "track",
                "fields": {"item": {"index": 4, "type": "int"}, "server": {"index": 5, "type": "int"}}
            },
            {
                "name": "player",
                "record_name": "Login",
                "source_log_type": "flog",
                "upload_kind": "user_setOnce",
                "fields": {"level": {"index": 4, "type": "int"}, "items": {"index": 5, "type": "[I"}}
            }
        ]
    }"##;

    #[test]
    fn test_common_fields_are_merged() {
        let catalog = parse_catalog(CONFIG).unwrap();
        assert_eq!(catalog.len(), 2);

        let pickup = &catalog.get("ItemRecord")[0];
        assert_eq!(pickup.fields.len(), 4);
        assert_eq!(pickup.fields["server"], FieldSpec::new(5, FieldType::Int));
        assert_eq!(pickup.fields["#time"], FieldSpec::new(1, FieldType::Date));

        let player = &catalog.get("Login")[0];
        assert_eq!(player.upload_kind, UploadKind::UserSetOnce);
        let names: Vec<_> = player.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["#account_id", "#time", "items", "level"]);
        assert_eq!(player.fields["items"].field_type, FieldType::IntArray);
    }

    #[test]
    fn test_rejects_malformed_templates() {
        let config = r##"{"events": [{
            "name": "e", "record_name": "R", "source_log_type": "tlog",
            "upload_kind": "track", "fields": {"${x}": {"index": 1, "type": "int"}}
        }]}"##;
        assert!(matches!(parse_catalog(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_kinds() {
        let config = r##"{"events": [{
            "name": "e", "record_name": "R", "source_log_type": "tlog",
            "upload_kind": "user_increment"
        }]}"##;
        assert!(matches!(parse_catalog(config), Err(Error::Json(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, CONFIG).unwrap();

        let catalog = load_catalog(&path).unwrap();
        let sources: Vec<_> = catalog.sources().collect();
        assert_eq!(sources, vec![("ItemRecord", "tlog"), ("Login", "flog")]);

        assert!(matches!(
            load_catalog(&dir.path().join("missing.json")),
            Err(Error::Config(_))
        ));
    }
}
