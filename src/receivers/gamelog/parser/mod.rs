// SPDX-License-Identifier: Apache-2.0

mod event;
mod field;
mod record;

pub use event::{EventCatalog, EventConfig, UploadKind};
pub use field::{FieldMapping, FieldSpec, FieldType};
pub use record::{
    MAX_STRING_BYTES, Record, RecordParser, SERVER_PLACEHOLDER, TIME_FIELD,
    apply_default_properties, derive_user_id, split_columns, template_index,
};
