// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Semantic type of a mapped column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "float")]
    Float,
    /// Milliseconds since the epoch
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "bool")]
    Bool,
    /// Bracketed list of integers, e.g. `[1,2,3]`
    #[serde(rename = "int_array", alias = "[I")]
    IntArray,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::Bool => "bool",
            FieldType::IntArray => "int_array",
        };
        f.write_str(name)
    }
}

/// Where a field comes from in a tab-separated line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// 1-based column index
    pub index: usize,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(index: usize, field_type: FieldType) -> Self {
        Self { index, field_type }
    }
}

/// Output key to column mapping for one event
pub type FieldMapping = BTreeMap<String, FieldSpec>;
