// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Records schema: typed columns and the `bltypes/v1` JSON document.

mod convert;
mod infer;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use infer::{infer_arrow_schema, infer_column_type};

use crate::error::{RecordsError, Result};

/// Schema document version tag
pub const SCHEMA_VERSION: &str = "bltypes/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Decimal,
    String,
    Boolean,
    Date,
    Time,
    Timetz,
    Datetime,
    Datetimetz,
}

impl FieldType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Timetz => "timetz",
            FieldType::Datetime => "datetime",
            FieldType::Datetimetz => "datetimetz",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer bounds are carried as decimal strings so values wider than
/// 64 bits survive JSON; numbers are accepted on read.
mod int_string {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub(super) fn serialize<S: Serializer>(
        value: &Option<i128>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(n) => serializer.serialize_str(&n.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i128>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("integer bound out of range: {n}"))),
            Some(other) => Err(D::Error::custom(format!("invalid integer bound: {other}"))),
        }
    }
}

/// Per-type constraints; only the entries relevant to the field type are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConstraints {
    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "int_string")]
    pub min: Option<i128>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "int_string")]
    pub max: Option<i128>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_precision: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_scale: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fp_total_bits: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fp_significand_bits: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length_chars: Option<u64>,
}

impl FieldConstraints {
    #[must_use]
    pub fn integer(min: i128, max: i128) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fixed_point(precision: u32, scale: i32) -> Self {
        Self {
            fixed_precision: Some(precision),
            fixed_scale: Some(scale),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn floating_point(total_bits: u32, significand_bits: u32) -> Self {
        Self {
            fp_total_bits: Some(total_bits),
            fp_significand_bits: Some(significand_bits),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub rows_sampled: u64,
    pub total_rows: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length_chars: Option<u64>,
}

/// A column as some other system describes it, e.g. `sql/redshift`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRepresentation {
    pub rep_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_ddl: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_type: Option<String>,
}

/// A whole table as some other system describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRepresentation {
    pub rep_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_ddl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordsSchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub constraints: FieldConstraints,
    pub statistics: Option<FieldStatistics>,
    pub representations: BTreeMap<String, FieldRepresentation>,
}

#[derive(Serialize, Deserialize)]
struct FieldDocument {
    #[serde(rename = "type")]
    field_type: FieldType,
    index: usize,
    #[serde(default)]
    constraints: FieldConstraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    statistics: Option<FieldStatistics>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    representations: BTreeMap<String, FieldRepresentation>,
}

impl RecordsSchemaField {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType, constraints: FieldConstraints) -> Self {
        Self {
            name: name.into(),
            field_type,
            constraints,
            statistics: None,
            representations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn required(&self) -> bool {
        self.constraints.required
    }

    #[must_use]
    pub fn with_representation(mut self, name: &str, rep: FieldRepresentation) -> Self {
        _ = self.representations.insert(name.to_string(), rep);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordsSchema {
    pub fields: Vec<RecordsSchemaField>,
    pub known_representations: BTreeMap<String, SchemaRepresentation>,
}

impl RecordsSchema {
    #[must_use]
    pub fn new(fields: Vec<RecordsSchemaField>) -> Self {
        Self {
            fields,
            known_representations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&RecordsSchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// The `bltypes/v1` document
    pub fn to_json_value(&self) -> Result<Value> {
        let mut fields = Map::new();
        for (index, field) in self.fields.iter().enumerate() {
            let doc = FieldDocument {
                field_type: field.field_type,
                index,
                constraints: field.constraints.clone(),
                statistics: field.statistics.clone(),
                representations: field.representations.clone(),
            };
            _ = fields.insert(field.name.clone(), serde_json::to_value(doc)?);
        }
        let mut root = Map::new();
        _ = root.insert("schema".into(), Value::from(SCHEMA_VERSION));
        _ = root.insert("fields".into(), Value::Object(fields));
        if !self.known_representations.is_empty() {
            _ = root.insert(
                "known_representations".into(),
                serde_json::to_value(&self.known_representations)?,
            );
        }
        Ok(Value::Object(root))
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json_value()?)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Self::from_json_value(&serde_json::from_str(s)?)
    }

    /// Parse a `bltypes/v1` document; fields are ordered by `index`.
    pub fn from_json_value(doc: &Value) -> Result<Self> {
        match doc.get("schema").and_then(Value::as_str) {
            Some(SCHEMA_VERSION) => {}
            Some(other) => {
                return Err(RecordsError::InvalidSchema(format!(
                    "unsupported schema version {other}"
                )));
            }
            None => return Err(RecordsError::InvalidSchema("missing \"schema\"".into())),
        }
        let fields_doc = doc
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| RecordsError::InvalidSchema("missing \"fields\"".into()))?;

        let mut indexed = Vec::with_capacity(fields_doc.len());
        for (name, value) in fields_doc {
            let doc: FieldDocument = serde_json::from_value(value.clone()).map_err(|e| {
                RecordsError::InvalidSchema(format!("field {name}: {e}"))
            })?;
            indexed.push((
                doc.index,
                RecordsSchemaField {
                    name: name.clone(),
                    field_type: doc.field_type,
                    constraints: doc.constraints,
                    statistics: doc.statistics,
                    representations: doc.representations,
                },
            ));
        }
        indexed.sort_by_key(|(index, _)| *index);

        let known_representations = match doc.get("known_representations") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            fields: indexed.into_iter().map(|(_, f)| f).collect(),
            known_representations,
        })
    }
}
