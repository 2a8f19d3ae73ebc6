// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Records formats: how tabular bytes are laid out on the wire.

use std::fmt;

use serde_json::{Map, Value, json};

use crate::error::{RecordsError, Result};
use crate::hints::{
    Compression, DEFAULT_VARIANT, HintName, PartialHints, UnhandledHints, ValidatedHints, Variant,
    expand, validate_hints,
};
use crate::processing::ProcessingInstructions;

/// Delimited text with a variant and fully expanded hints.
#[derive(Debug, Clone)]
pub struct DelimitedFormat {
    variant: Variant,
    hints: PartialHints,
    custom_hints: PartialHints,
}

impl DelimitedFormat {
    #[must_use]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Every hint, defaults included
    #[must_use]
    pub fn hints(&self) -> &PartialHints {
        &self.hints
    }

    /// Hints supplied on top of the variant defaults
    #[must_use]
    pub fn custom_hints(&self) -> &PartialHints {
        &self.custom_hints
    }

    #[must_use]
    pub fn hint(&self, name: HintName) -> Option<&Value> {
        self.hints.get(name.as_str())
    }

    /// Validate the hints, recording coerced values in `unhandled`.
    pub fn validated(
        &self,
        pi: &ProcessingInstructions,
        unhandled: &mut UnhandledHints,
    ) -> Result<ValidatedHints> {
        validate_hints(&self.hints, pi, unhandled)
    }

    /// Compression named by the hints, ignoring values outside the domain
    #[must_use]
    pub fn compression(&self) -> Option<Compression> {
        self.hint(HintName::Compression)
            .and_then(Value::as_str)
            .and_then(Compression::from_name)
    }

    #[must_use]
    pub fn header_row(&self) -> bool {
        self.hint(HintName::HeaderRow)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl PartialEq for DelimitedFormat {
    fn eq(&self, other: &Self) -> bool {
        self.variant == other.variant && self.hints == other.hints
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordsFormat {
    Delimited(DelimitedFormat),
    Parquet,
    Avro,
}

impl RecordsFormat {
    /// Delimited format from a variant plus custom hints.
    ///
    /// Hint keys outside the known set are kept so that translators can
    /// report them as unhandled.
    #[must_use]
    pub fn delimited(variant: Variant, custom_hints: PartialHints) -> Self {
        let mut hints = variant.default_hints();
        hints.extend(custom_hints.clone());
        RecordsFormat::Delimited(DelimitedFormat {
            variant,
            hints,
            custom_hints,
        })
    }

    /// Delimited format from a variant name.
    ///
    /// An unknown name fails under `fail_if_dont_understand`; otherwise the
    /// base defaults are used.
    pub fn delimited_named(
        variant: &str,
        custom_hints: PartialHints,
        pi: &ProcessingInstructions,
    ) -> Result<Self> {
        let defaults = expand(variant, pi)?;
        let variant = Variant::from_name(variant).unwrap_or(Variant::Dumb);
        let mut hints = defaults;
        hints.extend(custom_hints.clone());
        Ok(RecordsFormat::Delimited(DelimitedFormat {
            variant,
            hints,
            custom_hints,
        }))
    }

    /// The default delimited format
    #[must_use]
    pub fn bluelabs() -> Self {
        Self::delimited(DEFAULT_VARIANT, PartialHints::new())
    }

    #[must_use]
    pub fn format_type(&self) -> &'static str {
        match self {
            RecordsFormat::Delimited(_) => "delimited",
            RecordsFormat::Parquet => "parquet",
            RecordsFormat::Avro => "avro",
        }
    }

    #[must_use]
    pub fn as_delimited(&self) -> Option<&DelimitedFormat> {
        match self {
            RecordsFormat::Delimited(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn hints(&self) -> Option<&PartialHints> {
        self.as_delimited().map(DelimitedFormat::hints)
    }

    /// New format with `overrides` layered over the current hints.
    /// Formats without hints are returned unchanged.
    #[must_use]
    pub fn alter_hints(&self, overrides: &PartialHints) -> Self {
        match self {
            RecordsFormat::Delimited(d) => {
                let mut hints = d.hints.clone();
                hints.extend(overrides.clone());
                let mut custom_hints = d.custom_hints.clone();
                custom_hints.extend(overrides.clone());
                RecordsFormat::Delimited(DelimitedFormat {
                    variant: d.variant,
                    hints,
                    custom_hints,
                })
            }
            other => other.clone(),
        }
    }

    #[must_use]
    pub fn has_header_row(&self) -> bool {
        self.as_delimited().is_some_and(DelimitedFormat::header_row)
    }

    /// The format of every part after the first in a multi-part delimited
    /// set: the header row is written to and read from the first part only.
    #[must_use]
    pub fn without_header_row(&self) -> Self {
        if !self.has_header_row() {
            return self.clone();
        }
        let mut headerless = PartialHints::new();
        _ = headerless.insert(HintName::HeaderRow.as_str().to_string(), Value::Bool(false));
        self.alter_hints(&headerless)
    }

    /// Re-expand the defaults of another variant, keeping custom hints.
    #[must_use]
    pub fn alter_variant(&self, variant: Variant) -> Self {
        match self {
            RecordsFormat::Delimited(d) => Self::delimited(variant, d.custom_hints.clone()),
            other => other.clone(),
        }
    }

    /// Filename for a data file in this format, `data.csv.gz` and friends.
    #[must_use]
    pub fn generate_filename(&self, basename: &str) -> String {
        match self {
            RecordsFormat::Delimited(d) => {
                let ext = d.compression().map_or("", Compression::extension);
                format!("{basename}.csv{ext}")
            }
            RecordsFormat::Parquet => format!("{basename}.parquet"),
            RecordsFormat::Avro => format!("{basename}.avro"),
        }
    }

    /// Name of the `_format_<type>` document for this format
    #[must_use]
    pub fn document_name(&self) -> String {
        format!("_format_{}", self.format_type())
    }

    /// JSON document persisted in a records directory
    #[must_use]
    pub fn to_document(&self) -> Value {
        match self {
            RecordsFormat::Delimited(d) => json!({
                "type": "delimited",
                "variant": d.variant.as_str(),
                "hints": d.hints,
            }),
            other => json!({ "type": other.format_type() }),
        }
    }

    /// Parse a `_format_<type>` document.
    pub fn from_document(doc: &Value, pi: &ProcessingInstructions) -> Result<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| RecordsError::decode("format document", "expected a JSON object"))?;
        let format_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RecordsError::decode("format document", "missing \"type\""))?;
        match format_type {
            "delimited" => {
                let variant = obj
                    .get("variant")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_VARIANT.as_str());
                let hints = hints_from_object(obj.get("hints"))?;
                let base = Self::delimited_named(variant, PartialHints::new(), pi)?;
                let defaults = base.hints().cloned().unwrap_or_default();
                let custom: PartialHints = hints
                    .into_iter()
                    .filter(|(k, v)| defaults.get(k) != Some(v))
                    .collect();
                Ok(base.alter_hints(&custom))
            }
            "parquet" => Ok(RecordsFormat::Parquet),
            "avro" => Ok(RecordsFormat::Avro),
            other => Err(RecordsError::UnknownFormatType(other.to_string())),
        }
    }
}

fn hints_from_object(value: Option<&Value>) -> Result<PartialHints> {
    match value {
        None | Some(Value::Null) => Ok(PartialHints::new()),
        Some(Value::Object(map)) => Ok(map_to_hints(map)),
        Some(_) => Err(RecordsError::decode("format document", "\"hints\" must be an object")),
    }
}

fn map_to_hints(map: &Map<String, Value>) -> PartialHints {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

impl Default for RecordsFormat {
    fn default() -> Self {
        Self::bluelabs()
    }
}

impl fmt::Display for RecordsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordsFormat::Delimited(d) if d.custom_hints.is_empty() => {
                write!(f, "DelimitedRecordsFormat({})", d.variant)
            }
            RecordsFormat::Delimited(d) => write!(
                f,
                "DelimitedRecordsFormat({}, {})",
                d.variant,
                Value::Object(d.custom_hints.clone().into_iter().collect())
            ),
            RecordsFormat::Parquet => f.write_str("ParquetRecordsFormat"),
            RecordsFormat::Avro => f.write_str("AvroRecordsFormat"),
        }
    }
}
