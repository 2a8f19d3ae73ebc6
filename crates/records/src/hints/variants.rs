// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Named presets of delimited hint defaults.

use std::fmt;

use diagnostics::*;
use serde_json::{Value, json};

use super::{HintName, PartialHints};
use crate::error::{RecordsError, Result};
use crate::processing::ProcessingInstructions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    Dumb,
    Csv,
    Bigquery,
    Bluelabs,
    Vertica,
}

/// Variant used when a delimited format names none
pub const DEFAULT_VARIANT: Variant = Variant::Bluelabs;

struct Defaults {
    field_delimiter: &'static str,
    record_terminator: &'static str,
    compression: Option<&'static str>,
    quoting: Option<&'static str>,
    doublequote: bool,
    escape: Option<&'static str>,
    dateformat: &'static str,
    datetimeformat: &'static str,
    datetimeformattz: &'static str,
    header_row: bool,
}

const DUMB: Defaults = Defaults {
    field_delimiter: ",",
    record_terminator: "\n",
    compression: Some("GZIP"),
    quoting: None,
    doublequote: false,
    escape: None,
    dateformat: "YYYY-MM-DD",
    datetimeformat: "YYYY-MM-DD HH:MI:SS",
    datetimeformattz: "YYYY-MM-DD HH:MI:SSOF",
    header_row: false,
};

const CSV: Defaults = Defaults {
    field_delimiter: ",",
    record_terminator: "\n",
    compression: Some("GZIP"),
    quoting: Some("minimal"),
    doublequote: true,
    escape: None,
    dateformat: "MM/DD/YY",
    datetimeformat: "MM/DD/YY HH24:MI",
    datetimeformattz: "MM/DD/YY HH24:MI",
    header_row: true,
};

const BIGQUERY: Defaults = Defaults {
    field_delimiter: ",",
    record_terminator: "\n",
    compression: None,
    quoting: Some("minimal"),
    doublequote: true,
    escape: None,
    dateformat: "YYYY-MM-DD",
    datetimeformat: "YYYY-MM-DD HH24:MI:SS",
    datetimeformattz: "YYYY-MM-DD HH:MI:SSOF",
    header_row: true,
};

const BLUELABS: Defaults = Defaults {
    field_delimiter: ",",
    record_terminator: "\n",
    compression: Some("GZIP"),
    quoting: None,
    doublequote: false,
    escape: Some("\\"),
    dateformat: "YYYY-MM-DD",
    datetimeformat: "YYYY-MM-DD HH24:MI:SS",
    datetimeformattz: "YYYY-MM-DD HH:MI:SSOF",
    header_row: false,
};

const VERTICA: Defaults = Defaults {
    field_delimiter: "\u{1}",
    record_terminator: "\u{2}",
    compression: None,
    quoting: None,
    doublequote: false,
    escape: None,
    dateformat: "YYYY-MM-DD",
    datetimeformat: "YYYY-MM-DD HH:MI:SS",
    datetimeformattz: "YYYY-MM-DD HH:MI:SSOF",
    header_row: false,
};

impl Defaults {
    fn to_hints(&self) -> PartialHints {
        let opt = |v: Option<&str>| v.map_or(Value::Null, |s| json!(s));
        [
            (HintName::FieldDelimiter, json!(self.field_delimiter)),
            (HintName::RecordTerminator, json!(self.record_terminator)),
            (HintName::Compression, opt(self.compression)),
            (HintName::Quoting, opt(self.quoting)),
            (HintName::Quotechar, json!("\"")),
            (HintName::Doublequote, json!(self.doublequote)),
            (HintName::Escape, opt(self.escape)),
            (HintName::Encoding, json!("UTF8")),
            (HintName::Dateformat, json!(self.dateformat)),
            (HintName::Timeonlyformat, json!("HH24:MI:SS")),
            (HintName::Datetimeformat, json!(self.datetimeformat)),
            (HintName::Datetimeformattz, json!(self.datetimeformattz)),
            (HintName::HeaderRow, json!(self.header_row)),
        ]
        .into_iter()
        .map(|(k, v)| (k.as_str().to_string(), v))
        .collect()
    }
}

impl Variant {
    pub const ALL: [Variant; 5] = [
        Variant::Dumb,
        Variant::Csv,
        Variant::Bigquery,
        Variant::Bluelabs,
        Variant::Vertica,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Dumb => "dumb",
            Variant::Csv => "csv",
            Variant::Bigquery => "bigquery",
            Variant::Bluelabs => "bluelabs",
            Variant::Vertica => "vertica",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Variant> {
        Variant::ALL.into_iter().find(|v| v.as_str() == name)
    }

    /// Full default hint map; every hint key is present.
    #[must_use]
    pub fn default_hints(self) -> PartialHints {
        match self {
            Variant::Dumb => DUMB.to_hints(),
            Variant::Csv => CSV.to_hints(),
            Variant::Bigquery => BIGQUERY.to_hints(),
            Variant::Bluelabs => BLUELABS.to_hints(),
            Variant::Vertica => VERTICA.to_hints(),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Defaults used for a variant nobody recognises
#[must_use]
pub fn base_defaults() -> PartialHints {
    Variant::Dumb.default_hints()
}

/// Expand a variant name into its default hints.
///
/// An unknown name is an error when `fail_if_dont_understand` is set;
/// otherwise the base defaults are returned.
pub fn expand(variant: &str, pi: &ProcessingInstructions) -> Result<PartialHints> {
    match Variant::from_name(variant) {
        Some(v) => Ok(v.default_hints()),
        None if pi.fail_if_dont_understand => Err(RecordsError::UnknownVariant(variant.to_string())),
        None => {
            warn!("Unknown variant {variant}, using base defaults", variant: variant);
            Ok(base_defaults())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_has_every_hint() {
        for v in Variant::ALL {
            let hints = v.default_hints();
            assert_eq!(hints.len(), HintName::ALL.len(), "{v}");
            for name in HintName::ALL {
                assert!(hints.contains_key(name.as_str()), "{v} missing {name}");
            }
        }
    }

    #[test]
    fn test_vertica_defaults() {
        let hints = Variant::Vertica.default_hints();
        assert_eq!(hints["field-delimiter"], json!("\u{1}"));
        assert_eq!(hints["record-terminator"], json!("\u{2}"));
        assert_eq!(hints["compression"], Value::Null);
    }

    #[test]
    fn test_expand_unknown_variant() {
        let strict = ProcessingInstructions::default();
        assert!(matches!(
            expand("excel", &strict),
            Err(RecordsError::UnknownVariant(_))
        ));
        let lenient = ProcessingInstructions::lenient();
        assert_eq!(expand("excel", &lenient).unwrap(), base_defaults());
        assert_eq!(
            expand("csv", &strict).unwrap()["header-row"],
            json!(true)
        );
    }
}
