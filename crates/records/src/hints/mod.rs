// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Delimited-format hints.
//!
//! Hints travel as a loosely typed JSON map ([`PartialHints`]) so that
//! `_format_delimited` documents round-trip exactly. Translators work on
//! [`ValidatedHints`], produced by [`validate_hints`], which has every
//! value checked against its closed domain.

mod datetime;
mod unhandled;
mod variants;

use std::collections::BTreeMap;
use std::fmt;

use diagnostics::*;
use serde_json::{Value, json};

pub use datetime::{DateFormat, DateTimeFormat, FormatParseError, TimeFormat};
pub use unhandled::{UnhandledHints, cant_handle_hint};
pub use variants::{DEFAULT_VARIANT, Variant, base_defaults, expand};

use crate::error::{RecordsError, Result};
use crate::processing::ProcessingInstructions;

/// Hint name to JSON value
pub type PartialHints = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HintName {
    FieldDelimiter,
    RecordTerminator,
    Compression,
    Quoting,
    Quotechar,
    Doublequote,
    Escape,
    Encoding,
    Dateformat,
    Timeonlyformat,
    Datetimeformat,
    Datetimeformattz,
    HeaderRow,
}

impl HintName {
    pub const ALL: [HintName; 13] = [
        HintName::FieldDelimiter,
        HintName::RecordTerminator,
        HintName::Compression,
        HintName::Quoting,
        HintName::Quotechar,
        HintName::Doublequote,
        HintName::Escape,
        HintName::Encoding,
        HintName::Dateformat,
        HintName::Timeonlyformat,
        HintName::Datetimeformat,
        HintName::Datetimeformattz,
        HintName::HeaderRow,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HintName::FieldDelimiter => "field-delimiter",
            HintName::RecordTerminator => "record-terminator",
            HintName::Compression => "compression",
            HintName::Quoting => "quoting",
            HintName::Quotechar => "quotechar",
            HintName::Doublequote => "doublequote",
            HintName::Escape => "escape",
            HintName::Encoding => "encoding",
            HintName::Dateformat => "dateformat",
            HintName::Timeonlyformat => "timeonlyformat",
            HintName::Datetimeformat => "datetimeformat",
            HintName::Datetimeformattz => "datetimeformattz",
            HintName::HeaderRow => "header-row",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<HintName> {
        HintName::ALL.into_iter().find(|h| h.as_str() == name)
    }
}

impl fmt::Display for HintName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTerminator {
    Lf,
    CrLf,
    Cr,
    Stx,
}

impl RecordTerminator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordTerminator::Lf => "\n",
            RecordTerminator::CrLf => "\r\n",
            RecordTerminator::Cr => "\r",
            RecordTerminator::Stx => "\u{2}",
        }
    }

    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "\n" => Some(RecordTerminator::Lf),
            "\r\n" => Some(RecordTerminator::CrLf),
            "\r" => Some(RecordTerminator::Cr),
            "\u{2}" => Some(RecordTerminator::Stx),
            _ => None,
        }
    }
}

impl fmt::Display for RecordTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Gzip,
    Bzip,
    Lzo,
}

impl Compression {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::Gzip => "GZIP",
            Compression::Bzip => "BZIP",
            Compression::Lzo => "LZO",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GZIP" => Some(Compression::Gzip),
            "BZIP" | "BZIP2" => Some(Compression::Bzip),
            "LZO" | "LZOP" => Some(Compression::Lzo),
            _ => None,
        }
    }

    /// Filename suffix, including the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Compression::Gzip => ".gz",
            Compression::Bzip => ".bz2",
            Compression::Lzo => ".lzo",
        }
    }

    #[must_use]
    pub fn from_extension(filename: &str) -> Option<Self> {
        [Compression::Gzip, Compression::Bzip, Compression::Lzo]
            .into_iter()
            .find(|c| filename.ends_with(c.extension()))
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quoting {
    Minimal,
    All,
    Nonnumeric,
}

impl Quoting {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Quoting::Minimal => "minimal",
            Quoting::All => "all",
            Quoting::Nonnumeric => "nonnumeric",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "minimal" => Some(Quoting::Minimal),
            "all" => Some(Quoting::All),
            "nonnumeric" => Some(Quoting::Nonnumeric),
            _ => None,
        }
    }
}

impl fmt::Display for Quoting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    /// UTF-16 with a byte order mark
    Utf16,
    Utf16Le,
    Utf16Be,
    Latin1,
    Cp1252,
}

impl Encoding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF8",
            Encoding::Utf16 => "UTF16",
            Encoding::Utf16Le => "UTF16LE",
            Encoding::Utf16Be => "UTF16BE",
            Encoding::Latin1 => "LATIN1",
            Encoding::Cp1252 => "CP1252",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "UTF8" => Some(Encoding::Utf8),
            "UTF16" => Some(Encoding::Utf16),
            "UTF16LE" => Some(Encoding::Utf16Le),
            "UTF16BE" => Some(Encoding::Utf16Be),
            "LATIN1" | "ISO88591" => Some(Encoding::Latin1),
            "CP1252" | "WINDOWS1252" | "WIN1252" => Some(Encoding::Cp1252),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_utf16(self) -> bool {
        matches!(self, Encoding::Utf16 | Encoding::Utf16Le | Encoding::Utf16Be)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hints with every value checked against its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedHints {
    pub field_delimiter: char,
    pub record_terminator: RecordTerminator,
    pub compression: Option<Compression>,
    pub quoting: Option<Quoting>,
    pub quotechar: char,
    pub doublequote: bool,
    pub escape: Option<char>,
    pub encoding: Encoding,
    pub dateformat: DateFormat,
    pub timeonlyformat: TimeFormat,
    pub datetimeformat: DateTimeFormat,
    pub datetimeformattz: DateTimeFormat,
    pub header_row: bool,
}

impl ValidatedHints {
    /// Canonical JSON form
    #[must_use]
    pub fn to_hints(&self) -> PartialHints {
        let opt_str = |v: Option<&str>| v.map_or(Value::Null, |s| json!(s));
        let opt_char = |v: Option<char>| v.map_or(Value::Null, |c| json!(c.to_string()));
        [
            (HintName::FieldDelimiter, json!(self.field_delimiter.to_string())),
            (HintName::RecordTerminator, json!(self.record_terminator.as_str())),
            (HintName::Compression, opt_str(self.compression.map(Compression::as_str))),
            (HintName::Quoting, opt_str(self.quoting.map(Quoting::as_str))),
            (HintName::Quotechar, json!(self.quotechar.to_string())),
            (HintName::Doublequote, json!(self.doublequote)),
            (HintName::Escape, opt_char(self.escape)),
            (HintName::Encoding, json!(self.encoding.as_str())),
            (HintName::Dateformat, json!(self.dateformat.as_str())),
            (HintName::Timeonlyformat, json!(self.timeonlyformat.as_str())),
            (HintName::Datetimeformat, json!(self.datetimeformat.to_string())),
            (HintName::Datetimeformattz, json!(self.datetimeformattz.to_string())),
            (HintName::HeaderRow, json!(self.header_row)),
        ]
        .into_iter()
        .map(|(k, v)| (k.as_str().to_string(), v))
        .collect()
    }
}

fn single_char(v: &Value) -> Option<char> {
    let s = v.as_str()?;
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

fn optional_char(v: &Value) -> Option<Option<char>> {
    if v.is_null() {
        Some(None)
    } else {
        single_char(v).map(Some)
    }
}

fn boolean(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn nullable<T>(v: &Value, parse: impl Fn(&str) -> Option<T>) -> Option<Option<T>> {
    match v {
        Value::Null => Some(None),
        Value::String(s) => parse(s).map(Some),
        _ => None,
    }
}

fn parsed<T: std::str::FromStr>(v: &Value) -> Option<T> {
    v.as_str()?.parse().ok()
}

struct Validator<'a> {
    hints: &'a PartialHints,
    pi: &'a ProcessingInstructions,
    unhandled: &'a mut UnhandledHints,
}

impl Validator<'_> {
    fn check<T>(
        &mut self,
        hint: HintName,
        parse: impl Fn(&Value) -> Option<T>,
        fallback: T,
    ) -> Result<T> {
        let Some(value) = self.hints.get(hint.as_str()) else {
            return Ok(fallback);
        };
        if let Some(parsed) = parse(value) {
            return Ok(parsed);
        }
        if self.pi.fail_if_cant_handle_hint {
            return Err(RecordsError::cant_handle(
                hint.as_str(),
                value,
                "value outside the allowed domain",
            ));
        }
        let name = hint.as_str();
        let value = value.to_string();
        warn!("Coercing invalid hint {name}={value} to its default", name: name, value: value);
        self.unhandled.consume(hint);
        Ok(fallback)
    }
}

/// Check every hint value against its closed domain.
///
/// Missing keys take the base defaults. An invalid value is an error when
/// `fail_if_cant_handle_hint` is set; otherwise it is replaced by the base
/// default and removed from `unhandled`.
pub fn validate_hints(
    hints: &PartialHints,
    pi: &ProcessingInstructions,
    unhandled: &mut UnhandledHints,
) -> Result<ValidatedHints> {
    let mut v = Validator {
        hints,
        pi,
        unhandled,
    };
    Ok(ValidatedHints {
        field_delimiter: v.check(HintName::FieldDelimiter, single_char, ',')?,
        record_terminator: v.check(
            HintName::RecordTerminator,
            |v| v.as_str().and_then(RecordTerminator::from_str_value),
            RecordTerminator::Lf,
        )?,
        compression: v.check(
            HintName::Compression,
            |v| nullable(v, Compression::from_name),
            Some(Compression::Gzip),
        )?,
        quoting: v.check(HintName::Quoting, |v| nullable(v, Quoting::from_name), None)?,
        quotechar: v.check(HintName::Quotechar, single_char, '"')?,
        doublequote: v.check(HintName::Doublequote, boolean, false)?,
        escape: v.check(HintName::Escape, optional_char, None)?,
        encoding: v.check(
            HintName::Encoding,
            |v| v.as_str().and_then(Encoding::from_name),
            Encoding::Utf8,
        )?,
        dateformat: v.check(HintName::Dateformat, parsed, DateFormat::YyyyMmDd)?,
        timeonlyformat: v.check(
            HintName::Timeonlyformat,
            |v| parsed::<TimeFormat>(v).filter(|t| t.allowed_time_only()),
            TimeFormat::Hh24MiSs,
        )?,
        datetimeformat: v.check(
            HintName::Datetimeformat,
            parsed,
            DateTimeFormat::new(DateFormat::YyyyMmDd, TimeFormat::HhMiSs, false),
        )?,
        datetimeformattz: v.check(
            HintName::Datetimeformattz,
            parsed,
            DateTimeFormat::new(DateFormat::YyyyMmDd, TimeFormat::HhMiSs, true),
        )?,
        header_row: v.check(HintName::HeaderRow, boolean, false)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bluelabs() {
        let hints = Variant::Bluelabs.default_hints();
        let mut unhandled = UnhandledHints::from_hints(&hints);
        let v = validate_hints(&hints, &ProcessingInstructions::default(), &mut unhandled).unwrap();
        assert_eq!(v.escape, Some('\\'));
        assert_eq!(v.quoting, None);
        assert_eq!(v.compression, Some(Compression::Gzip));
        assert_eq!(v.datetimeformattz.to_string(), "YYYY-MM-DD HH:MI:SSOF");
        assert_eq!(unhandled.len(), HintName::ALL.len());
        assert_eq!(v.to_hints(), hints);
    }

    #[test]
    fn test_validate_strict_rejects_bad_value() {
        let mut hints = Variant::Csv.default_hints();
        _ = hints.insert("quoting".into(), json!("sometimes"));
        let mut unhandled = UnhandledHints::from_hints(&hints);
        let err = validate_hints(&hints, &ProcessingInstructions::default(), &mut unhandled)
            .unwrap_err();
        assert!(matches!(err, RecordsError::CantHandleHint { ref hint, .. } if hint == "quoting"));
    }

    #[test]
    fn test_validate_lenient_coerces_and_consumes() {
        let mut hints = Variant::Csv.default_hints();
        _ = hints.insert("field-delimiter".into(), json!("::"));
        _ = hints.insert("timeonlyformat".into(), json!("HH24:MI"));
        let mut unhandled = UnhandledHints::from_hints(&hints);
        let v = validate_hints(&hints, &ProcessingInstructions::lenient(), &mut unhandled)
            .unwrap();
        assert_eq!(v.field_delimiter, ',');
        assert_eq!(v.timeonlyformat, TimeFormat::Hh24MiSs);
        assert!(!unhandled.contains(HintName::FieldDelimiter));
        assert!(!unhandled.contains(HintName::Timeonlyformat));
        assert!(unhandled.contains(HintName::Quoting));
    }

    #[test]
    fn test_encoding_aliases() {
        assert_eq!(Encoding::from_name("utf-8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("ISO-8859-1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_name("windows-1252"), Some(Encoding::Cp1252));
        assert_eq!(Encoding::from_name("EBCDIC"), None);
    }

    #[test]
    fn test_compression_extension() {
        assert_eq!(Compression::from_extension("x.csv.bz2"), Some(Compression::Bzip));
        assert_eq!(Compression::from_extension("x.csv"), None);
    }
}
