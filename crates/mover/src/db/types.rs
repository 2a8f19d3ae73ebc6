// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Vendor column type tables.
//!
//! Each driver describes its integer, fixed point and floating point
//! types once; choosing a column type for a records schema field and
//! recovering constraints from an introspected column both read the same
//! table, so a range written as DDL comes back unchanged.

use diagnostics::*;
use records::{FieldConstraints, FieldType, RecordsSchemaField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerType {
    pub name: &'static str,
    pub min: i128,
    pub max: i128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatType {
    pub name: &'static str,
    pub total_bits: u32,
    pub significand_bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalType {
    pub name: &'static str,
    pub max_precision: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarcharType {
    pub name: &'static str,
    pub max_length: u64,
    /// Length counts bytes rather than characters
    pub in_bytes: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TypeTable {
    /// Narrowest first
    pub integers: &'static [IntegerType],
    pub integer_aliases: &'static [(&'static str, &'static str)],
    pub decimal: Option<DecimalType>,
    pub decimal_aliases: &'static [&'static str],
    /// Narrowest first
    pub floats: &'static [FloatType],
    pub float_aliases: &'static [(&'static str, &'static str)],
    pub varchar: Option<VarcharType>,
    pub text: &'static str,
    pub boolean: &'static str,
    pub date: &'static str,
    pub time: &'static str,
    pub timetz: &'static str,
    pub datetime: &'static str,
    pub datetimetz: &'static str,
}

fn normalize(col_type: &str) -> String {
    col_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Decimal digits needed for the magnitude of `n`
fn digits(n: i128) -> u32 {
    n.unsigned_abs().checked_ilog10().map_or(1, |d| d + 1)
}

/// `NAME(a)` or `NAME(a, b)`
fn parse_parameters(col_type: &str) -> Option<(&str, Vec<i64>)> {
    let (name, rest) = col_type.split_once('(')?;
    let args = rest.strip_suffix(')')?;
    let params = args
        .split(',')
        .map(|p| p.trim().parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()?;
    Some((name.trim(), params))
}

impl TypeTable {
    fn widest_integer(&self) -> Option<&IntegerType> {
        self.integers.last()
    }

    fn widest_float(&self) -> &str {
        self.floats.last().map_or(self.text, |f| f.name)
    }

    fn decimal_type(&self, precision: u32, scale: i32) -> Option<String> {
        let decimal = self.decimal?;
        (precision <= decimal.max_precision).then(|| format!("{}({precision},{scale})", decimal.name))
    }

    /// Narrowest integer type holding `[min, max]`, escalating to fixed
    /// point and then floating point.
    #[must_use]
    pub fn type_for_integer(&self, min: Option<i128>, max: Option<i128>) -> String {
        let (Some(min), Some(max)) = (min, max) else {
            return self
                .widest_integer()
                .map_or_else(|| self.widest_float().to_string(), |t| t.name.to_string());
        };
        if let Some(t) = self.integers.iter().find(|t| t.min <= min && max <= t.max) {
            return t.name.to_string();
        }
        let precision = digits(min).max(digits(max));
        let range = format!("{min}..{max}");
        if let Some(decimal) = self.decimal_type(precision, 0) {
            let chosen = decimal.as_str();
            warn!("Integer range {range} fits no integer type, using {chosen}", range: range, chosen: chosen);
            return decimal;
        }
        let float = self.widest_float();
        warn!("Integer range {range} stored as {float}; precision may be lost", range: range, float: float);
        float.to_string()
    }

    #[must_use]
    pub fn type_for_fixed_point(&self, precision: u32, scale: i32) -> String {
        if let Some(decimal) = self.decimal_type(precision, scale) {
            return decimal;
        }
        let float = self.widest_float();
        warn!("NUMERIC({precision},{scale}) stored as {float}", precision: precision, scale: scale, float: float);
        float.to_string()
    }

    #[must_use]
    pub fn type_for_floating_point(&self, total_bits: u32, significand_bits: u32) -> String {
        if let Some(t) = self
            .floats
            .iter()
            .find(|t| t.significand_bits >= significand_bits && t.total_bits >= total_bits)
        {
            return t.name.to_string();
        }
        let float = self.widest_float();
        warn!("{total_bits} bit float stored as {float}", total_bits: total_bits, float: float);
        float.to_string()
    }

    #[must_use]
    pub fn type_for_date_plus_time(&self, has_tz: bool) -> String {
        let name = if has_tz { self.datetimetz } else { self.datetime };
        name.to_string()
    }

    #[must_use]
    pub fn type_for_string(&self, field: &RecordsSchemaField) -> String {
        let Some(varchar) = self.varchar else {
            return self.text.to_string();
        };
        let stats = field.statistics.as_ref();
        let length = if varchar.in_bytes {
            field
                .constraints
                .max_length_bytes
                .or_else(|| stats.and_then(|s| s.max_length_bytes))
        } else {
            field
                .constraints
                .max_length_chars
                .or_else(|| stats.and_then(|s| s.max_length_chars))
        };
        match length {
            Some(n) if n <= varchar.max_length => format!("{}({})", varchar.name, n.max(1)),
            _ => self.text.to_string(),
        }
    }

    /// Column type for a records schema field
    #[must_use]
    pub fn type_for_field(&self, field: &RecordsSchemaField) -> String {
        let c = &field.constraints;
        match field.field_type {
            FieldType::Integer => self.type_for_integer(c.min, c.max),
            FieldType::Decimal => match (c.fixed_precision, c.fixed_scale) {
                (Some(p), Some(s)) => self.type_for_fixed_point(p, s),
                _ => self.type_for_floating_point(
                    c.fp_total_bits.unwrap_or(64),
                    c.fp_significand_bits.unwrap_or(53),
                ),
            },
            FieldType::String => self.type_for_string(field),
            FieldType::Boolean => self.boolean.to_string(),
            FieldType::Date => self.date.to_string(),
            FieldType::Time => self.time.to_string(),
            FieldType::Timetz => self.timetz.to_string(),
            FieldType::Datetime => self.type_for_date_plus_time(false),
            FieldType::Datetimetz => self.type_for_date_plus_time(true),
        }
    }

    fn canonical<'a>(name: &'a str, aliases: &[(&'static str, &'a str)]) -> &'a str {
        aliases
            .iter()
            .find(|(alias, _)| *alias == name)
            .map_or(name, |(_, canonical)| canonical)
    }

    #[must_use]
    pub fn integer_limits(&self, col_type: &str) -> Option<(i128, i128)> {
        let name = normalize(col_type);
        let name = Self::canonical(&name, self.integer_aliases);
        self.integers
            .iter()
            .find(|t| t.name == name)
            .map(|t| (t.min, t.max))
    }

    #[must_use]
    pub fn fp_constraints(&self, col_type: &str) -> Option<(u32, u32)> {
        let name = normalize(col_type);
        let name = Self::canonical(&name, self.float_aliases);
        self.floats
            .iter()
            .find(|t| t.name == name)
            .map(|t| (t.total_bits, t.significand_bits))
    }

    #[must_use]
    pub fn fixed_point_constraints(&self, col_type: &str) -> Option<(u32, i32)> {
        let name = normalize(col_type);
        let decimal = self.decimal?;
        let is_decimal = |n: &str| n == decimal.name || self.decimal_aliases.contains(&n);
        match parse_parameters(&name) {
            Some((base, params)) if is_decimal(base) => {
                let precision = u32::try_from(*params.first()?).ok()?;
                let scale = params.get(1).map_or(Some(0), |s| i32::try_from(*s).ok())?;
                Some((precision, scale))
            }
            None if is_decimal(&name) => Some((decimal.max_precision, 0)),
            _ => None,
        }
    }

    /// Field type and constraints for an introspected column
    #[must_use]
    pub fn classify_column(&self, col_type: &str, nullable: bool) -> (FieldType, FieldConstraints) {
        let name = normalize(col_type);
        let (field_type, constraints) = if let Some((min, max)) = self.integer_limits(&name) {
            (FieldType::Integer, FieldConstraints::integer(min, max))
        } else if let Some((p, s)) = self.fixed_point_constraints(&name) {
            (FieldType::Decimal, FieldConstraints::fixed_point(p, s))
        } else if let Some((total, sig)) = self.fp_constraints(&name) {
            (FieldType::Decimal, FieldConstraints::floating_point(total, sig))
        } else if name == self.datetimetz
            || name.starts_with("TIMESTAMPTZ")
            || name.starts_with("TIMESTAMP WITH TIME ZONE")
        {
            (FieldType::Datetimetz, FieldConstraints::default())
        } else if name == self.datetime || name.starts_with("TIMESTAMP") || name.starts_with("DATETIME") {
            (FieldType::Datetime, FieldConstraints::default())
        } else if (name == self.timetz && self.timetz != self.time && self.timetz != self.text)
            || name.starts_with("TIMETZ")
            || name.starts_with("TIME WITH TIME ZONE")
        {
            (FieldType::Timetz, FieldConstraints::default())
        } else if name.starts_with("TIME") {
            (FieldType::Time, FieldConstraints::default())
        } else if name == "DATE" {
            (FieldType::Date, FieldConstraints::default())
        } else if name == self.boolean || name == "BOOLEAN" || name == "BOOL" {
            (FieldType::Boolean, FieldConstraints::default())
        } else {
            let mut constraints = FieldConstraints::default();
            if let (Some(varchar), Some((_, params))) = (self.varchar, parse_parameters(&name)) {
                let length = params.first().and_then(|n| u64::try_from(*n).ok());
                if varchar.in_bytes {
                    constraints.max_length_bytes = length;
                } else {
                    constraints.max_length_chars = length;
                }
            }
            (FieldType::String, constraints)
        };
        (field_type, constraints.required(!nullable))
    }
}
