// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Type inference for columns that arrive as text (spreadsheets, sniffed
//! delimited files without a schema document).

use arrow_schema::{DataType, Field, Schema};

fn is_integer(s: &str) -> bool {
    s.parse::<i64>().is_ok()
}

fn is_number(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit()) && s.parse::<f64>().is_ok()
}

fn is_boolean(s: &str) -> bool {
    s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")
}

/// Narrowest type accepting every non-empty sample value.
///
/// Dates stay strings; a declared schema is needed to type them.
pub fn infer_column_type<'a, I>(values: I) -> DataType
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut seen = false;
    let (mut int, mut num, mut boolean) = (true, true, true);
    for value in values.into_iter().flatten() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        seen = true;
        int &= is_integer(value);
        num &= is_number(value);
        boolean &= is_boolean(value);
        if !(int || num || boolean) {
            return DataType::Utf8;
        }
    }
    match (seen, int, num, boolean) {
        (false, ..) => DataType::Utf8,
        (true, true, ..) => DataType::Int64,
        (true, false, true, _) => DataType::Float64,
        (true, false, false, true) => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

/// Arrow schema for string rows, sampling at most `max_rows` rows.
/// Every inferred column is nullable.
#[must_use]
pub fn infer_arrow_schema(headers: &[String], rows: &[Vec<Option<String>>], max_rows: usize) -> Schema {
    let sample = &rows[..rows.len().min(max_rows)];
    let fields = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let column = sample
                .iter()
                .map(|row| row.get(i).and_then(|v| v.as_deref()));
            Field::new(name, infer_column_type(column), true)
        })
        .collect::<Vec<_>>();
    Schema::new(fields)
}
