// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Writing record batches as delimited text.

use std::io::Write;

use arrow::compute::cast;
use arrow::datatypes::{Date32Type, Time64MicrosecondType, TimestampMicrosecondType};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use arrow_array::cast::AsArray;
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_schema::{DataType, TimeUnit};
use chrono::{DateTime, Utc};
use diagnostics::*;
use records::compression::CompressedWriter;
use records::encoding::encode_text;
use records::{
    Compression, DelimitedFormat, HintName, ProcessingInstructions, Quoting, RecordsError,
    UnhandledHints, ValidatedHints, cant_handle_hint,
};

use crate::error::Result;

/// Validate and consume a format's hints for writing.
///
/// Every hint except LZO compression is honoured by the encoder; LZO is
/// reported and written uncompressed in lenient mode.
pub fn writer_hints(format: &DelimitedFormat, pi: &ProcessingInstructions) -> Result<ValidatedHints> {
    let mut unhandled = UnhandledHints::from_hints(format.hints());
    let mut hints = format.validated(pi, &mut unhandled)?;
    if hints.compression == Some(Compression::Lzo) {
        cant_handle_hint(pi, HintName::Compression, "LZO", "LZO cannot be written locally")?;
        hints.compression = None;
    }
    if hints.quoting.is_some() && !hints.doublequote && hints.escape.is_none() {
        cant_handle_hint(
            pi,
            HintName::Doublequote,
            false,
            "quoted fields need doubled quotes or an escape character",
        )?;
        hints.doublequote = true;
    }
    unhandled.consume_all(HintName::ALL);
    unhandled.complain_if_unhandled(pi)?;
    Ok(hints)
}

struct Column {
    cells: Vec<Option<String>>,
    numeric: bool,
}

fn formatted(array: &dyn Array, numeric: bool) -> Result<Column> {
    let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())?;
    let cells = (0..array.len())
        .map(|i| array.is_valid(i).then(|| formatter.value(i).to_string()))
        .collect();
    Ok(Column { cells, numeric })
}

fn render_column(array: &ArrayRef, hints: &ValidatedHints) -> Result<Column> {
    let valid = |i: usize| array.is_valid(i);
    let rows = 0..array.len();
    let text = |cells: Vec<Option<String>>| Column {
        cells,
        numeric: false,
    };
    match array.data_type() {
        DataType::Date32 | DataType::Date64 => {
            let dates = cast(array, &DataType::Date32)?;
            let dates = dates.as_primitive::<Date32Type>();
            let fmt = hints.dateformat.chrono_format();
            Ok(text(
                rows.map(|i| {
                    valid(i)
                        .then(|| dates.value_as_date(i))
                        .flatten()
                        .map(|d| d.format(fmt).to_string())
                })
                .collect(),
            ))
        }
        DataType::Timestamp(_, tz) => {
            let micros = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, tz.clone()))?;
            let micros = micros.as_primitive::<TimestampMicrosecondType>();
            let (fmt, offset) = match tz {
                Some(_) => (hints.datetimeformattz.chrono_format(), true),
                None => (hints.datetimeformat.chrono_format(), false),
            };
            Ok(text(
                rows.map(|i| {
                    let naive = valid(i).then(|| micros.value_as_datetime(i)).flatten()?;
                    Some(if offset {
                        DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
                            .format(&fmt)
                            .to_string()
                    } else {
                        naive.format(&fmt).to_string()
                    })
                })
                .collect(),
            ))
        }
        DataType::Time32(_) | DataType::Time64(_) => {
            let times = cast(array, &DataType::Time64(TimeUnit::Microsecond))?;
            let times = times.as_primitive::<Time64MicrosecondType>();
            let fmt = hints.timeonlyformat.chrono_format();
            Ok(text(
                rows.map(|i| {
                    valid(i)
                        .then(|| times.value_as_time(i))
                        .flatten()
                        .map(|t| t.format(fmt).to_string())
                })
                .collect(),
            ))
        }
        dt if dt.is_numeric() => formatted(array.as_ref(), true),
        _ => formatted(array.as_ref(), false),
    }
}

/// Encoder for one delimited layout
pub struct DelimitedEncoder {
    hints: ValidatedHints,
}

impl DelimitedEncoder {
    #[must_use]
    pub fn new(hints: ValidatedHints) -> Self {
        Self { hints }
    }

    #[must_use]
    pub fn hints(&self) -> &ValidatedHints {
        &self.hints
    }

    fn is_special(&self, c: char) -> bool {
        c == self.hints.field_delimiter
            || c == '\n'
            || c == '\r'
            || self.hints.record_terminator.as_str().contains(c)
            || Some(c) == self.hints.escape
    }

    fn quote(&self, value: &str, out: &mut String) {
        let q = self.hints.quotechar;
        out.push(q);
        for c in value.chars() {
            if c == q {
                match (self.hints.doublequote, self.hints.escape) {
                    (false, Some(e)) => out.push(e),
                    _ => out.push(q),
                }
            } else if Some(c) == self.hints.escape && !self.hints.doublequote {
                out.push(c);
            }
            out.push(c);
        }
        out.push(q);
    }

    fn escape_unquoted(&self, value: &str, out: &mut String) -> Result<()> {
        match self.hints.escape {
            Some(e) => {
                for c in value.chars() {
                    if self.is_special(c) {
                        out.push(e);
                    }
                    out.push(c);
                }
                Ok(())
            }
            None if value.chars().any(|c| self.is_special(c)) => Err(RecordsError::decode(
                "delimited output",
                format!("value {value:?} needs quoting or an escape character"),
            )
            .into()),
            None => {
                out.push_str(value);
                Ok(())
            }
        }
    }

    fn field(&self, value: &str, numeric: bool, out: &mut String) -> Result<()> {
        let quote = match self.hints.quoting {
            None => return self.escape_unquoted(value, out),
            Some(Quoting::All) => true,
            Some(Quoting::Nonnumeric) => !numeric,
            Some(Quoting::Minimal) => {
                value.is_empty()
                    || value
                        .chars()
                        .any(|c| c == self.hints.quotechar || self.is_special(c))
            }
        };
        if quote {
            self.quote(value, out);
        } else {
            out.push_str(value);
        }
        Ok(())
    }

    /// Delimited text for a batch, with the header row when asked for and
    /// the hints call for one.
    pub fn encode_text(&self, batch: &RecordBatch, include_header: bool) -> Result<String> {
        let delimiter = self.hints.field_delimiter;
        let terminator = self.hints.record_terminator.as_str();
        let mut out = String::new();
        if include_header && self.hints.header_row {
            for (i, field) in batch.schema().fields().iter().enumerate() {
                if i > 0 {
                    out.push(delimiter);
                }
                self.field(field.name(), false, &mut out)?;
            }
            out.push_str(terminator);
        }
        let columns = batch
            .columns()
            .iter()
            .map(|array| render_column(array, &self.hints))
            .collect::<Result<Vec<_>>>()?;
        for row in 0..batch.num_rows() {
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    out.push(delimiter);
                }
                if let Some(value) = &column.cells[row] {
                    self.field(value, column.numeric, &mut out)?;
                }
            }
            out.push_str(terminator);
        }
        Ok(out)
    }

    /// Encoded and compressed bytes of one file
    pub fn encode_file(&self, batch: &RecordBatch, include_header: bool) -> Result<Vec<u8>> {
        let text = self.encode_text(batch, include_header)?;
        let bytes = encode_text(self.hints.encoding, &text)?;
        let mut writer = CompressedWriter::new(self.hints.compression, Vec::new())?;
        writer.write_all(&bytes)?;
        let out = writer.finish()?;
        let rows = batch.num_rows();
        let size = out.len();
        debug!("Encoded {rows} rows into {size} bytes", rows: rows, size: size);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{TimestampMicrosecondArray, record_batch};
    use records::{PartialHints, RecordsFormat, Variant};
    use serde_json::json;
    use std::sync::Arc;

    fn encoder(variant: Variant, custom: &[(&str, serde_json::Value)]) -> DelimitedEncoder {
        let custom: PartialHints = custom
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        let format = RecordsFormat::delimited(variant, custom);
        let hints = writer_hints(format.as_delimited().unwrap(), &ProcessingInstructions::default())
            .unwrap();
        DelimitedEncoder::new(hints)
    }

    #[test]
    fn test_csv_minimal_quoting() {
        let batch = record_batch!(
            ("id", Int32, [1, 2, 3]),
            ("text", Utf8, [Some("plain"), Some("has, comma"), None])
        )
        .unwrap();
        let text = encoder(Variant::Csv, &[]).encode_text(&batch, true).unwrap();
        assert_eq!(text, "id,text\n1,plain\n2,\"has, comma\"\n3,\n");
    }

    #[test]
    fn test_header_only_when_asked() {
        let batch = record_batch!(("id", Int32, [1])).unwrap();
        let csv = encoder(Variant::Csv, &[]);
        assert_eq!(csv.encode_text(&batch, false).unwrap(), "1\n");
    }

    #[test]
    fn test_bluelabs_escapes() {
        let batch = record_batch!(("s", Utf8, ["a,b", "back\\slash", "two\nlines"])).unwrap();
        let text = encoder(Variant::Bluelabs, &[]).encode_text(&batch, true).unwrap();
        assert_eq!(text, "a\\,b\nback\\\\slash\ntwo\\\nlines\n");
    }

    #[test]
    fn test_dumb_refuses_unescapable_values() {
        let batch = record_batch!(("s", Utf8, ["a,b"])).unwrap();
        assert!(encoder(Variant::Dumb, &[]).encode_text(&batch, false).is_err());
    }

    #[test]
    fn test_quote_all_and_nonnumeric() {
        let batch = record_batch!(("n", Int64, [7]), ("s", Utf8, ["say \"hi\""])).unwrap();
        let all = encoder(Variant::Csv, &[("quoting", json!("all"))]);
        assert_eq!(all.encode_text(&batch, false).unwrap(), "\"7\",\"say \"\"hi\"\"\"\n");
        let nonnumeric = encoder(Variant::Csv, &[("quoting", json!("nonnumeric"))]);
        assert_eq!(
            nonnumeric.encode_text(&batch, false).unwrap(),
            "7,\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_temporal_formats() {
        let ts = TimestampMicrosecondArray::from(vec![1_700_000_000_000_000]).with_timezone("+00:00");
        let batch = RecordBatch::try_from_iter(vec![
            ("d", Arc::new(arrow_array::Date32Array::from(vec![19_000])) as ArrayRef),
            ("ts", Arc::new(ts) as ArrayRef),
        ])
        .unwrap();
        let text = encoder(Variant::Csv, &[]).encode_text(&batch, false).unwrap();
        assert_eq!(text, "01/08/22,11/14/23 22:13\n");
        let text = encoder(Variant::Bluelabs, &[]).encode_text(&batch, false).unwrap();
        assert_eq!(text, "2022-01-08,2023-11-14 22:13:20+00:00\n");
    }

    #[test]
    fn test_compressed_file() {
        let batch = record_batch!(("n", Int32, [1, 2])).unwrap();
        let bytes = encoder(Variant::Bluelabs, &[]).encode_file(&batch, true).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        let plain = records::compression::decompress_bytes(Some(Compression::Gzip), &bytes).unwrap();
        assert_eq!(plain, b"1\n2\n");
    }

    #[test]
    fn test_lzo_is_reported() {
        let format = RecordsFormat::bluelabs()
            .alter_hints(&[("compression".to_string(), json!("LZO"))].into());
        let strict = writer_hints(format.as_delimited().unwrap(), &ProcessingInstructions::default());
        assert!(matches!(strict, Err(crate::MoverError::CantHandleHint { .. })));
        let lenient =
            writer_hints(format.as_delimited().unwrap(), &ProcessingInstructions::lenient()).unwrap();
        assert_eq!(lenient.compression, None);
    }
}
