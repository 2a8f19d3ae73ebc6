// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Reading delimited text into record batches.

use std::sync::Arc;

use arrow::compute::{CastOptions, cast, cast_with_options};
use arrow::datatypes::Date32Type;
use arrow_array::{
    Array, ArrayRef, BooleanArray, Date32Array, RecordBatch, StringArray, Time64MicrosecondArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use diagnostics::*;
use records::compression::decompress_bytes;
use records::encoding::decode_text;
use records::schema::infer_arrow_schema;
use records::{
    DelimitedFormat, HintName, ProcessingInstructions, RecordsError, UnhandledHints,
    ValidatedHints,
};

use crate::dataframes::split_batch;
use crate::error::{MoverError, Result};

/// A row of text cells; `None` is an unquoted empty field
pub type TextRow = Vec<Option<String>>;

/// Validate and consume a format's hints for reading. Every hint is
/// honoured; LZO fails later when the bytes are decompressed.
pub fn reader_hints(format: &DelimitedFormat, pi: &ProcessingInstructions) -> Result<ValidatedHints> {
    let mut unhandled = UnhandledHints::from_hints(format.hints());
    let hints = format.validated(pi, &mut unhandled)?;
    unhandled.consume_all(HintName::ALL);
    unhandled.complain_if_unhandled(pi)?;
    Ok(hints)
}

pub struct DelimitedDecoder {
    hints: ValidatedHints,
    pi: ProcessingInstructions,
}

struct Tokenizer<'a> {
    hints: &'a ValidatedHints,
    rows: Vec<TextRow>,
    row: TextRow,
    field: String,
    quoted: bool,
}

impl Tokenizer<'_> {
    fn end_field(&mut self) {
        let field = std::mem::take(&mut self.field);
        let cell = if self.quoted || !field.is_empty() {
            Some(field)
        } else {
            None
        };
        self.row.push(cell);
        self.quoted = false;
    }

    fn end_row(&mut self) {
        self.end_field();
        self.rows.push(std::mem::take(&mut self.row));
    }

    fn run(mut self, text: &str) -> Result<Vec<TextRow>> {
        let chars: Vec<char> = text.chars().collect();
        let terminator: Vec<char> = self.hints.record_terminator.as_str().chars().collect();
        let delimiter = self.hints.field_delimiter;
        let quotechar = self.hints.quotechar;
        let escape = self.hints.escape;
        let quoting = self.hints.quoting.is_some();
        let mut in_quotes = false;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            if in_quotes {
                if Some(c) == escape && !self.hints.doublequote {
                    if let Some(n) = next {
                        self.field.push(n);
                        i += 2;
                        continue;
                    }
                }
                if c == quotechar {
                    if self.hints.doublequote && next == Some(quotechar) {
                        self.field.push(quotechar);
                        i += 2;
                    } else {
                        in_quotes = false;
                        i += 1;
                    }
                    continue;
                }
                self.field.push(c);
                i += 1;
                continue;
            }
            if quoting && c == quotechar && self.field.is_empty() && !self.quoted {
                in_quotes = true;
                self.quoted = true;
                i += 1;
                continue;
            }
            if Some(c) == escape {
                if let Some(n) = next {
                    self.field.push(n);
                    i += 2;
                    continue;
                }
            }
            if c == delimiter {
                self.end_field();
                i += 1;
                continue;
            }
            if chars[i..].starts_with(&terminator) {
                self.end_row();
                i += terminator.len();
                continue;
            }
            self.field.push(c);
            i += 1;
        }
        if in_quotes {
            return Err(RecordsError::decode("delimited input", "unterminated quoted field").into());
        }
        if !(self.row.is_empty() && self.field.is_empty() && !self.quoted) {
            self.end_row();
        }
        Ok(self.rows)
    }
}

fn invalid(count: usize, column: &str) -> RecordsError {
    RecordsError::decode(
        "delimited input",
        format!("{count} values in column {column} could not be parsed"),
    )
}

fn parse_date(v: &str, fmt: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(v, fmt)
        .or_else(|_| NaiveDate::parse_from_str(v, "%Y-%m-%d"))
        .ok()
}

fn with_fraction(fmt: &str) -> String {
    fmt.replacen("%S", "%S%.f", 1)
}

fn parse_datetime(v: &str, fmt: &str) -> Option<NaiveDateTime> {
    [fmt.to_string(), with_fraction(fmt), "%Y-%m-%d %H:%M:%S%.f".into(), "%Y-%m-%dT%H:%M:%S%.f".into()]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(v, f).ok())
}

/// Offsets arrive as `+00:00`, `+0000` or `+00`
fn parse_datetimetz(v: &str, fmt: &str) -> Option<DateTime<chrono::FixedOffset>> {
    let bases = [fmt.to_string(), with_fraction(fmt)];
    bases
        .iter()
        .flat_map(|f| ["%:z", "%z", "%#z"].map(|z| f.replace("%:z", z)))
        .find_map(|f| DateTime::parse_from_str(v, &f).ok())
        .or_else(|| DateTime::parse_from_rfc3339(v).ok())
}

fn parse_time(v: &str, fmt: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(v, fmt)
        .or_else(|_| NaiveTime::parse_from_str(v, "%H:%M:%S%.f"))
        .ok()
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

impl DelimitedDecoder {
    #[must_use]
    pub fn new(hints: ValidatedHints, pi: &ProcessingInstructions) -> Self {
        Self {
            hints,
            pi: pi.clone(),
        }
    }

    /// Split text into rows of cells
    pub fn tokenize(&self, text: &str) -> Result<Vec<TextRow>> {
        Tokenizer {
            hints: &self.hints,
            rows: Vec::new(),
            row: Vec::new(),
            field: String::new(),
            quoted: false,
        }
        .run(text)
    }

    /// Decompressed, transcoded and tokenized rows plus the header, if any
    pub fn rows_from_bytes(&self, data: &[u8]) -> Result<(Option<Vec<String>>, Vec<TextRow>)> {
        let plain = decompress_bytes(self.hints.compression, data)?;
        let text = decode_text(self.hints.encoding, &plain)?;
        let mut rows = self.tokenize(&text)?;
        let header = if self.hints.header_row && !rows.is_empty() {
            let names = rows.remove(0);
            Some(
                names
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect(),
            )
        } else {
            None
        };
        Ok((header, rows))
    }

    fn check_failures(&self, failures: usize, column: &str) -> Result<()> {
        if failures == 0 {
            return Ok(());
        }
        let over_limit = self
            .pi
            .max_failure_rows
            .is_some_and(|max| failures as u64 > max);
        if self.pi.fail_if_row_invalid || over_limit {
            return Err(invalid(failures, column).into());
        }
        warn!("Nulled {failures} unparseable values in column {column}", failures: failures, column: column);
        Ok(())
    }

    fn column(&self, field: &Field, cells: Vec<Option<&str>>) -> Result<ArrayRef> {
        let present = cells.iter().filter(|c| c.is_some()).count();
        let array: ArrayRef = match field.data_type() {
            DataType::Utf8 => Arc::new(StringArray::from(cells)),
            DataType::Date32 => {
                let fmt = self.hints.dateformat.chrono_format();
                Arc::new(Date32Array::from(
                    cells
                        .iter()
                        .map(|c| {
                            c.and_then(|v| parse_date(v, fmt))
                                .map(Date32Type::from_naive_date)
                        })
                        .collect::<Vec<_>>(),
                ))
            }
            DataType::Timestamp(_, None) => {
                let fmt = self.hints.datetimeformat.chrono_format();
                Arc::new(TimestampMicrosecondArray::from(
                    cells
                        .iter()
                        .map(|c| {
                            c.and_then(|v| parse_datetime(v, &fmt))
                                .map(|dt| dt.and_utc().timestamp_micros())
                        })
                        .collect::<Vec<_>>(),
                ))
            }
            DataType::Timestamp(_, tz @ Some(_)) => {
                let fmt = self.hints.datetimeformattz.chrono_format();
                Arc::new(
                    TimestampMicrosecondArray::from(
                        cells
                            .iter()
                            .map(|c| {
                                c.and_then(|v| {
                                    parse_datetimetz(v, &fmt).map(|dt| dt.timestamp_micros()).or_else(
                                        || parse_datetime(v, &fmt).map(|dt| dt.and_utc().timestamp_micros()),
                                    )
                                })
                            })
                            .collect::<Vec<_>>(),
                    )
                    .with_timezone_opt(tz.clone()),
                )
            }
            DataType::Time64(_) => {
                let fmt = self.hints.timeonlyformat.chrono_format();
                Arc::new(Time64MicrosecondArray::from(
                    cells
                        .iter()
                        .map(|c| {
                            c.and_then(|v| parse_time(v, fmt)).map(|t| {
                                i64::from(t.num_seconds_from_midnight()) * 1_000_000
                                    + i64::from(t.nanosecond() / 1_000)
                            })
                        })
                        .collect::<Vec<_>>(),
                ))
            }
            DataType::Boolean => Arc::new(BooleanArray::from(
                cells
                    .iter()
                    .map(|c| c.and_then(parse_bool))
                    .collect::<Vec<_>>(),
            )),
            other => {
                let strings = StringArray::from(cells);
                let options = CastOptions {
                    safe: true,
                    ..CastOptions::default()
                };
                cast_with_options(&strings, other, &options)?
            }
        };
        let parsed = array.len() - array.null_count();
        self.check_failures(present - parsed, field.name())?;
        if array.data_type() == field.data_type() {
            Ok(array)
        } else {
            Ok(cast(&array, field.data_type())?)
        }
    }

    /// Build batches of at most `batch_rows` rows.
    ///
    /// Without a schema, column types are inferred from a sample of the
    /// rows and names come from the header (or `column_<n>`).
    pub fn decode_rows(
        &self,
        header: Option<Vec<String>>,
        rows: Vec<TextRow>,
        schema: Option<SchemaRef>,
        batch_rows: usize,
    ) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        let width = schema
            .as_ref()
            .map(|s| s.fields().len())
            .or_else(|| header.as_ref().map(Vec::len))
            .unwrap_or_else(|| rows.iter().map(Vec::len).max().unwrap_or(0));
        let mut accepted = Vec::with_capacity(rows.len());
        let mut rejected = 0usize;
        for mut row in rows {
            if row.len() > width {
                rejected += 1;
                continue;
            }
            row.resize(width, None);
            accepted.push(row);
        }
        self.check_failures(rejected, "(row width)")?;

        let schema = match schema {
            Some(schema) => Arc::new(Schema::new(
                schema
                    .fields()
                    .iter()
                    .map(|f| f.as_ref().clone().with_nullable(true))
                    .collect::<Vec<_>>(),
            )),
            None => {
                let names = header
                    .unwrap_or_else(|| (0..width).map(|i| format!("column_{i}")).collect());
                Arc::new(infer_arrow_schema(&names, &accepted, self.pi.inference_rows()))
            }
        };
        let columns = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let cells = accepted.iter().map(|row| row[i].as_deref()).collect();
                self.column(field, cells)
            })
            .collect::<Result<Vec<_>>>()?;
        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        Ok((schema, split_batch(&batch, batch_rows)))
    }

    /// Decode one whole file.
    pub fn decode_bytes(
        &self,
        data: &[u8],
        schema: Option<SchemaRef>,
        batch_rows: usize,
    ) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        let (header, rows) = self.rows_from_bytes(data)?;
        if let (Some(schema), Some(header)) = (&schema, &header) {
            if header.len() != schema.fields().len() {
                return Err(MoverError::Records(RecordsError::InvalidSchema(format!(
                    "header has {} columns, schema has {}",
                    header.len(),
                    schema.fields().len()
                ))));
            }
        }
        self.decode_rows(header, rows, schema, batch_rows)
    }
}

/// Arrow type for a timestamp column decoded from text
#[must_use]
pub fn text_timestamp_type(with_tz: bool) -> DataType {
    DataType::Timestamp(
        TimeUnit::Microsecond,
        with_tz.then(|| Arc::from("+00:00")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataframes::encode::{DelimitedEncoder, writer_hints};
    use arrow_array::cast::AsArray;
    use arrow_array::record_batch;
    use arrow::datatypes::{Int64Type, TimestampMicrosecondType};
    use records::{PartialHints, RecordsFormat, Variant};
    use serde_json::json;

    fn decoder(format: &RecordsFormat, pi: &ProcessingInstructions) -> DelimitedDecoder {
        DelimitedDecoder::new(reader_hints(format.as_delimited().unwrap(), pi).unwrap(), pi)
    }

    fn csv() -> RecordsFormat {
        RecordsFormat::delimited(Variant::Csv, PartialHints::new())
            .alter_hints(&[("compression".to_string(), json!(null))].into())
    }

    #[test]
    fn test_tokenize_csv_quotes() {
        let d = decoder(&csv(), &ProcessingInstructions::default());
        let rows = d.tokenize("a,\"b,\"\"c\"\"\",\n\"\",x\n").unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Some("a".into()), Some("b,\"c\"".into()), None],
                vec![Some(String::new()), Some("x".into())],
            ]
        );
    }

    #[test]
    fn test_tokenize_bluelabs_escapes() {
        let format = RecordsFormat::bluelabs()
            .alter_hints(&[("compression".to_string(), json!(null))].into());
        let d = decoder(&format, &ProcessingInstructions::default());
        let rows = d.tokenize("a\\,b,two\\\nlines\nlast").unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Some("a,b".into()), Some("two\nlines".into())],
                vec![Some("last".into())],
            ]
        );
    }

    #[test]
    fn test_unterminated_quote() {
        let d = decoder(&csv(), &ProcessingInstructions::default());
        assert!(d.tokenize("\"open,1\n").is_err());
    }

    #[test]
    fn test_infers_types_with_header() {
        let d = decoder(&csv(), &ProcessingInstructions::default());
        let (schema, batches) = d.decode_bytes(b"id,name\n1,x\n2,\n", None, 100).unwrap();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).name(), "name");
        let ids = batches[0].column(0).as_primitive::<Int64Type>();
        assert_eq!(ids.values().to_vec(), vec![1, 2]);
        assert!(batches[0].column(1).is_null(1));
    }

    #[test]
    fn test_bad_values_follow_processing_instructions() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]));
        let strict = decoder(&csv().alter_hints(&[("header-row".to_string(), json!(false))].into()), &ProcessingInstructions::default());
        assert!(strict.decode_bytes(b"1\nnope\n", Some(schema.clone()), 10).is_err());

        let pi = ProcessingInstructions::lenient();
        let lenient = decoder(&csv().alter_hints(&[("header-row".to_string(), json!(false))].into()), &pi);
        let (_, batches) = lenient.decode_bytes(b"1\nnope\n", Some(schema.clone()), 10).unwrap();
        assert_eq!(batches[0].column(0).null_count(), 1);

        let capped = ProcessingInstructions {
            max_failure_rows: Some(0),
            ..ProcessingInstructions::lenient()
        };
        let capped = decoder(&csv().alter_hints(&[("header-row".to_string(), json!(false))].into()), &capped);
        assert!(capped.decode_bytes(b"1\nnope\n", Some(schema), 10).is_err());
    }

    #[test]
    fn test_bluelabs_round_trip() {
        let ts = TimestampMicrosecondArray::from(vec![Some(1_700_000_000_000_000), None])
            .with_timezone("+00:00");
        let source = record_batch!(
            ("id", Int64, [1, 2]),
            ("text", Utf8, [Some("comma, and \\ slash"), None])
        )
        .unwrap();
        let source = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                source.schema().field(0).clone(),
                source.schema().field(1).clone(),
                Field::new("at", text_timestamp_type(true), true),
            ])),
            vec![source.column(0).clone(), source.column(1).clone(), Arc::new(ts)],
        )
        .unwrap();

        let format = RecordsFormat::bluelabs();
        let pi = ProcessingInstructions::default();
        let encoder = DelimitedEncoder::new(writer_hints(format.as_delimited().unwrap(), &pi).unwrap());
        let bytes = encoder.encode_file(&source, true).unwrap();

        let (_, batches) = decoder(&format, &pi)
            .decode_bytes(&bytes, Some(source.schema()), 100)
            .unwrap();
        let decoded = &batches[0];
        assert_eq!(decoded.column(0).as_primitive::<Int64Type>().values().to_vec(), vec![1, 2]);
        assert_eq!(decoded.column(1).as_string::<i32>().value(0), "comma, and \\ slash");
        assert!(decoded.column(1).is_null(1));
        let at = decoded.column(2).as_primitive::<TimestampMicrosecondType>();
        assert_eq!(at.value(0), 1_700_000_000_000_000);
        assert!(at.is_null(1));
    }

    #[test]
    fn test_short_rows_padded_long_rows_rejected() {
        let format = csv().alter_hints(&[("header-row".to_string(), json!(false))].into());
        let pi = ProcessingInstructions::default();
        let d = decoder(&format, &pi);
        let (schema, batches) = d.decode_bytes(b"1,2\n3\n", None, 10).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert!(batches[0].column(1).is_null(1));
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Utf8, true)]));
        assert!(d.decode_bytes(b"1,2\n", Some(schema), 10).is_err());
    }
}
