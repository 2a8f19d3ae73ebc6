// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Conversion between records schemas and arrow schemas.

use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_array::cast::AsArray;
use arrow_schema::{DataType, Field, Schema, TimeUnit};

use super::{FieldConstraints, FieldStatistics, FieldType, RecordsSchema, RecordsSchemaField};
use crate::error::{RecordsError, Result};

fn int_limits(data_type: &DataType) -> Option<(i128, i128)> {
    Some(match data_type {
        DataType::Int8 => (i8::MIN.into(), i8::MAX.into()),
        DataType::Int16 => (i16::MIN.into(), i16::MAX.into()),
        DataType::Int32 => (i32::MIN.into(), i32::MAX.into()),
        DataType::Int64 => (i64::MIN.into(), i64::MAX.into()),
        DataType::UInt8 => (0, u8::MAX.into()),
        DataType::UInt16 => (0, u16::MAX.into()),
        DataType::UInt32 => (0, u32::MAX.into()),
        DataType::UInt64 => (0, u64::MAX.into()),
        _ => return None,
    })
}

/// Narrowest arrow integer type holding `min..=max`
fn arrow_integer_type(min: i128, max: i128) -> DataType {
    let candidates: &[DataType] = if min >= 0 {
        &[
            DataType::UInt8,
            DataType::UInt16,
            DataType::UInt32,
            DataType::UInt64,
        ]
    } else {
        &[
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
        ]
    };
    candidates
        .iter()
        .find(|dt| int_limits(dt).is_some_and(|(lo, hi)| lo <= min && max <= hi))
        .cloned()
        .unwrap_or(DataType::Decimal128(38, 0))
}

impl RecordsSchemaField {
    /// Records field for an arrow field
    pub fn from_arrow_field(field: &Field) -> Result<Self> {
        let data_type = field.data_type();
        let (field_type, constraints) = match data_type {
            dt if int_limits(dt).is_some() => {
                let (min, max) = int_limits(dt).unwrap_or_default();
                (FieldType::Integer, FieldConstraints::integer(min, max))
            }
            DataType::Float16 => (FieldType::Decimal, FieldConstraints::floating_point(16, 11)),
            DataType::Float32 => (FieldType::Decimal, FieldConstraints::floating_point(32, 24)),
            DataType::Float64 => (FieldType::Decimal, FieldConstraints::floating_point(64, 53)),
            DataType::Decimal128(p, s) | DataType::Decimal256(p, s) => (
                FieldType::Decimal,
                FieldConstraints::fixed_point(u32::from(*p), i32::from(*s)),
            ),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
                (FieldType::String, FieldConstraints::default())
            }
            DataType::Boolean => (FieldType::Boolean, FieldConstraints::default()),
            DataType::Date32 | DataType::Date64 => (FieldType::Date, FieldConstraints::default()),
            DataType::Time32(_) | DataType::Time64(_) => {
                (FieldType::Time, FieldConstraints::default())
            }
            DataType::Timestamp(_, None) => (FieldType::Datetime, FieldConstraints::default()),
            DataType::Timestamp(_, Some(_)) => {
                (FieldType::Datetimetz, FieldConstraints::default())
            }
            other => {
                return Err(RecordsError::UnsupportedColumnType {
                    column: field.name().clone(),
                    data_type: other.to_string(),
                });
            }
        };
        Ok(RecordsSchemaField::new(
            field.name().clone(),
            field_type,
            constraints.required(!field.is_nullable()),
        ))
    }

    /// Arrow type used to decode this field from text
    #[must_use]
    pub fn arrow_data_type(&self) -> DataType {
        let c = &self.constraints;
        match self.field_type {
            FieldType::Integer => match (c.min, c.max) {
                (Some(min), Some(max)) => arrow_integer_type(min, max),
                _ => DataType::Int64,
            },
            FieldType::Decimal => match (c.fixed_precision, c.fixed_scale, c.fp_total_bits) {
                (Some(p), Some(s), _) if p <= 38 => DataType::Decimal128(
                    u8::try_from(p).unwrap_or(38),
                    i8::try_from(s).unwrap_or(0),
                ),
                (Some(p), Some(s), _) if p <= 76 => DataType::Decimal256(
                    u8::try_from(p).unwrap_or(76),
                    i8::try_from(s).unwrap_or(0),
                ),
                (_, _, Some(bits)) if bits <= 32 => DataType::Float32,
                _ => DataType::Float64,
            },
            FieldType::String | FieldType::Timetz => DataType::Utf8,
            FieldType::Boolean => DataType::Boolean,
            FieldType::Date => DataType::Date32,
            FieldType::Time => DataType::Time64(TimeUnit::Microsecond),
            FieldType::Datetime => DataType::Timestamp(TimeUnit::Microsecond, None),
            FieldType::Datetimetz => {
                DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("+00:00")))
            }
        }
    }

    #[must_use]
    pub fn to_arrow_field(&self) -> Field {
        Field::new(&self.name, self.arrow_data_type(), !self.required())
    }
}

impl RecordsSchema {
    /// Records schema mirroring an arrow schema's native column types
    pub fn from_arrow_schema(schema: &Schema) -> Result<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| RecordsSchemaField::from_arrow_field(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordsSchema::new(fields))
    }

    #[must_use]
    pub fn to_arrow_schema(&self) -> Schema {
        Schema::new(
            self.fields
                .iter()
                .map(RecordsSchemaField::to_arrow_field)
                .collect::<Vec<_>>(),
        )
    }

    /// Fill statistics by scanning up to `max_rows` rows of the batches.
    #[must_use]
    pub fn with_sampled_statistics(mut self, batches: &[RecordBatch], max_rows: usize) -> Self {
        let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        let rows_sampled = total_rows.min(max_rows);
        for (index, field) in self.fields.iter_mut().enumerate() {
            let mut stats = FieldStatistics {
                rows_sampled: rows_sampled as u64,
                total_rows: total_rows as u64,
                ..FieldStatistics::default()
            };
            if field.field_type == FieldType::String {
                let (bytes, chars) = string_lengths(batches, index, max_rows);
                stats.max_length_bytes = bytes;
                stats.max_length_chars = chars;
            }
            field.statistics = Some(stats);
        }
        self
    }
}

fn string_lengths(batches: &[RecordBatch], index: usize, max_rows: usize) -> (Option<u64>, Option<u64>) {
    let mut remaining = max_rows;
    let mut max_bytes: Option<u64> = None;
    let mut max_chars: Option<u64> = None;
    let mut observe = |s: &str| {
        let bytes = s.len() as u64;
        let chars = s.chars().count() as u64;
        max_bytes = Some(max_bytes.map_or(bytes, |m| m.max(bytes)));
        max_chars = Some(max_chars.map_or(chars, |m| m.max(chars)));
    };
    for batch in batches {
        if remaining == 0 {
            break;
        }
        let Some(column) = batch.columns().get(index) else {
            continue;
        };
        let take = remaining.min(batch.num_rows());
        remaining -= take;
        if let Some(strings) = column.as_string_opt::<i32>() {
            strings.iter().take(take).flatten().for_each(&mut observe);
        } else if let Some(strings) = column.as_string_opt::<i64>() {
            strings.iter().take(take).flatten().for_each(&mut observe);
        }
    }
    (max_bytes, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Int32Array, StringArray};

    #[test]
    fn test_from_arrow_schema() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int16, false),
            Field::new("b", DataType::Float32, true),
            Field::new("c", DataType::Decimal128(10, 3), true),
            Field::new("d", DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())), true),
            Field::new("e", DataType::UInt64, true),
        ]);
        let rs = RecordsSchema::from_arrow_schema(&schema).unwrap();
        assert_eq!(rs.fields[0].field_type, FieldType::Integer);
        assert_eq!(rs.fields[0].constraints.min, Some(-32768));
        assert!(rs.fields[0].required());
        assert_eq!(rs.fields[1].constraints.fp_significand_bits, Some(24));
        assert_eq!(rs.fields[2].constraints.fixed_scale, Some(3));
        assert_eq!(rs.fields[3].field_type, FieldType::Datetimetz);
        assert_eq!(rs.fields[4].constraints.max, Some(i128::from(u64::MAX)));
    }

    #[test]
    fn test_unsupported_type() {
        let schema = Schema::new(vec![Field::new("blob", DataType::Binary, true)]);
        assert!(matches!(
            RecordsSchema::from_arrow_schema(&schema),
            Err(RecordsError::UnsupportedColumnType { .. })
        ));
    }

    #[test]
    fn test_to_arrow_schema_narrowest_integer() {
        let rs = RecordsSchema::new(vec![
            RecordsSchemaField::new("small", FieldType::Integer, FieldConstraints::integer(-5, 100)),
            RecordsSchemaField::new("byte", FieldType::Integer, FieldConstraints::integer(0, 255)),
            RecordsSchemaField::new(
                "huge",
                FieldType::Integer,
                FieldConstraints::integer(0, i128::from(u64::MAX) + 1),
            ),
        ]);
        let schema = rs.to_arrow_schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int8);
        assert_eq!(schema.field(1).data_type(), &DataType::UInt8);
        assert_eq!(schema.field(2).data_type(), &DataType::Decimal128(38, 0));
        assert!(schema.field(0).is_nullable());
    }

    #[test]
    fn test_sampled_statistics() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("n", DataType::Int32, true),
            Field::new("s", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("ab"), None, Some("héllo")])),
            ],
        )
        .unwrap();
        let rs = RecordsSchema::from_arrow_schema(&schema)
            .unwrap()
            .with_sampled_statistics(&[batch], 2);
        let stats = rs.fields[1].statistics.clone().unwrap();
        assert_eq!(stats.rows_sampled, 2);
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.max_length_chars, Some(2));
        assert!(rs.fields[0].statistics.clone().unwrap().max_length_bytes.is_none());
    }
}
