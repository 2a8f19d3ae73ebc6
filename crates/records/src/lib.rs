// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Records model: formats, hints, schemas and the codecs they name.
//!
//! A records format says how tabular bytes are laid out (delimited text
//! with hints, Parquet or Avro). A records schema says what the columns
//! are. Both serialize to the JSON documents kept in a records directory.

pub mod compression;
pub mod encoding;
pub mod error;
pub mod format;
pub mod hints;
pub mod negotiate;
pub mod processing;
pub mod schema;
pub mod sniff;

pub use error::{RecordsError, Result};
pub use format::{DelimitedFormat, RecordsFormat};
pub use hints::{
    Compression, DateFormat, DateTimeFormat, Encoding, HintName, PartialHints, Quoting,
    RecordTerminator, TimeFormat, UnhandledHints, ValidatedHints, Variant, cant_handle_hint,
    validate_hints,
};
pub use negotiate::negotiate;
pub use processing::ProcessingInstructions;
pub use schema::{
    FieldConstraints, FieldRepresentation, FieldStatistics, FieldType, RecordsSchema,
    RecordsSchemaField, SchemaRepresentation,
};
pub use sniff::sniff_hints;
