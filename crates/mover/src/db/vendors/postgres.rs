// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL: `COPY ... FROM STDIN` loads and `COPY ... TO STDOUT`
//! unloads, with compression and UTF-16 handled in this process.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use diagnostics::*;
use records::compression::{compress_bytes, decompress_bytes};
use records::encoding::decode_text;
use records::{
    Compression, DateFormat, Encoding, HintName, ProcessingInstructions, Quoting, RecordTerminator,
    RecordsFormat, TimeFormat, UnhandledHints, Variant, cant_handle_hint,
};
use serde_json::json;
use urlfs::{DirectoryUrl, Fileobj};

use super::{delimited, octal_char, read_fileobj, sql_string};
use crate::db::prep::TransactionGuard;
use crate::db::types::{DecimalType, FloatType, IntegerType, TypeTable, VarcharType};
use crate::db::{
    Connection, DbDriver, Dialect, FileobjLoader, LoadPlan, Loader, UnloadPlan, Unloader,
    load_failure, unload_failure,
};
use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};

pub(crate) const POSTGRES_TYPES: TypeTable = TypeTable {
    integers: &[
        IntegerType {
            name: "SMALLINT",
            min: i16::MIN as i128,
            max: i16::MAX as i128,
        },
        IntegerType {
            name: "INTEGER",
            min: i32::MIN as i128,
            max: i32::MAX as i128,
        },
        IntegerType {
            name: "BIGINT",
            min: i64::MIN as i128,
            max: i64::MAX as i128,
        },
    ],
    integer_aliases: &[
        ("INT2", "SMALLINT"),
        ("INT", "INTEGER"),
        ("INT4", "INTEGER"),
        ("INT8", "BIGINT"),
    ],
    decimal: Some(DecimalType {
        name: "NUMERIC",
        max_precision: 1000,
    }),
    decimal_aliases: &["DECIMAL"],
    floats: &[
        FloatType {
            name: "REAL",
            total_bits: 32,
            significand_bits: 24,
        },
        FloatType {
            name: "DOUBLE PRECISION",
            total_bits: 64,
            significand_bits: 53,
        },
    ],
    float_aliases: &[
        ("FLOAT4", "REAL"),
        ("FLOAT8", "DOUBLE PRECISION"),
        ("FLOAT", "DOUBLE PRECISION"),
    ],
    varchar: Some(VarcharType {
        name: "VARCHAR",
        max_length: 10_485_760,
        in_bytes: false,
    }),
    text: "TEXT",
    boolean: "BOOLEAN",
    date: "DATE",
    time: "TIME",
    timetz: "TIMETZ",
    datetime: "TIMESTAMP",
    datetimetz: "TIMESTAMPTZ",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    Load,
    Unload,
}

/// A translated `COPY` option list plus what this process must do to the bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    pub options: Vec<String>,
    pub date_style: &'static str,
    /// Applied locally, the server never sees compressed bytes
    pub compression: Option<Compression>,
    /// Transcoded to UTF-8 locally before loading
    pub transcode_from: Option<Encoding>,
}

impl CopyOptions {
    fn with_clause(&self) -> String {
        self.options.join(", ")
    }
}

fn date_style(dateformat: DateFormat) -> &'static str {
    match dateformat {
        DateFormat::YyyyMmDd => "ISO, YMD",
        DateFormat::MmDdYyyy | DateFormat::MmDdYy => "ISO, MDY",
        DateFormat::DdMmYyyy => "ISO, DMY",
    }
}

/// Translate a records format into `COPY` options.
pub fn copy_options(
    format: &RecordsFormat,
    pi: &ProcessingInstructions,
    direction: CopyDirection,
) -> Result<CopyOptions> {
    let Some(delimited) = format.as_delimited() else {
        return Err(MoverError::not_supported(format!(
            "Postgres COPY cannot handle {} records",
            format.format_type()
        )));
    };
    let mut unhandled = UnhandledHints::from_hints(delimited.hints());
    let hints = delimited.validated(pi, &mut unhandled)?;
    let mut options = Vec::new();

    match hints.quoting {
        None => {
            options.push("FORMAT text".to_string());
            if let Some(escape) = hints.escape.filter(|e| *e != '\\') {
                cant_handle_hint(pi, HintName::Escape, escape, "text COPY escapes with backslash")?;
            }
            if hints.header_row {
                cant_handle_hint(pi, HintName::HeaderRow, true, "text COPY has no header row")?;
            }
            options.push("NULL ''".to_string());
        }
        Some(quoting) => {
            options.push("FORMAT csv".to_string());
            options.push(format!("QUOTE {}", octal_char(hints.quotechar)));
            match (hints.doublequote, hints.escape) {
                (true, Some(escape)) => {
                    cant_handle_hint(pi, HintName::Escape, escape, "csv COPY escapes quotes by doubling them")?;
                }
                (false, Some(escape)) => options.push(format!("ESCAPE {}", octal_char(escape))),
                (false, None) => {
                    cant_handle_hint(pi, HintName::Doublequote, false, "csv COPY needs doubled quotes or an escape")?;
                }
                (true, None) => {}
            }
            if hints.header_row {
                options.push("HEADER true".to_string());
            }
            match (direction, quoting) {
                (CopyDirection::Unload, Quoting::All) => options.push("FORCE_QUOTE *".to_string()),
                (CopyDirection::Unload, Quoting::Nonnumeric) => {
                    cant_handle_hint(pi, HintName::Quoting, "nonnumeric", "COPY cannot quote by column type")?;
                }
                _ => {}
            }
        }
    }
    unhandled.consume_all([
        HintName::Quoting,
        HintName::Quotechar,
        HintName::Doublequote,
        HintName::Escape,
        HintName::HeaderRow,
    ]);

    options.push(format!("DELIMITER {}", octal_char(hints.field_delimiter)));
    unhandled.consume(HintName::FieldDelimiter);

    let terminator_ok = match direction {
        CopyDirection::Load => matches!(hints.record_terminator, RecordTerminator::Lf | RecordTerminator::CrLf),
        CopyDirection::Unload => hints.record_terminator == RecordTerminator::Lf,
    };
    if !terminator_ok {
        cant_handle_hint(pi, HintName::RecordTerminator, hints.record_terminator, "COPY rows end in newlines")?;
    }
    unhandled.consume(HintName::RecordTerminator);

    let mut transcode_from = None;
    let server_encoding = match hints.encoding {
        Encoding::Utf8 => "UTF8",
        Encoding::Latin1 => "LATIN1",
        Encoding::Cp1252 => "WIN1252",
        utf16 => {
            match direction {
                CopyDirection::Load => transcode_from = Some(utf16),
                CopyDirection::Unload => {
                    cant_handle_hint(pi, HintName::Encoding, utf16, "COPY cannot write UTF-16")?;
                }
            }
            "UTF8"
        }
    };
    options.push(format!("ENCODING {}", sql_string(server_encoding)));
    unhandled.consume(HintName::Encoding);

    let compression = match hints.compression {
        Some(Compression::Lzo) => {
            cant_handle_hint(pi, HintName::Compression, "LZO", "LZO is not available in this process")?;
            None
        }
        other => other,
    };
    unhandled.consume(HintName::Compression);

    let style = match direction {
        CopyDirection::Load => date_style(hints.dateformat),
        CopyDirection::Unload => {
            if hints.dateformat != DateFormat::YyyyMmDd {
                cant_handle_hint(pi, HintName::Dateformat, hints.dateformat, "COPY writes ISO dates")?;
            }
            if hints.timeonlyformat != TimeFormat::Hh24MiSs {
                cant_handle_hint(pi, HintName::Timeonlyformat, hints.timeonlyformat, "COPY writes 24 hour times")?;
            }
            if !hints.datetimeformat.is_iso_like() || hints.datetimeformat.offset {
                cant_handle_hint(pi, HintName::Datetimeformat, hints.datetimeformat, "COPY writes ISO timestamps")?;
            }
            if !hints.datetimeformattz.is_iso_like() || !hints.datetimeformattz.offset {
                cant_handle_hint(pi, HintName::Datetimeformattz, hints.datetimeformattz, "COPY writes ISO timestamps with offsets")?;
            }
            "ISO, YMD"
        }
    };
    unhandled.consume_all([
        HintName::Dateformat,
        HintName::Timeonlyformat,
        HintName::Datetimeformat,
        HintName::Datetimeformattz,
    ]);

    if !pi.fail_if_row_invalid || pi.max_failure_rows.is_some() {
        debug!("Postgres COPY aborts on the first invalid row");
    }
    unhandled.complain_if_unhandled(pi)?;
    Ok(CopyOptions {
        options,
        date_style: style,
        compression,
        transcode_from,
    })
}

pub struct PostgresDriver {
    conn: Arc<dyn Connection>,
}

impl PostgresDriver {
    #[must_use]
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    fn copy_from_sql(&self, schema: &str, table: &str, copy: &CopyOptions) -> String {
        format!(
            "COPY {} FROM STDIN WITH ({})",
            self.qualified_table(schema, table),
            copy.with_clause()
        )
    }

    /// Decompress and transcode one file, then `COPY` it in
    async fn copy_in_bytes(&self, sql: &str, copy: &CopyOptions, data: &[u8]) -> Result<u64> {
        let plain = decompress_bytes(copy.compression, data)?;
        let plain = match copy.transcode_from {
            Some(encoding) => decode_text(encoding, &plain)?.into_bytes(),
            None => plain,
        };
        let mut reader = Cursor::new(plain);
        self.conn.copy_in(sql, &mut reader).await
    }

    /// Every part loads in one transaction; only the first part skips a
    /// header row.
    async fn copy_parts(&self, schema: &str, table: &str, plan: &LoadPlan, parts: Vec<Vec<u8>>) -> Result<Option<u64>> {
        let copy = copy_options(&plan.records_format, &plan.processing_instructions, CopyDirection::Load)?;
        let sql = self.copy_from_sql(schema, table, &copy);
        let later = plan.for_part(1);
        let later_copy = copy_options(&later.records_format, &later.processing_instructions, CopyDirection::Load)?;
        let later_sql = self.copy_from_sql(schema, table, &later_copy);
        let conn = self.conn.as_ref();
        let guard = TransactionGuard::begin(conn).await?;
        let result = async {
            _ = conn
                .execute(&format!("SET LOCAL DateStyle = {}", sql_string(copy.date_style)))
                .await?;
            let mut total = 0;
            for (index, part) in parts.iter().enumerate() {
                total += if index == 0 {
                    self.copy_in_bytes(&sql, &copy, part).await?
                } else {
                    self.copy_in_bytes(&later_sql, &later_copy, part).await?
                };
            }
            Ok::<_, MoverError>(total)
        }
        .await;
        match result {
            Ok(total) => {
                guard.commit().await?;
                let target = self.qualified_table(schema, table);
                info!("Loaded {total} rows into {target}", total: total, target: target);
                Ok(Some(total))
            }
            Err(err) => {
                if let Err(rollback_err) = guard.rollback().await {
                    let message = rollback_err.to_string();
                    warn!("Rollback after failed COPY failed: {message}", message: message);
                }
                Err(load_failure(err))
            }
        }
    }

    fn load_formats() -> Vec<RecordsFormat> {
        vec![RecordsFormat::bluelabs(), delimited(Variant::Csv, [])]
    }
}

#[async_trait]
impl DbDriver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    fn type_table(&self) -> &TypeTable {
        &POSTGRES_TYPES
    }

    fn loader(&self) -> Option<&dyn Loader> {
        Some(self)
    }

    fn fileobj_loader(&self) -> Option<&dyn FileobjLoader> {
        Some(self)
    }

    fn unloader(&self) -> Option<&dyn Unloader> {
        Some(self)
    }

    /// Postgres folds unquoted identifiers to lower case and caps them at 63 bytes
    fn make_column_name_valid(&self, name: &str) -> String {
        let mut valid = name.to_string();
        while valid.len() > 63 {
            _ = valid.pop();
        }
        valid
    }
}

#[async_trait]
impl Loader for PostgresDriver {
    async fn load(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>> {
        let mut parts = Vec::new();
        for (_, file) in directory.entry_files().await? {
            parts.push(file.read_bytes().await?.to_vec());
        }
        self.copy_parts(schema, table, plan, parts).await
    }

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool {
        copy_options(format, &ProcessingInstructions::default(), CopyDirection::Load).is_ok()
    }

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat> {
        Self::load_formats()
    }

    fn best_scheme_to_load_from(&self) -> &str {
        "file"
    }

    fn temporary_loadable_directory_parent(&self) -> Option<DirectoryUrl> {
        None
    }
}

#[async_trait]
impl FileobjLoader for PostgresDriver {
    async fn load_from_fileobjs(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        fileobjs: &mut [(String, Fileobj)],
    ) -> Result<Option<u64>> {
        let mut parts = Vec::with_capacity(fileobjs.len());
        for (_, fileobj) in fileobjs.iter_mut() {
            parts.push(read_fileobj(fileobj).await?);
        }
        self.copy_parts(schema, table, plan, parts).await
    }

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool {
        Loader::can_load_this_format(self, format)
    }

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat> {
        Self::load_formats()
    }
}

#[async_trait]
impl Unloader for PostgresDriver {
    async fn unload(
        &self,
        schema: &str,
        table: &str,
        plan: &UnloadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>> {
        let copy = copy_options(&plan.records_format, &plan.processing_instructions, CopyDirection::Unload)?;
        let sql = format!(
            "COPY {} TO STDOUT WITH ({})",
            self.qualified_table(schema, table),
            copy.with_clause()
        );
        let conn = self.conn.as_ref();
        let guard = TransactionGuard::begin(conn).await?;
        let mut buffer = Vec::new();
        let result = async {
            _ = conn
                .execute(&format!("SET LOCAL DateStyle = {}", sql_string(copy.date_style)))
                .await?;
            conn.copy_out(&sql, &mut buffer).await
        }
        .await;
        match result {
            Ok(_) => guard.commit().await?,
            Err(err) => {
                _ = guard.rollback().await;
                return Err(unload_failure(err));
            }
        }
        let data = compress_bytes(copy.compression, &buffer)?;
        let file = directory
            .loc()
            .file_in_this_directory(&plan.records_format.generate_filename("data"))?;
        let length = data.len() as u64;
        file.write_bytes(Bytes::from(data)).await?;
        directory
            .save_preliminary_manifest(Some(&[(file, length)][..]))
            .await?;
        Ok(None)
    }

    fn can_unload_format(&self, format: &RecordsFormat) -> bool {
        copy_options(format, &ProcessingInstructions::default(), CopyDirection::Unload).is_ok()
    }

    fn can_unload_to_scheme(&self, _scheme: &str) -> bool {
        true
    }

    fn known_supported_records_formats_for_unload(&self) -> Vec<RecordsFormat> {
        vec![
            RecordsFormat::bluelabs(),
            delimited(
                Variant::Csv,
                [
                    ("dateformat", json!("YYYY-MM-DD")),
                    ("datetimeformat", json!("YYYY-MM-DD HH24:MI:SS")),
                    ("datetimeformattz", json!("YYYY-MM-DD HH24:MI:SSOF")),
                ],
            ),
        ]
    }

    fn temporary_unloadable_directory_parent(&self) -> Option<DirectoryUrl> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConnection;
    use records::PartialHints;

    fn csv_format(overrides: &[(&str, serde_json::Value)]) -> RecordsFormat {
        let hints: PartialHints = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        RecordsFormat::delimited(Variant::Csv, hints)
    }

    #[test]
    fn test_bluelabs_uses_text_format() {
        let copy = copy_options(&RecordsFormat::bluelabs(), &ProcessingInstructions::default(), CopyDirection::Load)
            .unwrap();
        assert_eq!(
            copy.options,
            vec!["FORMAT text", "NULL ''", "DELIMITER ','", "ENCODING 'UTF8'"]
        );
        assert_eq!(copy.compression, Some(Compression::Gzip));
        assert_eq!(copy.date_style, "ISO, YMD");
    }

    #[test]
    fn test_csv_load_options() {
        let copy = copy_options(&csv_format(&[]), &ProcessingInstructions::default(), CopyDirection::Load).unwrap();
        assert_eq!(
            copy.options,
            vec![
                "FORMAT csv",
                "QUOTE '\"'",
                "HEADER true",
                "DELIMITER ','",
                "ENCODING 'UTF8'"
            ]
        );
        assert_eq!(copy.date_style, "ISO, MDY");
    }

    #[test]
    fn test_unrepresentable_hints() {
        let pi = ProcessingInstructions::default();
        let lzo = csv_format(&[("compression", json!("LZO"))]);
        assert!(matches!(
            copy_options(&lzo, &pi, CopyDirection::Load),
            Err(MoverError::CantHandleHint { hint, .. }) if hint == "compression"
        ));
        let nonnumeric = csv_format(&[("quoting", json!("nonnumeric")), ("dateformat", json!("YYYY-MM-DD"))]);
        assert!(copy_options(&nonnumeric, &pi, CopyDirection::Load).is_ok());
        assert!(copy_options(&nonnumeric, &pi, CopyDirection::Unload).is_err());
        let utf16 = csv_format(&[("encoding", json!("UTF16LE"))]);
        let copy = copy_options(&utf16, &pi, CopyDirection::Load).unwrap();
        assert_eq!(copy.transcode_from, Some(Encoding::Utf16Le));
        assert!(copy_options(&RecordsFormat::Parquet, &pi, CopyDirection::Load).is_err());
    }

    #[tokio::test]
    async fn test_load_decompresses_and_counts() {
        let conn = Arc::new(RecordingConnection::default());
        let driver = PostgresDriver::new(conn.clone());
        let format = csv_format(&[]);
        let data = compress_bytes(Some(Compression::Gzip), b"a,b\n1,2\n3,4\n").unwrap();
        let fileobj: Fileobj = Box::new(Cursor::new(data));
        let mut fileobjs = vec![("in.csv.gz".to_string(), fileobj)];
        let plan = LoadPlan {
            records_format: format,
            processing_instructions: ProcessingInstructions::default(),
        };
        let count = driver
            .load_from_fileobjs("s", "t", &plan, &mut fileobjs)
            .await
            .unwrap();
        assert_eq!(count, Some(2));
        let copied = conn.copied_in();
        assert_eq!(copied[0].1, b"a,b\n1,2\n3,4\n");
        let statements = conn.statements();
        assert_eq!(statements[0], "BEGIN");
        assert_eq!(statements[1], "SET LOCAL DateStyle = 'ISO, MDY'");
        assert!(statements[2].starts_with(r#"COPY "s"."t" FROM STDIN WITH (FORMAT csv"#));
        assert_eq!(statements[3], "COMMIT");
    }

    #[tokio::test]
    async fn test_header_skipped_in_first_part_only() {
        let conn = Arc::new(RecordingConnection::default());
        let driver = PostgresDriver::new(conn.clone());
        let plan = LoadPlan {
            records_format: csv_format(&[("compression", json!(null))]),
            processing_instructions: ProcessingInstructions::default(),
        };
        let first: Fileobj = Box::new(Cursor::new(b"a,b\n1,2\n".to_vec()));
        let second: Fileobj = Box::new(Cursor::new(b"3,4\n5,6\n".to_vec()));
        let mut fileobjs = vec![("p0.csv".to_string(), first), ("p1.csv".to_string(), second)];
        let count = driver
            .load_from_fileobjs("s", "t", &plan, &mut fileobjs)
            .await
            .unwrap();
        assert_eq!(count, Some(3));
        let copied = conn.copied_in();
        assert_eq!(copied.len(), 2);
        assert!(copied[0].0.contains("HEADER true"));
        assert!(!copied[1].0.contains("HEADER"));
        assert_eq!(copied[1].1, b"3,4\n5,6\n");
    }

    #[tokio::test]
    async fn test_failed_copy_rolls_back_as_load_error() {
        let conn = Arc::new(RecordingConnection::default());
        conn.fail_statements_containing("COPY", 1);
        let driver = PostgresDriver::new(conn.clone());
        let plan = LoadPlan {
            records_format: csv_format(&[("compression", json!(null))]),
            processing_instructions: ProcessingInstructions::default(),
        };
        let fileobj: Fileobj = Box::new(Cursor::new(b"a\n1\n".to_vec()));
        let mut fileobjs = vec![("x".to_string(), fileobj)];
        let err = driver
            .load_from_fileobjs("s", "t", &plan, &mut fileobjs)
            .await
            .unwrap_err();
        assert!(err.is_load_error());
        assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
    }
}
