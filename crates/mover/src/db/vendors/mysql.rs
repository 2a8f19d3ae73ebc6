// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! MySQL: `LOAD DATA LOCAL INFILE` from a local temporary file.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use diagnostics::*;
use records::compression::decompress_bytes;
use records::{
    DateFormat, Encoding, HintName, ProcessingInstructions, RecordsFormat, TimeFormat,
    UnhandledHints, Variant, cant_handle_hint,
};
use serde_json::json;
use urlfs::Fileobj;

use super::{delimited, read_fileobj, sql_string};
use crate::db::ddl::SqlBuilder;
use crate::db::types::{DecimalType, FloatType, IntegerType, TypeTable, VarcharType};
use crate::db::{Connection, DbDriver, Dialect, FileobjLoader, LoadPlan, load_failure, quote_with};
use crate::error::{MoverError, Result};

pub(crate) const MYSQL_TYPES: TypeTable = TypeTable {
    integers: &[
        IntegerType {
            name: "TINYINT",
            min: i8::MIN as i128,
            max: i8::MAX as i128,
        },
        IntegerType {
            name: "SMALLINT",
            min: i16::MIN as i128,
            max: i16::MAX as i128,
        },
        IntegerType {
            name: "MEDIUMINT",
            min: -8_388_608,
            max: 8_388_607,
        },
        IntegerType {
            name: "INT",
            min: i32::MIN as i128,
            max: i32::MAX as i128,
        },
        IntegerType {
            name: "BIGINT",
            min: i64::MIN as i128,
            max: i64::MAX as i128,
        },
    ],
    integer_aliases: &[("INTEGER", "INT")],
    decimal: Some(DecimalType {
        name: "DECIMAL",
        max_precision: 65,
    }),
    decimal_aliases: &["NUMERIC", "DEC", "FIXED"],
    floats: &[
        FloatType {
            name: "FLOAT",
            total_bits: 32,
            significand_bits: 24,
        },
        FloatType {
            name: "DOUBLE",
            total_bits: 64,
            significand_bits: 53,
        },
    ],
    float_aliases: &[("REAL", "DOUBLE"), ("DOUBLE PRECISION", "DOUBLE")],
    varchar: Some(VarcharType {
        name: "VARCHAR",
        max_length: 16_383,
        in_bytes: false,
    }),
    text: "LONGTEXT",
    boolean: "BOOLEAN",
    date: "DATE",
    time: "TIME",
    timetz: "TIME",
    datetime: "DATETIME(6)",
    datetimetz: "TIMESTAMP(6)",
};

/// Everything after `INTO TABLE t`
pub fn load_data_options(format: &RecordsFormat, pi: &ProcessingInstructions) -> Result<Vec<String>> {
    let Some(delimited) = format.as_delimited() else {
        return Err(MoverError::not_supported(format!(
            "MySQL LOAD DATA cannot handle {} records",
            format.format_type()
        )));
    };
    let mut unhandled = UnhandledHints::from_hints(delimited.hints());
    let hints = delimited.validated(pi, &mut unhandled)?;
    let mut options = Vec::new();

    let charset = match hints.encoding {
        Encoding::Utf8 => "utf8mb4",
        Encoding::Latin1 | Encoding::Cp1252 => "latin1",
        Encoding::Utf16 | Encoding::Utf16Be => "utf16",
        Encoding::Utf16Le => "utf16le",
    };
    options.push(format!("CHARACTER SET {charset}"));
    unhandled.consume(HintName::Encoding);

    options.push(format!("FIELDS TERMINATED BY {}", sql_string(&hints.field_delimiter.to_string())));
    if hints.quoting.is_some() {
        if hints.doublequote && hints.escape.is_some() {
            cant_handle_hint(pi, HintName::Doublequote, true, "MySQL doubles quotes only without an escape")?;
        }
        options.push(format!(
            "OPTIONALLY ENCLOSED BY {}",
            sql_string(&hints.quotechar.to_string())
        ));
    }
    let escape = hints.escape.map(|c| c.to_string()).unwrap_or_default();
    options.push(format!("ESCAPED BY {}", sql_string(&escape.replace('\\', "\\\\"))));
    options.push(format!(
        "LINES TERMINATED BY {}",
        sql_string(&hints.record_terminator.as_str().escape_default().to_string())
    ));
    unhandled.consume_all([
        HintName::FieldDelimiter,
        HintName::Quoting,
        HintName::Quotechar,
        HintName::Doublequote,
        HintName::Escape,
        HintName::RecordTerminator,
        HintName::Compression,
    ]);

    if hints.header_row {
        options.push("IGNORE 1 LINES".to_string());
    }
    unhandled.consume(HintName::HeaderRow);

    if hints.dateformat != DateFormat::YyyyMmDd {
        cant_handle_hint(pi, HintName::Dateformat, hints.dateformat, "MySQL reads ISO dates")?;
    }
    if hints.timeonlyformat != TimeFormat::Hh24MiSs {
        cant_handle_hint(pi, HintName::Timeonlyformat, hints.timeonlyformat, "MySQL reads 24 hour times")?;
    }
    if !hints.datetimeformat.is_iso_like() || hints.datetimeformat.offset {
        cant_handle_hint(pi, HintName::Datetimeformat, hints.datetimeformat, "MySQL reads ISO datetimes")?;
    }
    if !hints.datetimeformattz.is_iso_like() || hints.datetimeformattz.offset {
        cant_handle_hint(pi, HintName::Datetimeformattz, hints.datetimeformattz, "MySQL has no time zone offsets")?;
    }
    unhandled.consume_all([
        HintName::Dateformat,
        HintName::Timeonlyformat,
        HintName::Datetimeformat,
        HintName::Datetimeformattz,
    ]);

    if !pi.fail_if_row_invalid {
        debug!("MySQL LOAD DATA LOCAL skips invalid rows with warnings");
    }
    unhandled.complain_if_unhandled(pi)?;
    Ok(options)
}

pub struct MySqlDriver {
    conn: Arc<dyn Connection>,
}

impl MySqlDriver {
    #[must_use]
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    #[must_use]
    pub fn load_data_sql(&self, path: &str, schema: &str, table: &str, options: &[String]) -> String {
        format!(
            "LOAD DATA LOCAL INFILE {} INTO TABLE {} {}",
            sql_string(path),
            self.qualified_table(schema, table),
            options.join(" ")
        )
    }
}

#[async_trait]
impl DbDriver for MySqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    fn type_table(&self) -> &TypeTable {
        &MYSQL_TYPES
    }

    fn sql_builder(&self) -> SqlBuilder {
        SqlBuilder::MySql
    }

    fn fileobj_loader(&self) -> Option<&dyn FileobjLoader> {
        Some(self)
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '`')
    }

    fn make_column_name_valid(&self, name: &str) -> String {
        name.chars().take(64).collect()
    }

    fn grant_sql(
        &self,
        permission: &str,
        schema: &str,
        table: &str,
        grantee: &str,
        group: bool,
    ) -> Option<String> {
        if group {
            let grantee = grantee.to_string();
            warn!("MySQL has no groups; skipping grant to {grantee}", grantee: grantee);
            return None;
        }
        Some(format!(
            "GRANT {permission} ON {} TO {}",
            self.qualified_table(schema, table),
            sql_string(grantee)
        ))
    }
}

#[async_trait]
impl FileobjLoader for MySqlDriver {
    /// Each stream is decompressed to a temporary file the client library
    /// sends with `LOCAL INFILE`. Only the first stream skips a header row.
    async fn load_from_fileobjs(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        fileobjs: &mut [(String, Fileobj)],
    ) -> Result<Option<u64>> {
        let first_options = load_data_options(&plan.records_format, &plan.processing_instructions)?;
        let later = plan.for_part(1);
        let later_options = load_data_options(&later.records_format, &later.processing_instructions)?;
        let compression = plan
            .records_format
            .as_delimited()
            .and_then(records::DelimitedFormat::compression);
        let mut total = Some(0);
        for (index, (_, fileobj)) in fileobjs.iter_mut().enumerate() {
            let options = if index == 0 { &first_options } else { &later_options };
            let data = decompress_bytes(compression, &read_fileobj(fileobj).await?)?;
            let mut infile = tempfile::NamedTempFile::new()?;
            infile.write_all(&data)?;
            infile.flush()?;
            let path = infile.path().to_string_lossy().to_string();
            let sql = self.load_data_sql(&path, schema, table, options);
            let rows = self.conn.execute(&sql).await.map_err(load_failure)?;
            total = total.zip(rows).map(|(a, b)| a + b);
        }
        Ok(total)
    }

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool {
        load_data_options(format, &ProcessingInstructions::default()).is_ok()
    }

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat> {
        vec![delimited(
            Variant::Bluelabs,
            [
                ("datetimeformattz", json!("YYYY-MM-DD HH24:MI:SS")),
                ("compression", json!(null)),
            ],
        )]
    }
}
