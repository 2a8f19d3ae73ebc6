// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Vertica: `COPY` from this process or from S3, and `S3EXPORT` unloads.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use diagnostics::*;
use records::{
    Compression, DateFormat, Encoding, HintName, ProcessingInstructions, Quoting, RecordsFormat,
    TimeFormat, UnhandledHints, Variant, cant_handle_hint,
};
use serde_json::json;
use urlfs::{AwsCreds, DirectoryUrl, Fileobj};

use super::{delimited, read_fileobj, sql_string};
use crate::db::types::{DecimalType, FloatType, IntegerType, TypeTable, VarcharType};
use crate::db::{
    Connection, DbDriver, Dialect, FileobjLoader, LoadPlan, Loader, UnloadPlan, Unloader,
    load_failure, unload_failure,
};
use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};

pub(crate) const VERTICA_TYPES: TypeTable = TypeTable {
    integers: &[IntegerType {
        name: "INTEGER",
        min: i64::MIN as i128 + 1,
        max: i64::MAX as i128,
    }],
    integer_aliases: &[
        ("INT", "INTEGER"),
        ("BIGINT", "INTEGER"),
        ("SMALLINT", "INTEGER"),
        ("TINYINT", "INTEGER"),
        ("INT8", "INTEGER"),
    ],
    decimal: Some(DecimalType {
        name: "NUMERIC",
        max_precision: 1024,
    }),
    decimal_aliases: &["DECIMAL", "NUMBER", "MONEY"],
    floats: &[FloatType {
        name: "FLOAT",
        total_bits: 64,
        significand_bits: 53,
    }],
    float_aliases: &[
        ("FLOAT8", "FLOAT"),
        ("REAL", "FLOAT"),
        ("DOUBLE PRECISION", "FLOAT"),
    ],
    varchar: Some(VarcharType {
        name: "VARCHAR",
        max_length: 65_000,
        in_bytes: true,
    }),
    text: "VARCHAR(65000)",
    boolean: "BOOLEAN",
    date: "DATE",
    time: "TIME",
    timetz: "TIMETZ",
    datetime: "TIMESTAMP",
    datetimetz: "TIMESTAMPTZ",
};

/// String literal, as an `E''` octal escape when anything is unprintable
#[must_use]
pub fn vertica_literal(s: &str) -> String {
    if s.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return sql_string(s);
    }
    let escaped: String = s
        .chars()
        .map(|c| match c {
            '\'' => "''".to_string(),
            '\\' => "\\\\".to_string(),
            c if c.is_ascii_graphic() || c == ' ' => c.to_string(),
            c => format!("\\{:03o}", u32::from(c)),
        })
        .collect();
    format!("E'{escaped}'")
}

/// Options following `COPY t FROM <source>`.
pub fn copy_options(format: &RecordsFormat, pi: &ProcessingInstructions) -> Result<Vec<String>> {
    let Some(delimited) = format.as_delimited() else {
        return Err(MoverError::not_supported(format!(
            "Vertica COPY cannot handle {} records",
            format.format_type()
        )));
    };
    let mut unhandled = UnhandledHints::from_hints(delimited.hints());
    let hints = delimited.validated(pi, &mut unhandled)?;
    let mut options = Vec::new();

    match hints.compression {
        Some(Compression::Gzip) => options.push("GZIP".to_string()),
        Some(Compression::Bzip) => options.push("BZIP".to_string()),
        Some(Compression::Lzo) => options.push("LZO".to_string()),
        None => {}
    }
    unhandled.consume(HintName::Compression);

    options.push(format!("DELIMITER {}", vertica_literal(&hints.field_delimiter.to_string())));
    options.push(format!("RECORD TERMINATOR {}", vertica_literal(hints.record_terminator.as_str())));
    unhandled.consume_all([HintName::FieldDelimiter, HintName::RecordTerminator]);

    if let Some(quoting) = hints.quoting {
        if quoting == Quoting::Nonnumeric {
            debug!("Vertica reads nonnumeric quoting as optional enclosure");
        }
        options.push(format!("ENCLOSED BY {}", vertica_literal(&hints.quotechar.to_string())));
    }
    match hints.escape {
        Some(escape) => options.push(format!("ESCAPE AS {}", vertica_literal(&escape.to_string()))),
        None => options.push("NO ESCAPE".to_string()),
    }
    unhandled.consume_all([
        HintName::Quoting,
        HintName::Quotechar,
        HintName::Doublequote,
        HintName::Escape,
    ]);

    if hints.encoding != Encoding::Utf8 {
        cant_handle_hint(pi, HintName::Encoding, hints.encoding, "Vertica reads UTF-8")?;
    }
    unhandled.consume(HintName::Encoding);

    if hints.header_row {
        options.push("SKIP 1".to_string());
    }
    unhandled.consume(HintName::HeaderRow);

    if hints.dateformat != DateFormat::YyyyMmDd {
        cant_handle_hint(pi, HintName::Dateformat, hints.dateformat, "Vertica reads ISO dates")?;
    }
    if !hints.timeonlyformat.is_24h_seconds() {
        cant_handle_hint(pi, HintName::Timeonlyformat, hints.timeonlyformat, "Vertica reads 24 hour times")?;
    }
    if !hints.datetimeformat.is_iso_like() {
        cant_handle_hint(pi, HintName::Datetimeformat, hints.datetimeformat, "Vertica reads ISO timestamps")?;
    }
    if !hints.datetimeformattz.is_iso_like() {
        cant_handle_hint(pi, HintName::Datetimeformattz, hints.datetimeformattz, "Vertica reads ISO timestamps")?;
    }
    unhandled.consume_all([
        HintName::Dateformat,
        HintName::Timeonlyformat,
        HintName::Datetimeformat,
        HintName::Datetimeformattz,
    ]);

    if pi.fail_if_row_invalid {
        options.push("ABORT ON ERROR".to_string());
    } else if let Some(max) = pi.max_failure_rows {
        options.push(format!("REJECTMAX {max}"));
    }
    unhandled.complain_if_unhandled(pi)?;
    Ok(options)
}

/// `S3EXPORT` parameters; only plain delimited output is possible.
pub fn export_parameters(format: &RecordsFormat, pi: &ProcessingInstructions) -> Result<Vec<String>> {
    let Some(delimited) = format.as_delimited() else {
        return Err(MoverError::not_supported(format!(
            "Vertica S3EXPORT cannot write {} records",
            format.format_type()
        )));
    };
    let mut unhandled = UnhandledHints::from_hints(delimited.hints());
    let hints = delimited.validated(pi, &mut unhandled)?;
    if let Some(compression) = hints.compression {
        cant_handle_hint(pi, HintName::Compression, compression, "S3EXPORT writes uncompressed files")?;
    }
    if let Some(quoting) = hints.quoting {
        cant_handle_hint(pi, HintName::Quoting, quoting, "S3EXPORT does not quote")?;
    }
    if let Some(escape) = hints.escape {
        cant_handle_hint(pi, HintName::Escape, escape, "S3EXPORT does not escape")?;
    }
    if hints.header_row {
        cant_handle_hint(pi, HintName::HeaderRow, true, "S3EXPORT writes no header")?;
    }
    if hints.encoding != Encoding::Utf8 {
        cant_handle_hint(pi, HintName::Encoding, hints.encoding, "S3EXPORT writes UTF-8")?;
    }
    if hints.dateformat != DateFormat::YyyyMmDd || hints.timeonlyformat != TimeFormat::Hh24MiSs {
        cant_handle_hint(pi, HintName::Dateformat, hints.dateformat, "S3EXPORT writes ISO dates")?;
    }
    if !hints.datetimeformat.is_iso_like() || !hints.datetimeformattz.is_iso_like() {
        cant_handle_hint(pi, HintName::Datetimeformat, hints.datetimeformat, "S3EXPORT writes ISO timestamps")?;
    }
    unhandled.consume_all(HintName::ALL);
    unhandled.complain_if_unhandled(pi)?;
    Ok(vec![
        format!("delimiter={}", vertica_literal(&hints.field_delimiter.to_string())),
        format!("record_terminator={}", vertica_literal(hints.record_terminator.as_str())),
    ])
}

/// Long-lived credentials or the given error
fn long_lived_creds(dir: &DirectoryUrl, err: fn(String) -> MoverError) -> Result<&AwsCreds> {
    match dir.aws_creds() {
        Some(creds) if creds.is_long_lived() => Ok(creds),
        _ => Err(err(dir.url().to_string())),
    }
}

fn session_statements(dir: &DirectoryUrl, creds: &AwsCreds) -> Vec<String> {
    let auth = format!("{}:{}", creds.access_key_id, creds.secret_access_key);
    let mut statements = vec![format!("ALTER SESSION SET AWSAuth={}", sql_string(&auth))];
    if let Some(region) = dir.region() {
        statements.push(format!("ALTER SESSION SET AWSRegion={}", sql_string(region)));
    }
    statements
}

pub struct VerticaDriver {
    conn: Arc<dyn Connection>,
    scratch: Option<DirectoryUrl>,
}

impl VerticaDriver {
    #[must_use]
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn, scratch: None }
    }

    #[must_use]
    pub fn with_scratch(mut self, scratch: DirectoryUrl) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Session setup plus `COPY` over the given S3 URLs
    pub fn s3_copy_statements(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        dir: &DirectoryUrl,
        urls: &[String],
    ) -> Result<Vec<String>> {
        let creds = long_lived_creds(dir, MoverError::CredsDoNotSupportS3Import)?;
        let mut statements = session_statements(dir, creds);
        // SKIP applies to every listed file, so the header part goes alone
        let groups: Vec<(LoadPlan, &[String])> = match urls {
            [first, rest @ ..] if plan.has_header_row() && !rest.is_empty() => vec![
                (plan.clone(), std::slice::from_ref(first)),
                (plan.for_part(1), rest),
            ],
            _ => vec![(plan.clone(), urls)],
        };
        for (plan, urls) in groups {
            let options = copy_options(&plan.records_format, &plan.processing_instructions)?;
            let sources = urls
                .iter()
                .map(String::as_str)
                .map(sql_string)
                .collect::<Vec<_>>()
                .join(", ");
            statements.push(format!(
                "COPY {} FROM {sources} {}",
                self.qualified_table(schema, table),
                options.join(" ")
            ));
        }
        Ok(statements)
    }

    /// Session setup plus the `S3EXPORT` query
    pub fn export_statements(
        &self,
        schema: &str,
        table: &str,
        plan: &UnloadPlan,
        dir: &DirectoryUrl,
    ) -> Result<Vec<String>> {
        let creds = long_lived_creds(dir, MoverError::CredsDoNotSupportS3Export)?;
        let mut parameters = vec![format!("url={}", sql_string(&format!("{}data", dir.url())))];
        parameters.extend(export_parameters(&plan.records_format, &plan.processing_instructions)?);
        let mut statements = session_statements(dir, creds);
        statements.push(format!(
            "SELECT S3EXPORT(* USING PARAMETERS {}) OVER(PARTITION BEST) FROM {}",
            parameters.join(", "),
            self.qualified_table(schema, table)
        ));
        Ok(statements)
    }

    /// Counts from the statements that report one are summed
    async fn run(&self, statements: &[String]) -> Result<Option<u64>> {
        let mut count = None;
        for sql in statements {
            if let Some(rows) = self.conn.execute(sql).await? {
                count = Some(count.unwrap_or(0) + rows);
            }
        }
        Ok(count)
    }

    fn load_formats() -> Vec<RecordsFormat> {
        vec![
            RecordsFormat::delimited(Variant::Vertica, Default::default()),
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
}

#[async_trait]
impl DbDriver for VerticaDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Vertica
    }

    fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    fn type_table(&self) -> &TypeTable {
        &VERTICA_TYPES
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

    fn supports_transactional_ddl(&self) -> bool {
        false
    }
}

#[async_trait]
impl Loader for VerticaDriver {
    async fn load(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>> {
        if directory.loc().scheme() != "s3" {
            return Err(MoverError::not_supported(format!(
                "Vertica loads directories from s3:// only, got {}",
                directory.loc().url()
            )));
        }
        let urls = directory.manifest_entry_urls().await?;
        let statements = self.s3_copy_statements(schema, table, plan, directory.loc(), &urls)?;
        self.run(&statements).await.map_err(load_failure)
    }

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool {
        copy_options(format, &ProcessingInstructions::default()).is_ok()
    }

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat> {
        Self::load_formats()
    }

    fn best_scheme_to_load_from(&self) -> &str {
        "s3"
    }

    fn temporary_loadable_directory_parent(&self) -> Option<DirectoryUrl> {
        self.scratch.clone()
    }
}

#[async_trait]
impl FileobjLoader for VerticaDriver {
    async fn load_from_fileobjs(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        fileobjs: &mut [(String, Fileobj)],
    ) -> Result<Option<u64>> {
        let stdin_sql = |plan: &LoadPlan| -> Result<String> {
            let options = copy_options(&plan.records_format, &plan.processing_instructions)?;
            Ok(format!(
                "COPY {} FROM STDIN {}",
                self.qualified_table(schema, table),
                options.join(" ")
            ))
        };
        let first_sql = stdin_sql(plan)?;
        let later_sql = stdin_sql(&plan.for_part(1))?;
        let mut total = 0;
        for (index, (name, fileobj)) in fileobjs.iter_mut().enumerate() {
            let sql = if index == 0 { &first_sql } else { &later_sql };
            let data = read_fileobj(fileobj).await?;
            let mut reader = Cursor::new(data);
            let rows = self.conn.copy_in(sql, &mut reader).await.map_err(load_failure)?;
            let name = name.as_str();
            debug!("Copied {rows} rows from {name}", rows: rows, name: name);
            total += rows;
        }
        Ok(Some(total))
    }

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool {
        Loader::can_load_this_format(self, format)
    }

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat> {
        Self::load_formats()
    }
}

#[async_trait]
impl Unloader for VerticaDriver {
    async fn unload(
        &self,
        schema: &str,
        table: &str,
        plan: &UnloadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>> {
        let statements = self.export_statements(schema, table, plan, directory.loc())?;
        let count = self.run(&statements).await.map_err(unload_failure)?;
        directory.save_preliminary_manifest(None).await?;
        Ok(count)
    }

    fn can_unload_format(&self, format: &RecordsFormat) -> bool {
        export_parameters(format, &ProcessingInstructions::default()).is_ok()
    }

    fn can_unload_to_scheme(&self, scheme: &str) -> bool {
        scheme == "s3"
    }

    fn known_supported_records_formats_for_unload(&self) -> Vec<RecordsFormat> {
        vec![RecordsFormat::delimited(Variant::Vertica, Default::default())]
    }

    fn temporary_unloadable_directory_parent(&self) -> Option<DirectoryUrl> {
        self.scratch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConnection;
    use urlfs::{AwsConfig, UrlConfig, UrlResolver};

    fn s3_dir(session_token: Option<&str>) -> DirectoryUrl {
        let resolver = UrlResolver::new(UrlConfig {
            aws: Some(AwsConfig {
                region: Some("us-west-2".to_string()),
                access_key_id: Some("AKID".to_string()),
                secret_access_key: Some("SECRET".to_string()),
                session_token: session_token.map(str::to_string),
                ..AwsConfig::default()
            }),
            gcs: None,
        });
        resolver.directory_url("s3://bucket/out/").unwrap()
    }

    #[test]
    fn test_literals() {
        assert_eq!(vertica_literal(","), "','");
        assert_eq!(vertica_literal("\u{1}"), "E'\\001'");
        assert_eq!(vertica_literal("\r\n"), "E'\\015\\012'");
    }

    #[test]
    fn test_vertica_variant_options() {
        let format = RecordsFormat::delimited(Variant::Vertica, Default::default());
        let options = copy_options(&format, &ProcessingInstructions::default()).unwrap();
        assert_eq!(
            options,
            vec![
                "DELIMITER E'\\001'",
                "RECORD TERMINATOR E'\\002'",
                "NO ESCAPE",
                "ABORT ON ERROR",
            ]
        );
    }

    #[test]
    fn test_csv_options_and_rejects() {
        let pi = ProcessingInstructions {
            fail_if_row_invalid: false,
            max_failure_rows: Some(5),
            ..ProcessingInstructions::default()
        };
        let csv = VerticaDriver::load_formats().remove(2);
        let options = copy_options(&csv, &pi).unwrap();
        assert_eq!(options[0], "GZIP");
        assert!(options.contains(&"ENCLOSED BY '\"'".to_string()));
        assert!(options.contains(&"SKIP 1".to_string()));
        assert_eq!(options.last().map(String::as_str), Some("REJECTMAX 5"));

        let plain_csv = delimited(Variant::Csv, []);
        assert!(copy_options(&plain_csv, &ProcessingInstructions::default()).is_err());
        assert!(copy_options(&RecordsFormat::Parquet, &pi).is_err());
    }

    #[tokio::test]
    async fn test_fileobj_load_counts_rows() {
        let conn = Arc::new(RecordingConnection::default());
        let driver = VerticaDriver::new(conn.clone());
        let plan = LoadPlan {
            records_format: RecordsFormat::delimited(
                Variant::Bluelabs,
                [("compression".to_string(), json!(null))].into(),
            ),
            processing_instructions: ProcessingInstructions::default(),
        };
        let fileobj: Fileobj = Box::new(Cursor::new(b"1,a\n2,b\n".to_vec()));
        let mut fileobjs = vec![("part".to_string(), fileobj)];
        let count = driver
            .load_from_fileobjs("s", "t", &plan, &mut fileobjs)
            .await
            .unwrap();
        assert_eq!(count, Some(2));
        assert!(conn.statements()[0].starts_with("COPY \"s\".\"t\" FROM STDIN DELIMITER ','"));
    }

    #[test]
    fn test_s3_copy_requires_long_lived_credentials() {
        let driver = VerticaDriver::new(Arc::new(RecordingConnection::default()));
        let plan = LoadPlan {
            records_format: RecordsFormat::delimited(Variant::Vertica, Default::default()),
            processing_instructions: ProcessingInstructions::default(),
        };
        let urls = vec!["s3://bucket/out/a".to_string()];
        let statements = driver
            .s3_copy_statements("s", "t", &plan, &s3_dir(None), &urls)
            .unwrap();
        assert_eq!(statements[0], "ALTER SESSION SET AWSAuth='AKID:SECRET'");
        assert_eq!(statements[1], "ALTER SESSION SET AWSRegion='us-west-2'");
        assert!(statements[2].starts_with("COPY \"s\".\"t\" FROM 's3://bucket/out/a' DELIMITER"));

        let err = driver
            .s3_copy_statements("s", "t", &plan, &s3_dir(Some("TOKEN")), &urls)
            .unwrap_err();
        assert!(matches!(err, MoverError::CredsDoNotSupportS3Import(_)));
    }

    #[test]
    fn test_s3_copy_skips_header_of_first_file_only() {
        let driver = VerticaDriver::new(Arc::new(RecordingConnection::default()));
        let plan = LoadPlan {
            records_format: VerticaDriver::load_formats().remove(2),
            processing_instructions: ProcessingInstructions::default(),
        };
        let urls = vec![
            "s3://bucket/out/a.csv.gz".to_string(),
            "s3://bucket/out/b.csv.gz".to_string(),
            "s3://bucket/out/c.csv.gz".to_string(),
        ];
        let statements = driver
            .s3_copy_statements("s", "t", &plan, &s3_dir(None), &urls)
            .unwrap();
        assert_eq!(statements.len(), 4);
        assert!(statements[2].contains("FROM 's3://bucket/out/a.csv.gz' GZIP"));
        assert!(statements[2].contains("SKIP 1"));
        assert!(statements[3].contains("FROM 's3://bucket/out/b.csv.gz', 's3://bucket/out/c.csv.gz'"));
        assert!(!statements[3].contains("SKIP"));
    }

    #[tokio::test]
    async fn test_stdin_copy_skips_header_of_first_stream_only() {
        let conn = Arc::new(RecordingConnection::default());
        let driver = VerticaDriver::new(conn.clone());
        let plan = LoadPlan {
            records_format: VerticaDriver::load_formats()
                .remove(2)
                .alter_hints(&[("compression".to_string(), json!(null))].into()),
            processing_instructions: ProcessingInstructions::default(),
        };
        let first: Fileobj = Box::new(Cursor::new(b"id\n1\n".to_vec()));
        let second: Fileobj = Box::new(Cursor::new(b"2\n".to_vec()));
        let mut fileobjs = vec![("a".to_string(), first), ("b".to_string(), second)];
        _ = driver
            .load_from_fileobjs("s", "t", &plan, &mut fileobjs)
            .await
            .unwrap();
        let copied = conn.copied_in();
        assert!(copied[0].0.contains("SKIP 1"));
        assert!(!copied[1].0.contains("SKIP"));
    }

    #[test]
    fn test_export_statements() {
        let driver = VerticaDriver::new(Arc::new(RecordingConnection::default()));
        let plan = UnloadPlan {
            records_format: RecordsFormat::delimited(Variant::Vertica, Default::default()),
            processing_instructions: ProcessingInstructions::default(),
        };
        let statements = driver.export_statements("s", "t", &plan, &s3_dir(None)).unwrap();
        assert_eq!(
            statements[2],
            "SELECT S3EXPORT(* USING PARAMETERS url='s3://bucket/out/data', \
             delimiter=E'\\001', record_terminator=E'\\002') OVER(PARTITION BEST) FROM \"s\".\"t\""
        );
        let err = driver
            .export_statements("s", "t", &plan, &s3_dir(Some("TOKEN")))
            .unwrap_err();
        assert!(matches!(err, MoverError::CredsDoNotSupportS3Export(_)));

        let bluelabs = UnloadPlan {
            records_format: RecordsFormat::bluelabs(),
            processing_instructions: ProcessingInstructions::default(),
        };
        assert!(driver.export_statements("s", "t", &bluelabs, &s3_dir(None)).is_err());
    }
}
