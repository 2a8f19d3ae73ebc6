// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Amazon Redshift: `COPY ... MANIFEST` from and `UNLOAD` to S3 records
//! directories.

use std::sync::Arc;

use async_trait::async_trait;
use diagnostics::*;
use records::{
    Compression, DateFormat, Encoding, HintName, ProcessingInstructions, Quoting, RecordTerminator,
    RecordsFormat, TimeFormat, UnhandledHints, ValidatedHints, Variant, cant_handle_hint,
};
use serde_json::json;
use urlfs::{DirectoryUrl, with_temporary_directory};

use super::{delimited, octal_char, sql_string};
use crate::db::types::{DecimalType, FloatType, IntegerType, TypeTable, VarcharType};
use crate::db::{
    Connection, DbDriver, Dialect, LoadPlan, Loader, UnloadPlan, Unloader, load_failure,
    unload_failure,
};
use crate::db::prep::run_in_transaction;
use crate::directory::RecordsDirectory;
use crate::directory::manifest::Manifest;
use crate::error::{MoverError, Result};

/// Largest `MAXERROR` Redshift accepts
const MAX_ERROR_LIMIT: u64 = 100_000;

pub(crate) const REDSHIFT_TYPES: TypeTable = TypeTable {
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
        name: "DECIMAL",
        max_precision: 38,
    }),
    decimal_aliases: &["NUMERIC"],
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
        max_length: 65_535,
        in_bytes: true,
    }),
    text: "VARCHAR(65535)",
    boolean: "BOOLEAN",
    date: "DATE",
    time: "TIME",
    timetz: "TIMETZ",
    datetime: "TIMESTAMP",
    datetimetz: "TIMESTAMPTZ",
};

fn require_terminator(pi: &ProcessingInstructions, hints: &ValidatedHints) -> Result<()> {
    if hints.record_terminator != RecordTerminator::Lf {
        cant_handle_hint(pi, HintName::RecordTerminator, hints.record_terminator, "Redshift rows end in newlines")?;
    }
    Ok(())
}

fn load_timeformat(pi: &ProcessingInstructions, hints: &ValidatedHints) -> Result<String> {
    if hints.datetimeformat.is_iso_like() && hints.datetimeformattz.is_iso_like() {
        return Ok("auto".to_string());
    }
    if hints.datetimeformattz.without_offset() != hints.datetimeformat.without_offset() {
        cant_handle_hint(
            pi,
            HintName::Datetimeformattz,
            hints.datetimeformattz,
            "Redshift takes one TIMEFORMAT for every timestamp column",
        )?;
    }
    Ok(hints.datetimeformat.without_offset().to_string())
}

fn max_error(pi: &ProcessingInstructions) -> Option<String> {
    if pi.fail_if_row_invalid {
        return None;
    }
    let limit = pi.max_failure_rows.unwrap_or(MAX_ERROR_LIMIT).min(MAX_ERROR_LIMIT);
    Some(format!("MAXERROR {limit}"))
}

/// `COPY` options for a records format.
pub fn copy_options(format: &RecordsFormat, pi: &ProcessingInstructions) -> Result<Vec<String>> {
    let delimited = match format {
        RecordsFormat::Parquet => return Ok(vec!["FORMAT AS PARQUET".to_string()]),
        RecordsFormat::Avro => return Ok(vec!["FORMAT AS AVRO 'auto'".to_string()]),
        RecordsFormat::Delimited(d) => d,
    };
    let mut unhandled = UnhandledHints::from_hints(delimited.hints());
    let hints = delimited.validated(pi, &mut unhandled)?;
    let mut options = vec![format!("DELIMITER AS {}", octal_char(hints.field_delimiter))];
    unhandled.consume(HintName::FieldDelimiter);

    match hints.quoting {
        Some(_) => {
            if !hints.doublequote {
                cant_handle_hint(pi, HintName::Doublequote, false, "Redshift CSV escapes quotes by doubling them")?;
            }
            if let Some(escape) = hints.escape {
                cant_handle_hint(pi, HintName::Escape, escape, "Redshift CSV has no escape character")?;
            }
            options.push(format!("CSV QUOTE AS {}", octal_char(hints.quotechar)));
        }
        None => match hints.escape {
            Some('\\') => options.push("ESCAPE".to_string()),
            Some(other) => {
                cant_handle_hint(pi, HintName::Escape, other, "Redshift only escapes with backslash")?;
            }
            None => {}
        },
    }
    unhandled.consume_all([
        HintName::Quoting,
        HintName::Quotechar,
        HintName::Doublequote,
        HintName::Escape,
    ]);

    require_terminator(pi, &hints)?;
    unhandled.consume(HintName::RecordTerminator);

    match hints.compression {
        Some(Compression::Gzip) => options.push("GZIP".to_string()),
        Some(Compression::Bzip) => options.push("BZIP2".to_string()),
        Some(Compression::Lzo) => options.push("LZOP".to_string()),
        None => {}
    }
    unhandled.consume(HintName::Compression);

    match hints.encoding {
        Encoding::Utf8 | Encoding::Utf16 | Encoding::Utf16Le | Encoding::Utf16Be => {
            options.push(format!("ENCODING {}", hints.encoding.as_str()));
        }
        other => {
            cant_handle_hint(pi, HintName::Encoding, other, "Redshift reads UTF-8 and UTF-16 only")?;
        }
    }
    unhandled.consume(HintName::Encoding);

    if hints.header_row {
        options.push("IGNOREHEADER 1".to_string());
    }
    unhandled.consume(HintName::HeaderRow);

    options.push(format!("DATEFORMAT {}", sql_string(hints.dateformat.as_str())));
    if hints.timeonlyformat != TimeFormat::Hh24MiSs {
        cant_handle_hint(pi, HintName::Timeonlyformat, hints.timeonlyformat, "Redshift reads 24 hour times")?;
    }
    options.push(format!("TIMEFORMAT {}", sql_string(&load_timeformat(pi, &hints)?)));
    unhandled.consume_all([
        HintName::Dateformat,
        HintName::Timeonlyformat,
        HintName::Datetimeformat,
        HintName::Datetimeformattz,
    ]);

    options.push("EMPTYASNULL".to_string());
    options.extend(max_error(pi));
    unhandled.complain_if_unhandled(pi)?;
    Ok(options)
}

/// `UNLOAD` options for a records format, without the manifest clauses.
pub fn unload_options(format: &RecordsFormat, pi: &ProcessingInstructions) -> Result<Vec<String>> {
    let delimited = match format {
        RecordsFormat::Parquet => return Ok(vec!["FORMAT PARQUET".to_string()]),
        RecordsFormat::Avro => return Err(MoverError::not_supported("Redshift cannot UNLOAD Avro")),
        RecordsFormat::Delimited(d) => d,
    };
    let mut unhandled = UnhandledHints::from_hints(delimited.hints());
    let hints = delimited.validated(pi, &mut unhandled)?;
    let mut options = vec![format!("DELIMITER AS {}", octal_char(hints.field_delimiter))];
    unhandled.consume(HintName::FieldDelimiter);

    match hints.quoting {
        Some(Quoting::Minimal) => {
            if !hints.doublequote || hints.escape.is_some() {
                cant_handle_hint(pi, HintName::Doublequote, hints.doublequote, "Redshift CSV output doubles quotes")?;
            }
            if hints.quotechar != '"' {
                cant_handle_hint(pi, HintName::Quotechar, hints.quotechar, "Redshift CSV output quotes with \"")?;
            }
            options.push("FORMAT CSV".to_string());
        }
        Some(Quoting::All) => {
            if hints.doublequote || hints.escape != Some('\\') {
                cant_handle_hint(pi, HintName::Doublequote, hints.doublequote, "ADDQUOTES escapes quotes with backslash")?;
            }
            options.push("ADDQUOTES".to_string());
            options.push("ESCAPE".to_string());
        }
        Some(Quoting::Nonnumeric) => {
            cant_handle_hint(pi, HintName::Quoting, "nonnumeric", "Redshift cannot quote by column type")?;
        }
        None => match hints.escape {
            Some('\\') => options.push("ESCAPE".to_string()),
            Some(other) => {
                cant_handle_hint(pi, HintName::Escape, other, "Redshift only escapes with backslash")?;
            }
            None => {}
        },
    }
    unhandled.consume_all([
        HintName::Quoting,
        HintName::Quotechar,
        HintName::Doublequote,
        HintName::Escape,
    ]);

    require_terminator(pi, &hints)?;
    unhandled.consume(HintName::RecordTerminator);

    match hints.compression {
        Some(Compression::Gzip) => options.push("GZIP".to_string()),
        Some(Compression::Bzip) => options.push("BZIP2".to_string()),
        Some(Compression::Lzo) => {
            cant_handle_hint(pi, HintName::Compression, "LZO", "Redshift cannot UNLOAD LZO")?;
        }
        None => {}
    }
    unhandled.consume(HintName::Compression);

    if hints.encoding != Encoding::Utf8 {
        cant_handle_hint(pi, HintName::Encoding, hints.encoding, "Redshift writes UTF-8")?;
    }
    unhandled.consume(HintName::Encoding);

    // UNLOAD heads every part it writes; serial output keeps it to one part
    if hints.header_row {
        options.push("HEADER".to_string());
        options.push("PARALLEL OFF".to_string());
    }
    unhandled.consume(HintName::HeaderRow);

    if hints.dateformat != DateFormat::YyyyMmDd {
        cant_handle_hint(pi, HintName::Dateformat, hints.dateformat, "Redshift writes ISO dates")?;
    }
    if hints.timeonlyformat != TimeFormat::Hh24MiSs {
        cant_handle_hint(pi, HintName::Timeonlyformat, hints.timeonlyformat, "Redshift writes 24 hour times")?;
    }
    if !hints.datetimeformat.is_iso_like() || hints.datetimeformat.offset {
        cant_handle_hint(pi, HintName::Datetimeformat, hints.datetimeformat, "Redshift writes ISO timestamps")?;
    }
    if !hints.datetimeformattz.is_iso_like() || !hints.datetimeformattz.offset {
        cant_handle_hint(pi, HintName::Datetimeformattz, hints.datetimeformattz, "Redshift writes ISO timestamps with offsets")?;
    }
    unhandled.consume_all([
        HintName::Dateformat,
        HintName::Timeonlyformat,
        HintName::Datetimeformat,
        HintName::Datetimeformattz,
    ]);

    unhandled.complain_if_unhandled(pi)?;
    Ok(options)
}

pub struct RedshiftDriver {
    conn: Arc<dyn Connection>,
    scratch: Option<DirectoryUrl>,
    iam_role: Option<String>,
}

impl RedshiftDriver {
    #[must_use]
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            scratch: None,
            iam_role: None,
        }
    }

    /// S3 prefix for temp-staged loads and unloads
    #[must_use]
    pub fn with_scratch(mut self, scratch: DirectoryUrl) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Authorize bulk statements with a role rather than URL credentials
    #[must_use]
    pub fn with_iam_role(mut self, role: &str) -> Self {
        self.iam_role = Some(role.to_string());
        self
    }

    fn authorization(&self, dir: &DirectoryUrl, export: bool) -> Result<String> {
        if let Some(role) = &self.iam_role {
            return Ok(format!("IAM_ROLE {}", sql_string(role)));
        }
        let Some(creds) = dir.aws_creds() else {
            let url = dir.url().to_string();
            return Err(if export {
                MoverError::CredsDoNotSupportS3Export(url)
            } else {
                MoverError::CredsDoNotSupportS3Import(url)
            });
        };
        let mut credentials = format!(
            "aws_access_key_id={};aws_secret_access_key={}",
            creds.access_key_id, creds.secret_access_key
        );
        if let Some(token) = &creds.session_token {
            credentials.push_str(&format!(";token={token}"));
        }
        Ok(format!("CREDENTIALS {}", sql_string(&credentials)))
    }

    fn require_s3(dir: &DirectoryUrl) -> Result<()> {
        if dir.scheme() == "s3" {
            Ok(())
        } else {
            Err(MoverError::not_supported(format!(
                "Redshift bulk statements need an s3:// directory, got {}",
                dir.url()
            )))
        }
    }

    pub fn copy_sql(&self, schema: &str, table: &str, plan: &LoadPlan, directory: &RecordsDirectory) -> Result<String> {
        self.copy_from_manifest_sql(schema, table, plan, directory.loc(), &directory.manifest_url()?)
    }

    fn copy_from_manifest_sql(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        loc: &DirectoryUrl,
        manifest_url: &str,
    ) -> Result<String> {
        Self::require_s3(loc)?;
        let options = copy_options(&plan.records_format, &plan.processing_instructions)?;
        Ok(format!(
            "COPY {} FROM {} {} MANIFEST {}",
            self.qualified_table(schema, table),
            sql_string(manifest_url),
            self.authorization(loc, false)?,
            options.join(" ")
        ))
    }

    /// `IGNOREHEADER` applies to every manifest entry, so a multi-part load
    /// with a header row runs as two `COPY`s in one transaction: the first
    /// entry with the header skipped, then the rest. Their manifests live
    /// in a temporary directory under the records directory.
    async fn copy_with_leading_header(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        directory: &RecordsDirectory,
        manifest: Manifest,
    ) -> Result<()> {
        let loc = directory.loc();
        with_temporary_directory(loc, |temp| async move {
            let (first, rest) = manifest.entries.split_at(1);
            let mut statements = Vec::with_capacity(2);
            for (name, entries, part_plan) in [
                ("header_manifest", first, plan.clone()),
                ("body_manifest", rest, plan.for_part(1)),
            ] {
                let file = temp.file_in_this_directory(name)?;
                let doc = serde_json::to_string(&Manifest {
                    entries: entries.to_vec(),
                })?;
                file.store_string(&doc).await?;
                statements.push(self.copy_from_manifest_sql(schema, table, &part_plan, loc, file.url())?);
            }
            run_in_transaction(self.conn.as_ref(), &statements)
                .await
                .map_err(load_failure)
        })
        .await
    }

    pub fn unload_sql(&self, schema: &str, table: &str, plan: &UnloadPlan, directory: &RecordsDirectory) -> Result<String> {
        Self::require_s3(directory.loc())?;
        let options = unload_options(&plan.records_format, &plan.processing_instructions)?;
        let select = format!("SELECT * FROM {}", self.qualified_table(schema, table));
        Ok(format!(
            "UNLOAD ({}) TO {} {} {} MANIFEST VERBOSE ALLOWOVERWRITE",
            sql_string(&select),
            sql_string(directory.loc().url()),
            self.authorization(directory.loc(), true)?,
            options.join(" ")
        ))
    }
}

#[async_trait]
impl DbDriver for RedshiftDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    fn type_table(&self) -> &TypeTable {
        &REDSHIFT_TYPES
    }

    fn loader(&self) -> Option<&dyn Loader> {
        Some(self)
    }

    fn unloader(&self) -> Option<&dyn Unloader> {
        Some(self)
    }

    /// Redshift folds identifiers to lower case and caps them at 127 bytes
    fn make_column_name_valid(&self, name: &str) -> String {
        let mut valid = name.to_lowercase();
        while valid.len() > 127 {
            _ = valid.pop();
        }
        valid
    }
}

#[async_trait]
impl Loader for RedshiftDriver {
    /// Row counts from `COPY` are not reliable, so the result is always `None`
    async fn load(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>> {
        let target = self.qualified_table(schema, table);
        let url = directory.loc().url();
        info!("Redshift COPY into {target} from {url}", target: target, url: url);
        if plan.has_header_row() {
            if let Some(manifest) = directory.load_manifest().await? {
                if manifest.entries.len() > 1 {
                    self.copy_with_leading_header(schema, table, plan, directory, manifest)
                        .await?;
                    return Ok(None);
                }
            }
        }
        let sql = self.copy_sql(schema, table, plan, directory)?;
        _ = self.conn.execute(&sql).await.map_err(load_failure)?;
        Ok(None)
    }

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool {
        copy_options(format, &ProcessingInstructions::default()).is_ok()
    }

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat> {
        vec![
            RecordsFormat::bluelabs(),
            delimited(Variant::Csv, []),
            RecordsFormat::Parquet,
            RecordsFormat::Avro,
        ]
    }

    fn best_scheme_to_load_from(&self) -> &str {
        "s3"
    }

    fn temporary_loadable_directory_parent(&self) -> Option<DirectoryUrl> {
        self.scratch.clone()
    }
}

#[async_trait]
impl Unloader for RedshiftDriver {
    /// Redshift writes the data files and the preliminary `manifest` itself
    async fn unload(
        &self,
        schema: &str,
        table: &str,
        plan: &UnloadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>> {
        let sql = self.unload_sql(schema, table, plan, directory)?;
        let source = self.qualified_table(schema, table);
        let url = directory.loc().url();
        info!("Redshift UNLOAD from {source} to {url}", source: source, url: url);
        self.conn.execute(&sql).await.map_err(unload_failure)
    }

    fn can_unload_format(&self, format: &RecordsFormat) -> bool {
        unload_options(format, &ProcessingInstructions::default()).is_ok()
    }

    fn can_unload_to_scheme(&self, scheme: &str) -> bool {
        scheme == "s3"
    }

    fn known_supported_records_formats_for_unload(&self) -> Vec<RecordsFormat> {
        vec![
            RecordsFormat::bluelabs(),
            RecordsFormat::Parquet,
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
        self.scratch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConnection;
    use urlfs::{AwsConfig, UrlConfig, UrlResolver};

    fn resolver(session_token: Option<&str>) -> Arc<UrlResolver> {
        Arc::new(UrlResolver::new(UrlConfig {
            aws: Some(AwsConfig {
                region: Some("us-east-1".to_string()),
                access_key_id: Some("AKID".to_string()),
                secret_access_key: Some("SECRET".to_string()),
                session_token: session_token.map(str::to_string),
                ..AwsConfig::default()
            }),
            gcs: None,
        }))
    }

    fn s3_directory(resolver: Arc<UrlResolver>) -> RecordsDirectory {
        let loc = resolver.directory_url("s3://bucket/out/").unwrap();
        RecordsDirectory::new(loc, resolver)
    }

    fn plan(format: RecordsFormat) -> LoadPlan {
        LoadPlan {
            records_format: format,
            processing_instructions: ProcessingInstructions::default(),
        }
    }

    #[test]
    fn test_bluelabs_copy_options() {
        let options = copy_options(&RecordsFormat::bluelabs(), &ProcessingInstructions::default()).unwrap();
        assert_eq!(
            options,
            vec![
                "DELIMITER AS ','",
                "ESCAPE",
                "GZIP",
                "ENCODING UTF8",
                "DATEFORMAT 'YYYY-MM-DD'",
                "TIMEFORMAT 'auto'",
                "EMPTYASNULL",
            ]
        );
    }

    #[test]
    fn test_csv_rejects_escape_and_caps_maxerror() {
        let strict = ProcessingInstructions::default();
        let escaped = delimited(Variant::Csv, [("escape", json!("\\"))]);
        assert!(matches!(
            copy_options(&escaped, &strict),
            Err(MoverError::CantHandleHint { hint, .. }) if hint == "escape"
        ));

        let pi = ProcessingInstructions {
            fail_if_row_invalid: false,
            max_failure_rows: Some(10_000_000),
            ..ProcessingInstructions::default()
        };
        let options = copy_options(&delimited(Variant::Csv, []), &pi).unwrap();
        assert!(options.contains(&"CSV QUOTE AS '\"'".to_string()));
        assert!(options.contains(&"IGNOREHEADER 1".to_string()));
        assert!(options.contains(&"TIMEFORMAT 'MM/DD/YY HH24:MI'".to_string()));
        assert_eq!(options.last().map(String::as_str), Some("MAXERROR 100000"));
    }

    #[test]
    fn test_unload_options() {
        let pi = ProcessingInstructions::default();
        assert_eq!(unload_options(&RecordsFormat::Parquet, &pi).unwrap(), vec!["FORMAT PARQUET"]);
        assert!(unload_options(&RecordsFormat::Avro, &pi).is_err());
        let options = unload_options(&RecordsFormat::bluelabs(), &pi).unwrap();
        assert_eq!(options, vec!["DELIMITER AS ','", "ESCAPE", "GZIP"]);
        let latin1 = delimited(Variant::Bluelabs, [("encoding", json!("LATIN1"))]);
        assert!(unload_options(&latin1, &pi).is_err());

        let driver = RedshiftDriver::new(Arc::new(RecordingConnection::default()));
        let csv = driver.known_supported_records_formats_for_unload().remove(2);
        let options = unload_options(&csv, &pi).unwrap();
        let header = options.iter().position(|o| o == "HEADER").unwrap();
        assert_eq!(options[header + 1], "PARALLEL OFF");
    }

    #[tokio::test]
    async fn test_copy_uses_manifest_and_credentials() {
        let conn = Arc::new(RecordingConnection::default());
        conn.set_row_count(Some(7));
        let driver = RedshiftDriver::new(conn.clone());
        let directory = s3_directory(resolver(Some("TOKEN")));
        let count = driver
            .load("s", "t", &plan(RecordsFormat::Parquet), &directory)
            .await
            .unwrap();
        assert_eq!(count, None);
        let statements = conn.statements();
        assert_eq!(
            statements[0],
            "COPY \"s\".\"t\" FROM 's3://bucket/out/_manifest' \
             CREDENTIALS 'aws_access_key_id=AKID;aws_secret_access_key=SECRET;token=TOKEN' \
             MANIFEST FORMAT AS PARQUET"
        );
    }

    #[tokio::test]
    async fn test_unload_with_iam_role() {
        let conn = Arc::new(RecordingConnection::default());
        let driver = RedshiftDriver::new(conn.clone()).with_iam_role("arn:aws:iam::1:role/r");
        let directory = s3_directory(resolver(None));
        let unload = UnloadPlan {
            records_format: RecordsFormat::Parquet,
            processing_instructions: ProcessingInstructions::default(),
        };
        _ = driver.unload("s", "t", &unload, &directory).await.unwrap();
        assert_eq!(
            conn.statements()[0],
            "UNLOAD ('SELECT * FROM \"s\".\"t\"') TO 's3://bucket/out/' \
             IAM_ROLE 'arn:aws:iam::1:role/r' FORMAT PARQUET MANIFEST VERBOSE ALLOWOVERWRITE"
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_and_local_directories() {
        let conn = Arc::new(RecordingConnection::default());
        let driver = RedshiftDriver::new(conn.clone());
        let bare = Arc::new(UrlResolver::default());
        let directory = s3_directory(bare.clone());
        let err = driver
            .load("s", "t", &plan(RecordsFormat::Parquet), &directory)
            .await
            .unwrap_err();
        assert!(matches!(err, MoverError::CredsDoNotSupportS3Import(_)));

        let local = RecordsDirectory::new(bare.directory_url("mem://bucket/out/").unwrap(), bare);
        let err = driver
            .load("s", "t", &plan(RecordsFormat::Parquet), &local)
            .await
            .unwrap_err();
        assert!(matches!(err, MoverError::NotSupported(_)));
        assert!(conn.statements().is_empty());
    }

    #[tokio::test]
    async fn test_header_skipped_in_first_entry_only() {
        let resolver = Arc::new(
            UrlResolver::new(UrlConfig {
                aws: Some(AwsConfig {
                    access_key_id: Some("AKID".to_string()),
                    secret_access_key: Some("SECRET".to_string()),
                    ..AwsConfig::default()
                }),
                gcs: None,
            })
            .with_memory_bucket("s3://bucket"),
        );
        let directory = s3_directory(resolver);
        let format = delimited(Variant::Csv, []);
        let first: urlfs::Fileobj = Box::new(std::io::Cursor::new(b"id\n1\n".to_vec()));
        let second: urlfs::Fileobj = Box::new(std::io::Cursor::new(b"2\n".to_vec()));
        let mut parts = vec![("a.csv.gz".to_string(), first), ("b.csv.gz".to_string(), second)];
        _ = directory
            .save_fileobjs(&mut parts, None, Some(&format))
            .await
            .unwrap();

        let conn = Arc::new(RecordingConnection::default());
        let driver = RedshiftDriver::new(conn.clone());
        let count = driver.load("s", "t", &plan(format), &directory).await.unwrap();

        assert_eq!(count, None);
        let statements = conn.statements();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0], "BEGIN");
        assert!(statements[1].contains("header_manifest"));
        assert!(statements[1].contains("IGNOREHEADER 1"));
        assert!(statements[2].contains("body_manifest"));
        assert!(!statements[2].contains("IGNOREHEADER"));
        assert_eq!(statements[3], "COMMIT");
        let leftovers = directory.loc().files_in_directory().await.unwrap();
        assert!(
            leftovers
                .iter()
                .all(|f| !f.url().ends_with("header_manifest") && !f.url().ends_with("body_manifest"))
        );
    }

    #[tokio::test]
    async fn test_failed_copy_is_a_load_error() {
        let conn = Arc::new(RecordingConnection::default());
        conn.fail_statements_containing("COPY", 1);
        let driver = RedshiftDriver::new(conn.clone());
        let directory = s3_directory(resolver(None));
        let err = driver
            .load("s", "t", &plan(RecordsFormat::bluelabs()), &directory)
            .await
            .unwrap_err();
        assert!(err.is_load_error());
    }
}
