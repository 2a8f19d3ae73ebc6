// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Google BigQuery: load and extract jobs.
//!
//! Job submission goes through [`BigQueryJobs`]; [`HttpBigQueryJobs`]
//! talks to the REST API with a bearer token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use diagnostics::*;
use records::{
    Compression, DateFormat, Encoding, HintName, ProcessingInstructions, Quoting, RecordTerminator,
    RecordsFormat, UnhandledHints, Variant, cant_handle_hint,
};
use serde_json::{Map, Value, json};
use urlfs::{DirectoryUrl, Fileobj};

use super::read_fileobj;
use crate::db::ddl::SqlBuilder;
use crate::db::types::{DecimalType, FloatType, IntegerType, TypeTable};
use crate::db::{
    Connection, DbDriver, Dialect, FileobjLoader, LoadPlan, Loader, UnloadPlan, Unloader,
    load_failure, quote_with, unload_failure,
};
use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};

const API_URL: &str = "https://bigquery.googleapis.com";
const TIMEOUT_SECONDS: u64 = 300;
const BOUNDARY: &str = "mover_load_job_boundary";

pub(crate) const BIGQUERY_TYPES: TypeTable = TypeTable {
    integers: &[IntegerType {
        name: "INT64",
        min: i64::MIN as i128,
        max: i64::MAX as i128,
    }],
    integer_aliases: &[
        ("INTEGER", "INT64"),
        ("INT", "INT64"),
        ("SMALLINT", "INT64"),
        ("BIGINT", "INT64"),
        ("TINYINT", "INT64"),
        ("BYTEINT", "INT64"),
    ],
    decimal: Some(DecimalType {
        name: "NUMERIC",
        max_precision: 38,
    }),
    decimal_aliases: &["DECIMAL", "BIGNUMERIC", "BIGDECIMAL"],
    floats: &[FloatType {
        name: "FLOAT64",
        total_bits: 64,
        significand_bits: 53,
    }],
    float_aliases: &[("FLOAT", "FLOAT64")],
    varchar: None,
    text: "STRING",
    boolean: "BOOL",
    date: "DATE",
    time: "TIME",
    timetz: "STRING",
    datetime: "DATETIME",
    datetimetz: "TIMESTAMP",
};

/// Submits BigQuery jobs and waits for them to finish.
#[async_trait]
pub trait BigQueryJobs: Send + Sync {
    /// Run a load job, uploading `data` when given; returns rows loaded
    async fn run_load_job(&self, configuration: Value, data: Option<Bytes>) -> Result<Option<u64>>;

    async fn run_extract_job(&self, configuration: Value) -> Result<()>;
}

/// [`BigQueryJobs`] over the REST API
pub struct HttpBigQueryJobs {
    http_client: reqwest::Client,
    project: String,
    token: String,
    base_url: String,
    poll: Duration,
}

impl HttpBigQueryJobs {
    pub fn new(project: &str, token: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            http_client,
            project: project.to_string(),
            token: token.to_string(),
            base_url: API_URL.to_string(),
            poll: Duration::from_secs(2),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn jobs_url(&self) -> String {
        format!("{}/bigquery/v2/projects/{}/jobs", self.base_url, self.project)
    }

    async fn json_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MoverError::database(format!("BigQuery HTTP {status}: {text}")));
        }
        Ok(response.json::<Value>().await?)
    }

    async fn insert(&self, configuration: Value, data: Option<Bytes>) -> Result<Value> {
        let job = json!({ "configuration": configuration });
        let request = match data {
            None => self.http_client.post(self.jobs_url()).json(&job),
            Some(data) => {
                let url = format!(
                    "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
                    self.base_url, self.project
                );
                let mut body = format!(
                    "--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n\
                     --{BOUNDARY}\r\nContent-Type: application/octet-stream\r\n\r\n",
                    serde_json::to_string(&job)?
                )
                .into_bytes();
                body.extend_from_slice(&data);
                body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
                self.http_client
                    .post(url)
                    .header("Content-Type", format!("multipart/related; boundary={BOUNDARY}"))
                    .body(body)
            }
        };
        Self::json_response(request.bearer_auth(&self.token).send().await?).await
    }

    /// Poll until the job is `DONE`; a job error becomes a database error
    async fn wait(&self, job: Value) -> Result<Value> {
        let job_id = job["jobReference"]["jobId"]
            .as_str()
            .ok_or_else(|| MoverError::database("BigQuery job has no id"))?
            .to_string();
        let location = job["jobReference"]["location"].as_str().unwrap_or_default().to_string();
        let mut job = job;
        loop {
            if job["status"]["state"] == "DONE" {
                if let Some(message) = job["status"]["errorResult"]["message"].as_str() {
                    return Err(MoverError::database(format!("BigQuery job {job_id}: {message}")));
                }
                return Ok(job);
            }
            tokio::time::sleep(self.poll).await;
            let url = format!("{}/{job_id}?location={location}", self.jobs_url());
            let response = self.http_client.get(&url).bearer_auth(&self.token).send().await?;
            job = Self::json_response(response).await?;
            let state = job["status"]["state"].as_str().unwrap_or_default().to_string();
            debug!("BigQuery job {job_id} is {state}", job_id: job_id, state: state);
        }
    }
}

#[async_trait]
impl BigQueryJobs for HttpBigQueryJobs {
    async fn run_load_job(&self, configuration: Value, data: Option<Bytes>) -> Result<Option<u64>> {
        let job = self.insert(configuration, data).await?;
        let done = self.wait(job).await?;
        Ok(done["statistics"]["load"]["outputRows"]
            .as_str()
            .and_then(|rows| rows.parse().ok()))
    }

    async fn run_extract_job(&self, configuration: Value) -> Result<()> {
        let job = self.insert(configuration, None).await?;
        _ = self.wait(job).await?;
        Ok(())
    }
}

fn check_dates(pi: &ProcessingInstructions, hints: &records::ValidatedHints) -> Result<()> {
    if hints.dateformat != DateFormat::YyyyMmDd {
        cant_handle_hint(pi, HintName::Dateformat, hints.dateformat, "BigQuery uses ISO dates")?;
    }
    if !hints.timeonlyformat.is_24h_seconds() {
        cant_handle_hint(pi, HintName::Timeonlyformat, hints.timeonlyformat, "BigQuery uses 24 hour times")?;
    }
    if !hints.datetimeformat.is_iso_like() || hints.datetimeformat.offset {
        cant_handle_hint(pi, HintName::Datetimeformat, hints.datetimeformat, "BigQuery DATETIME is ISO without offset")?;
    }
    if !hints.datetimeformattz.is_iso_like() {
        cant_handle_hint(pi, HintName::Datetimeformattz, hints.datetimeformattz, "BigQuery TIMESTAMP is ISO")?;
    }
    Ok(())
}

/// Format-dependent fields of a load job configuration.
pub fn load_configuration(format: &RecordsFormat, pi: &ProcessingInstructions) -> Result<Map<String, Value>> {
    let mut config = Map::new();
    let delimited = match format {
        RecordsFormat::Parquet => {
            _ = config.insert("sourceFormat".into(), json!("PARQUET"));
            return Ok(config);
        }
        RecordsFormat::Avro => {
            _ = config.insert("sourceFormat".into(), json!("AVRO"));
            _ = config.insert("useAvroLogicalTypes".into(), json!(true));
            return Ok(config);
        }
        RecordsFormat::Delimited(d) => d,
    };
    let mut unhandled = UnhandledHints::from_hints(delimited.hints());
    let hints = delimited.validated(pi, &mut unhandled)?;
    _ = config.insert("sourceFormat".into(), json!("CSV"));
    _ = config.insert("fieldDelimiter".into(), json!(hints.field_delimiter.to_string()));
    unhandled.consume(HintName::FieldDelimiter);

    if !matches!(hints.record_terminator, RecordTerminator::Lf | RecordTerminator::CrLf) {
        cant_handle_hint(pi, HintName::RecordTerminator, hints.record_terminator, "BigQuery rows end in newlines")?;
    }
    unhandled.consume(HintName::RecordTerminator);

    match hints.compression {
        None | Some(Compression::Gzip) => {}
        Some(other) => {
            cant_handle_hint(pi, HintName::Compression, other, "BigQuery reads GZIP only")?;
        }
    }
    unhandled.consume(HintName::Compression);

    match hints.quoting {
        None => {
            _ = config.insert("quote".into(), json!(""));
        }
        Some(_) => {
            if !hints.doublequote {
                cant_handle_hint(pi, HintName::Doublequote, false, "BigQuery escapes quotes by doubling them")?;
            }
            _ = config.insert("quote".into(), json!(hints.quotechar.to_string()));
        }
    }
    if let Some(escape) = hints.escape {
        cant_handle_hint(pi, HintName::Escape, escape, "BigQuery has no escape character")?;
    }
    _ = config.insert("allowQuotedNewlines".into(), json!(hints.quoting.is_some()));
    unhandled.consume_all([
        HintName::Quoting,
        HintName::Quotechar,
        HintName::Doublequote,
        HintName::Escape,
    ]);

    let encoding = match hints.encoding {
        Encoding::Utf8 => "UTF-8",
        Encoding::Latin1 => "ISO-8859-1",
        other => {
            cant_handle_hint(pi, HintName::Encoding, other, "BigQuery reads UTF-8 and ISO-8859-1")?;
            "UTF-8"
        }
    };
    _ = config.insert("encoding".into(), json!(encoding));
    unhandled.consume(HintName::Encoding);

    _ = config.insert("skipLeadingRows".into(), json!(u32::from(hints.header_row)));
    unhandled.consume(HintName::HeaderRow);

    check_dates(pi, &hints)?;
    unhandled.consume_all([
        HintName::Dateformat,
        HintName::Timeonlyformat,
        HintName::Datetimeformat,
        HintName::Datetimeformattz,
    ]);

    let max_bad = if pi.fail_if_row_invalid {
        0
    } else {
        pi.max_failure_rows.unwrap_or(u64::from(u32::MAX))
    };
    _ = config.insert("maxBadRecords".into(), json!(max_bad));
    unhandled.complain_if_unhandled(pi)?;
    Ok(config)
}

/// Format-dependent fields of an extract job and the file it writes.
pub fn extract_configuration(format: &RecordsFormat, pi: &ProcessingInstructions) -> Result<(Map<String, Value>, String)> {
    let mut config = Map::new();
    let delimited = match format {
        RecordsFormat::Avro => {
            _ = config.insert("destinationFormat".into(), json!("AVRO"));
            _ = config.insert("useAvroLogicalTypes".into(), json!(true));
            return Ok((config, "output.avro".to_string()));
        }
        RecordsFormat::Parquet => {
            _ = config.insert("destinationFormat".into(), json!("PARQUET"));
            return Ok((config, "output.parquet".to_string()));
        }
        RecordsFormat::Delimited(d) => d,
    };
    let mut unhandled = UnhandledHints::from_hints(delimited.hints());
    let hints = delimited.validated(pi, &mut unhandled)?;
    _ = config.insert("destinationFormat".into(), json!("CSV"));
    _ = config.insert("fieldDelimiter".into(), json!(hints.field_delimiter.to_string()));
    _ = config.insert("printHeader".into(), json!(hints.header_row));
    if hints.record_terminator != RecordTerminator::Lf {
        cant_handle_hint(pi, HintName::RecordTerminator, hints.record_terminator, "BigQuery writes newlines")?;
    }
    if hints.quoting != Some(Quoting::Minimal) || !hints.doublequote || hints.quotechar != '"' {
        cant_handle_hint(pi, HintName::Quoting, "non-minimal", "BigQuery writes minimally quoted CSV")?;
    }
    if let Some(escape) = hints.escape {
        cant_handle_hint(pi, HintName::Escape, escape, "BigQuery writes no escapes")?;
    }
    if hints.encoding != Encoding::Utf8 {
        cant_handle_hint(pi, HintName::Encoding, hints.encoding, "BigQuery writes UTF-8")?;
    }
    let filename = match hints.compression {
        None => "output.csv".to_string(),
        Some(Compression::Gzip) => {
            _ = config.insert("compression".into(), json!("GZIP"));
            "output.csv.gz".to_string()
        }
        Some(other) => {
            cant_handle_hint(pi, HintName::Compression, other, "BigQuery writes GZIP only")?;
            "output.csv".to_string()
        }
    };
    check_dates(pi, &hints)?;
    unhandled.consume_all(HintName::ALL);
    unhandled.complain_if_unhandled(pi)?;
    Ok((config, filename))
}

pub struct BigQueryDriver {
    conn: Arc<dyn Connection>,
    jobs: Arc<dyn BigQueryJobs>,
    project: String,
    scratch: Option<DirectoryUrl>,
}

impl BigQueryDriver {
    #[must_use]
    pub fn new(conn: Arc<dyn Connection>, jobs: Arc<dyn BigQueryJobs>, project: &str) -> Self {
        Self {
            conn,
            jobs,
            project: project.to_string(),
            scratch: None,
        }
    }

    /// `gs://` prefix for temp-staged moves
    #[must_use]
    pub fn with_scratch(mut self, scratch: DirectoryUrl) -> Self {
        self.scratch = Some(scratch);
        self
    }

    fn table_reference(&self, schema: &str, table: &str) -> Value {
        json!({ "projectId": self.project, "datasetId": schema, "tableId": table })
    }

    /// Complete `load` configuration for one job
    pub fn load_job(&self, schema: &str, table: &str, plan: &LoadPlan, source_uris: Option<Vec<String>>) -> Result<Value> {
        let mut load = load_configuration(&plan.records_format, &plan.processing_instructions)?;
        _ = load.insert("destinationTable".into(), self.table_reference(schema, table));
        _ = load.insert("writeDisposition".into(), json!("WRITE_APPEND"));
        if let Some(uris) = source_uris {
            _ = load.insert("sourceUris".into(), json!(uris));
        }
        Ok(json!({ "load": load }))
    }

    fn require_gcs(dir: &DirectoryUrl) -> Result<()> {
        if dir.scheme() == "gs" {
            Ok(())
        } else {
            Err(MoverError::not_supported(format!(
                "BigQuery jobs need a gs:// directory, got {}",
                dir.url()
            )))
        }
    }

    fn load_formats() -> Vec<RecordsFormat> {
        vec![
            RecordsFormat::delimited(Variant::Bigquery, Default::default()),
            RecordsFormat::Parquet,
            RecordsFormat::Avro,
        ]
    }
}

#[async_trait]
impl DbDriver for BigQueryDriver {
    fn dialect(&self) -> Dialect {
        Dialect::BigQuery
    }

    fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    fn type_table(&self) -> &TypeTable {
        &BIGQUERY_TYPES
    }

    fn sql_builder(&self) -> SqlBuilder {
        SqlBuilder::MySql
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

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '`')
    }

    /// Letters, digits and underscores, not starting with a digit
    fn make_column_name_valid(&self, name: &str) -> String {
        let mut valid: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .take(300)
            .collect();
        if valid.is_empty() || valid.starts_with(|c: char| c.is_ascii_digit()) {
            valid.insert(0, '_');
        }
        valid
    }

    /// Access is managed through IAM
    fn grant_sql(&self, _: &str, _: &str, _: &str, _: &str, _: bool) -> Option<String> {
        None
    }
}

#[async_trait]
impl Loader for BigQueryDriver {
    async fn load(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>> {
        Self::require_gcs(directory.loc())?;
        let mut uris = directory.manifest_entry_urls().await?;
        if !plan.has_header_row() || uris.len() < 2 {
            let job = self.load_job(schema, table, plan, Some(uris))?;
            return self.jobs.run_load_job(job, None).await.map_err(load_failure);
        }
        // skipLeadingRows applies to every source URI
        let rest = uris.split_off(1);
        let header_job = self.load_job(schema, table, plan, Some(uris))?;
        let body_job = self.load_job(schema, table, &plan.for_part(1), Some(rest))?;
        let first = self.jobs.run_load_job(header_job, None).await.map_err(load_failure)?;
        let later = self.jobs.run_load_job(body_job, None).await.map_err(load_failure)?;
        Ok(first.zip(later).map(|(a, b)| a + b))
    }

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool {
        load_configuration(format, &ProcessingInstructions::default()).is_ok()
    }

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat> {
        Self::load_formats()
    }

    fn best_scheme_to_load_from(&self) -> &str {
        "gs"
    }

    fn temporary_loadable_directory_parent(&self) -> Option<DirectoryUrl> {
        self.scratch.clone()
    }
}

#[async_trait]
impl FileobjLoader for BigQueryDriver {
    async fn load_from_fileobjs(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        fileobjs: &mut [(String, Fileobj)],
    ) -> Result<Option<u64>> {
        let mut total = Some(0);
        for (index, (_, fileobj)) in fileobjs.iter_mut().enumerate() {
            let data = read_fileobj(fileobj).await?;
            let job = self.load_job(schema, table, &plan.for_part(index), None)?;
            let rows = self
                .jobs
                .run_load_job(job, Some(Bytes::from(data)))
                .await
                .map_err(load_failure)?;
            total = total.zip(rows).map(|(a, b)| a + b);
        }
        Ok(total)
    }

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool {
        Loader::can_load_this_format(self, format)
    }

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat> {
        Self::load_formats()
    }
}

#[async_trait]
impl Unloader for BigQueryDriver {
    async fn unload(
        &self,
        schema: &str,
        table: &str,
        plan: &UnloadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>> {
        Self::require_gcs(directory.loc())?;
        let (mut extract, filename) = extract_configuration(&plan.records_format, &plan.processing_instructions)?;
        let file = directory.loc().file_in_this_directory(&filename)?;
        _ = extract.insert("sourceTable".into(), self.table_reference(schema, table));
        _ = extract.insert("destinationUris".into(), json!([file.url()]));
        self.jobs
            .run_extract_job(json!({ "extract": extract }))
            .await
            .map_err(unload_failure)?;
        let length = file.size().await?;
        directory
            .save_preliminary_manifest(Some(&[(file, length)][..]))
            .await?;
        Ok(None)
    }

    fn can_unload_format(&self, format: &RecordsFormat) -> bool {
        extract_configuration(format, &ProcessingInstructions::default()).is_ok()
    }

    fn can_unload_to_scheme(&self, scheme: &str) -> bool {
        scheme == "gs"
    }

    fn known_supported_records_formats_for_unload(&self) -> Vec<RecordsFormat> {
        vec![
            RecordsFormat::Avro,
            RecordsFormat::Parquet,
            RecordsFormat::delimited(Variant::Bigquery, Default::default()),
        ]
    }

    fn temporary_unloadable_directory_parent(&self) -> Option<DirectoryUrl> {
        self.scratch.clone()
    }
}
