// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Whole moves between in-process stand-ins for buckets and databases.

use std::io::Cursor;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use bytes::Bytes;
use mover::db::prep::ExistingTableHandling;
use mover::db::vendors::bigquery::{BigQueryDriver, BigQueryJobs};
use mover::db::vendors::postgres::PostgresDriver;
use mover::db::vendors::redshift::RedshiftDriver;
use mover::db::vendors::vertica::VerticaDriver;
use mover::db::ColumnInfo;
use mover::sheets::SheetsClient;
use mover::sources::{
    DataUrlSource, DataframesSource, DirectorySource, FileobjsSource, GoogleSheetsSource, TableSource,
};
use mover::targets::{DataUrlTarget, DirectoryTarget, SpectrumTarget, TableTarget};
use mover::testing::RecordingConnection;
use mover::{MoveContext, MoverError, Result, Source, Target, move_records};
use records::{PartialHints, ProcessingInstructions, RecordsFormat, Variant};
use serde_json::{Value, json};
use urlfs::{AwsConfig, Fileobj, UrlConfig, UrlResolver};

fn resolver() -> Arc<UrlResolver> {
    let config = UrlConfig {
        aws: Some(AwsConfig {
            access_key_id: Some("AKID".into()),
            secret_access_key: Some("SECRET".into()),
            ..AwsConfig::default()
        }),
        gcs: None,
    };
    Arc::new(
        UrlResolver::new(config)
            .with_memory_bucket("s3://b")
            .with_memory_bucket("gs://scratch"),
    )
}

fn cx() -> MoveContext {
    MoveContext::new(resolver(), ProcessingInstructions::default())
}

fn plain_csv(header: bool) -> RecordsFormat {
    let mut hints = PartialHints::new();
    _ = hints.insert("compression".into(), json!(null));
    _ = hints.insert("header-row".into(), json!(header));
    RecordsFormat::delimited(Variant::Csv, hints)
}

/// Writes the extract file where the job says, like the service would
struct ExtractingJobs(Arc<UrlResolver>);

#[async_trait]
impl BigQueryJobs for ExtractingJobs {
    async fn run_load_job(&self, _: Value, _: Option<Bytes>) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn run_extract_job(&self, configuration: Value) -> Result<()> {
        let uri = configuration["extract"]["destinationUris"][0]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let file = self.0.file_url(&uri)?;
        file.write_bytes(Bytes::from_static(b"Obj\x01")).await?;
        Ok(())
    }
}

struct FixedSheet;

#[async_trait]
impl SheetsClient for FixedSheet {
    async fn values(&self, _: &str, _: &str) -> Result<Vec<Vec<Value>>> {
        Ok(vec![
            vec![json!("name"), json!("count")],
            vec![json!("ann"), json!(1)],
            vec![json!("bob"), json!(2)],
        ])
    }
}

#[tokio::test]
async fn test_csv_in_bucket_to_postgres() {
    let cx = cx();
    let file = cx.file_url("s3://b/in/people.csv").unwrap();
    file.write_bytes(Bytes::from_static(b"id,name\n1,ann\n2,bob\n"))
        .await
        .unwrap();
    let conn = Arc::new(RecordingConnection::default());
    let target = Target::Table(TableTarget::new(Arc::new(PostgresDriver::new(conn.clone())), "public", "people"));

    let source = Source::DataUrl(DataUrlSource::new(file, plain_csv(true)));
    let result = move_records(&cx, source, &target).await.unwrap();

    assert_eq!(result.move_count, Some(2));
    let statements = conn.statements();
    assert!(statements.iter().any(|s| s.starts_with("CREATE TABLE")));
    let copied = conn.copied_in();
    assert_eq!(copied.len(), 1);
    assert!(copied[0].0.contains("FROM STDIN"));
    assert_eq!(copied[0].1, b"id,name\n1,ann\n2,bob\n".to_vec());
}

#[tokio::test]
async fn test_bigquery_table_to_avro_directory_in_s3() {
    let cx = cx();
    let conn = Arc::new(RecordingConnection::default());
    conn.set_columns("ds", "events", vec![ColumnInfo::new("n", "INT64", false)]);
    let scratch = cx.resolver().directory_url("gs://scratch/tmp/").unwrap();
    let driver = BigQueryDriver::new(conn, Arc::new(ExtractingJobs(cx.resolver().clone())), "proj")
        .with_scratch(scratch);
    let source = Source::Table(TableSource::new(Arc::new(driver), "ds", "events"));
    let directory = cx.records_directory("s3://b/events/").unwrap();
    let target = Target::Directory(DirectoryTarget::new(directory.clone(), Some(RecordsFormat::Avro)));

    let result = move_records(&cx, source, &target).await.unwrap();

    assert!(result.output_urls.as_ref().is_some_and(|urls| urls.contains_key("manifest")));
    let opened = DirectorySource::open(directory, None, cx.processing_instructions())
        .await
        .unwrap();
    assert_eq!(*opened.records_format(), RecordsFormat::Avro);
    assert!(opened.records_schema().is_some());
    let entries = opened.directory().manifest_entry_urls().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("s3://b/events/"));
    assert!(entries[0].ends_with(".avro"));
}

#[tokio::test]
async fn test_redshift_table_to_spectrum() {
    let cx = cx();
    let conn = Arc::new(RecordingConnection::default());
    conn.set_columns("public", "orders", vec![ColumnInfo::new("n", "INTEGER", false)]);
    conn.set_row_count(Some(5));
    let source = Source::Table(TableSource::new(
        Arc::new(RedshiftDriver::new(conn.clone())),
        "public",
        "orders",
    ));
    let directory = cx.records_directory("s3://b/spectrum/orders/").unwrap();
    let target = Target::Spectrum(SpectrumTarget::new(
        Arc::new(RedshiftDriver::new(conn.clone())),
        "spectrum",
        "orders",
        directory,
        ExistingTableHandling::DropAndRecreate,
    ));

    let result = move_records(&cx, source, &target).await.unwrap();

    assert_eq!(result.move_count, Some(5));
    let statements = conn.statements();
    let unload = statements.iter().position(|s| s.starts_with("UNLOAD")).unwrap();
    let create = statements
        .iter()
        .position(|s| s.starts_with("CREATE EXTERNAL TABLE"))
        .unwrap();
    assert!(unload < create);
    assert!(statements[unload].contains("PARQUET"));
    assert!(statements[create].contains("'numRows'='5'"));
}

#[tokio::test]
async fn test_sheet_to_vertica() {
    let cx = cx();
    let conn = Arc::new(RecordingConnection::default());
    let target = Target::Table(TableTarget::new(Arc::new(VerticaDriver::new(conn.clone())), "s", "people"));
    let source = Source::GoogleSheets(GoogleSheetsSource::new(Arc::new(FixedSheet), "sheet", "A1:B3"));

    _ = move_records(&cx, source, &target).await.unwrap();

    let statements = conn.statements();
    let create = statements.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
    let copy = statements.iter().position(|s| s.contains("FROM STDIN")).unwrap();
    assert!(create < copy);
    assert!(!conn.copied_in().is_empty());
}

#[tokio::test]
async fn test_local_directory_to_single_file() {
    let local = tempfile::tempdir().unwrap();
    let cx = MoveContext::new(Arc::new(UrlResolver::default()), ProcessingInstructions::default());
    let base = format!("file://{}", local.path().display());
    let directory = cx.records_directory(&format!("{base}/dir/")).unwrap();
    let parts: Vec<(String, Fileobj)> = vec![
        ("part-0.csv".into(), Box::new(Cursor::new(b"1,ann\n".to_vec()))),
        ("part-1.csv".into(), Box::new(Cursor::new(b"2,bob\n".to_vec()))),
    ];
    _ = FileobjsSource::new(parts, plain_csv(false))
        .move_to_records_directory(&directory, cx.processing_instructions())
        .await
        .unwrap();

    let source = Source::Directory(
        DirectorySource::open(directory, None, cx.processing_instructions())
            .await
            .unwrap(),
    );
    let file = cx.file_url(&format!("{base}/all.csv")).unwrap();
    let target = Target::DataUrl(DataUrlTarget::new(file.clone(), None));
    let result = move_records(&cx, source, &target).await.unwrap();

    assert_eq!(result.move_count, None);
    assert_eq!(file.read_bytes().await.unwrap().as_ref(), b"1,ann\n2,bob\n");
}

#[tokio::test]
async fn test_dataframes_to_redshift_through_scratch() {
    let cx = cx();
    let conn = Arc::new(RecordingConnection::default());
    let scratch = cx.resolver().directory_url("s3://b/scratch/").unwrap();
    let driver = RedshiftDriver::new(conn.clone()).with_scratch(scratch);
    let target = Target::Table(TableTarget::new(Arc::new(driver), "public", "ids"));
    let batch = arrow_array::record_batch!(("id", Int64, [1, 2, 3]), ("name", Utf8, ["a", "b", "c"])).unwrap();
    let source = Source::Dataframes(DataframesSource::from_batches(vec![batch]));

    let result = move_records(&cx, source, &target).await.unwrap();

    assert_eq!(result.move_count, None);
    let statements = conn.statements();
    let create = statements.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
    let copy = statements
        .iter()
        .position(|s| s.starts_with("COPY") && s.contains("MANIFEST"))
        .unwrap();
    assert!(create < copy);
    assert!(statements[copy].contains("s3://b/scratch/"));
}

#[tokio::test]
async fn test_empty_dataframes_still_create_the_table() {
    let cx = cx();
    let conn = Arc::new(RecordingConnection::default());
    let target = Target::Table(TableTarget::new(Arc::new(PostgresDriver::new(conn.clone())), "s", "t"));
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
    let source = Source::Dataframes(DataframesSource::from_batches(Vec::new()).with_arrow_schema(schema));

    let result = move_records(&cx, source, &target).await.unwrap();

    assert_eq!(result.move_count, Some(0));
    let statements = conn.statements();
    let create = statements.iter().find(|s| s.starts_with("CREATE TABLE")).unwrap();
    assert!(create.contains(r#""s"."t""#));
    assert!(create.contains(r#""id""#));
}

#[tokio::test]
async fn test_empty_dataframes_without_schema() {
    let cx = cx();
    let conn = Arc::new(RecordingConnection::default());
    let target = Target::Table(TableTarget::new(Arc::new(PostgresDriver::new(conn.clone())), "s", "t"));
    let source = Source::Dataframes(DataframesSource::from_batches(Vec::new()));

    let err = move_records(&cx, source, &target).await.unwrap_err();
    assert!(matches!(err, MoverError::SchemaMissing(_)));
    assert!(!conn.statements().iter().any(|s| s.starts_with("CREATE TABLE")));

    // An existing table needs no schema; nothing is loaded into it
    conn.set_columns("s", "t", vec![ColumnInfo::new("id", "bigint", true)]);
    let source = Source::Dataframes(DataframesSource::from_batches(Vec::new()));
    let result = move_records(&cx, source, &target).await.unwrap();
    assert_eq!(result.move_count, Some(0));
    assert!(!conn.statements().iter().any(|s| s.starts_with("CREATE TABLE")));
}
