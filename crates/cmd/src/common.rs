// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use diagnostics::*;
use mover::sources::{DataUrlSource, DirectorySource};
use mover::{MoveContext, MoverConfig, Source, load_config};
use records::{PartialHints, ProcessingInstructions, RecordsFormat};
use serde_json::Value;

/// `--variant` and repeated `--hint key=value`
#[derive(Args, Debug, Default, Clone)]
pub struct FormatArgs {
    /// Delimited variant (dumb, csv, bigquery, bluelabs, vertica), or parquet / avro
    #[arg(long)]
    pub variant: Option<String>,

    /// Hint override, e.g. `compression=null` or `field-delimiter=|`
    #[arg(long = "hint", value_name = "KEY=VALUE")]
    pub hints: Vec<String>,
}

impl FormatArgs {
    pub fn partial_hints(&self) -> Result<PartialHints> {
        hints_from_args(&self.hints)
    }

    /// The format these arguments pin, if any
    pub fn records_format(&self, pi: &ProcessingInstructions) -> Result<Option<RecordsFormat>> {
        let hints = self.partial_hints()?;
        match self.variant.as_deref() {
            Some("parquet") => Ok(Some(RecordsFormat::Parquet)),
            Some("avro") => Ok(Some(RecordsFormat::Avro)),
            Some(variant) => Ok(Some(RecordsFormat::delimited_named(variant, hints, pi)?)),
            None if hints.is_empty() => Ok(None),
            None => Ok(Some(RecordsFormat::bluelabs().alter_hints(&hints))),
        }
    }
}

/// Build the move context from `path`, or from defaults without one
pub fn load_context(path: Option<&Path>) -> Result<MoveContext> {
    let config = match path {
        Some(path) => {
            let shown = path.display().to_string();
            let config = load_config(path).with_context(|| format!("Failed to load configuration {shown}"))?;
            debug!("Loaded configuration from {shown}", shown: shown);
            config
        }
        None => MoverConfig::default(),
    };
    Ok(MoveContext::from_config(&config)?)
}

/// Split `key=value`; the value is read as JSON when it parses, else as a string
pub fn parse_hint(arg: &str) -> Result<(String, Value)> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Hint must look like key=value, got '{arg}'"))?;
    if key.is_empty() {
        return Err(anyhow!("Hint '{arg}' has no key"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

pub fn hints_from_args(args: &[String]) -> Result<PartialHints> {
    let mut hints = PartialHints::new();
    for arg in args {
        let (key, value) = parse_hint(arg)?;
        _ = hints.insert(key, value);
    }
    Ok(hints)
}

/// A URL ending in `/` is a records directory; anything else is one file
/// whose format is sniffed, with `hints` taking precedence
pub async fn open_source(cx: &MoveContext, url: &str, hints: PartialHints) -> Result<Source> {
    if url.ends_with('/') {
        let directory = cx.records_directory(url)?;
        let source = DirectorySource::open(directory, None, cx.processing_instructions())
            .await
            .with_context(|| format!("Failed to open records directory {url}"))?;
        return Ok(Source::Directory(source));
    }
    let file = cx.file_url(url)?;
    let source = DataUrlSource::sniff(file, hints)
        .await
        .with_context(|| format!("Failed to read {url}"))?;
    Ok(Source::DataUrl(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hint_values() {
        assert_eq!(parse_hint("header-row=true").unwrap(), ("header-row".into(), json!(true)));
        assert_eq!(parse_hint("compression=null").unwrap(), ("compression".into(), json!(null)));
        assert_eq!(parse_hint("field-delimiter=|").unwrap(), ("field-delimiter".into(), json!("|")));
        assert_eq!(parse_hint("escape=\\").unwrap(), ("escape".into(), json!("\\")));
        assert!(parse_hint("header-row").is_err());
        assert!(parse_hint("=x").is_err());
    }

    #[test]
    fn test_format_args() {
        let pi = ProcessingInstructions::default();
        assert_eq!(FormatArgs::default().records_format(&pi).unwrap(), None);

        let parquet = FormatArgs {
            variant: Some("parquet".into()),
            hints: Vec::new(),
        };
        assert_eq!(parquet.records_format(&pi).unwrap(), Some(RecordsFormat::Parquet));

        let csv = FormatArgs {
            variant: Some("csv".into()),
            hints: vec!["compression=null".into()],
        };
        let format = csv.records_format(&pi).unwrap().unwrap();
        let delimited = format.as_delimited().unwrap();
        assert_eq!(delimited.hints()["compression"], json!(null));
        assert_eq!(delimited.hints()["header-row"], json!(true));

        let unknown = FormatArgs {
            variant: Some("fixed-width".into()),
            hints: Vec::new(),
        };
        assert!(unknown.records_format(&pi).is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mvrec.yaml");
        std::fs::write(&path, "poll_interval: 0s\n").unwrap();
        let err = load_context(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("poll_interval"));
        assert!(load_context(None).is_ok());
    }
}
