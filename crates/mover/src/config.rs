// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! YAML configuration for moves.

use std::path::Path;
use std::time::Duration;

use records::ProcessingInstructions;
use serde::{Deserialize, Serialize};
use urlfs::{AwsConfig, GcsConfig, UrlConfig};

use crate::directory::WaitSettings;
use crate::error::{MoverError, Result};

/// Scratch locations used for temp-staged moves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchConfig {
    #[serde(default)]
    pub s3: Option<String>,
    #[serde(default)]
    pub gcs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetsConfig {
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoverConfig {
    #[serde(default)]
    pub processing_instructions: ProcessingInstructions,

    #[serde(default)]
    pub scratch: ScratchConfig,

    #[serde(default)]
    pub aws: Option<AwsConfig>,

    #[serde(default)]
    pub gcs: Option<GcsConfig>,

    #[serde(default)]
    pub google_sheets: Option<SheetsConfig>,

    /// How often to poll for eventually consistent objects, e.g. `2s`
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// How long to wait for them, e.g. `10m`
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: String,
}

fn default_poll_interval() -> String {
    "2s".to_string()
}

fn default_wait_timeout() -> String {
    "10m".to_string()
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            processing_instructions: ProcessingInstructions::default(),
            scratch: ScratchConfig::default(),
            aws: None,
            gcs: None,
            google_sheets: None,
            poll_interval: default_poll_interval(),
            wait_timeout: default_wait_timeout(),
        }
    }
}

fn duration(name: &str, value: &str) -> Result<Duration> {
    parse_duration::parse(value)
        .map_err(|e| MoverError::Config(format!("invalid {name} {value:?}: {e}")))
}

impl MoverConfig {
    #[must_use]
    pub fn url_config(&self) -> UrlConfig {
        UrlConfig {
            aws: self.aws.clone(),
            gcs: self.gcs.clone(),
        }
    }

    pub fn wait_settings(&self) -> Result<WaitSettings> {
        Ok(WaitSettings {
            poll: duration("poll_interval", &self.poll_interval)?,
            timeout: duration("wait_timeout", &self.wait_timeout)?,
        })
    }
}

/// Load configuration from YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MoverConfig> {
    let content = std::fs::read_to_string(&path)?;
    let config: MoverConfig = serde_yaml_ng::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &MoverConfig) -> Result<()> {
    let scratch = [
        ("scratch.s3", config.scratch.s3.as_deref(), "s3://"),
        ("scratch.gcs", config.scratch.gcs.as_deref(), "gs://"),
    ];
    for (name, url, prefix) in scratch {
        match url {
            Some("") => return Err(MoverError::Config(format!("{name} cannot be empty"))),
            Some(url) if !url.starts_with(prefix) => {
                return Err(MoverError::Config(format!(
                    "{name} must be a {prefix} URL, got {url}"
                )));
            }
            _ => {}
        }
    }

    let wait = config.wait_settings()?;
    if wait.poll.is_zero() {
        return Err(MoverError::Config(
            "poll_interval must be greater than 0".to_string(),
        ));
    }

    if let Some(sheets) = &config.google_sheets {
        if sheets.access_token.is_empty() {
            return Err(MoverError::Config(
                "google_sheets.access_token cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: MoverConfig = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(config, MoverConfig::default());
        validate_config(&config).unwrap();
        let wait = config.wait_settings().unwrap();
        assert_eq!(wait.poll, Duration::from_secs(2));
        assert_eq!(wait.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
processing_instructions:
  fail_if_row_invalid: false
  max_failure_rows: 10
scratch:
  s3: s3://scratch-bucket/tmp/
  gcs: gs://scratch-bucket/tmp/
aws:
  region: us-west-2
poll_interval: 500ms
wait_timeout: 1m
"#;
        let config: MoverConfig = serde_yaml_ng::from_str(yaml).unwrap();
        validate_config(&config).unwrap();
        assert!(!config.processing_instructions.fail_if_row_invalid);
        assert!(config.processing_instructions.fail_if_dont_understand);
        assert_eq!(config.processing_instructions.max_failure_rows, Some(10));
        assert_eq!(
            config.url_config().aws.unwrap().region.as_deref(),
            Some("us-west-2")
        );
        assert_eq!(
            config.wait_settings().unwrap().poll,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_rejects_bad_scratch_and_poll() {
        let mut config = MoverConfig::default();
        config.scratch.s3 = Some("gs://wrong/".into());
        assert!(matches!(validate_config(&config), Err(MoverError::Config(_))));

        let mut config = MoverConfig::default();
        config.scratch.gcs = Some(String::new());
        assert!(validate_config(&config).is_err());

        let config = MoverConfig {
            poll_interval: "0s".into(),
            ..MoverConfig::default()
        };
        assert!(validate_config(&config).is_err());

        let config = MoverConfig {
            wait_timeout: "soon".into(),
            ..MoverConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
