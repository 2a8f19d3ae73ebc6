// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use records::RecordsError;

#[derive(Debug, thiserror::Error)]
pub enum MoverError {
    #[error("Records directory is not empty: {0}")]
    RecordsFolderNonEmpty(String),

    #[error("No compatible move path from {0}")]
    NoCompatibleMovePath(String),

    #[error("Hints not understood: {}", hints.join(", "))]
    UnhandledHint { hints: Vec<String> },

    #[error("Cannot handle hint {hint}={value}: {reason}")]
    CantHandleHint {
        hint: String,
        value: String,
        reason: String,
    },

    #[error("Load failed: {0}")]
    Load(String),

    #[error("Unload failed: {0}")]
    Unload(String),

    #[error("No scratch bucket configured for {0}")]
    NoTemporaryBucketConfiguration(String),

    #[error("Credentials cannot be used for an S3 export: {0}")]
    CredsDoNotSupportS3Export(String),

    #[error("Credentials cannot be used for an S3 import: {0}")]
    CredsDoNotSupportS3Import(String),

    #[error("No records schema available for {0}")]
    SchemaMissing(String),

    #[error("No compatible records format")]
    NoCompatibleFormat,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Duplicate column name: {0}")]
    DuplicateColumnName(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Records error: {0}")]
    Records(RecordsError),

    #[error("URL error: {0}")]
    Url(#[from] urlfs::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RecordsError> for MoverError {
    fn from(err: RecordsError) -> Self {
        match err {
            RecordsError::UnhandledHint { hints } => MoverError::UnhandledHint { hints },
            RecordsError::CantHandleHint {
                hint,
                value,
                reason,
            } => MoverError::CantHandleHint {
                hint,
                value,
                reason,
            },
            RecordsError::NoCompatibleFormat => MoverError::NoCompatibleFormat,
            other => MoverError::Records(other),
        }
    }
}

impl MoverError {
    pub fn database<M: Into<String>>(message: M) -> Self {
        MoverError::Database(message.into())
    }

    pub fn not_supported<M: Into<String>>(message: M) -> Self {
        MoverError::NotSupported(message.into())
    }

    /// Vendor rejected a load; the only kind retried after drop-and-recreate
    #[must_use]
    pub fn is_load_error(&self) -> bool {
        matches!(self, MoverError::Load(_))
    }
}

pub type Result<T> = std::result::Result<T, MoverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_errors_keep_their_kind() {
        let err: MoverError = RecordsError::cant_handle("escape", "\\", "no escapes").into();
        assert!(matches!(err, MoverError::CantHandleHint { ref hint, .. } if hint == "escape"));

        let err: MoverError = RecordsError::UnhandledHint {
            hints: vec!["made-up".into()],
        }
        .into();
        assert_eq!(err.to_string(), "Hints not understood: made-up");

        let err: MoverError = RecordsError::InvalidSchema("x".into()).into();
        assert!(matches!(err, MoverError::Records(_)));
    }
}
