// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the records model

#[derive(Debug, thiserror::Error)]
pub enum RecordsError {
    #[error("Hints not understood: {}", hints.join(", "))]
    UnhandledHint { hints: Vec<String> },

    #[error("Cannot handle hint {hint}={value}: {reason}")]
    CantHandleHint {
        hint: String,
        value: String,
        reason: String,
    },

    #[error("Unknown records format variant: {0}")]
    UnknownVariant(String),

    #[error("Unknown records format type: {0}")]
    UnknownFormatType(String),

    #[error("No compatible records format")]
    NoCompatibleFormat,

    #[error("Invalid records schema: {0}")]
    InvalidSchema(String),

    #[error("Unsupported column type for {column}: {data_type}")]
    UnsupportedColumnType { column: String, data_type: String },

    #[error("Invalid {what}: {message}")]
    Decode { what: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordsError {
    pub fn cant_handle<H, V, R>(hint: H, value: V, reason: R) -> Self
    where
        H: Into<String>,
        V: std::fmt::Display,
        R: Into<String>,
    {
        RecordsError::CantHandleHint {
            hint: hint.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn decode<W: Into<String>, M: Into<String>>(what: W, message: M) -> Self {
        RecordsError::Decode {
            what: what.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecordsError>;
