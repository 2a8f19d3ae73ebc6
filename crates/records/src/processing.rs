// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Strictness settings threaded through every move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingInstructions {
    /// Error when a hint is left unconsumed by a translator
    #[serde(default = "default_true")]
    pub fail_if_dont_understand: bool,

    /// Error when a hint value cannot be represented exactly
    #[serde(default = "default_true")]
    pub fail_if_cant_handle_hint: bool,

    /// Error on any row the vendor rejects
    #[serde(default = "default_true")]
    pub fail_if_row_invalid: bool,

    #[serde(default = "default_max_inference_rows")]
    pub max_inference_rows: Option<u64>,

    #[serde(default)]
    pub max_failure_rows: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_max_inference_rows() -> Option<u64> {
    Some(1000)
}

impl Default for ProcessingInstructions {
    fn default() -> Self {
        Self {
            fail_if_dont_understand: true,
            fail_if_cant_handle_hint: true,
            fail_if_row_invalid: true,
            max_inference_rows: default_max_inference_rows(),
            max_failure_rows: None,
        }
    }
}

impl ProcessingInstructions {
    /// Every strictness flag off
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            fail_if_dont_understand: false,
            fail_if_cant_handle_hint: false,
            fail_if_row_invalid: false,
            ..Self::default()
        }
    }

    /// Sample size for inference, `usize::MAX` when unbounded
    #[must_use]
    pub fn inference_rows(&self) -> usize {
        self.max_inference_rows
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX))
    }
}
