// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Outcome of a move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoveResult {
    /// Rows moved, when the strategy can tell
    pub move_count: Option<u64>,
    /// Named locations written, e.g. `{"manifest": "s3://..."}`
    pub output_urls: Option<BTreeMap<String, String>>,
}

impl MoveResult {
    #[must_use]
    pub fn with_count(move_count: Option<u64>) -> Self {
        Self {
            move_count,
            output_urls: None,
        }
    }

    #[must_use]
    pub fn with_output_url(mut self, name: &str, url: &str) -> Self {
        _ = self
            .output_urls
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), url.to_string());
        self
    }
}

impl fmt::Display for MoveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.move_count {
            Some(n) => write!(f, "moved {n} rows")?,
            None => f.write_str("moved an unknown number of rows")?,
        }
        if let Some(urls) = &self.output_urls {
            for (name, url) in urls {
                write!(f, "; {name}: {url}")?;
            }
        }
        Ok(())
    }
}
