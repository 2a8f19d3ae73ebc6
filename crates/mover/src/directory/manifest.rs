// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The `manifest` / `_manifest` document, shared with Redshift's
//! `COPY ... MANIFEST` format.

use serde::{Deserialize, Serialize};

/// Name of the preliminary manifest
pub const PRELIMINARY: &str = "manifest";

/// Name of the finalized manifest; its existence marks a complete directory
pub const FINAL: &str = "_manifest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub content_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
    /// Older producers omit this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<EntryMeta>,
}

fn default_mandatory() -> bool {
    true
}

impl ManifestEntry {
    #[must_use]
    pub fn new(url: &str, content_length: u64) -> Self {
        Self {
            url: url.to_string(),
            mandatory: true,
            meta: Some(EntryMeta { content_length }),
        }
    }

    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.meta.map(|m| m.content_length)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.url.clone()).collect()
    }
}

/// Whether a directory listing entry holds data rather than metadata
#[must_use]
pub fn is_data_file(name: &str) -> bool {
    !(name.starts_with('_') || name == PRELIMINARY || name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerates_missing_meta_and_mandatory() {
        let doc = r#"{"entries":[{"url":"s3://b/a.csv"},{"url":"s3://b/b.csv","mandatory":false,"meta":{"content_length":7}}]}"#;
        let manifest: Manifest = serde_json::from_str(doc).unwrap();
        assert!(manifest.entries[0].mandatory);
        assert_eq!(manifest.entries[0].content_length(), None);
        assert!(!manifest.entries[1].mandatory);
        assert_eq!(manifest.entries[1].content_length(), Some(7));
    }

    #[test]
    fn test_written_form() {
        let manifest = Manifest {
            entries: vec![ManifestEntry::new("mem://b/data.csv", 12)],
        };
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"entries":[{"url":"mem://b/data.csv","mandatory":true,"meta":{"content_length":12}}]})
        );
    }

    #[test]
    fn test_data_file_names() {
        assert!(is_data_file("data000.csv.gz"));
        assert!(is_data_file("0000_part_00"));
        assert!(!is_data_file("_schema.json"));
        assert!(!is_data_file("_format_delimited"));
        assert!(!is_data_file("manifest"));
        assert!(!is_data_file("_manifest"));
    }
}
