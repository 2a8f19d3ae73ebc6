// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Vendor drivers and their records-format option mappings.

pub mod bigquery;
pub mod mysql;
pub mod postgres;
pub mod redshift;
pub mod vertica;

use records::{PartialHints, RecordsFormat, Variant};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use urlfs::Fileobj;

use crate::error::Result;

/// Single quoted SQL string literal
#[must_use]
pub fn sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Character literal, octal-escaped when it is not printable
#[must_use]
pub fn octal_char(c: char) -> String {
    if c.is_ascii_graphic() || c == ' ' {
        sql_string(&c.to_string())
    } else {
        format!("'\\{:03o}'", u32::from(c))
    }
}

/// Delimited format from a variant with a few hints changed
#[must_use]
pub fn delimited<const N: usize>(variant: Variant, overrides: [(&str, Value); N]) -> RecordsFormat {
    let hints: PartialHints = overrides
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    RecordsFormat::delimited(variant, hints)
}

/// Read a whole fileobj from its start
pub async fn read_fileobj(fileobj: &mut Fileobj) -> Result<Vec<u8>> {
    _ = fileobj.seek(std::io::SeekFrom::Start(0)).await?;
    let mut data = Vec::new();
    _ = fileobj.read_to_end(&mut data).await?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(sql_string("it's"), "'it''s'");
        assert_eq!(octal_char(','), "','");
        assert_eq!(octal_char('\u{1}'), "'\\001'");
        assert_eq!(octal_char('\t'), "'\\011'");
    }
}
