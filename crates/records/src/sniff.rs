// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Guess delimited hints from the head of a file and its name.

use std::io::Read;

use diagnostics::*;
use serde_json::{Value, json};

use crate::compression::{decompress_reader, detect_compression};
use crate::encoding::{decode_text, detect_bom};
use crate::hints::{Compression, Encoding, HintName, PartialHints, RecordTerminator};

/// Bytes of a file examined when sniffing
pub const SNIFF_BYTES: usize = 64 * 1024;

const DELIMITER_CANDIDATES: [char; 5] = [',', '\t', '|', ';', '\u{1}'];

fn insert(hints: &mut PartialHints, name: HintName, value: Value) {
    _ = hints.insert(name.as_str().to_string(), value);
}

/// Decompress as much of a truncated stream as possible
fn decompress_prefix(compression: Compression, head: &[u8]) -> Option<Vec<u8>> {
    let mut reader = decompress_reader(Some(compression), head).ok()?;
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
    Some(out)
}

fn decode_prefix(encoding: Encoding, bytes: &[u8]) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        e if e.is_utf16() => {
            let even = &bytes[..bytes.len() - bytes.len() % 2];
            decode_text(e, even).unwrap_or_default()
        }
        e => decode_text(e, bytes).unwrap_or_default(),
    }
}

fn detect_terminator(text: &str) -> Option<RecordTerminator> {
    let pos = text.find(['\r', '\n'])?;
    let rest = &text[pos..];
    Some(if rest.starts_with("\r\n") {
        RecordTerminator::CrLf
    } else if rest.starts_with('\r') {
        RecordTerminator::Cr
    } else {
        RecordTerminator::Lf
    })
}

fn detect_delimiter(lines: &[&str]) -> Option<char> {
    let mut best: Option<(char, usize, usize)> = None;
    for candidate in DELIMITER_CANDIDATES {
        let counts: Vec<usize> = lines.iter().map(|l| l.matches(candidate).count()).collect();
        let Some(&first) = counts.first() else {
            continue;
        };
        if first == 0 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == first).count();
        let better = match best {
            None => true,
            Some((_, bc, bf)) => (consistent, first) > (bc, bf),
        };
        if better {
            best = Some((candidate, consistent, first));
        }
    }
    best.map(|(c, _, _)| c)
}

fn looks_numeric(cell: &str) -> bool {
    let cell = cell.trim().trim_matches('"');
    !cell.is_empty() && cell.parse::<f64>().is_ok()
}

/// Hints that could be determined; absent keys were not guessed.
#[must_use]
pub fn sniff_hints(head: &[u8], filename: Option<&str>) -> PartialHints {
    let mut hints = PartialHints::new();

    let compression =
        detect_compression(head).or_else(|| filename.and_then(Compression::from_extension));
    insert(
        &mut hints,
        HintName::Compression,
        compression.map_or(Value::Null, |c| json!(c.as_str())),
    );

    let plain = match compression {
        None => head.to_vec(),
        Some(Compression::Lzo) => {
            debug!("LZO input cannot be sniffed beyond its compression");
            return hints;
        }
        Some(c) => match decompress_prefix(c, head) {
            Some(bytes) => bytes,
            None => return hints,
        },
    };

    let encoding = detect_bom(&plain).unwrap_or(Encoding::Utf8);
    insert(&mut hints, HintName::Encoding, json!(encoding.as_str()));
    let text = decode_prefix(encoding, &plain);

    let Some(terminator) = detect_terminator(&text) else {
        return hints;
    };
    insert(
        &mut hints,
        HintName::RecordTerminator,
        json!(terminator.as_str()),
    );

    let mut lines: Vec<&str> = text.split(terminator.as_str()).collect();
    // The final piece is usually cut off by the sniff window
    if lines.len() > 1 {
        _ = lines.pop();
    }
    lines.retain(|l| !l.is_empty());

    let Some(delimiter) = detect_delimiter(&lines) else {
        return hints;
    };
    insert(
        &mut hints,
        HintName::FieldDelimiter,
        json!(delimiter.to_string()),
    );

    let rows: Vec<Vec<&str>> = lines.iter().map(|l| l.split(delimiter).collect()).collect();
    let quoted = rows
        .iter()
        .flatten()
        .any(|cell| cell.starts_with('"') || cell.ends_with('"'));
    if quoted {
        insert(&mut hints, HintName::Quoting, json!("minimal"));
        insert(&mut hints, HintName::Quotechar, json!("\""));
        insert(&mut hints, HintName::Doublequote, json!(true));
    }

    if let Some((first, rest)) = rows.split_first() {
        if !rest.is_empty() {
            let first_numeric = first.iter().any(|c| looks_numeric(c));
            let later_numeric = rest.iter().flatten().any(|c| looks_numeric(c));
            insert(
                &mut hints,
                HintName::HeaderRow,
                json!(!first_numeric && later_numeric),
            );
        }
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::compress_bytes;

    #[test]
    fn test_sniff_plain_csv_with_header() {
        let data = b"id,name,score\r\n1,\"a, b\",2.5\r\n2,c,3\r\n";
        let hints = sniff_hints(data, Some("in.csv"));
        assert_eq!(hints["compression"], Value::Null);
        assert_eq!(hints["record-terminator"], json!("\r\n"));
        assert_eq!(hints["field-delimiter"], json!(","));
        assert_eq!(hints["quoting"], json!("minimal"));
        assert_eq!(hints["header-row"], json!(true));
    }

    #[test]
    fn test_sniff_gzipped_tsv_without_header() {
        let data = compress_bytes(Some(Compression::Gzip), b"1\tx\n2\ty\n3\tz\n").unwrap();
        let hints = sniff_hints(&data, Some("in.tsv.gz"));
        assert_eq!(hints["compression"], json!("GZIP"));
        assert_eq!(hints["field-delimiter"], json!("\t"));
        assert_eq!(hints["header-row"], json!(false));
        assert!(!hints.contains_key("quoting"));
    }

    #[test]
    fn test_sniff_lzo_by_extension() {
        let hints = sniff_hints(b"opaque", Some("x.csv.lzo"));
        assert_eq!(hints["compression"], json!("LZO"));
        assert_eq!(hints.len(), 1);
    }
}
