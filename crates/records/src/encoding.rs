// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Transcoding between UTF-8 and the other text encodings hints may name.

use encoding_rs::{UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};

use crate::error::{RecordsError, Result};
use crate::hints::Encoding;

const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];
const UTF16LE_BOM: &[u8] = &[0xff, 0xfe];
const UTF16BE_BOM: &[u8] = &[0xfe, 0xff];

/// Encoding implied by a byte order mark
#[must_use]
pub fn detect_bom(head: &[u8]) -> Option<Encoding> {
    if head.starts_with(UTF8_BOM) {
        Some(Encoding::Utf8)
    } else if head.starts_with(UTF16LE_BOM) {
        Some(Encoding::Utf16Le)
    } else if head.starts_with(UTF16BE_BOM) {
        Some(Encoding::Utf16Be)
    } else {
        None
    }
}

fn decode_strict(codec: &'static encoding_rs::Encoding, what: Encoding, bytes: &[u8]) -> Result<String> {
    codec
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| RecordsError::decode(format!("{what} text"), "malformed input"))
}

/// Decode text in `encoding`, dropping any byte order mark.
pub fn decode_text(encoding: Encoding, bytes: &[u8]) -> Result<String> {
    match encoding {
        Encoding::Utf8 => decode_strict(UTF_8, encoding, bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)),
        Encoding::Utf16 => match bytes {
            [0xfe, 0xff, rest @ ..] => decode_strict(UTF_16BE, encoding, rest),
            [0xff, 0xfe, rest @ ..] => decode_strict(UTF_16LE, encoding, rest),
            _ => decode_strict(UTF_16LE, encoding, bytes),
        },
        Encoding::Utf16Le => decode_strict(UTF_16LE, encoding, bytes.strip_prefix(UTF16LE_BOM).unwrap_or(bytes)),
        Encoding::Utf16Be => decode_strict(UTF_16BE, encoding, bytes.strip_prefix(UTF16BE_BOM).unwrap_or(bytes)),
        // encoding_rs treats ISO-8859-1 as windows-1252; true latin1 is the identity on code points
        Encoding::Latin1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
        Encoding::Cp1252 => Ok(WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()),
    }
}

fn unencodable(encoding: Encoding, c: char) -> RecordsError {
    RecordsError::decode(
        format!("{encoding} text"),
        format!("character {c:?} cannot be encoded"),
    )
}

/// Encode UTF-8 text into `encoding`. `UTF16` output carries a little-endian BOM.
pub fn encode_text(encoding: Encoding, text: &str) -> Result<Vec<u8>> {
    match encoding {
        Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        Encoding::Utf16 => {
            let mut out = UTF16LE_BOM.to_vec();
            out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
            Ok(out)
        }
        Encoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        Encoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
        Encoding::Latin1 => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).map_err(|_| unencodable(encoding, c)))
            .collect(),
        Encoding::Cp1252 => {
            let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
            if unmappable {
                let c = text
                    .chars()
                    .find(|c| WINDOWS_1252.encode(c.encode_utf8(&mut [0; 4])).2)
                    .unwrap_or('\u{fffd}');
                return Err(unencodable(encoding, c));
            }
            Ok(bytes.into_owned())
        }
    }
}
