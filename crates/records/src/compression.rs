// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-process GZIP and BZIP codecs.
//!
//! Readers decode every member of concatenated streams. LZO can be named in
//! hints but is never encoded or decoded here.

use std::io::{self, Read, Write};

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use crate::error::{RecordsError, Result};
use crate::hints::Compression;

fn lzo_unsupported() -> RecordsError {
    RecordsError::cant_handle("compression", "LZO", "LZO cannot be processed locally")
}

/// Magic-number check on the head of a file
#[must_use]
pub fn detect_compression(head: &[u8]) -> Option<Compression> {
    if head.starts_with(&[0x1f, 0x8b]) {
        Some(Compression::Gzip)
    } else if head.starts_with(b"BZh") {
        Some(Compression::Bzip)
    } else if head.starts_with(&[0x89, 0x4c, 0x5a, 0x4f]) {
        Some(Compression::Lzo)
    } else {
        None
    }
}

/// Wrap a reader so it yields decompressed bytes.
pub fn decompress_reader<'a, R: Read + Send + 'a>(
    compression: Option<Compression>,
    reader: R,
) -> Result<Box<dyn Read + Send + 'a>> {
    Ok(match compression {
        None => Box::new(reader),
        Some(Compression::Gzip) => Box::new(MultiGzDecoder::new(reader)),
        Some(Compression::Bzip) => Box::new(MultiBzDecoder::new(reader)),
        Some(Compression::Lzo) => return Err(lzo_unsupported()),
    })
}

pub fn decompress_bytes(compression: Option<Compression>, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    _ = decompress_reader(compression, data)?.read_to_end(&mut out)?;
    Ok(out)
}

/// A writer that compresses on the way through; call [`finish`](Self::finish)
/// to flush trailers.
pub enum CompressedWriter<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Bzip(BzEncoder<W>),
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(compression: Option<Compression>, inner: W) -> Result<Self> {
        Ok(match compression {
            None => CompressedWriter::Plain(inner),
            Some(Compression::Gzip) => {
                CompressedWriter::Gzip(GzEncoder::new(inner, flate2::Compression::default()))
            }
            Some(Compression::Bzip) => {
                CompressedWriter::Bzip(BzEncoder::new(inner, bzip2::Compression::default()))
            }
            Some(Compression::Lzo) => return Err(lzo_unsupported()),
        })
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            CompressedWriter::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            CompressedWriter::Gzip(e) => e.finish(),
            CompressedWriter::Bzip(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressedWriter::Plain(w) => w.write(buf),
            CompressedWriter::Gzip(e) => e.write(buf),
            CompressedWriter::Bzip(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressedWriter::Plain(w) => w.flush(),
            CompressedWriter::Gzip(e) => e.flush(),
            CompressedWriter::Bzip(e) => e.flush(),
        }
    }
}

pub fn compress_bytes(compression: Option<Compression>, data: &[u8]) -> Result<Vec<u8>> {
    let mut writer = CompressedWriter::new(compression, Vec::new())?;
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_members_concatenate() {
        let mut joined = compress_bytes(Some(Compression::Gzip), b"a,1\n").unwrap();
        joined.extend(compress_bytes(Some(Compression::Gzip), b"b,2\n").unwrap());
        assert_eq!(detect_compression(&joined), Some(Compression::Gzip));
        let plain = decompress_bytes(Some(Compression::Gzip), &joined).unwrap();
        assert_eq!(plain, b"a,1\nb,2\n");
    }

    #[test]
    fn test_bzip_members_concatenate() {
        let mut joined = compress_bytes(Some(Compression::Bzip), b"x\n").unwrap();
        joined.extend(compress_bytes(Some(Compression::Bzip), b"y\n").unwrap());
        assert_eq!(detect_compression(&joined), Some(Compression::Bzip));
        assert_eq!(
            decompress_bytes(Some(Compression::Bzip), &joined).unwrap(),
            b"x\ny\n"
        );
    }

    #[test]
    fn test_lzo_is_refused() {
        assert!(matches!(
            compress_bytes(Some(Compression::Lzo), b"x"),
            Err(RecordsError::CantHandleHint { .. })
        ));
        assert_eq!(detect_compression(b"plain"), None);
    }
}
