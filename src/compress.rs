//! Transfer encoding for file content.
//!
//! UPLOAD and DOWNLOAD carry file bytes as base64 text inside the JSON
//! payload, optionally zlib-compressed first. A compressed transfer also
//! carries the uncompressed length, which the receiver checks.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use std::io::{Read, Write};
use thiserror::Error;

/// Errors produced while decoding transfer content.
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("Decompress failed: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("Decompress failed: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// Compresses `data` with zlib at the default level.
pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflates zlib `data` and checks that it yields exactly `original_size` bytes.
pub fn decompress(data: &[u8], original_size: u64) -> Result<Vec<u8>, CompressError> {
    // Read one byte past the expected size so oversized output is detected
    // without inflating all of it.
    let mut decoder = ZlibDecoder::new(data).take(original_size.saturating_add(1));
    let mut out = Vec::with_capacity(original_size.min(1 << 20) as usize);
    decoder.read_to_end(&mut out)?;

    if out.len() as u64 != original_size {
        return Err(CompressError::SizeMismatch {
            expected: original_size,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}

/// Standard base64 with padding.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_roundtrip() {
        let data = b"flashftp ".repeat(200);
        let packed = compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, data.len() as u64).unwrap(), data);
    }

    #[test]
    fn test_empty_input() {
        let packed = compress(b"").unwrap();
        assert!(decompress(&packed, 0).unwrap().is_empty());
    }

    #[test]
    fn test_size_mismatch() {
        let packed = compress(b"hello world").unwrap();
        assert!(matches!(
            decompress(&packed, 5),
            Err(CompressError::SizeMismatch { expected: 5, .. })
        ));
        assert!(matches!(
            decompress(&packed, 50),
            Err(CompressError::SizeMismatch { expected: 50, actual: 11 })
        ));
    }

    #[test]
    fn test_corrupt_input() {
        assert!(matches!(
            decompress(b"definitely not zlib", 10),
            Err(CompressError::Inflate(_))
        ));
    }

    #[test]
    fn test_base64() {
        assert_eq!(encode_base64(b"hi!"), "aGkh");
        assert_eq!(encode_base64(b"h"), "aA==");
        assert_eq!(decode_base64("aGkh").unwrap(), b"hi!");
        assert!(decode_base64("not base64!").is_err());
    }
}
