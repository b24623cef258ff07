use super::{check_size, FrameCodec};
use crate::error::{CodecError, Result};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

// Upper bound on deflate's expansion ratio; caps the up-front allocation
const MAX_INFLATE_RATIO: usize = 1032;

/// Lossless deflate with zlib framing.
#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: u32,
}

impl ZlibCodec {
    /// Default level (6).
    pub const fn new() -> Self {
        Self { level: 6 }
    }

    /// Level 0 (store) to 9 (best); higher values are clamped.
    pub const fn with_level(level: u32) -> Self {
        Self {
            level: if level > 9 { 9 } else { level },
        }
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for ZlibCodec {
    fn compress(&self, raw: &[u8]) -> Result<Bytes> {
        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(raw.len() / 4 + 64),
            Compression::new(self.level),
        );
        encoder.write_all(raw)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    fn decompress(&self, blob: &[u8], expected_size: usize) -> Result<Bytes> {
        // Read one byte past the expected size so oversized payloads are
        // detected without inflating all of them.
        let reserve = expected_size.min(blob.len().saturating_mul(MAX_INFLATE_RATIO));
        let mut out = Vec::with_capacity(reserve);
        ZlibDecoder::new(blob)
            .take((expected_size as u64).saturating_add(1))
            .read_to_end(&mut out)
            .map_err(|e| CodecError::DecompressionFailed(e.to_string()))?;
        check_size(expected_size, out.len())?;
        Ok(Bytes::from(out))
    }
}
