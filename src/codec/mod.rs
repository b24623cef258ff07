//! # Frame Codec
//!
//! Intra-only compression of single frames. Every frame is compressed on its
//! own, so any frame can be decoded without touching its neighbours.
//!
//! ```rust
//! use sanchez::codec::{decode_frame, encode_frame};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let raw = vec![7u8; 64 * 64 * 3];
//! let blob = encode_frame(&raw, true)?;
//! assert!(blob.len() < raw.len());
//!
//! let back = decode_frame(&blob, true, raw.len())?;
//! assert_eq!(&back[..], &raw[..]);
//! # Ok(())
//! # }
//! ```

/// zlib (deflate) implementation
pub mod zlib;

use crate::error::{CodecError, Result};
use bytes::Bytes;

pub use zlib::ZlibCodec;

/// Compresses and decompresses one frame's pixel buffer.
pub trait FrameCodec: Send + Sync {
    /// Encodes one raw frame into its stored form.
    fn compress(&self, raw: &[u8]) -> Result<Bytes>;

    /// Inverse of [`FrameCodec::compress`]; the result must be exactly `expected_size` bytes.
    fn decompress(&self, blob: &[u8], expected_size: usize) -> Result<Bytes>;
}

/// Stores frames unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl FrameCodec for Passthrough {
    fn compress(&self, raw: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(raw))
    }

    fn decompress(&self, blob: &[u8], expected_size: usize) -> Result<Bytes> {
        check_size(expected_size, blob.len())?;
        Ok(Bytes::copy_from_slice(blob))
    }
}

static ZLIB: ZlibCodec = ZlibCodec::new();
static PASSTHROUGH: Passthrough = Passthrough;

/// The codec a container's `compressed` flag selects.
pub fn codec_for(compressed: bool) -> &'static dyn FrameCodec {
    if compressed {
        &ZLIB
    } else {
        &PASSTHROUGH
    }
}

/// Compresses (or copies) one raw frame for storage.
pub fn encode_frame(raw: &[u8], compressed: bool) -> Result<Bytes> {
    codec_for(compressed).compress(raw)
}

/// Turns a stored blob back into exactly `expected_size` bytes of pixels.
pub fn decode_frame(blob: &[u8], compressed: bool, expected_size: usize) -> Result<Bytes> {
    codec_for(compressed).decompress(blob, expected_size)
}

pub(crate) fn check_size(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CodecError::SizeMismatch { expected, actual }.into());
    }
    Ok(())
}
