use std::num::ParseIntError;
use thiserror::Error;

/// The input bytes are not a valid container.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// The file does not start with the container signature
    #[error("invalid magic: {0:02x?}")]
    InvalidMagic([u8; 8]),

    /// A layout version this crate cannot read
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// The data ends before the layout says it should
    #[error("truncated container: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required to continue parsing
        needed: u64,
        /// Bytes actually present
        available: u64,
    },

    /// Field values or index entries that break the layout rules
    #[error("malformed container: {0}")]
    Malformed(String),
}

/// A frame payload could not be turned back into pixels.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Decoding produced the wrong number of bytes
    #[error("decoded frame is {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Frame size implied by the metadata
        expected: usize,
        /// Bytes actually produced
        actual: usize,
    },

    /// The blob is not a valid zlib stream
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
}

/// Every error this crate returns.
#[derive(Error, Debug)]
pub enum SanchezError {
    /// Filesystem or pipe failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid container bytes
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// A frame blob failed to decode
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A frame index past the end of the container
    #[error("frame index {index} out of range (frame count {frame_count})")]
    OutOfRange {
        /// Requested frame
        index: usize,
        /// Frames in the container
        frame_count: usize,
    },

    /// The input video or image could not be read
    #[error("source error: {0}")]
    Source(String),

    /// The output could not be produced
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Still image encoding or decoding failed
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A caller-supplied value was rejected
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A number in a resolution or ffprobe output did not parse
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

impl SanchezError {
    /// Shorthand used by parsers when a read runs past the end of the buffer.
    pub fn truncated(needed: u64, available: u64) -> Self {
        SanchezError::Format(FormatError::Truncated { needed, available })
    }

    /// Returns true if this error reports a truncated container.
    pub fn is_truncated(&self) -> bool {
        matches!(self, SanchezError::Format(FormatError::Truncated { .. }))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SanchezError>;
