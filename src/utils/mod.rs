//! # Utility Functions and Types
//!
//! Small helpers shared by the container model and the pipelines:
//!
//! - Bounds-checked little-endian reading over byte slices
//! - Atomic (temp file + rename) writes for final artifacts
//!
//! ## Byte Reading
//!
//! ```rust
//! use sanchez::utils::ByteReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = [0x01, 0x00, 0xff];
//! let mut reader = ByteReader::new(&data);
//!
//! assert_eq!(reader.read_u16()?, 1);
//! assert_eq!(reader.read_u8()?, 0xff);
//! assert!(reader.read_u8().is_err()); // past the end: FormatError::Truncated
//! # Ok(())
//! # }
//! ```

/// Bounds-checked byte reader
pub mod reader;

/// Filesystem helpers
pub mod fs;

pub use fs::{partial_path, write_atomic};
pub use reader::ByteReader;
