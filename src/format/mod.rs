//! # The `.sanchez` Container
//!
//! A single file holding a sequence of same-sized RGB24 frames plus metadata:
//!
//! ```text
//! magic (8) | version (u16) | metadata | index: frame_count x (offset u64, length u32) | payload
//! ```
//!
//! All integers are little-endian. Strings are `u32` length-prefixed UTF-8.
//! Index offsets are relative to the start of the payload region, which holds
//! the frame blobs back to back with no padding.
//!
//! - [`Container`]: a whole container in memory, with pure
//!   [`Container::serialize`] / [`Container::deserialize`]
//! - [`ContainerBuilder`]: assembles a container blob by blob
//! - [`ContainerHeader`]: header + index only, for cheap inspection
//! - [`ContainerReader`]: file-backed random access to single frames
//!
//! ## Example
//!
//! ```rust
//! use sanchez::codec::encode_frame;
//! use sanchez::format::{Container, ContainerBuilder, Metadata};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = ContainerBuilder::new();
//! for shade in [0u8, 128, 255] {
//!     builder.push_frame(&encode_frame(&vec![shade; 4 * 4 * 3], true)?)?;
//! }
//! let container = builder.finish(Metadata {
//!     title: "demo".into(),
//!     creator: "cbx".into(),
//!     created_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
//!     is_image: false,
//!     width: 4,
//!     height: 4,
//!     frame_count: 3,
//!     fps: 30.0,
//!     compressed: true,
//! })?;
//!
//! let bytes = container.serialize()?;
//! let parsed = Container::deserialize(bytes)?;
//! assert_eq!(parsed.decode_frame(2)?.data[0], 255);
//! # Ok(())
//! # }
//! ```

/// In-memory container model and builder
pub mod container;

/// File-backed header parsing and random access
pub mod reader;

/// Layout constants, version tag, metadata and index entries
pub mod types;


pub use container::{Container, ContainerBuilder, ContainerHeader};
pub use reader::{read_header_from_path, ContainerReader};
pub use types::{
    FormatVersion,
    IndexEntry,
    Metadata,
    FILE_EXTENSION,
    IMAGE_FPS,
    INDEX_ENTRY_SIZE,
    MAGIC,
};
