#![doc(html_root_url = "https://docs.rs/sanchez/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # sanchez - the `.sanchez` container format
//!
//! `sanchez` stores a short video, or a single still image, as one
//! self-describing file: a metadata record, a frame index and a payload of
//! independently compressed RGB24 frames. Every frame can be read on its own,
//! so any frame is reachable in constant time from the index.
//!
//! ## Features
//!
//! - Pure, byte-exact container serialization and validation
//! - Header-only inspection that never reads frame payloads
//! - zlib frame compression (or raw storage)
//! - Encoding from any video ffmpeg can read, and from PNG/JPEG/BMP/GIF/TIFF stills
//! - Decoding to MP4 (with an optional audio track), to single images, or to a
//!   directory of numbered frames
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sanchez::{DecodeOptions, Decoder, EncodeOptions, Encoder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let encoder = Encoder::new();
//!     let options = EncodeOptions::new()
//!         .with_title("Two Brothers")
//!         .with_max_frames(240);
//!     encoder.encode("clip.mp4", "clip.sanchez", &options).await?;
//!
//!     let decoder = Decoder::new();
//!     println!("{}", decoder.get_info("clip.sanchez").await?);
//!     decoder
//!         .decode("clip.sanchez", "roundtrip.mp4", &DecodeOptions::new())
//!         .await?;
//!     decoder
//!         .decode_to_image("clip.sanchez", "first.png", 0, None)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `format`: the container model (layout, builder, header-only reads,
//!   file-backed random access)
//! - `codec`: per-frame payload compression
//! - `av`: raw frames, resizing, still images and the ffmpeg collaborators
//! - `encoder` / `decoder`: the end-to-end pipelines
//! - `config`: environment and config-file settings
//! - `error`: error types and the `Result` alias
//! - `utils`: byte reading and atomic file writes

/// Raw frames, stills and media collaborators
pub mod av;

/// Frame payload compression
pub mod codec;

/// Error types and utilities
pub mod error;

/// The `.sanchez` container model
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

/// Video/image to container pipeline
pub mod encoder;

/// Container to video/image pipeline
pub mod decoder;

pub use av::{FrameFormat, RawFrame, Resolution};
pub use decoder::{DecodeOptions, DecodeSummary, Decoder, ExtractOptions, SanchezInfo};
pub use encoder::{EncodeOptions, EncodeSummary, Encoder, ImageEncodeOptions};
pub use error::{Result, SanchezError};
pub use format::{Container, Metadata};
