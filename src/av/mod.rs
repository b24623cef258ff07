//! Raw frames and the capability traits for the media collaborators the
//! pipelines delegate to: frame extraction, still-image loading and muxing.
//!
//! Concrete backends are chosen by the caller. [`FfmpegSource`] and
//! [`FfmpegMuxBackend`] drive ffmpeg subprocesses; [`ImageFileSource`] reads
//! stills through the `image` crate.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

mod frame;
/// ffmpeg-backed frame source and muxer
pub mod ffmpeg;
/// Still image loading and writing
pub mod still;

pub use ffmpeg::{FfmpegMuxBackend, FfmpegSource};
pub use frame::*;
pub use still::{encode_still, is_image_path, save_frame, FrameFormat, ImageFileSource, IMAGE_EXTENSIONS};

use crate::Result;

/// An opened source video yielding frames in presentation order.
#[async_trait]
pub trait FrameReader: Send {
    /// Nominal frame rate reported by the source
    fn fps(&self) -> f64;

    /// Dimensions of every frame this reader yields
    fn resolution(&self) -> Resolution;

    /// Returns the next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// Opens source videos for frame extraction.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Opens `path` and reads its geometry and frame rate.
    async fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>>;
}

/// Loads a still image as a single RGB24 frame.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Decodes the image at `path`.
    async fn load(&self, path: &Path) -> Result<RawFrame>;
}

/// Parameters of the video stream handed to a muxer.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxStream {
    /// Frame size handed to the muxer
    pub resolution: Resolution,
    /// Output frame rate
    pub fps: f64,
    /// External audio track muxed alongside the frames
    pub audio: Option<PathBuf>,
}

/// Receives an ordered frame sequence and produces a playable video.
#[async_trait]
pub trait FrameMuxer: Send {
    /// Appends the next frame; frames arrive in presentation order.
    async fn write_frame(&mut self, frame: &RawFrame) -> Result<()>;

    /// Completes the output file. Nothing is left at the output path unless this succeeds.
    async fn finish(&mut self) -> Result<()>;
}

/// Creates muxers for output paths.
#[async_trait]
pub trait MuxBackend: Send + Sync {
    /// Starts a muxer writing `stream` to `output`.
    async fn open(&self, output: &Path, stream: &MuxStream) -> Result<Box<dyn FrameMuxer>>;
}

/// A [`FrameReader`] over frames already held in memory.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    frames: VecDeque<RawFrame>,
    fps: f64,
    resolution: Resolution,
}

impl MemoryReader {
    /// Serves `frames` in order; the resolution is taken from the first frame.
    pub fn new(frames: Vec<RawFrame>, fps: f64) -> Self {
        let resolution = frames
            .first()
            .map(RawFrame::resolution)
            .unwrap_or(Resolution::new(0, 0));
        Self {
            frames: frames.into(),
            fps,
            resolution,
        }
    }
}

#[async_trait]
impl FrameReader for MemoryReader {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        Ok(self.frames.pop_front())
    }
}
