//! # Encoder Pipeline
//!
//! Turns a source video or still image into a `.sanchez` container on disk.
//!
//! Frames are pulled from a [`FrameSource`] in presentation order, optionally
//! resized and truncated, compressed one by one and appended to a
//! [`ContainerBuilder`]. Resizing and compression run on the blocking pool
//! with bounded concurrency; results are consumed in source order, so the
//! index offsets are assigned sequentially exactly as if the work ran on a
//! single thread.

use crate::av::{
    is_image_path, FfmpegSource, FrameReader, FrameSource, ImageFileSource, ImageSource, RawFrame,
    Resolution,
};
use crate::codec;
use crate::config;
use crate::error::{Result, SanchezError};
use crate::format::{Container, ContainerBuilder, Metadata, FILE_EXTENSION, IMAGE_FPS};
use crate::utils::write_atomic;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use futures::{pin_mut, stream, StreamExt};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for [`Encoder::encode`].
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Stored title; empty when not given
    pub title: Option<String>,
    /// Stored creator; the configured default (`cbx`) when not given
    pub creator: Option<String>,
    /// Resample every frame to this size before anything else
    pub resize: Option<Resolution>,
    /// Keep only the first `n` frames
    pub max_frames: Option<usize>,
    /// Compress frame payloads (default true)
    pub use_compression: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            title: None,
            creator: None,
            resize: None,
            max_frames: None,
            use_compression: true,
        }
    }
}

impl EncodeOptions {
    /// Default options: compressed, no resize, no frame limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stored title.
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Sets the stored creator.
    pub fn with_creator(mut self, creator: &str) -> Self {
        self.creator = Some(creator.to_string());
        self
    }

    /// Resamples every frame to `resolution`.
    pub fn with_resize(mut self, resolution: Resolution) -> Self {
        self.resize = Some(resolution);
        self
    }

    /// Keeps only the first `max_frames` frames.
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Turns frame compression on or off.
    pub fn with_compression(mut self, enable: bool) -> Self {
        self.use_compression = enable;
        self
    }
}

/// Options for [`Encoder::encode_image`]. Stills are always compressed.
#[derive(Debug, Clone, Default)]
pub struct ImageEncodeOptions {
    /// Stored title; empty when not given
    pub title: Option<String>,
    /// Stored creator; the configured default when not given
    pub creator: Option<String>,
    /// Resample the still to this size
    pub resize: Option<Resolution>,
}

impl ImageEncodeOptions {
    /// Default options: no title, default creator, no resize.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stored title.
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Sets the stored creator.
    pub fn with_creator(mut self, creator: &str) -> Self {
        self.creator = Some(creator.to_string());
        self
    }

    /// Resamples the still to `resolution`.
    pub fn with_resize(mut self, resolution: Resolution) -> Self {
        self.resize = Some(resolution);
        self
    }
}

impl From<&EncodeOptions> for ImageEncodeOptions {
    fn from(options: &EncodeOptions) -> Self {
        Self {
            title: options.title.clone(),
            creator: options.creator.clone(),
            resize: options.resize,
        }
    }
}

/// What an encode call wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSummary {
    /// Path of the written container
    pub output: PathBuf,
    /// Frames stored
    pub frame_count: usize,
    /// Size of the stored frames
    pub resolution: Resolution,
    /// True for a still image container
    pub is_image: bool,
    /// Whether frame payloads are compressed
    pub compressed: bool,
    /// Bytes of frame payload
    pub payload_bytes: u64,
    /// Bytes of the whole container file
    pub container_bytes: u64,
}

/// `clip.mp4` -> `clip.sanchez`
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension(FILE_EXTENSION)
}

/// Encodes videos and stills into containers.
#[derive(Clone)]
pub struct Encoder {
    frames: Arc<dyn FrameSource>,
    images: Arc<dyn ImageSource>,
    workers: usize,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// ffmpeg for videos, the `image` crate for stills, workers from [`config`].
    pub fn new() -> Self {
        Self::with_sources(Arc::new(FfmpegSource::new()), Arc::new(ImageFileSource::new()))
    }

    /// Reads videos from `frames` and stills from `images`, workers from [`config`].
    pub fn with_sources(frames: Arc<dyn FrameSource>, images: Arc<dyn ImageSource>) -> Self {
        Self {
            frames,
            images,
            workers: config::get_workers(),
        }
    }

    /// Caps how many frames are resized/compressed at once.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Encodes a source video into a container at `output`.
    pub async fn encode(
        &self,
        source: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: &EncodeOptions,
    ) -> Result<EncodeSummary> {
        let (source, output) = (source.as_ref(), output.as_ref());
        info!("encoding {} -> {}", source.display(), output.display());

        let mut reader = self.frames.open(source).await?;
        let container = self
            .encode_reader(reader.as_mut(), options)
            .await
            .map_err(|e| match e {
                SanchezError::Source(msg) => {
                    SanchezError::Source(format!("{}: {}", source.display(), msg))
                }
                other => other,
            })?;
        drop(reader);

        write_container(&container, output).await
    }

    /// Encodes a still image into a single-frame container at `output`.
    pub async fn encode_image(
        &self,
        source: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: &ImageEncodeOptions,
    ) -> Result<EncodeSummary> {
        let (source, output) = (source.as_ref(), output.as_ref());
        info!("encoding image {} -> {}", source.display(), output.display());

        let frame = self.images.load(source).await?;
        let container = self.encode_still(frame, options).await?;
        write_container(&container, output).await
    }

    /// Dispatches on the source extension: stills go through
    /// [`Encoder::encode_image`], everything else through [`Encoder::encode`].
    pub async fn encode_path(
        &self,
        source: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: &EncodeOptions,
    ) -> Result<EncodeSummary> {
        let source = source.as_ref();
        if is_image_path(source) {
            self.encode_image(source, output, &ImageEncodeOptions::from(options))
                .await
        } else {
            self.encode(source, output, options).await
        }
    }

    /// Builds a video container from an opened reader without touching storage.
    pub async fn encode_reader(
        &self,
        reader: &mut dyn FrameReader,
        options: &EncodeOptions,
    ) -> Result<Container> {
        if options.max_frames == Some(0) {
            return Err(SanchezError::InvalidArgument(
                "max_frames must be at least 1".into(),
            ));
        }
        if let Some(target) = options.resize {
            if target.is_empty() {
                return Err(SanchezError::InvalidArgument(format!(
                    "cannot resize to {}",
                    target
                )));
            }
        }
        let fps = reader.fps();
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SanchezError::Source(format!("source reports fps {}", fps)));
        }

        let limit = options.max_frames;
        let resize = options.resize;
        let compressed = options.use_compression;

        // Stops reading at the limit; after an error the reader is dropped from the state
        let frames = stream::unfold((Some(reader), 0usize), move |(reader, taken)| async move {
            let reader = reader?;
            if limit.map_or(false, |max| taken >= max) {
                return None;
            }
            match reader.next_frame().await {
                Ok(Some(frame)) => Some((Ok(frame), (Some(reader), taken + 1))),
                Ok(None) => None,
                Err(e) => Some((Err(e), (None, taken))),
            }
        });
        let prepared = frames
            .map(move |frame| async move {
                let frame = frame?;
                tokio::task::spawn_blocking(move || prepare_frame(frame, resize, compressed))
                    .await
                    .map_err(|e| SanchezError::Encoding(format!("frame task failed: {}", e)))?
            })
            .buffered(self.workers);
        pin_mut!(prepared);

        let mut builder = ContainerBuilder::new();
        let mut resolution: Option<Resolution> = None;
        while let Some(item) = prepared.next().await {
            let (frame_res, blob) = item?;
            match resolution {
                None => resolution = Some(frame_res),
                Some(expected) if expected != frame_res => {
                    return Err(SanchezError::Source(format!(
                        "frame {} is {} but earlier frames are {}",
                        builder.len(),
                        frame_res,
                        expected
                    )));
                }
                Some(_) => {}
            }
            let entry = builder.push_frame(&blob)?;
            debug!(
                "frame {}: offset {} length {}",
                builder.len() - 1,
                entry.offset,
                entry.length
            );
        }

        let resolution = match resolution {
            Some(r) => r,
            None => return Err(SanchezError::Source("source yielded no frames".into())),
        };
        let metadata = Metadata {
            title: options.title.clone().unwrap_or_default(),
            creator: options
                .creator
                .clone()
                .unwrap_or_else(config::get_default_creator),
            created_at: now_seconds(),
            is_image: false,
            width: resolution.width,
            height: resolution.height,
            frame_count: frame_count(builder.len())?,
            fps,
            compressed,
        };
        builder.finish(metadata)
    }

    /// Builds a single-frame image container without touching storage.
    pub async fn encode_still(
        &self,
        frame: RawFrame,
        options: &ImageEncodeOptions,
    ) -> Result<Container> {
        let resize = options.resize;
        let (resolution, blob) =
            tokio::task::spawn_blocking(move || prepare_frame(frame, resize, true))
                .await
                .map_err(|e| SanchezError::Encoding(format!("frame task failed: {}", e)))??;

        let mut builder = ContainerBuilder::new();
        builder.push_frame(&blob)?;
        builder.finish(Metadata {
            title: options.title.clone().unwrap_or_default(),
            creator: options
                .creator
                .clone()
                .unwrap_or_else(config::get_default_creator),
            created_at: now_seconds(),
            is_image: true,
            width: resolution.width,
            height: resolution.height,
            frame_count: 1,
            fps: IMAGE_FPS,
            compressed: true,
        })
    }
}

/// Resize (if asked) then compress one frame.
fn prepare_frame(
    frame: RawFrame,
    resize: Option<Resolution>,
    compressed: bool,
) -> Result<(Resolution, Bytes)> {
    let frame = match resize {
        Some(target) => frame.resize(target)?,
        None => frame,
    };
    let blob = codec::encode_frame(&frame.data, compressed)?;
    Ok((frame.resolution(), blob))
}

fn frame_count(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| SanchezError::Encoding(format!("{} frames exceed u32", n)))
}

fn now_seconds() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Serializes and atomically writes a container.
pub async fn write_container(container: &Container, output: &Path) -> Result<EncodeSummary> {
    let bytes = container.serialize()?;
    write_atomic(output, &bytes).await?;

    let meta = &container.metadata;
    info!(
        "wrote {}: {} frame(s) at {} ({} bytes, compressed={})",
        output.display(),
        meta.frame_count,
        meta.resolution(),
        bytes.len(),
        meta.compressed
    );
    Ok(EncodeSummary {
        output: output.to_path_buf(),
        frame_count: container.frame_count(),
        resolution: meta.resolution(),
        is_image: meta.is_image,
        compressed: meta.compressed,
        payload_bytes: container.payload.len() as u64,
        container_bytes: bytes.len() as u64,
    })
}
