//! # Decoder Pipeline
//!
//! Reads `.sanchez` containers back: metadata only ([`Decoder::get_info`]),
//! the whole sequence into a playable video ([`Decoder::decode`]), a single
//! frame into an image ([`Decoder::decode_to_image`]) or every frame into a
//! directory of images ([`Decoder::extract_all_frames`]).

use crate::av::{
    encode_still, save_frame, FfmpegMuxBackend, FrameFormat, MuxBackend, MuxStream, RawFrame,
    Resolution,
};
use crate::config;
use crate::error::{Result, SanchezError};
use crate::format::{read_header_from_path, Container, ContainerReader, Metadata};
use crate::utils::partial_path;
use chrono::{DateTime, Utc};
use futures::{pin_mut, stream, Stream, StreamExt};
use log::{debug, info};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Summary of a container, read from its header alone.
#[derive(Debug, Clone, PartialEq)]
pub struct SanchezInfo {
    /// Stored title, possibly empty
    pub title: String,
    /// Stored creator
    pub creator: String,
    /// Encode time
    pub created_at: DateTime<Utc>,
    /// True for a single still image
    pub is_image: bool,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Number of stored frames
    pub frame_count: u32,
    /// Stored frame rate
    pub fps: f64,
    /// `frame_count / fps`; zero for stills
    pub duration_seconds: f64,
    /// Container file size in MiB
    pub file_size_mb: f64,
}

impl SanchezInfo {
    /// Builds the summary from header metadata and the container's size on disk.
    pub fn new(metadata: &Metadata, file_len: u64) -> Self {
        Self {
            title: metadata.title.clone(),
            creator: metadata.creator.clone(),
            created_at: metadata.created_at,
            is_image: metadata.is_image,
            width: metadata.width,
            height: metadata.height,
            frame_count: metadata.frame_count,
            fps: metadata.fps,
            duration_seconds: metadata.duration_seconds(),
            file_size_mb: file_len as f64 / BYTES_PER_MB,
        }
    }

    /// Width and height of the stored frames.
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl fmt::Display for SanchezInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        };
        writeln!(f, "Title:      {}", title)?;
        writeln!(f, "Creator:    {}", self.creator)?;
        writeln!(
            f,
            "Created:    {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(
            f,
            "Type:       {}",
            if self.is_image { "image" } else { "video" }
        )?;
        writeln!(f, "Resolution: {}x{}", self.width, self.height)?;
        if !self.is_image {
            writeln!(f, "Frames:     {}", self.frame_count)?;
            writeln!(f, "FPS:        {:.2}", self.fps)?;
            writeln!(f, "Duration:   {:.2}s", self.duration_seconds)?;
        }
        write!(f, "File size:  {:.2} MB", self.file_size_mb)
    }
}

/// Options for [`Decoder::decode`].
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Audio track muxed into the output video
    pub audio_path: Option<PathBuf>,
    /// Resample decoded frames to this size
    pub resize: Option<Resolution>,
}

impl DecodeOptions {
    /// Empty options: no audio, no resize.
    pub fn new() -> Self {
        Self::default()
    }

    /// Muxes the audio track at `path` into the output.
    pub fn with_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_path = Some(path.into());
        self
    }

    /// Resamples every frame to `resolution`.
    pub fn with_resize(mut self, resolution: Resolution) -> Self {
        self.resize = Some(resolution);
        self
    }
}

/// Options for [`Decoder::extract_all_frames`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Image format of every extracted file (PNG by default)
    pub format: FrameFormat,
    /// Resample extracted frames to this size
    pub resize: Option<Resolution>,
}

impl ExtractOptions {
    /// PNG output at the stored size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes frames in `format`.
    pub fn with_format(mut self, format: FrameFormat) -> Self {
        self.format = format;
        self
    }

    /// Resamples every frame to `resolution`.
    pub fn with_resize(mut self, resolution: Resolution) -> Self {
        self.resize = Some(resolution);
        self
    }
}

/// What [`Decoder::decode`] wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeSummary {
    /// Path of the finished video
    pub output: PathBuf,
    /// Frames muxed
    pub frame_count: usize,
    /// Size of the muxed frames
    pub resolution: Resolution,
    /// Frame rate of the video
    pub fps: f64,
}

/// `clip.sanchez` -> `clip.mp4`
pub fn default_video_path(input: &Path) -> PathBuf {
    input.with_extension("mp4")
}

/// `pic.sanchez` -> `pic.png`
pub fn default_image_path(input: &Path) -> PathBuf {
    input.with_extension(FrameFormat::Png.extension())
}

/// `clip.sanchez` -> `clip_frames/` next to the input
pub fn default_frames_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sanchez".to_string());
    input.with_file_name(format!("{}_frames", stem))
}

/// File name of extracted frame `index`, zero padded so names sort in frame order.
pub fn frame_file_name(index: usize, frame_count: usize, format: FrameFormat) -> String {
    let width = frame_count.saturating_sub(1).to_string().len().max(6);
    format!("frame_{:0width$}.{}", index, format.extension(), width = width)
}

/// Decodes containers into videos and images.
#[derive(Clone)]
pub struct Decoder {
    muxer: Arc<dyn MuxBackend>,
    workers: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Muxes through ffmpeg, workers from [`config`].
    pub fn new() -> Self {
        Self::with_muxer(Arc::new(FfmpegMuxBackend::new()))
    }

    /// Muxes through `muxer`, workers from [`config`].
    pub fn with_muxer(muxer: Arc<dyn MuxBackend>) -> Self {
        Self {
            muxer,
            workers: config::get_workers(),
        }
    }

    /// Caps how many frames are decompressed at once.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Reads and validates a whole container.
    pub async fn open(&self, input: impl AsRef<Path>) -> Result<Container> {
        let data = tokio::fs::read(input.as_ref()).await?;
        Container::deserialize(data)
    }

    /// Reads only the header; payload bytes are never touched.
    pub async fn get_info(&self, input: impl AsRef<Path>) -> Result<SanchezInfo> {
        let (header, file_len) = read_header_from_path(input.as_ref()).await?;
        Ok(SanchezInfo::new(&header.metadata, file_len))
    }

    /// Decodes every frame in order and hands them to the muxer.
    pub async fn decode(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: &DecodeOptions,
    ) -> Result<DecodeSummary> {
        let (input, output) = (input.as_ref(), output.as_ref());
        info!("decoding {} -> {}", input.display(), output.display());

        let container = Arc::new(self.open(input).await?);
        let meta = &container.metadata;
        let resolution = options.resize.unwrap_or_else(|| meta.resolution());
        let stream_params = MuxStream {
            resolution,
            fps: meta.fps,
            audio: options.audio_path.clone(),
        };

        let mut muxer = self.muxer.open(output, &stream_params).await?;
        let frames = self.decoded_frames(container.clone(), options.resize);
        pin_mut!(frames);

        let mut written = 0usize;
        while let Some(frame) = frames.next().await {
            // Dropping the muxer on error discards the partial output
            muxer.write_frame(&frame?).await?;
            written += 1;
        }
        muxer.finish().await?;

        info!(
            "wrote {}: {} frame(s) at {} @ {} fps",
            output.display(),
            written,
            resolution,
            meta.fps
        );
        Ok(DecodeSummary {
            output: output.to_path_buf(),
            frame_count: written,
            resolution,
            fps: meta.fps,
        })
    }

    /// Writes frame `frame_index` as a still; the format follows the output extension.
    pub async fn decode_to_image(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        frame_index: usize,
        resize: Option<Resolution>,
    ) -> Result<PathBuf> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let mut reader = ContainerReader::open(input).await?;
        let frame = reader.read_frame(frame_index).await?;
        let frame = match resize {
            Some(target) => frame.resize(target)?,
            None => frame,
        };
        save_frame(&frame, output, FrameFormat::from_path(output)).await?;
        info!(
            "frame {} of {} -> {}",
            frame_index,
            input.display(),
            output.display()
        );
        Ok(output.to_path_buf())
    }

    /// Writes every frame as `frame_NNNNNN.<ext>` into `output_dir`, returning
    /// the paths in frame order.
    ///
    /// Frames are staged in a hidden directory inside `output_dir` and moved
    /// into place only once all of them decoded. On failure nothing is left
    /// behind, and `output_dir` itself is removed if this call created it.
    pub async fn extract_all_frames(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<Vec<PathBuf>> {
        let (input, output_dir) = (input.as_ref(), output_dir.as_ref());
        let container = Arc::new(self.open(input).await?);

        let created_dir = tokio::fs::metadata(output_dir).await.is_err();
        tokio::fs::create_dir_all(output_dir).await?;
        let staging = partial_path(&output_dir.join("frames"));

        let result = self
            .extract_into(container, output_dir, &staging, options)
            .await;
        if result.is_err() {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            if created_dir {
                let _ = tokio::fs::remove_dir(output_dir).await;
            }
        }
        let paths = result?;

        info!(
            "extracted {} {} frame(s) from {} into {}",
            paths.len(),
            options.format,
            input.display(),
            output_dir.display()
        );
        Ok(paths)
    }

    async fn extract_into(
        &self,
        container: Arc<Container>,
        output_dir: &Path,
        staging: &Path,
        options: &ExtractOptions,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(staging).await?;

        let count = container.frame_count();
        let format = options.format;
        let resize = options.resize;
        // Encoding runs in parallel; files are written here, in order, so no
        // write is still in flight when an error stops the stream
        let encoded = stream::iter(0..count)
            .map(|index| {
                let container = container.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        let frame = decode_resized(&container, index, resize)?;
                        encode_still(&frame, format)
                    })
                    .await
                    .map_err(|e| SanchezError::Encoding(format!("frame task failed: {}", e)))?
                }
            })
            .buffered(self.workers);
        pin_mut!(encoded);

        let mut names = Vec::with_capacity(count);
        while let Some(bytes) = encoded.next().await {
            let name = frame_file_name(names.len(), count, format);
            let path = staging.join(&name);
            tokio::fs::write(&path, bytes?).await?;
            debug!("extracted frame {} to {}", names.len(), path.display());
            names.push(name);
        }

        let mut placed = Vec::with_capacity(names.len());
        for name in &names {
            let target = output_dir.join(name);
            if let Err(e) = tokio::fs::rename(staging.join(name), &target).await {
                for path in &placed {
                    let _ = tokio::fs::remove_file(path).await;
                }
                return Err(e.into());
            }
            placed.push(target);
        }
        tokio::fs::remove_dir(staging).await?;
        Ok(placed)
    }

    /// Decompresses frames in order with bounded parallelism.
    pub fn decoded_frames(
        &self,
        container: Arc<Container>,
        resize: Option<Resolution>,
    ) -> impl Stream<Item = Result<RawFrame>> + Send + 'static {
        let count = container.frame_count();
        stream::iter(0..count)
            .map(move |index| {
                let container = container.clone();
                async move {
                    tokio::task::spawn_blocking(move || decode_resized(&container, index, resize))
                        .await
                        .map_err(|e| SanchezError::Encoding(format!("frame task failed: {}", e)))?
                }
            })
            .buffered(self.workers)
    }
}

fn decode_resized(container: &Container, index: usize, resize: Option<Resolution>) -> Result<RawFrame> {
    let frame = container.decode_frame(index)?;
    match resize {
        Some(target) => frame.resize(target),
        None => Ok(frame),
    }
}
