use super::{FrameMuxer, FrameReader, FrameSource, MuxBackend, MuxStream, RawFrame, Resolution};
use crate::config;
use crate::error::{Result, SanchezError};
use crate::utils::partial_path;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Frame extraction through `ffprobe` + `ffmpeg` subprocesses.
///
/// Frames arrive as raw RGB24 over ffmpeg's stdout. The child is killed when
/// the reader is dropped, so stopping early (e.g. after `max_frames`) or
/// bailing on an error never leaks the process.
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegSource {
    /// Uses the executables from the global [`config`].
    pub fn new() -> Self {
        Self::with_paths(config::get_ffmpeg_path(), config::get_ffprobe_path())
    }

    /// Uses explicit ffmpeg and ffprobe executables.
    pub fn with_paths(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn stream_info(&self, path: &Path) -> Result<(Resolution, f64)> {
        let out = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height,r_frame_rate")
            .arg("-of")
            .arg("default=noprint_wrappers=1")
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SanchezError::Source(format!("failed to run {}: {}", self.ffprobe, e)))?;

        if !out.status.success() {
            return Err(SanchezError::Source(format!(
                "ffprobe rejected {}: {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        parse_stream_info(&String::from_utf8_lossy(&out.stdout))
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `key=value` lines from ffprobe's `default` writer.
fn parse_stream_info(output: &str) -> Result<(Resolution, f64)> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;
    for line in output.lines() {
        match line.trim().split_once('=') {
            Some(("width", v)) => width = v.parse::<u32>().ok(),
            Some(("height", v)) => height = v.parse::<u32>().ok(),
            Some(("r_frame_rate", v)) => fps = parse_rate(v),
            _ => {}
        }
    }
    match (width, height, fps) {
        (Some(w), Some(h), Some(fps)) if w > 0 && h > 0 => Ok((Resolution::new(w, h), fps)),
        _ => Err(SanchezError::Source(format!(
            "no usable video stream in ffprobe output: {:?}",
            output.trim()
        ))),
    }
}

/// `30000/1001` or `25` to frames per second.
fn parse_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn spawn_stderr_collector<R>(stderr: Option<R>) -> Option<JoinHandle<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stderr.map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).trim().to_string()
        })
    })
}

async fn collected(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(h) => h.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    async fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>> {
        if !path.is_file() {
            return Err(SanchezError::Source(format!(
                "source video not found: {}",
                path.display()
            )));
        }
        let (resolution, fps) = self.stream_info(path).await?;
        let frame_size = resolution.frame_size().ok_or_else(|| {
            SanchezError::Source(format!("{} frames are too large", resolution))
        })?;
        info!(
            "opening {} ({} @ {:.3} fps) for frame extraction",
            path.display(),
            resolution,
            fps
        );

        let mut child = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(path)
            .arg("-map")
            .arg("0:v:0")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(resolution.to_string())
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SanchezError::Source(format!("failed to spawn {}: {}", self.ffmpeg, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SanchezError::Source("ffmpeg stdout missing".into()))?;
        let stderr = spawn_stderr_collector(child.stderr.take());

        Ok(Box::new(FfmpegFrameReader {
            child,
            stdout: BufReader::with_capacity(frame_size.max(8192), stdout),
            stderr,
            resolution,
            frame_size,
            fps,
            path: path.to_path_buf(),
            done: false,
        }))
    }
}

struct FfmpegFrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    resolution: Resolution,
    frame_size: usize,
    fps: f64,
    path: PathBuf,
    done: bool,
}

impl FfmpegFrameReader {
    async fn finish(&mut self) -> Result<()> {
        self.done = true;
        let status = self.child.wait().await?;
        let diagnostics = collected(self.stderr.take()).await;
        if !status.success() {
            return Err(SanchezError::Source(format!(
                "ffmpeg failed decoding {} ({}): {}",
                self.path.display(),
                status,
                diagnostics
            )));
        }
        if !diagnostics.is_empty() {
            warn!("ffmpeg: {}", diagnostics);
        }
        Ok(())
    }
}

#[async_trait]
impl FrameReader for FfmpegFrameReader {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.done {
            return Ok(None);
        }
        let frame_size = self.frame_size;
        let mut buf = vec![0u8; frame_size];
        let mut filled = 0;
        while filled < frame_size {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.finish().await?;
            return Ok(None);
        }
        if filled < frame_size {
            self.finish().await?;
            return Err(SanchezError::Source(format!(
                "ffmpeg produced a partial frame ({} of {} bytes)",
                filled, frame_size
            )));
        }
        Ok(Some(RawFrame::new(
            self.resolution.width,
            self.resolution.height,
            buf,
        )?))
    }
}

/// Muxing through an `ffmpeg` subprocess fed raw RGB24 on stdin.
///
/// Output goes to a hidden sibling of the target path and is renamed into
/// place only after ffmpeg exits cleanly.
#[derive(Debug, Clone)]
pub struct FfmpegMuxBackend {
    ffmpeg: String,
    video_codec: String,
}

impl FfmpegMuxBackend {
    /// Uses the ffmpeg executable from the global [`config`] and libx264.
    pub fn new() -> Self {
        Self::with_path(config::get_ffmpeg_path())
    }

    /// Uses an explicit ffmpeg executable and libx264.
    pub fn with_path(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            video_codec: String::from("libx264"),
        }
    }

    /// Overrides the output video codec (ffmpeg `-c:v` name).
    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    fn command(&self, tmp: &Path, stream: &MuxStream) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(stream.resolution.to_string())
            .arg("-r")
            .arg(format!("{}", stream.fps))
            .arg("-i")
            .arg("pipe:0");

        if let Some(audio) = &stream.audio {
            cmd.arg("-i")
                .arg(audio)
                .arg("-map")
                .arg("0:v:0")
                .arg("-map")
                .arg("1:a:0")
                .arg("-c:a")
                .arg("aac")
                .arg("-shortest");
        }

        // yuv420p needs even dimensions
        cmd.arg("-vf")
            .arg("pad=ceil(iw/2)*2:ceil(ih/2)*2")
            .arg("-c:v")
            .arg(&self.video_codec)
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(tmp)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for FfmpegMuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MuxBackend for FfmpegMuxBackend {
    async fn open(&self, output: &Path, stream: &MuxStream) -> Result<Box<dyn FrameMuxer>> {
        if let Some(audio) = &stream.audio {
            if !audio.is_file() {
                return Err(SanchezError::Source(format!(
                    "audio track not found: {}",
                    audio.display()
                )));
            }
        }
        let tmp = partial_path(output);
        let mut child = self
            .command(&tmp, stream)
            .spawn()
            .map_err(|e| SanchezError::Source(format!("failed to spawn {}: {}", self.ffmpeg, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SanchezError::Source("ffmpeg stdin missing".into()))?;
        let stderr = spawn_stderr_collector(child.stderr.take());
        debug!("muxing {} via {}", output.display(), tmp.display());

        Ok(Box::new(FfmpegMuxer {
            child,
            stdin: Some(BufWriter::with_capacity(8 * 1024 * 1024, stdin)),
            stderr,
            resolution: stream.resolution,
            tmp,
            output: output.to_path_buf(),
            frames_written: 0,
            finished: false,
        }))
    }
}

struct FfmpegMuxer {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
    resolution: Resolution,
    tmp: PathBuf,
    output: PathBuf,
    frames_written: u64,
    finished: bool,
}

impl FfmpegMuxer {
    async fn fail(&mut self, context: &str) -> SanchezError {
        self.stdin = None;
        let _ = self.child.kill().await;
        let diagnostics = collected(self.stderr.take()).await;
        let _ = tokio::fs::remove_file(&self.tmp).await;
        self.finished = true;
        SanchezError::Source(format!(
            "ffmpeg muxing {} failed: {}: {}",
            self.output.display(),
            context,
            diagnostics
        ))
    }
}

#[async_trait]
impl FrameMuxer for FfmpegMuxer {
    async fn write_frame(&mut self, frame: &RawFrame) -> Result<()> {
        if frame.resolution() != self.resolution {
            return Err(SanchezError::InvalidArgument(format!(
                "frame is {}, muxer expects {}",
                frame.resolution(),
                self.resolution
            )));
        }
        let stdin = match self.stdin.as_mut() {
            Some(stdin) => stdin,
            None => return Err(SanchezError::Source("muxer already finished".into())),
        };
        let written = stdin.write_all(&frame.data).await;
        if let Err(e) = written {
            return Err(self.fail(&e.to_string()).await);
        }
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush().await {
                return Err(self.fail(&e.to_string()).await);
            }
            if let Err(e) = stdin.shutdown().await {
                return Err(self.fail(&e.to_string()).await);
            }
        }
        let status = self.child.wait().await?;
        if !status.success() {
            return Err(self.fail(&status.to_string()).await);
        }
        let diagnostics = collected(self.stderr.take()).await;
        if !diagnostics.is_empty() {
            warn!("ffmpeg: {}", diagnostics);
        }
        tokio::fs::rename(&self.tmp, &self.output).await?;
        self.finished = true;
        info!(
            "muxed {} frames into {}",
            self.frames_written,
            self.output.display()
        );
        Ok(())
    }
}

impl Drop for FfmpegMuxer {
    fn drop(&mut self) {
        // Child is killed by kill_on_drop; only the partial file needs removing.
        if !self.finished {
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}
