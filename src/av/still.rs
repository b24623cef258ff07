use super::{ImageSource, RawFrame};
use crate::error::{Result, SanchezError};
use crate::utils::write_atomic;
use async_trait::async_trait;
use image::ImageFormat;
use log::debug;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

/// Extensions treated as still images rather than videos.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tiff"];

/// Returns true if `path` has one of [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Output format for extracted still frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameFormat {
    /// Lossless PNG
    #[default]
    Png,
    /// Baseline JPEG
    Jpeg,
    /// Uncompressed BMP
    Bmp,
}

impl FrameFormat {
    /// File extension written for this format, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Png => "png",
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Bmp => "bmp",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            FrameFormat::Png => ImageFormat::Png,
            FrameFormat::Jpeg => ImageFormat::Jpeg,
            FrameFormat::Bmp => ImageFormat::Bmp,
        }
    }

    /// Picks the format from a file extension, defaulting to PNG.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_string_lossy().parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FrameFormat {
    type Err = SanchezError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(FrameFormat::Png),
            "jpg" | "jpeg" => Ok(FrameFormat::Jpeg),
            "bmp" => Ok(FrameFormat::Bmp),
            other => Err(SanchezError::InvalidArgument(format!(
                "unsupported frame format {:?} (png, jpg, bmp)",
                other
            ))),
        }
    }
}

/// Encodes a frame into an in-memory image file.
pub fn encode_still(frame: &RawFrame, format: FrameFormat) -> Result<Vec<u8>> {
    let img = frame.to_rgb_image()?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format.image_format())?;
    Ok(out.into_inner())
}

/// Writes a frame as a still image file, atomically.
pub async fn save_frame(frame: &RawFrame, path: &Path, format: FrameFormat) -> Result<()> {
    let frame = frame.clone();
    let encoded = tokio::task::spawn_blocking(move || encode_still(&frame, format))
        .await
        .map_err(|e| SanchezError::Encoding(format!("image encode task failed: {}", e)))??;
    write_atomic(path, &encoded).await?;
    debug!("saved {} frame to {}", format, path.display());
    Ok(())
}

/// Loads stills through the `image` crate, converting any pixel format to RGB24.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileSource;

impl ImageFileSource {
    /// Creates the source; it holds no state.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageSource for ImageFileSource {
    async fn load(&self, path: &Path) -> Result<RawFrame> {
        let owned = path.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || image::open(&owned))
            .await
            .map_err(|e| SanchezError::Source(format!("image load task failed: {}", e)))?;
        let img = loaded.map_err(|e| {
            SanchezError::Source(format!("cannot load image {}: {}", path.display(), e))
        })?;
        Ok(RawFrame::from(img.to_rgb8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("a/b/pic.PNG")));
        assert!(is_image_path(Path::new("pic.jpeg")));
        assert!(!is_image_path(Path::new("clip.mp4")));
        assert!(!is_image_path(Path::new("noext")));
    }

    #[test]
    fn test_frame_format_parse() {
        assert_eq!("JPEG".parse::<FrameFormat>().unwrap(), FrameFormat::Jpeg);
        assert_eq!("bmp".parse::<FrameFormat>().unwrap(), FrameFormat::Bmp);
        assert!("webp".parse::<FrameFormat>().is_err());
        assert_eq!(FrameFormat::from_path(Path::new("x.jpg")), FrameFormat::Jpeg);
        assert_eq!(FrameFormat::from_path(Path::new("x.sanchez")), FrameFormat::Png);
    }

    #[tokio::test]
    async fn test_png_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let data: Vec<u8> = (0..(7 * 5 * 3)).map(|i| (i * 13 % 256) as u8).collect();
        let frame = RawFrame::new(7, 5, data).unwrap();

        save_frame(&frame, &path, FrameFormat::Png).await.unwrap();
        let loaded = ImageFileSource.load(&path).await.unwrap();
        assert_eq!(loaded, frame);
    }

    #[tokio::test]
    async fn test_bmp_and_jpeg_keep_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let frame = RawFrame::solid(12, 9, [40, 80, 120]);
        for format in [FrameFormat::Bmp, FrameFormat::Jpeg] {
            let path = dir.path().join(format!("frame.{}", format.extension()));
            save_frame(&frame, &path, format).await.unwrap();
            let loaded = ImageFileSource.load(&path).await.unwrap();
            assert_eq!(loaded.resolution(), frame.resolution());
        }
    }

    #[tokio::test]
    async fn test_load_missing_image_is_source_error() {
        let err = ImageFileSource
            .load(Path::new("/definitely/not/here.png"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SanchezError::Source(_)));
    }
}
