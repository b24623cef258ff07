use crate::error::{Result, SanchezError};
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fmt;
use std::str::FromStr;

/// Bytes per pixel of the fixed RGB24 layout.
pub const BYTES_PER_PIXEL: usize = 3;

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// Pixels per row
    pub width: u32,
    /// Rows per frame
    pub height: u32,
}

impl Resolution {
    /// Creates a resolution from width and height in pixels.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size in bytes of one RGB24 frame at this resolution, `None` if it overflows `usize`.
    pub fn frame_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parses `WxH`, e.g. `1280x720`.
impl FromStr for Resolution {
    type Err = SanchezError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        let (w, h) = lower
            .split_once('x')
            .ok_or_else(|| SanchezError::InvalidArgument(format!("expected WxH, got {:?}", s)))?;
        let res = Resolution::new(w.trim().parse()?, h.trim().parse()?);
        if res.is_empty() {
            return Err(SanchezError::InvalidArgument(format!(
                "resolution must be positive, got {}",
                res
            )));
        }
        Ok(res)
    }
}

/// One decoded frame: RGB24, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Packed RGB24 pixels
    pub data: Bytes,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl RawFrame {
    /// Wraps a pixel buffer, checking it holds exactly `width * height` pixels.
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let expected = Resolution::new(width, height).frame_size().ok_or_else(|| {
            SanchezError::InvalidArgument(format!("{}x{} frame is too large", width, height))
        })?;
        if data.len() != expected {
            return Err(SanchezError::InvalidArgument(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, width, height })
    }

    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            data: data.into(),
            width,
            height,
        }
    }

    /// Width and height of this frame.
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Length of the pixel buffer in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-sized frame.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bilinear resample to exactly `target`. Same-size input is returned untouched.
    pub fn resize(&self, target: Resolution) -> Result<RawFrame> {
        if target.is_empty() {
            return Err(SanchezError::InvalidArgument(format!(
                "cannot resize to {}",
                target
            )));
        }
        if target == self.resolution() {
            return Ok(self.clone());
        }
        let scaled = imageops::resize(
            &self.to_rgb_image()?,
            target.width,
            target.height,
            FilterType::Triangle,
        );
        Ok(RawFrame::from(scaled))
    }

    /// Copies the pixels into an `image` buffer.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.to_vec()).ok_or_else(|| {
            SanchezError::InvalidArgument(format!(
                "buffer of {} bytes does not fit {}",
                self.data.len(),
                self.resolution()
            ))
        })
    }
}

impl From<RgbImage> for RawFrame {
    fn from(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: Bytes::from(img.into_raw()),
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_resolution() {
        assert_eq!("1280x720".parse::<Resolution>().unwrap(), Resolution::new(1280, 720));
        assert_eq!(" 64X48 ".parse::<Resolution>().unwrap(), Resolution::new(64, 48));
        assert!("1280".parse::<Resolution>().is_err());
        assert!("0x720".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_frame_size_overflow() {
        assert_eq!(Resolution::new(4, 2).frame_size(), Some(24));
        assert_eq!(Resolution::new(u32::MAX, u32::MAX).frame_size(), None);
        assert!(RawFrame::new(u32::MAX, u32::MAX, vec![0u8; 3]).is_err());
    }

    #[test]
    fn test_new_checks_size() {
        assert!(RawFrame::new(2, 2, vec![0u8; 12]).is_ok());
        assert!(RawFrame::new(2, 2, vec![0u8; 11]).is_err());
    }

    #[test]
    fn test_resize_exact_dimensions() {
        let frame = RawFrame::solid(64, 48, [10, 20, 30]);
        for target in [Resolution::new(32, 24), Resolution::new(100, 7), Resolution::new(1, 1)] {
            let out = frame.resize(target).unwrap();
            assert_eq!(out.resolution(), target);
            assert_eq!(Some(out.len()), target.frame_size());
        }
    }

    #[test]
    fn test_resize_solid_stays_solid() {
        let frame = RawFrame::solid(16, 16, [200, 100, 50]);
        let out = frame.resize(Resolution::new(9, 5)).unwrap();
        assert_eq!(out, RawFrame::solid(9, 5, [200, 100, 50]));
    }

    #[test]
    fn test_resize_is_deterministic() {
        let data: Vec<u8> = (0..(20 * 10 * 3)).map(|i| (i * 7 % 251) as u8).collect();
        let frame = RawFrame::new(20, 10, data).unwrap();
        let a = frame.resize(Resolution::new(13, 17)).unwrap();
        let b = frame.resize(Resolution::new(13, 17)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resize_rejects_zero() {
        let frame = RawFrame::solid(4, 4, [0, 0, 0]);
        assert!(frame.resize(Resolution::new(0, 4)).is_err());
    }
}
