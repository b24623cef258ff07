use crate::av::Resolution;
use crate::error::{FormatError, Result, SanchezError};
use crate::utils::ByteReader;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};

/// First eight bytes of every container
pub const MAGIC: [u8; 8] = *b"SANCHEZ\0";
/// Length of [`MAGIC`]
pub const MAGIC_SIZE: usize = 8;
/// Length of the version field
pub const VERSION_SIZE: usize = 2;

/// Bytes per index entry: offset u64 + length u32
pub const INDEX_ENTRY_SIZE: usize = 12;

/// Nominal frame rate stored for stills
pub const IMAGE_FPS: f64 = 1.0;

/// File extension of containers, without the dot
pub const FILE_EXTENSION: &str = "sanchez";

/// On-disk layout versions this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FormatVersion {
    /// The first and only layout
    V1 = 1,
}

impl FormatVersion {
    /// Version written by this crate.
    pub const CURRENT: FormatVersion = FormatVersion::V1;

    /// The on-disk version number.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for FormatVersion {
    type Error = FormatError;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(FormatVersion::V1),
            other => Err(FormatError::UnsupportedVersion(other)),
        }
    }
}

/// Descriptive record stored once per container.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Free-form title, possibly empty
    pub title: String,
    /// Who or what made the container
    pub creator: String,
    /// Encode time, whole seconds
    pub created_at: DateTime<Utc>,
    /// True for a single still image
    pub is_image: bool,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Number of stored frames
    pub frame_count: u32,
    /// Frames per second; positive
    pub fps: f64,
    /// Applies to every frame in the container
    pub compressed: bool,
}

impl Metadata {
    /// Width and height of every stored frame.
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Decoded size of every frame in bytes.
    pub fn frame_size(&self) -> Result<usize> {
        self.resolution().frame_size().ok_or_else(|| {
            malformed(format!(
                "frame size {}x{} overflows",
                self.width, self.height
            ))
        })
    }

    /// Playback length; zero for stills.
    pub fn duration_seconds(&self) -> f64 {
        if self.is_image || self.fps <= 0.0 {
            0.0
        } else {
            self.frame_count as f64 / self.fps
        }
    }

    /// Bytes the record takes on disk.
    pub fn encoded_len(&self) -> usize {
        4 + self.title.len() + 4 + self.creator.len() + 8 + 1 + 4 + 4 + 4 + 8 + 1
    }

    /// Appends the little-endian encoding of the record.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        put_string(buf, "title", &self.title)?;
        put_string(buf, "creator", &self.creator)?;
        buf.put_i64_le(self.created_at.timestamp());
        buf.put_u8(self.is_image as u8);
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.frame_count);
        buf.put_f64_le(self.fps);
        buf.put_u8(self.compressed as u8);
        Ok(())
    }

    /// Reads and validates a record.
    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        let title = read_string(reader, "title")?;
        let creator = read_string(reader, "creator")?;
        let secs = reader.read_i64()?;
        let created_at = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| malformed(format!("created_at {} out of range", secs)))?;
        let is_image = read_flag(reader, "is_image")?;
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        let frame_count = reader.read_u32()?;
        let fps = reader.read_f64()?;
        let compressed = read_flag(reader, "compressed")?;

        let metadata = Metadata {
            title,
            creator,
            created_at,
            is_image,
            width,
            height,
            frame_count,
            fps,
            compressed,
        };
        metadata.validate().map_err(SanchezError::Format)?;
        Ok(metadata)
    }

    /// Field-level invariants shared by writers and readers.
    pub fn validate(&self) -> std::result::Result<(), FormatError> {
        if self.width == 0 || self.height == 0 {
            return Err(FormatError::Malformed(format!(
                "frame size {}x{} must be positive",
                self.width, self.height
            )));
        }
        if self.resolution().frame_size().is_none() {
            return Err(FormatError::Malformed(format!(
                "frame size {}x{} overflows",
                self.width, self.height
            )));
        }
        if self.frame_count == 0 {
            return Err(FormatError::Malformed("frame count must be positive".into()));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(FormatError::Malformed(format!(
                "fps {} must be positive",
                self.fps
            )));
        }
        if self.is_image && self.frame_count != 1 {
            return Err(FormatError::Malformed(format!(
                "image container with {} frames",
                self.frame_count
            )));
        }
        Ok(())
    }
}

/// Location of one frame's blob inside the payload region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndexEntry {
    /// Relative to the first payload byte
    pub offset: u64,
    /// Blob size in bytes
    pub length: u32,
}

impl IndexEntry {
    /// First payload byte past this blob.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length as u64)
    }

    /// Appends the 12-byte table entry.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.offset);
        buf.put_u32_le(self.length);
    }

    /// Reads one table entry.
    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(IndexEntry {
            offset: reader.read_u64()?,
            length: reader.read_u32()?,
        })
    }
}

fn malformed(msg: String) -> SanchezError {
    SanchezError::Format(FormatError::Malformed(msg))
}

fn put_string(buf: &mut BytesMut, field: &str, value: &str) -> Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| SanchezError::Encoding(format!("{} is too long ({} bytes)", field, value.len())))?;
    buf.put_u32_le(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn read_string(reader: &mut ByteReader<'_>, field: &str) -> Result<String> {
    let len = reader.read_u32()? as usize;
    let bytes = reader.read_bytes(len)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| malformed(format!("{} is not UTF-8: {}", field, e)))
}

fn read_flag(reader: &mut ByteReader<'_>, field: &str) -> Result<bool> {
    match reader.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(malformed(format!("{} flag has value {}", field, other))),
    }
}
