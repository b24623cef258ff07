use super::types::*;
use crate::av::RawFrame;
use crate::codec;
use crate::error::{FormatError, Result, SanchezError};
use crate::utils::ByteReader;
use bytes::{BufMut, Bytes, BytesMut};
use log::trace;

/// Everything in front of the payload region: signature, metadata and index.
///
/// Parsing a header never looks at payload bytes, so it succeeds on files
/// whose payload is damaged as long as the header and index are intact.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHeader {
    /// Layout version
    pub version: FormatVersion,
    /// Descriptive record
    pub metadata: Metadata,
    /// One entry per frame, in frame order
    pub index: Vec<IndexEntry>,
    /// Byte length of the header; the payload region starts here
    pub header_len: usize,
}

impl ContainerHeader {
    /// Parses magic, version, metadata and the frame index from the front of `data`.
    ///
    /// Magic and version are validated before anything else is read.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);

        let magic: [u8; MAGIC_SIZE] = reader.read_array()?;
        if magic != MAGIC {
            return Err(FormatError::InvalidMagic(magic).into());
        }
        let version = FormatVersion::try_from(reader.read_u16()?)?;

        let metadata = Metadata::read_from(&mut reader)?;

        // Check the whole table fits before allocating for it
        let table_len = metadata.frame_count as usize * INDEX_ENTRY_SIZE;
        if reader.remaining() < table_len {
            return Err(SanchezError::truncated(
                (reader.position() + table_len) as u64,
                data.len() as u64,
            ));
        }

        // Blobs are packed back to back: each offset is the running sum of prior lengths
        let mut index = Vec::with_capacity(metadata.frame_count as usize);
        let mut next_offset = 0u64;
        for i in 0..metadata.frame_count {
            let entry = IndexEntry::read_from(&mut reader)?;
            if entry.offset != next_offset {
                return Err(FormatError::Malformed(format!(
                    "index entry {} starts at {}, expected {}",
                    i, entry.offset, next_offset
                ))
                .into());
            }
            next_offset = entry.offset.checked_add(entry.length as u64).ok_or_else(|| {
                SanchezError::Format(FormatError::Malformed(format!(
                    "index entry {} overflows",
                    i
                )))
            })?;
            index.push(entry);
        }

        Ok(ContainerHeader {
            version,
            metadata,
            index,
            header_len: reader.position(),
        })
    }

    /// Number of index entries.
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Index entry for frame `index`.
    pub fn entry(&self, index: usize) -> Result<IndexEntry> {
        self.index
            .get(index)
            .copied()
            .ok_or(SanchezError::OutOfRange {
                index,
                frame_count: self.index.len(),
            })
    }

    /// Exact size of the payload region: the sum of all blob lengths.
    pub fn payload_len(&self) -> u64 {
        self.index.iter().map(IndexEntry::end).max().unwrap_or(0)
    }
}

/// A complete container held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    /// Layout version
    pub version: FormatVersion,
    /// Descriptive record
    pub metadata: Metadata,
    /// One entry per frame, in frame order
    pub index: Vec<IndexEntry>,
    /// Concatenated frame blobs
    pub payload: Bytes,
}

impl Container {
    /// Writes magic, version, metadata, index table, then the payload region.
    pub fn serialize(&self) -> Result<Bytes> {
        if self.index.len() != self.metadata.frame_count as usize {
            return Err(SanchezError::Encoding(format!(
                "index has {} entries but metadata declares {} frames",
                self.index.len(),
                self.metadata.frame_count
            )));
        }
        self.metadata
            .validate()
            .map_err(|e| SanchezError::Encoding(e.to_string()))?;
        let mut next_offset = 0u64;
        for (i, entry) in self.index.iter().enumerate() {
            if entry.offset != next_offset {
                return Err(SanchezError::Encoding(format!(
                    "index entry {} starts at {}, expected {}",
                    i, entry.offset, next_offset
                )));
            }
            next_offset = entry.end();
        }
        if next_offset != self.payload.len() as u64 {
            return Err(SanchezError::Encoding(format!(
                "index covers {} bytes but payload holds {}",
                next_offset,
                self.payload.len()
            )));
        }

        let header_len = MAGIC_SIZE
            + VERSION_SIZE
            + self.metadata.encoded_len()
            + self.index.len() * INDEX_ENTRY_SIZE;
        let mut buf = BytesMut::with_capacity(header_len + self.payload.len());
        buf.put_slice(&MAGIC);
        buf.put_u16_le(self.version.as_u16());
        self.metadata.write_to(&mut buf)?;
        for entry in &self.index {
            entry.write_to(&mut buf);
        }
        buf.put_slice(&self.payload);
        trace!(
            "serialized container: header {} bytes, payload {} bytes",
            header_len,
            self.payload.len()
        );
        Ok(buf.freeze())
    }

    /// Parses a full container. The payload region must hold exactly the indexed blobs.
    pub fn deserialize(data: impl Into<Bytes>) -> Result<Self> {
        let data: Bytes = data.into();
        let header = ContainerHeader::parse(&data)?;
        let payload = data.slice(header.header_len..);

        let expected = header.payload_len();
        let available = payload.len() as u64;
        if available < expected {
            return Err(SanchezError::truncated(
                header.header_len as u64 + expected,
                data.len() as u64,
            ));
        }
        if available > expected {
            return Err(FormatError::Malformed(format!(
                "{} bytes after the last frame",
                available - expected
            ))
            .into());
        }

        Ok(Container {
            version: header.version,
            metadata: header.metadata,
            index: header.index,
            payload,
        })
    }

    /// Number of stored frames.
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// The stored blob of frame `index`, located through the index table alone.
    pub fn frame_bytes(&self, index: usize) -> Result<Bytes> {
        let entry = self.index.get(index).ok_or(SanchezError::OutOfRange {
            index,
            frame_count: self.index.len(),
        })?;
        let start = entry.offset as usize;
        let end = entry.end() as usize;
        if end > self.payload.len() {
            return Err(SanchezError::truncated(end as u64, self.payload.len() as u64));
        }
        Ok(self.payload.slice(start..end))
    }

    /// Decompresses frame `index` into pixels.
    pub fn decode_frame(&self, index: usize) -> Result<RawFrame> {
        let blob = self.frame_bytes(index)?;
        let pixels = codec::decode_frame(
            &blob,
            self.metadata.compressed,
            self.metadata.frame_size()?,
        )?;
        RawFrame::new(self.metadata.width, self.metadata.height, pixels)
    }
}

/// Assembles a container one blob at a time.
///
/// Offsets are the running sum of the lengths of the blobs pushed before.
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    index: Vec<IndexEntry>,
    payload: BytesMut,
}

impl ContainerBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one frame's blob and returns its index entry.
    pub fn push_frame(&mut self, blob: &[u8]) -> Result<IndexEntry> {
        let length = u32::try_from(blob.len()).map_err(|_| {
            SanchezError::Encoding(format!("frame blob of {} bytes exceeds u32", blob.len()))
        })?;
        let entry = IndexEntry {
            offset: self.payload.len() as u64,
            length,
        };
        self.payload.put_slice(blob);
        self.index.push(entry);
        Ok(entry)
    }

    /// Frames pushed so far.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True before the first frame is pushed.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Payload bytes pushed so far.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Seals the container; `metadata.frame_count` must match the frames pushed.
    pub fn finish(self, metadata: Metadata) -> Result<Container> {
        if self.index.len() != metadata.frame_count as usize {
            return Err(SanchezError::Encoding(format!(
                "{} frames pushed but metadata declares {}",
                self.index.len(),
                metadata.frame_count
            )));
        }
        Ok(Container {
            version: FormatVersion::CURRENT,
            metadata,
            index: self.index,
            payload: self.payload.freeze(),
        })
    }
}
