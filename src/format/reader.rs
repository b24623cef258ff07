use super::container::ContainerHeader;
use super::types::Metadata;
use crate::av::RawFrame;
use crate::codec;
use crate::error::{FormatError, Result, SanchezError};
use bytes::Bytes;
use log::debug;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

// First read when parsing a header; grown on demand
const HEADER_READ_SIZE: u64 = 64 * 1024;

/// File-backed random access to a container.
///
/// Opening reads only the header and index. Each frame read seeks straight to
/// the frame's blob, so frame *k* costs the same whatever *k* is.
#[derive(Debug)]
pub struct ContainerReader {
    file: File,
    header: ContainerHeader,
    file_len: u64,
}

impl ContainerReader {
    /// Opens `path` and reads its header and index. No frame payload is read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).await?;
        let file_len = file.metadata().await?.len();
        let header = read_header(&mut file, file_len).await?;
        let expected_len = header.header_len as u64 + header.payload_len();
        if file_len > expected_len {
            return Err(FormatError::Malformed(format!(
                "{} bytes after the last frame",
                file_len - expected_len
            ))
            .into());
        }
        debug!(
            "opened {}: {} frames, header {} bytes",
            path.display(),
            header.frame_count(),
            header.header_len
        );
        Ok(Self {
            file,
            header,
            file_len,
        })
    }

    /// The parsed header and index.
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// The container's metadata record.
    pub fn metadata(&self) -> &Metadata {
        &self.header.metadata
    }

    /// Number of stored frames.
    pub fn frame_count(&self) -> usize {
        self.header.frame_count()
    }

    /// Size of the container file in bytes.
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Reads the stored blob of frame `index` straight from disk.
    pub async fn read_frame_bytes(&mut self, index: usize) -> Result<Bytes> {
        let entry = self.header.entry(index)?;
        let start = self.header.header_len as u64 + entry.offset;
        let end = start + entry.length as u64;
        if end > self.file_len {
            return Err(SanchezError::truncated(end, self.file_len));
        }
        self.file.seek(SeekFrom::Start(start)).await?;
        let mut blob = vec![0u8; entry.length as usize];
        self.file.read_exact(&mut blob).await?;
        Ok(Bytes::from(blob))
    }

    /// Reads and decompresses frame `index`.
    pub async fn read_frame(&mut self, index: usize) -> Result<RawFrame> {
        let blob = self.read_frame_bytes(index).await?;
        let meta = &self.header.metadata;
        let (width, height, compressed, size) =
            (meta.width, meta.height, meta.compressed, meta.frame_size()?);
        let pixels = tokio::task::spawn_blocking(move || {
            codec::decode_frame(&blob, compressed, size)
        })
        .await
        .map_err(|e| SanchezError::Encoding(format!("decode task failed: {}", e)))??;
        RawFrame::new(width, height, pixels)
    }
}

/// Reads just enough of the file to parse the header.
///
/// Starts with a fixed-size read and, when the parse reports truncation, reads up to
/// the byte count it asked for. Payload bytes are never parsed.
pub async fn read_header(file: &mut File, file_len: u64) -> Result<ContainerHeader> {
    file.seek(SeekFrom::Start(0)).await?;
    let mut buf = vec![0u8; HEADER_READ_SIZE.min(file_len) as usize];
    file.read_exact(&mut buf).await?;

    loop {
        match ContainerHeader::parse(&buf) {
            Ok(header) => return Ok(header),
            Err(SanchezError::Format(FormatError::Truncated { needed, .. }))
                if (buf.len() as u64) < file_len =>
            {
                let target = needed.max(buf.len() as u64 * 2).min(file_len) as usize;
                let start = buf.len();
                buf.resize(target, 0);
                file.read_exact(&mut buf[start..]).await?;
            }
            Err(SanchezError::Format(FormatError::Truncated { needed, .. })) => {
                return Err(SanchezError::truncated(needed, file_len));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parses only the header of the container at `path`; returns it with the file size.
pub async fn read_header_from_path(path: impl AsRef<Path>) -> Result<(ContainerHeader, u64)> {
    let mut file = File::open(path.as_ref()).await?;
    let file_len = file.metadata().await?.len();
    let header = read_header(&mut file, file_len).await?;
    Ok((header, file_len))
}
