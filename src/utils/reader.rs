use crate::error::{Result, SanchezError};

/// A little-endian reader over a byte slice.
///
/// Every read is bounds-checked; running past the end yields
/// `FormatError::Truncated` carrying the absolute byte count that would have
/// been needed, so callers can tell how much more input a parse requires.
///
/// Example:
/// ```
/// use sanchez::utils::ByteReader;
///
/// let data = [0x2a, 0x00, 0x00, 0x00, b'h', b'i'];
/// let mut reader = ByteReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 42);
/// assert_eq!(reader.read_bytes(2).unwrap(), b"hi");
/// assert_eq!(reader.remaining(), 0);
/// ```
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a new reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, offset: 0 }
    }

    /// Reads exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(n)
            .ok_or_else(|| SanchezError::truncated(u64::MAX, self.data.len() as u64))?;
        if end > self.data.len() {
            return Err(SanchezError::truncated(end as u64, self.data.len() as u64));
        }
        let out = &self.data[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    /// Reads a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian f64.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Current position from the start of the buffer.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Returns number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Returns the unread tail of the buffer without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }
}
