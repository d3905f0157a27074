//! Byte framing shared by table files and log frames
//!
//! All integers are little-endian. Variable-length fields are prefixed with
//! their length as u32. Every frame ends with a CRC32 (IEEE) of all bytes
//! that precede it.

use crc32fast::Hasher;

/// Computes a CRC32 checksum over the provided data
pub(crate) fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Appends `[len u32][bytes]`
pub(crate) fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

/// Appends the checksum of everything written so far and returns the frame
pub(crate) fn seal(mut buf: Vec<u8>) -> Vec<u8> {
    let checksum = compute_checksum(&buf);
    put_u32(&mut buf, checksum);
    buf
}

/// Patches the leading length field of a frame under construction
pub(crate) fn patch_len(buf: &mut [u8], total: usize) {
    buf[..4].copy_from_slice(&(total as u32).to_le_bytes());
}

/// Splits the next sealed frame off `data`
///
/// Returns the frame body (after the length field, before the checksum) and
/// the total frame length, or a description of what is wrong.
pub(crate) fn open_frame(data: &[u8], min_len: usize) -> Result<(&[u8], usize), String> {
    if data.len() < 4 {
        return Err(format!("truncated frame header: {} bytes", data.len()));
    }
    let total = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if total < min_len {
        return Err(format!("frame length {} below minimum {}", total, min_len));
    }
    if total > data.len() {
        return Err(format!(
            "truncated frame: length {} but {} bytes remain",
            total,
            data.len()
        ));
    }
    let crc_at = total - 4;
    let expected = u32::from_le_bytes([
        data[crc_at],
        data[crc_at + 1],
        data[crc_at + 2],
        data[crc_at + 3],
    ]);
    let actual = compute_checksum(&data[..crc_at]);
    if actual != expected {
        return Err(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            expected, actual
        ));
    }
    Ok((&data[4..crc_at], total))
}

/// Sequential reader over a frame body
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        if self.data.len() - self.pos < len {
            return Err(format!(
                "field of {} bytes overruns frame at {}",
                len, self.pos
            ));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, String> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(out))
    }

    /// Reads a `[len u32][bytes]` field
    pub(crate) fn bytes(&mut self) -> Result<Vec<u8>, String> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}
