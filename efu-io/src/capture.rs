//! Packet capture files.
//!
//! A capture is the magic `EFUCAP01` followed by one record per packet:
//! a little-endian `u32` payload length, then the payload bytes.

use crate::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// File magic of a capture.
pub const CAPTURE_MAGIC: &[u8; 8] = b"EFUCAP01";

const LENGTH_BYTES: usize = 4;

/// Appends packets to a capture file.
pub struct CaptureWriter {
    writer: BufWriter<File>,
    packets: u64,
}

impl CaptureWriter {
    /// Creates (or truncates) a capture file and writes the magic.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(CAPTURE_MAGIC)?;
        Ok(Self { writer, packets: 0 })
    }

    /// Appends one packet.
    ///
    /// # Errors
    /// Returns an error on write failure or if the packet exceeds `u32::MAX` bytes.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::InvalidFormat(format!("packet of {} bytes", payload.len())))?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.packets += 1;
        Ok(())
    }

    #[must_use]
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Flushes buffered packets to disk.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Checks the magic and returns the record area.
pub(crate) fn records(bytes: &[u8]) -> Result<&[u8]> {
    bytes
        .strip_prefix(CAPTURE_MAGIC.as_slice())
        .ok_or_else(|| Error::InvalidFormat("missing capture magic".into()))
}

/// Splits the next record off `bytes`.
///
/// Returns the payload and the number of bytes consumed, or `None` when the
/// record header or payload is truncated.
pub(crate) fn next_record(bytes: &[u8]) -> Option<(&[u8], usize)> {
    let header: [u8; LENGTH_BYTES] = bytes.get(..LENGTH_BYTES)?.try_into().ok()?;
    let len = u32::from_le_bytes(header) as usize;
    let payload = bytes.get(LENGTH_BYTES..LENGTH_BYTES + len)?;
    Some((payload, LENGTH_BYTES + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_written_layout() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = CaptureWriter::create(file.path()).unwrap();
        writer.write_packet(&[1, 2, 3]).unwrap();
        writer.write_packet(&[]).unwrap();
        assert_eq!(writer.packets(), 2);
        writer.finish().unwrap();

        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(&bytes[..8], CAPTURE_MAGIC);
        assert_eq!(&bytes[8..], &[3, 0, 0, 0, 1, 2, 3, 0, 0, 0, 0]);
    }

    #[test]
    fn test_record_split() {
        let area = records(b"EFUCAP01\x02\x00\x00\x00ab\x01\x00").unwrap();
        let (payload, used) = next_record(area).unwrap();
        assert_eq!(payload, b"ab");
        assert_eq!(used, 6);
        assert!(next_record(&area[used..]).is_none());
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(records(b"NOTACAPT"), Err(Error::InvalidFormat(_))));
        assert!(records(b"EFU").is_err());
    }
}
