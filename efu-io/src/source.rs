//! Packet sources feeding the receiver.

use crate::capture::{next_record, records};
use crate::Result;
use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::Path;
use std::time::Duration;

/// Outcome of one [`PacketSource::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A packet of this many bytes was written to the buffer.
    Packet(usize),
    /// Nothing arrived within the receive timeout.
    Timeout,
    /// The source will never deliver more packets.
    Exhausted,
}

/// Something the receiver thread can pull packets from.
pub trait PacketSource: Send {
    /// Waits a bounded time for one packet and copies it into `buf`.
    ///
    /// Packets longer than `buf` are truncated.
    ///
    /// # Errors
    /// Returns an error the source cannot recover from.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Received>;
}

/// UDP socket with a read timeout.
pub struct UdpSource {
    socket: UdpSocket,
}

impl UdpSource {
    /// Binds a socket; `receive` gives up after `timeout`.
    ///
    /// # Errors
    /// Returns an error if binding or setting the timeout fails.
    pub fn bind<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(Self { socket })
    }

    /// Address the socket is bound to.
    ///
    /// # Errors
    /// Returns an error if the address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSource for UdpSource {
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Received> {
        match self.socket.recv(buf) {
            Ok(len) => Ok(Received::Packet(len)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(Received::Timeout)
            }
            Err(e) => Err(e),
        }
    }
}

/// Replays the packets of a capture file, then reports exhaustion.
pub struct CaptureReplay {
    mmap: Mmap,
    offset: usize,
    packets: u64,
}

impl CaptureReplay {
    /// Memory-maps a capture file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or lacks the magic.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        let offset = mmap.len() - records(&mmap)?.len();
        Ok(Self {
            mmap,
            offset,
            packets: 0,
        })
    }

    /// Packets delivered so far.
    #[must_use]
    pub fn packets(&self) -> u64 {
        self.packets
    }
}

impl PacketSource for CaptureReplay {
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Received> {
        let rest = &self.mmap[self.offset..];
        if rest.is_empty() {
            return Ok(Received::Exhausted);
        }
        let (payload, used) = next_record(rest).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("truncated capture record at byte {}", self.offset),
            )
        })?;
        let len = payload.len().min(buf.len());
        buf[..len].copy_from_slice(&payload[..len]);
        self.offset += used;
        self.packets += 1;
        Ok(Received::Packet(len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureWriter;
    use tempfile::NamedTempFile;

    #[test]
    fn test_replay_in_order() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = CaptureWriter::create(file.path()).unwrap();
        writer.write_packet(b"first").unwrap();
        writer.write_packet(b"second packet").unwrap();
        writer.finish().unwrap();

        let mut replay = CaptureReplay::open(file.path()).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(replay.receive(&mut buf).unwrap(), Received::Packet(5));
        assert_eq!(&buf[..5], b"first");
        // truncated to the buffer, like a datagram
        assert_eq!(replay.receive(&mut buf).unwrap(), Received::Packet(8));
        assert_eq!(&buf, b"second p");
        assert_eq!(replay.receive(&mut buf).unwrap(), Received::Exhausted);
        assert_eq!(replay.receive(&mut buf).unwrap(), Received::Exhausted);
        assert_eq!(replay.packets(), 2);
    }

    #[test]
    fn test_truncated_record_is_error() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"EFUCAP01\x09\x00\x00\x00abc").unwrap();
        let mut replay = CaptureReplay::open(file.path()).unwrap();
        let mut buf = [0u8; 16];
        let err = replay.receive(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"something else").unwrap();
        assert!(CaptureReplay::open(file.path()).is_err());
    }

    #[test]
    fn test_udp_receive_and_timeout() {
        let mut source = UdpSource::bind("127.0.0.1:0", Duration::from_millis(20)).unwrap();
        let addr = source.local_addr().unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(source.receive(&mut buf).unwrap(), Received::Timeout);

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"datagram", addr).unwrap();
        source.socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        assert_eq!(source.receive(&mut buf).unwrap(), Received::Packet(8));
        assert_eq!(&buf[..8], b"datagram");
    }
}
