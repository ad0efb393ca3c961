//! Readout payload decoding.

use efu_core::Hit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-packet decoding counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodeStats {
    /// Hits appended.
    pub readouts: u64,
    /// Bytes that did not form a complete record.
    pub bad_bytes: u64,
    /// Packet sequence discontinuities.
    pub seq_errors: u64,
}

/// Turns one packet payload into hits.
pub trait Decoder: Send {
    /// Appends the hits of `payload` to `hits`.
    fn decode(&mut self, payload: &[u8], hits: &mut Vec<Hit>) -> DecodeStats;
}

/// Size of the packet sequence-number header.
pub const HEADER_SIZE: usize = 4;
/// Size of one encoded hit record.
pub const RECORD_SIZE: usize = 13;

/// Decoder for the plain record format.
///
/// A packet starts with a little-endian `u32` sequence number, followed by
/// 13-byte records: time `u64`, coordinate `u16`, weight `u16` (all
/// little-endian) and plane `u8`.
#[derive(Debug, Clone, Default)]
pub struct RecordDecoder {
    last_sequence: Option<u32>,
}

impl RecordDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_sequence(&self) -> Option<u32> {
        self.last_sequence
    }
}

fn parse_record(record: &[u8; RECORD_SIZE]) -> Hit {
    let [t0, t1, t2, t3, t4, t5, t6, t7, c0, c1, w0, w1, plane] = *record;
    Hit::new(
        u64::from_le_bytes([t0, t1, t2, t3, t4, t5, t6, t7]),
        u16::from_le_bytes([c0, c1]),
        u16::from_le_bytes([w0, w1]),
        plane,
    )
}

impl Decoder for RecordDecoder {
    fn decode(&mut self, payload: &[u8], hits: &mut Vec<Hit>) -> DecodeStats {
        let mut stats = DecodeStats::default();
        let Some((header, body)) = payload.split_first_chunk::<HEADER_SIZE>() else {
            stats.bad_bytes = payload.len() as u64;
            return stats;
        };

        let sequence = u32::from_le_bytes(*header);
        if self
            .last_sequence
            .is_some_and(|last| sequence != last.wrapping_add(1))
        {
            stats.seq_errors = 1;
        }
        self.last_sequence = Some(sequence);

        let records = body.chunks_exact(RECORD_SIZE);
        stats.bad_bytes = records.remainder().len() as u64;
        for record in records {
            if let Ok(record) = record.try_into() {
                hits.push(parse_record(record));
                stats.readouts += 1;
            }
        }
        stats
    }
}

/// Encodes hits into one packet of the record format.
#[must_use]
pub fn encode_records(sequence: u32, hits: &[Hit]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(HEADER_SIZE + hits.len() * RECORD_SIZE);
    payload.extend_from_slice(&sequence.to_le_bytes());
    for hit in hits {
        payload.extend_from_slice(&hit.time.to_le_bytes());
        payload.extend_from_slice(&hit.coordinate.to_le_bytes());
        payload.extend_from_slice(&hit.weight.to_le_bytes());
        payload.push(hit.plane);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_records() {
        let sent = [Hit::new(0x0102_0304_0506, 17, 300, 0), Hit::new(99, 3, 1, 1)];
        let payload = encode_records(7, &sent);
        assert_eq!(payload.len(), HEADER_SIZE + 2 * RECORD_SIZE);

        let mut decoder = RecordDecoder::new();
        let mut hits = Vec::new();
        let stats = decoder.decode(&payload, &mut hits);
        assert_eq!(hits, sent);
        assert_eq!(stats.readouts, 2);
        assert_eq!(stats.bad_bytes, 0);
        assert_eq!(stats.seq_errors, 0);
        assert_eq!(decoder.last_sequence(), Some(7));
    }

    #[test]
    fn test_partial_record_counts_bad_bytes() {
        let mut payload = encode_records(0, &[Hit::new(1, 1, 1, 0)]);
        payload.extend_from_slice(&[0xff; 5]);
        let mut hits = Vec::new();
        let stats = RecordDecoder::new().decode(&payload, &mut hits);
        assert_eq!(stats.readouts, 1);
        assert_eq!(stats.bad_bytes, 5);
    }

    #[test]
    fn test_short_packet_is_bad() {
        let mut hits = Vec::new();
        let stats = RecordDecoder::new().decode(&[1, 2], &mut hits);
        assert_eq!(stats.bad_bytes, 2);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_sequence_gaps() {
        let mut decoder = RecordDecoder::new();
        let mut hits = Vec::new();
        let mut errors = 0;
        for sequence in [5, 6, 8, 9, 9, u32::MAX, 0] {
            errors += decoder.decode(&encode_records(sequence, &[]), &mut hits).seq_errors;
        }
        // 6 -> 8, 9 -> 9 and 9 -> MAX; MAX -> 0 wraps cleanly
        assert_eq!(errors, 3);
    }

    #[test]
    fn test_appends_to_existing() {
        let mut hits = vec![Hit::new(0, 0, 0, 0)];
        RecordDecoder::new().decode(&encode_records(0, &[Hit::new(1, 1, 1, 1)]), &mut hits);
        assert_eq!(hits.len(), 2);
    }
}
