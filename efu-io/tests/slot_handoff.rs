//! Cross-thread behavior of the slot buffer.

use efu_io::{slot_buffer, Publish};
use std::thread;

const PACKETS: u32 = 20_000;
const SLOT_SIZE: usize = 64;

fn fill(slot: &mut [u8], sequence: u32) -> usize {
    let len = 4 + (sequence as usize % (SLOT_SIZE - 4));
    slot[..4].copy_from_slice(&sequence.to_le_bytes());
    for (i, byte) in slot[4..len].iter_mut().enumerate() {
        *byte = (sequence as usize + i) as u8;
    }
    len
}

fn check(packet: &[u8]) -> u32 {
    let sequence = u32::from_le_bytes(packet[..4].try_into().unwrap());
    assert_eq!(packet.len(), 4 + (sequence as usize % (SLOT_SIZE - 4)));
    for (i, byte) in packet[4..].iter().enumerate() {
        assert_eq!(*byte, (sequence as usize + i) as u8, "packet {sequence} corrupted");
    }
    sequence
}

#[test]
fn lossless_when_producer_retries() {
    let (mut producer, mut consumer) = slot_buffer(8, SLOT_SIZE).unwrap();
    let writer = thread::spawn(move || {
        for sequence in 0..PACKETS {
            let len = fill(producer.slot_mut(), sequence);
            while let Publish::Dropped(_) = producer.publish(len) {
                thread::yield_now();
            }
        }
    });

    let mut expected = 0;
    while expected < PACKETS {
        match consumer.pop() {
            Some(slot) => {
                assert_eq!(check(&slot), expected);
                expected += 1;
            }
            None => thread::yield_now(),
        }
    }
    writer.join().unwrap();
    assert!(consumer.pop().is_none());
}

#[test]
fn lossy_producer_never_corrupts_delivered_packets() {
    let (mut producer, mut consumer) = slot_buffer(4, SLOT_SIZE).unwrap();
    let writer = thread::spawn(move || {
        let mut dropped = 0u32;
        for sequence in 0..PACKETS {
            let len = fill(producer.slot_mut(), sequence);
            if let Publish::Dropped(_) = producer.publish(len) {
                dropped += 1;
            }
        }
        dropped
    });

    let mut delivered = 0u32;
    let mut last = None;
    loop {
        match consumer.pop() {
            Some(slot) => {
                let sequence = check(&slot);
                assert!(last.map_or(true, |l| sequence > l), "out of order");
                last = Some(sequence);
                delivered += 1;
            }
            None if writer.is_finished() => {
                // drain what is left after the producer stopped
                while let Some(slot) = consumer.pop() {
                    check(&slot);
                    delivered += 1;
                }
                break;
            }
            None => thread::yield_now(),
        }
    }
    let dropped = writer.join().unwrap();
    assert_eq!(delivered + dropped, PACKETS);
}
