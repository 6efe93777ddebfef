//! Integration tests exercising both stream paths end to end in software.
//!
//! The core pattern is a software loopback standing in for the USB bus:
//!
//! ```text
//! push → [transmit pipeline] → fill_packet → (bytes) → on_packet
//!     → [ready slot] → claim_ready
//! ```
//!
//! Packets keep their real sizes (the 44/45-frame alternation), so period
//! boundaries fall mid-packet exactly as they do on the bus.

use crate::block::pool::{test_guard, POOL};
use crate::block::{ChannelSet, SampleBlock};
use crate::constants::{
    AUDIO_BLOCK_SAMPLES, BYTES_PER_FRAME, CHANNELS, MAX_PACKET_BYTES,
};
use crate::feedback::RateFeedback;
use crate::io::input::UsbAudioInput;
use crate::io::output::UsbAudioOutput;

use std::vec::Vec;

/// A continuous, channel-distinct ramp: channel `ch`, absolute frame `idx`.
fn ramp(ch: usize, idx: usize) -> i16 {
    ((ch * 1000) as i16).wrapping_add(idx as i16)
}

/// Allocate the set holding frames `[period * 128, (period + 1) * 128)`.
fn ramp_period(period: usize) -> ChannelSet {
    let mut set = ChannelSet::allocate().unwrap();
    for (ch, samples) in set.channels_mut().into_iter().enumerate() {
        for (i, s) in samples.iter_mut().enumerate() {
            *s = ramp(ch, period * AUDIO_BLOCK_SAMPLES + i);
        }
    }
    set
}

#[test]
fn full_loopback_stream() {
    let _guard = test_guard();
    POOL.reset();

    let mut input = UsbAudioInput::new();
    let mut output = UsbAudioOutput::new();
    let feedback = RateFeedback::new();
    let (mut rx_packets, mut rx_blocks) = input.split();
    let (mut tx_blocks, mut tx_packets) = output.split();

    // Keep the pipeline topped up, loop every packet straight back into
    // the receive path, and claim each period as soon as it completes.
    let mut fed_frames = 0usize;
    let mut claimed = Vec::new();

    tx_blocks.push(ramp_period(0));
    tx_blocks.push(ramp_period(1));
    let mut pushed = 2usize;

    let mut buf = [0u8; MAX_PACKET_BYTES];
    for packet_no in 0..12 {
        let n = tx_packets.fill_packet(&mut buf);
        rx_packets.on_packet(&buf[..n]);
        fed_frames += n / BYTES_PER_FRAME;

        while (claimed.len() + 1) * AUDIO_BLOCK_SAMPLES <= fed_frames {
            claimed.push(rx_blocks.claim_ready(&feedback).unwrap());
        }
        // One fresh period for every ~3 packets drained.
        if packet_no % 3 == 2 {
            tx_blocks.push(ramp_period(pushed));
            pushed += 1;
        }
    }

    // 12 packets ≈ 529 frames → 4 complete periods claimed.
    assert_eq!(claimed.len(), 4);
    for (period, set) in claimed.iter().enumerate() {
        for ch in 0..CHANNELS {
            for i in 0..AUDIO_BLOCK_SAMPLES {
                assert_eq!(
                    set.channel(ch)[i],
                    ramp(ch, period * AUDIO_BLOCK_SAMPLES + i),
                    "period {period} channel {ch} sample {i}"
                );
            }
        }
    }

    // The stream stayed clean in both directions.
    assert_eq!(tx_blocks.overruns(), 0);
    assert_eq!(tx_blocks.underruns(), 0);
    assert_eq!(rx_blocks.overruns(), 0);
    assert_eq!(rx_blocks.underruns(), 0);
    assert_eq!(rx_blocks.discards(), 0);
}

#[test]
fn loopback_pool_accounting() {
    let _guard = test_guard();
    POOL.reset();
    assert_eq!(POOL.allocated_count(), 0, "pool should start clean");

    {
        let mut input = UsbAudioInput::new();
        let mut output = UsbAudioOutput::new();
        let feedback = RateFeedback::new();
        let (mut rx_packets, mut rx_blocks) = input.split();
        let (mut tx_blocks, mut tx_packets) = output.split();

        tx_blocks.push(ramp_period(0));
        tx_blocks.push(ramp_period(1));

        let mut buf = [0u8; MAX_PACKET_BYTES];
        let mut fed = 0usize;
        let mut claims = 0usize;
        for _ in 0..6 {
            let n = tx_packets.fill_packet(&mut buf);
            rx_packets.on_packet(&buf[..n]);
            fed += n / BYTES_PER_FRAME;
            while (claims + 1) * AUDIO_BLOCK_SAMPLES <= fed {
                let set = rx_blocks.claim_ready(&feedback).unwrap();
                claims += 1;
                drop(set);
            }
        }
        assert!(claims >= 2);
        // Engines drop here with blocks still in flight.
    }

    assert_eq!(
        POOL.allocated_count(),
        0,
        "all blocks should return to the pool when the engines drop"
    );
}

#[test]
fn silence_substitution_for_missing_channels() {
    let _guard = test_guard();
    POOL.reset();

    let mut output = UsbAudioOutput::new();
    let (mut tx_blocks, mut tx_packets) = output.split();

    // The caller only produced data for channel 0 this period.
    let mut only = SampleBlock::alloc().unwrap();
    only.fill(500);
    let set = ChannelSet::from_parts([Some(only), None, None, None]).unwrap();
    tx_blocks.push(set);

    let mut buf = [0u8; MAX_PACKET_BYTES];
    let n = tx_packets.fill_packet(&mut buf);
    for f in 0..n / BYTES_PER_FRAME {
        let at = f * BYTES_PER_FRAME;
        assert_eq!(i16::from_le_bytes([buf[at], buf[at + 1]]), 500);
        for ch in 1..CHANNELS {
            let at = at + ch * 2;
            assert_eq!(
                i16::from_le_bytes([buf[at], buf[at + 1]]),
                0,
                "channel {ch} frame {f} should be silent"
            );
        }
    }
}

#[test]
fn stalled_consumer_then_recovery() {
    let _guard = test_guard();
    POOL.reset();

    let mut input = UsbAudioInput::new();
    let mut output = UsbAudioOutput::new();
    let feedback = RateFeedback::new();
    let (mut rx_packets, mut rx_blocks) = input.split();
    let (mut tx_blocks, mut tx_packets) = output.split();

    // The audio task stalls: packets keep flowing, claims don't happen.
    tx_blocks.push(ramp_period(0));
    tx_blocks.push(ramp_period(1));
    let mut buf = [0u8; MAX_PACKET_BYTES];
    for _ in 0..6 {
        let n = tx_packets.fill_packet(&mut buf);
        rx_packets.on_packet(&buf[..n]);
    }

    // 6 packets ≈ 265 frames crossed two period boundaries with no claim.
    assert!(rx_blocks.overruns() >= 1);

    // Recovery: claiming resumes and fresh data flows end to end.
    assert!(rx_blocks.claim_ready(&feedback).is_some());
    let before = rx_blocks.underruns();
    tx_blocks.push(ramp_period(2));
    for _ in 0..3 {
        let n = tx_packets.fill_packet(&mut buf);
        rx_packets.on_packet(&buf[..n]);
    }
    assert!(rx_blocks.claim_ready(&feedback).is_some());
    assert_eq!(rx_blocks.underruns(), before);
}
