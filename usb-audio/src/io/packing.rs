//! Wire packing for interleaved multi-channel PCM.
//!
//! One sample frame on the wire is `CHANNELS × 2` bytes: a sequence of
//! 32-bit words, each holding two channels' 16-bit signed samples with the
//! lower-numbered channel in the low half. With 4 channels a frame is two
//! words / 8 bytes, little-endian:
//!
//! ```text
//! byte:   0    1    2    3    4    5    6    7
//!        ch0.lo ch0.hi ch1.lo ch1.hi ch2.lo ch2.hi ch3.lo ch3.hi
//!        └──── word 0 (ch1 << 16 | ch0) ──┘└──── word 1 (ch3 << 16 | ch2) ──┘
//! ```
//!
//! A packet's byte length is always a multiple of the frame size; dividing
//! by it yields the per-channel sample count.

use crate::constants::{BYTES_PER_FRAME, CHANNELS};

/// Deinterleave packed wire frames into per-channel sample slices.
///
/// Every destination slice receives `src.len() / BYTES_PER_FRAME` samples.
///
/// # Panics
///
/// Debug-asserts that `src` holds whole frames and that every destination
/// slice has exactly one sample per frame.
pub fn deinterleave(src: &[u8], mut dest: [&mut [i16]; CHANNELS]) {
    let frames = src.len() / BYTES_PER_FRAME;
    debug_assert_eq!(src.len(), frames * BYTES_PER_FRAME);
    for d in dest.iter() {
        debug_assert_eq!(d.len(), frames);
    }

    for (f, frame) in src.chunks_exact(BYTES_PER_FRAME).enumerate() {
        for (ch, out) in dest.iter_mut().enumerate() {
            out[f] = i16::from_le_bytes([frame[ch * 2], frame[ch * 2 + 1]]);
        }
    }
}

/// Interleave per-channel sample slices into packed wire frames.
///
/// Writes `src[0].len()` frames into `dest`.
///
/// # Panics
///
/// Debug-asserts that all source slices have the same length and that
/// `dest` holds exactly one frame per sample.
pub fn interleave(dest: &mut [u8], src: [&[i16]; CHANNELS]) {
    let frames = src[0].len();
    for s in src.iter() {
        debug_assert_eq!(s.len(), frames);
    }
    debug_assert_eq!(dest.len(), frames * BYTES_PER_FRAME);

    for (f, frame) in dest.chunks_exact_mut(BYTES_PER_FRAME).enumerate() {
        for (ch, input) in src.iter().enumerate() {
            let bytes = input[f].to_le_bytes();
            frame[ch * 2] = bytes[0];
            frame[ch * 2 + 1] = bytes[1];
        }
    }
}

/// Fill a region of an outgoing packet with silence.
pub fn silence(dest: &mut [u8]) {
    dest.fill(0);
}
