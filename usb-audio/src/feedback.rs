//! Asynchronous rate feedback accumulator.
//!
//! The device runs on its own sample clock; the host runs on its own. The
//! feedback endpoint closes the loop: the device reports its measured
//! consumption rate and the host adjusts how much audio it sends per frame.
//!
//! [`RateFeedback`] holds that rate estimate as a 6.24 fixed-point value
//! (nominal samples per USB frame), seeded to the nominal sample rate. Both
//! stream paths nudge it: small signed deltas derived from buffer fullness
//! in steady state, and one large fixed step when a claim finds no data.
//! The wire value is a shift-truncated snapshot — deliberately imprecise,
//! self-correcting over many frames.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::constants::{FEEDBACK_NOMINAL, FEEDBACK_SHIFT_FULL, FEEDBACK_SHIFT_HIGH};
use crate::transport::UsbSpeed;

/// Shared fixed-point rate accumulator.
///
/// All operations are single atomic accesses, callable from either the
/// transfer-completion callback context or the audio task.
pub struct RateFeedback {
    accumulator: AtomicU32,
}

impl RateFeedback {
    /// Create an accumulator seeded to the nominal rate.
    pub const fn new() -> Self {
        RateFeedback {
            accumulator: AtomicU32::new(FEEDBACK_NOMINAL),
        }
    }

    /// Apply a signed correction. Positive deltas ask the host for more
    /// data, negative for less. Wrapping by design — the value is a rate
    /// estimate, not a counter.
    pub fn adjust(&self, delta: i32) {
        self.accumulator.fetch_add(delta as u32, Ordering::Relaxed);
    }

    /// The raw 6.24 accumulator value.
    pub fn raw(&self) -> u32 {
        self.accumulator.load(Ordering::Relaxed)
    }

    /// Produce the wire-format feedback value for the negotiated speed.
    ///
    /// Full speed: 3 bytes, 10.14 format. High speed: 4 bytes, 16.16
    /// format. The truncation is lossy; the channel only needs enough
    /// resolution to nudge the host's rate.
    pub fn snapshot(&self, speed: UsbSpeed) -> FeedbackValue {
        let acc = self.accumulator.load(Ordering::Relaxed);
        match speed {
            UsbSpeed::Full => FeedbackValue::new(acc >> FEEDBACK_SHIFT_FULL, 3),
            UsbSpeed::High => FeedbackValue::new(acc >> FEEDBACK_SHIFT_HIGH, 4),
        }
    }
}

impl Default for RateFeedback {
    fn default() -> Self {
        Self::new()
    }
}

/// A wire-format feedback value: 3 or 4 little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeedbackValue {
    bytes: [u8; 4],
    len: u8,
}

impl FeedbackValue {
    fn new(value: u32, len: u8) -> Self {
        FeedbackValue {
            bytes: value.to_le_bytes(),
            len,
        }
    }

    /// The bytes to place in the feedback packet.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FEEDBACK_UNDERRUN_STEP, TARGET_FILL};

    #[test]
    fn seeded_to_nominal_rate() {
        let fb = RateFeedback::new();
        // 44.1 samples per frame in 6.24 fixed point.
        assert_eq!(fb.raw(), ((44_100u64 << 24) / 1000) as u32);
    }

    #[test]
    fn adjust_moves_toward_target() {
        let fb = RateFeedback::new();
        let seed = fb.raw();

        // Fill below target: positive correction, bounded by half a block.
        let low_fill = 10usize;
        let delta = TARGET_FILL as i32 - low_fill as i32;
        fb.adjust(delta);
        assert_eq!(fb.raw(), seed + delta as u32);
        assert!(delta > 0 && delta <= TARGET_FILL as i32);

        // Fill above target: negative correction.
        let high_fill = 120usize;
        fb.adjust(TARGET_FILL as i32 - high_fill as i32);
        assert!(fb.raw() < seed + delta as u32);
    }

    #[test]
    fn underrun_step_dominates_steady_state() {
        // The emergency step must dwarf any fullness-derived delta.
        assert!(FEEDBACK_UNDERRUN_STEP > TARGET_FILL as i32);

        let fb = RateFeedback::new();
        let seed = fb.raw();
        fb.adjust(FEEDBACK_UNDERRUN_STEP);
        assert_eq!(fb.raw(), seed + FEEDBACK_UNDERRUN_STEP as u32);
    }

    #[test]
    fn steady_state_oscillates_without_diverging() {
        let fb = RateFeedback::new();
        let seed = fb.raw();

        // Model a consumer whose fill level responds to the correction:
        // above-nominal rate raises the fill, below-nominal lowers it.
        let mut fill = 20i32;
        for _ in 0..1000 {
            let delta = TARGET_FILL as i32 - fill;
            fb.adjust(delta);
            let rate_excess = fb.raw() as i64 - seed as i64;
            fill += (rate_excess / 16) as i32;
            fill = fill.clamp(0, 128);
        }
        // The loop settles near the seed instead of running away.
        let drift = (fb.raw() as i64 - seed as i64).abs();
        assert!(drift < 1000, "accumulator diverged by {drift}");
    }

    #[test]
    fn full_speed_snapshot_is_3_bytes_10_14() {
        let fb = RateFeedback::new();
        let value = fb.snapshot(UsbSpeed::Full);
        let expected = fb.raw() >> 10;
        assert_eq!(value.as_bytes().len(), 3);
        assert_eq!(
            value.as_bytes(),
            &expected.to_le_bytes()[..3],
            "10.14 truncation mismatch"
        );
    }

    #[test]
    fn high_speed_snapshot_is_4_bytes_16_16() {
        let fb = RateFeedback::new();
        let value = fb.snapshot(UsbSpeed::High);
        let expected = fb.raw() >> 8;
        assert_eq!(value.as_bytes().len(), 4);
        assert_eq!(value.as_bytes(), &expected.to_le_bytes());
    }

    #[test]
    fn snapshot_tracks_adjustments() {
        let fb = RateFeedback::new();
        let before = fb.snapshot(UsbSpeed::High);
        // Below the truncation step: invisible on the wire.
        fb.adjust(1);
        assert_eq!(fb.snapshot(UsbSpeed::High), before);
        // A large correction shows up.
        fb.adjust(1 << 12);
        assert_ne!(fb.snapshot(UsbSpeed::High), before);
    }
}
