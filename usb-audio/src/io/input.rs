//! USB receive path (host → device).
//!
//! Incoming isochronous packets carry interleaved multi-channel PCM. The
//! transfer-completion callback deinterleaves each packet into an
//! in-progress [`ChannelSet`]; once per audio period the audio task claims
//! the most recently completed set.
//!
//! ```text
//! completion callback                           audio task
//! ┌──────────────────┐    ready slot (owned     ┌─────────────────┐
//! │ on_packet(bytes)  │───── handoff, O(1)) ───►│ claim_ready()    │
//! │  deinterleave     │                          │  → ChannelSet    │
//! │  fill cursor      │    fresh flag / fill     │  rate feedback   │
//! └──────────────────┘    level (atomics)        └─────────────────┘
//! ```
//!
//! The two contexts meet only at the handoff slot and a few atomics; the
//! callback never blocks, never copies across the boundary, and handles
//! every fault (overrun, underrun, pool exhaustion) by dropping data and
//! counting, never by waiting.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::block::ChannelSet;
use crate::constants::{
    AUDIO_BLOCK_SAMPLES, BYTES_PER_FRAME, FEEDBACK_UNDERRUN_STEP, TARGET_FILL,
};
use crate::feedback::RateFeedback;

use super::handoff::Slot;
use super::packing::deinterleave;

/// Receive-path engine state shared between the two execution contexts.
///
/// Construct one per receive endpoint and [`split()`](Self::split) it into
/// the producer half (driven by the transport's completion callback) and
/// the consumer half (driven by the audio task).
pub struct UsbAudioInput {
    /// The completed set waiting for the consumer.
    ready: Slot<ChannelSet>,
    /// Set whenever a packet arrives, cleared at each claim.
    fresh: AtomicBool,
    /// Mirror of the producer's fill cursor, read at claim time to derive
    /// the steady-state rate correction.
    fill_level: AtomicUsize,
    overruns: AtomicU32,
    underruns: AtomicU32,
    discards: AtomicU32,
}

impl UsbAudioInput {
    /// Create a new receive path with no data in flight.
    pub const fn new() -> Self {
        UsbAudioInput {
            ready: Slot::new(),
            fresh: AtomicBool::new(false),
            fill_level: AtomicUsize::new(0),
            overruns: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
            discards: AtomicU32::new(0),
        }
    }

    /// Split into the packet-producer half and the block-consumer half.
    ///
    /// The producer belongs to the transfer-completion callback context,
    /// the consumer to the ordinary audio task. Exclusive borrows enforce
    /// single-producer / single-consumer use.
    pub fn split(&mut self) -> (InputProducer<'_>, InputConsumer<'_>) {
        let shared = &*self;
        (
            InputProducer {
                shared,
                pending: None,
                cursor: 0,
            },
            InputConsumer { shared },
        )
    }

    /// Completed periods that could not be published because the previous
    /// one was still unclaimed.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Claims that found no data waiting.
    pub fn underruns(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Periods dropped because the pool could not supply fresh blocks.
    pub fn discards(&self) -> u32 {
        self.discards.load(Ordering::Relaxed)
    }
}

impl Default for UsbAudioInput {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback-context half of the receive path.
pub struct InputProducer<'a> {
    shared: &'a UsbAudioInput,
    /// The set currently being filled. `None` until the first packet, or
    /// after a pool-exhaustion reset.
    pending: Option<ChannelSet>,
    /// Samples written into `pending` so far, per channel. Sits at
    /// `AUDIO_BLOCK_SAMPLES` only while a completed set waits out an
    /// overrun.
    cursor: usize,
}

impl InputProducer<'_> {
    /// Feed one received packet into the stream.
    ///
    /// Called from the transfer-completion callback whenever a receive
    /// transfer finishes, including the zero-length completion that
    /// bootstraps the endpoint. Runs in bounded time and never blocks:
    /// every fault path drops data and returns.
    pub fn on_packet(&mut self, raw: &[u8]) {
        self.shared.fresh.store(true, Ordering::Relaxed);

        let mut frames = raw.len() / BYTES_PER_FRAME;
        let mut offset = 0usize;

        if frames > 0 && self.pending.is_none() {
            // First packet, or recovery after a pool-exhaustion reset.
            self.pending = ChannelSet::allocate();
            self.cursor = 0;
            if self.pending.is_none() {
                self.shared.discards.fetch_add(1, Ordering::Relaxed);
                self.shared.fill_level.store(0, Ordering::Relaxed);
                return;
            }
        }

        while frames > 0 {
            let avail = AUDIO_BLOCK_SAMPLES - self.cursor;

            if avail == 0 {
                // The in-progress set is full but unpublished — left over
                // from an earlier overrun.
                if self.shared.ready.is_occupied() {
                    break; // still no room; the rest of this packet is lost
                }
                if !self.publish_and_refill() {
                    break;
                }
                continue;
            }

            let n = frames.min(avail);
            let cursor = self.cursor;
            if let Some(set) = self.pending.as_mut() {
                let bytes = &raw[offset * BYTES_PER_FRAME..(offset + n) * BYTES_PER_FRAME];
                let [c0, c1, c2, c3] = set.channels_mut();
                let r = cursor..cursor + n;
                deinterleave(
                    bytes,
                    [
                        &mut c0[r.clone()],
                        &mut c1[r.clone()],
                        &mut c2[r.clone()],
                        &mut c3[r],
                    ],
                );
            }
            offset += n;
            frames -= n;
            self.cursor += n;

            if self.cursor == AUDIO_BLOCK_SAMPLES {
                // Period boundary.
                if self.shared.ready.is_occupied() {
                    // Overrun — the consumer has not claimed the previous
                    // set. The just-filled set stays in place; whatever is
                    // left of this packet is lost for the period.
                    self.shared.overruns.fetch_add(1, Ordering::Relaxed);
                    warn!("usb audio rx overrun");
                    break;
                }
                if !self.publish_and_refill() {
                    break;
                }
            }
        }

        self.shared.fill_level.store(self.cursor, Ordering::Relaxed);
    }

    /// Publish the full in-progress set and start a fresh one.
    ///
    /// Returns `false` if the pool could not supply a complete replacement
    /// set; the in-flight period is dropped and filling restarts at the
    /// next packet.
    fn publish_and_refill(&mut self) -> bool {
        if let Some(set) = self.pending.take() {
            if let Err(set) = self.shared.ready.offer(set) {
                // The slot was grabbed mid-exchange; treat it as occupied.
                self.pending = Some(set);
                self.shared.overruns.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }
        self.cursor = 0;
        match ChannelSet::allocate() {
            Some(fresh) => {
                self.pending = Some(fresh);
                true
            }
            None => {
                self.pending = None;
                self.shared.discards.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Audio-task half of the receive path.
pub struct InputConsumer<'a> {
    shared: &'a UsbAudioInput,
}

impl InputConsumer<'_> {
    /// Claim the most recently completed period, once per audio period.
    ///
    /// Returns `None` on underrun — the caller substitutes silence for the
    /// period. Also feeds the rate controller: when data arrived since the
    /// last claim, the accumulator is nudged toward the half-full target by
    /// the current fill distance; on underrun it takes the large fixed step
    /// instead.
    pub fn claim_ready(&mut self, feedback: &RateFeedback) -> Option<ChannelSet> {
        let claimed = self.shared.ready.take();
        let fresh = self.shared.fresh.swap(false, Ordering::Relaxed);
        let fill = self.shared.fill_level.load(Ordering::Relaxed);

        match claimed {
            Some(set) => {
                if fresh {
                    feedback.adjust(TARGET_FILL as i32 - fill as i32);
                }
                Some(set)
            }
            None => {
                self.shared.underruns.fetch_add(1, Ordering::Relaxed);
                feedback.adjust(FEEDBACK_UNDERRUN_STEP);
                None
            }
        }
    }

    /// Whether a completed period is waiting to be claimed.
    pub fn ready_pending(&self) -> bool {
        self.shared.ready.is_occupied()
    }

    /// See [`UsbAudioInput::overruns`].
    pub fn overruns(&self) -> u32 {
        self.shared.overruns()
    }

    /// See [`UsbAudioInput::underruns`].
    pub fn underruns(&self) -> u32 {
        self.shared.underruns()
    }

    /// See [`UsbAudioInput::discards`].
    pub fn discards(&self) -> u32 {
        self.shared.discards()
    }

    #[cfg(test)]
    fn fill_level(&self) -> usize {
        self.shared.fill_level.load(Ordering::Relaxed)
    }
}
