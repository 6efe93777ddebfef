//! USB transmit path (device → host).
//!
//! The audio task pushes one [`ChannelSet`] per period; the transport's
//! completion callback drains whatever the host asks for next, one packet
//! at a time. Production is block-granular, consumption is packet-granular,
//! so a two-slot pipeline sits in between:
//!
//! ```text
//! audio task                                    completion callback
//! ┌──────────────┐    ┌─────────┬─────────┐    ┌───────────────────┐
//! │ push(set)     │───►│ current │  next   │───►│ fill_packet(buf)   │
//! └──────────────┘    │ +cursor │         │    │  interleave,       │
//!                      └─────────┴─────────┘    │  44/45-frame target│
//!                       at most 2 sets          └───────────────────┘
//! ```
//!
//! A third push with no draining evicts the oldest set — the host gets the
//! freshest audio, never stale data. An empty pipeline drains as silence.
//! Critical sections guard only the O(1) slot moves; sample copying happens
//! while the callback exclusively owns the set it took out.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::block::ChannelSet;
use crate::constants::{
    AUDIO_BLOCK_SAMPLES, BYTES_PER_FRAME, PACKET_EXTRA_INTERVAL, PACKET_FRAMES_BASE,
};

use super::packing::{interleave, silence};

/// The two-slot transmit pipeline. Only touched inside critical sections,
/// and only with O(1) slot moves.
struct TxPipeline {
    current: Option<ChannelSet>,
    next: Option<ChannelSet>,
    /// Samples already drained from `current`, per channel.
    cursor: usize,
}

/// Transmit-path engine state shared between the two execution contexts.
///
/// Construct one per transmit endpoint and [`split()`](Self::split) it into
/// the producer half (audio task) and the consumer half (completion
/// callback).
pub struct UsbAudioOutput {
    pipeline: Mutex<RefCell<TxPipeline>>,
    enabled: AtomicBool,
    overruns: AtomicU32,
    underruns: AtomicU32,
}

impl UsbAudioOutput {
    /// Create a new, enabled transmit path with an empty pipeline.
    pub const fn new() -> Self {
        UsbAudioOutput {
            pipeline: Mutex::new(RefCell::new(TxPipeline {
                current: None,
                next: None,
                cursor: 0,
            })),
            enabled: AtomicBool::new(true),
            overruns: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
        }
    }

    /// Split into the block-producer half and the packet-consumer half.
    pub fn split(&mut self) -> (OutputProducer<'_>, OutputConsumer<'_>) {
        let shared = &*self;
        (
            OutputProducer { shared },
            OutputConsumer {
                shared,
                packet_counter: 0,
            },
        )
    }

    /// Gate the stream. While disabled, pushed and queued audio is released
    /// immediately and outgoing packets carry silence. Typically driven by
    /// the host selecting the streaming alternate setting.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether the stream is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Periods evicted because the host was not draining fast enough.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Packets that had to be padded with silence.
    pub fn underruns(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Take both pipeline slots out, leaving it empty with cursor 0.
    fn clear_pipeline(&self) -> (Option<ChannelSet>, Option<ChannelSet>) {
        critical_section::with(|cs| {
            let mut p = self.pipeline.borrow_ref_mut(cs);
            p.cursor = 0;
            (p.current.take(), p.next.take())
        })
    }
}

impl Default for UsbAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio-task half of the transmit path.
pub struct OutputProducer<'a> {
    shared: &'a UsbAudioOutput,
}

impl OutputProducer<'_> {
    /// Queue one period of freshly produced audio, once per audio period.
    ///
    /// With the stream disabled, the supplied set and anything queued are
    /// released immediately — no data flows. When both pipeline slots are
    /// occupied the oldest set is evicted so the host always gets the
    /// freshest two periods.
    pub fn push(&mut self, set: ChannelSet) {
        if !self.shared.is_enabled() {
            let dropped = self.shared.clear_pipeline();
            drop((set, dropped));
            return;
        }

        // O(1) slot moves only; the evicted set is released afterwards.
        let evicted = critical_section::with(|cs| {
            let mut p = self.shared.pipeline.borrow_ref_mut(cs);
            if p.current.is_none() {
                p.current = Some(set);
                p.cursor = 0;
                None
            } else if p.next.is_none() {
                p.next = Some(set);
                None
            } else {
                // Both slots full — the consumer is too slow. Drop the
                // oldest period, keep the freshest two.
                let evicted = p.current.take();
                p.current = p.next.take();
                p.next = Some(set);
                p.cursor = 0;
                evicted
            }
        });

        if evicted.is_some() {
            self.shared.overruns.fetch_add(1, Ordering::Relaxed);
            warn!("usb audio tx overrun");
        }
        drop(evicted);
    }

    /// See [`UsbAudioOutput::overruns`].
    pub fn overruns(&self) -> u32 {
        self.shared.overruns()
    }

    /// See [`UsbAudioOutput::underruns`].
    pub fn underruns(&self) -> u32 {
        self.shared.underruns()
    }

    /// How many sets the pipeline currently holds (0..=2).
    pub fn queued(&self) -> usize {
        critical_section::with(|cs| {
            let p = self.shared.pipeline.borrow_ref(cs);
            p.current.is_some() as usize + p.next.is_some() as usize
        })
    }
}

/// Callback-context half of the transmit path.
pub struct OutputConsumer<'a> {
    shared: &'a UsbAudioOutput,
    /// Drives the packet-size alternation. Seeded so the first cycle has
    /// the same length as every later one.
    packet_counter: u32,
}

impl OutputConsumer<'_> {
    /// Fill the next outgoing isochronous packet.
    ///
    /// Called from the transfer-completion callback whenever the host's
    /// next IN packet must be prepared. Drains up to the target frame count
    /// from the pipeline, re-interleaving into `packet`; shortfalls are
    /// padded with silence. Returns the number of bytes staged. Runs in
    /// bounded time and never blocks.
    pub fn fill_packet(&mut self, packet: &mut [u8]) -> usize {
        let target = self.next_target();
        let bytes = target * BYTES_PER_FRAME;
        debug_assert!(packet.len() >= bytes);

        if !self.shared.is_enabled() {
            // Stream shut off: release anything still queued, send silence.
            let dropped = self.shared.clear_pipeline();
            drop(dropped);
            silence(&mut packet[..bytes]);
            return bytes;
        }

        let mut written = 0usize;
        while written < target {
            // Take the draining set out of the pipeline (O(1)), copy from
            // it while owning it exclusively, then settle it back.
            let taken = critical_section::with(|cs| {
                let mut p = self.shared.pipeline.borrow_ref_mut(cs);
                let cursor = p.cursor;
                p.current.take().map(|set| (set, cursor))
            });
            let (set, cursor) = match taken {
                Some(t) => t,
                None => break, // underrun: the remainder becomes silence
            };

            let avail = AUDIO_BLOCK_SAMPLES - cursor;
            let n = (target - written).min(avail);
            {
                let [c0, c1, c2, c3] = set.channels();
                let r = cursor..cursor + n;
                let start = written * BYTES_PER_FRAME;
                interleave(
                    &mut packet[start..start + n * BYTES_PER_FRAME],
                    [&c0[r.clone()], &c1[r.clone()], &c2[r.clone()], &c3[r]],
                );
            }
            written += n;
            let cursor = cursor + n;

            if cursor >= AUDIO_BLOCK_SAMPLES {
                // Fully drained: release the set, promote `next` (which may
                // be empty) and restart the cursor.
                drop(set);
                critical_section::with(|cs| {
                    let mut p = self.shared.pipeline.borrow_ref_mut(cs);
                    p.current = p.next.take();
                    p.cursor = 0;
                });
            } else {
                // Partially drained: put it back, unless a push re-occupied
                // the slot in the meantime — then the newer data wins.
                let displaced = critical_section::with(|cs| {
                    let mut p = self.shared.pipeline.borrow_ref_mut(cs);
                    if p.current.is_some() {
                        Some(set)
                    } else {
                        p.current = Some(set);
                        p.cursor = cursor;
                        None
                    }
                });
                if displaced.is_some() {
                    self.shared.overruns.fetch_add(1, Ordering::Relaxed);
                }
                drop(displaced);
            }
        }

        if written < target {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
            silence(&mut packet[written * BYTES_PER_FRAME..bytes]);
        }
        bytes
    }

    /// Target frame count for the next packet: mostly `PACKET_FRAMES_BASE`,
    /// one frame more every `PACKET_EXTRA_INTERVAL`-th packet, so the
    /// long-run average matches the fractional nominal rate.
    fn next_target(&mut self) -> usize {
        self.packet_counter += 1;
        if self.packet_counter < PACKET_EXTRA_INTERVAL {
            PACKET_FRAMES_BASE
        } else {
            self.packet_counter = 0;
            PACKET_FRAMES_BASE + 1
        }
    }

    /// See [`UsbAudioOutput::underruns`].
    pub fn underruns(&self) -> u32 {
        self.shared.underruns()
    }
}
