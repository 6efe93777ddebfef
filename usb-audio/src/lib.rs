//! # usb-audio
//!
//! A `no_std`, zero-allocation engine for bidirectional, fixed-latency
//! audio streaming between a USB host and an embedded device over
//! isochronous transfers. The device's sample clock is synchronized to the
//! host's through an asynchronous feedback endpoint driven by a fixed-point
//! rate accumulator.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Memory | [`block`] | Fixed-size sample block pool, single-owner handles |
//! | Streams | [`io`] | Receive/transmit paths, wire packing, owned handoff |
//! | Clock | [`feedback`] | Fixed-point rate feedback accumulator |
//! | Control | [`control`] | Mute/volume feature unit |
//! | Glue | [`transport`] | Transfer descriptors, endpoint completion dispatch |
//!
//! ## Quick start
//!
//! ```ignore
//! use usb_audio::feedback::RateFeedback;
//! use usb_audio::io::{UsbAudioInput, UsbAudioOutput};
//! use usb_audio::transport::{EndpointKind, IsoTransfer, StreamDispatch, UsbSpeed};
//!
//! static FEEDBACK: RateFeedback = RateFeedback::new();
//!
//! let mut input = UsbAudioInput::new();
//! let mut output = UsbAudioOutput::new();
//! let (rx_packets, mut rx_blocks) = input.split();
//! let (mut tx_blocks, tx_packets) = output.split();
//!
//! // The completion-callback context services endpoint completions:
//! let mut dispatch = StreamDispatch::new(rx_packets, tx_packets, &FEEDBACK, UsbSpeed::Full);
//!
//! // The audio task runs once per 128-sample period:
//! if let Some(set) = rx_blocks.claim_ready(&FEEDBACK) {
//!     // process incoming audio...
//! }
//! // ...and pushes one freshly produced set per period:
//! // tx_blocks.push(set);
//! ```
//!
//! ## Execution contexts
//!
//! Two contexts exist: the transport's **completion callback** (bounded,
//! non-blocking, no allocation) and the **ordinary audio task** (once per
//! period). Every cross-context handoff moves ownership of whole blocks in
//! O(1); sample data is never copied under a lock and faults (overrun,
//! underrun, pool exhaustion) degrade to dropped periods and silence,
//! never to blocking or failure.
//!
//! ## Stream parameters
//!
//! - **Channels:** 4 ([`constants::CHANNELS`])
//! - **Block size:** 128 samples ([`constants::AUDIO_BLOCK_SAMPLES`])
//! - **Sample rate:** 44.1 kHz nominal ([`constants::SAMPLE_RATE_HZ`])
//! - **Sample format:** `i16` (signed 16-bit)
//! - **Block pool:** 32 blocks ([`constants::POOL_SIZE`])

#![no_std]

#[cfg(test)]
extern crate std;

// This mod MUST go first so the macros are visible everywhere.
#[macro_use]
mod fmt;

pub mod constants;

pub mod block;
pub mod control;
pub mod feedback;
pub mod io;
pub mod transport;
