//! The two isochronous stream paths and their shared plumbing.
//!
//! ## Components
//!
//! | Type | Context split | Description |
//! |------|---------------|-------------|
//! | [`UsbAudioInput`] | callback → task | Receive path: packets in, channel sets out |
//! | [`UsbAudioOutput`] | task → callback | Transmit path: channel sets in, packets out |
//!
//! ## Utilities
//!
//! - [`packing`] — wire interleave/deinterleave for packed multi-channel frames
//! - [`handoff`] — lock-free single-slot exchange of owned values
//!
//! ## Execution contexts
//!
//! Each path is `split()` into a producer half and a consumer half. The
//! transfer-completion callback drives `on_packet`/`fill_packet` and must
//! never block; the audio task drives `claim_ready`/`push` once per audio
//! period. The halves meet only at O(1) owned handoffs and atomics — audio
//! data is never copied across the context boundary.

pub mod handoff;
pub mod input;
pub mod output;
pub mod packing;

pub use input::{InputConsumer, InputProducer, UsbAudioInput};
pub use output::{OutputConsumer, OutputProducer, UsbAudioOutput};

#[cfg(test)]
mod integration_tests;
