//! Fixed-size sample block pool and single-owner block handles.
//!
//! Audio moves through the engine as pool-allocated blocks of
//! `[i16; AUDIO_BLOCK_SAMPLES]`. A block is exclusively owned by exactly one
//! stage at a time — the fill cursor, the ready slot, the transmit pipeline,
//! or the consumer — and returns to the pool when its handle drops. There is
//! no shared ownership and no copying of sample data between stages.

pub mod handle;
pub mod pool;

pub use handle::{ChannelSet, SampleBlock};
