use core::ops::{Deref, DerefMut};

use crate::constants::{AUDIO_BLOCK_SAMPLES, CHANNELS};

use super::pool::POOL;

/// Exclusive handle to one pool block.
///
/// There is exactly one `SampleBlock` per allocated slot. Ownership moves
/// between the fill, ready, and consumer stages — it is never shared or
/// aliased. Provides `Deref`/`DerefMut` access to the underlying
/// `[i16; 128]` samples. Dropping the handle returns the slot to the pool.
pub struct SampleBlock {
    slot: u8,
}

impl SampleBlock {
    /// Allocate a fresh (silent) block from the global pool.
    /// Returns `None` if the pool is exhausted.
    pub fn alloc() -> Option<Self> {
        POOL.alloc().map(|slot| SampleBlock { slot })
    }

    /// Get the pool slot index.
    pub fn slot(&self) -> u8 {
        self.slot
    }
}

impl Deref for SampleBlock {
    type Target = [i16; AUDIO_BLOCK_SAMPLES];

    fn deref(&self) -> &Self::Target {
        // SAFETY: We hold the slot's unique handle.
        unsafe { &(*POOL.data_ptr(self.slot)).samples }
    }
}

impl DerefMut for SampleBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: We hold the slot's unique handle.
        unsafe { &mut (*POOL.data_ptr(self.slot)).samples }
    }
}

impl Drop for SampleBlock {
    fn drop(&mut self) {
        POOL.free(self.slot);
    }
}

/// One audio period across all channels.
///
/// All channels advance together: allocation is all-or-nothing and the set
/// always holds exactly one block per channel. A `ChannelSet` is what moves
/// between the fill cursor, the ready slot, and the transmit pipeline.
pub struct ChannelSet {
    blocks: [SampleBlock; CHANNELS],
}

impl ChannelSet {
    /// Allocate one silent block per channel.
    ///
    /// On any allocation failure the blocks already taken are returned to
    /// the pool and `None` is returned.
    pub fn allocate() -> Option<Self> {
        Some(ChannelSet {
            blocks: [
                SampleBlock::alloc()?,
                SampleBlock::alloc()?,
                SampleBlock::alloc()?,
                SampleBlock::alloc()?,
            ],
        })
    }

    /// Assemble a set from per-channel blocks, substituting a silent pool
    /// block for each missing channel. All-or-nothing: on pool exhaustion
    /// every supplied block is released and `None` is returned.
    pub fn from_parts(parts: [Option<SampleBlock>; CHANNELS]) -> Option<Self> {
        let [c0, c1, c2, c3] = parts;
        Some(ChannelSet {
            blocks: [
                c0.or_else(SampleBlock::alloc)?,
                c1.or_else(SampleBlock::alloc)?,
                c2.or_else(SampleBlock::alloc)?,
                c3.or_else(SampleBlock::alloc)?,
            ],
        })
    }

    /// Borrow one channel's samples.
    pub fn channel(&self, ch: usize) -> &[i16; AUDIO_BLOCK_SAMPLES] {
        &self.blocks[ch]
    }

    /// Borrow every channel's samples at once.
    pub fn channels(&self) -> [&[i16; AUDIO_BLOCK_SAMPLES]; CHANNELS] {
        let [c0, c1, c2, c3] = &self.blocks;
        [&**c0, &**c1, &**c2, &**c3]
    }

    /// Mutably borrow every channel's samples at once.
    pub fn channels_mut(&mut self) -> [&mut [i16; AUDIO_BLOCK_SAMPLES]; CHANNELS] {
        let [c0, c1, c2, c3] = &mut self.blocks;
        [&mut **c0, &mut **c1, &mut **c2, &mut **c3]
    }

    /// Split the set back into its per-channel blocks.
    pub fn into_parts(self) -> [SampleBlock; CHANNELS] {
        self.blocks
    }
}
