use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::constants::{AUDIO_BLOCK_SAMPLES, POOL_SIZE};

// The allocation bitmap is a single u32.
const _: () = assert!(POOL_SIZE <= 32);

/// Raw sample storage: one audio period of signed 16-bit samples, 4-byte aligned.
#[repr(C, align(4))]
pub struct BlockData {
    pub samples: [i16; AUDIO_BLOCK_SAMPLES],
}

impl BlockData {
    /// Create a zeroed (silent) block.
    const fn zeroed() -> Self {
        BlockData {
            samples: [0i16; AUDIO_BLOCK_SAMPLES],
        }
    }
}

/// Lock-free pool allocator for sample blocks.
///
/// An atomic bitmap tracks which slots are in use. Every allocated slot has
/// exactly one owner at a time (a [`SampleBlock`](super::SampleBlock)
/// handle); there is no shared ownership. All operations are lock-free and
/// safe to call from the transfer-completion callback context.
pub struct BlockPool {
    /// Bitmap: bit N = 1 means slot N is allocated.
    bitmap: AtomicU32,
    /// Block storage.
    storage: UnsafeCell<[MaybeUninit<BlockData>; POOL_SIZE]>,
}

// SAFETY: The bitmap serializes slot ownership; the UnsafeCell storage is
// only reached through a slot index claimed via the bitmap CAS, so each
// slot's data is accessed by exactly one owner at a time.
unsafe impl Sync for BlockPool {}

impl BlockPool {
    /// Create a new pool. All slots start unallocated.
    const fn new() -> Self {
        BlockPool {
            bitmap: AtomicU32::new(0),
            storage: UnsafeCell::new(unsafe {
                MaybeUninit::<[MaybeUninit<BlockData>; POOL_SIZE]>::zeroed().assume_init()
            }),
        }
    }

    /// Allocate a block from the pool. Returns the slot index, or `None` if
    /// every slot is taken. The returned slot's data is zeroed.
    pub fn alloc(&self) -> Option<u8> {
        loop {
            let bitmap = self.bitmap.load(Ordering::Acquire);
            let free = !bitmap;
            if free == 0 {
                return None; // all slots allocated
            }
            let slot = free.trailing_zeros();
            if slot >= POOL_SIZE as u32 {
                return None;
            }
            let bit = 1u32 << slot;
            match self.bitmap.compare_exchange_weak(
                bitmap,
                bitmap | bit,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // Slot claimed — hand it out silent
                    let storage = self.storage.get();
                    // SAFETY: We just exclusively claimed this slot via the bitmap CAS.
                    unsafe {
                        let block_ptr = (*storage)[slot as usize].as_mut_ptr();
                        (*block_ptr) = BlockData::zeroed();
                    }
                    return Some(slot as u8);
                }
                Err(_) => continue, // another context raced us, retry
            }
        }
    }

    /// Return a slot to the pool.
    ///
    /// # Panics
    /// Debug-asserts that the slot is currently allocated.
    pub fn free(&self, slot: u8) {
        debug_assert!((slot as usize) < POOL_SIZE);
        let bit = 1u32 << (slot as u32);
        let old = self.bitmap.fetch_and(!bit, Ordering::Release);
        debug_assert!(old & bit != 0, "free of unallocated slot");
    }

    /// Get a pointer to the block data for a given slot.
    ///
    /// # Safety
    /// Caller must be the slot's sole owner and the slot must be allocated.
    pub unsafe fn data_ptr(&self, slot: u8) -> *mut BlockData {
        let storage = self.storage.get();
        unsafe { (*storage)[slot as usize].as_mut_ptr() }
    }

    /// Return the number of currently allocated blocks.
    pub fn allocated_count(&self) -> u32 {
        self.bitmap.load(Ordering::Acquire).count_ones()
    }

    /// Reset the pool to its initial state. For testing only.
    #[cfg(test)]
    pub fn reset(&self) {
        self.bitmap.store(0, Ordering::Release);
    }
}

/// The global sample block pool instance.
pub static POOL: BlockPool = BlockPool::new();

/// Serialize tests that touch the global pool; the test harness runs on
/// multiple threads and absolute pool counts are meaningless otherwise.
#[cfg(test)]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_slot() {
        let _guard = test_guard();
        POOL.reset();
        let slot = POOL.alloc();
        assert!(slot.is_some());
        assert!(slot.unwrap() < POOL_SIZE as u8);
    }

    #[test]
    fn alloc_zeroes_data() {
        let _guard = test_guard();
        POOL.reset();
        let slot = POOL.alloc().unwrap();
        unsafe {
            let data = &*POOL.data_ptr(slot);
            for &s in data.samples.iter() {
                assert_eq!(s, 0);
            }
        }
    }

    #[test]
    fn alloc_unique_slots() {
        let _guard = test_guard();
        POOL.reset();
        let mut slots = [0u8; POOL_SIZE];
        for s in slots.iter_mut() {
            *s = POOL.alloc().unwrap();
        }
        slots.sort();
        for i in 0..POOL_SIZE - 1 {
            assert_ne!(slots[i], slots[i + 1]);
        }
    }

    #[test]
    fn alloc_exhaustion() {
        let _guard = test_guard();
        POOL.reset();
        for _ in 0..POOL_SIZE {
            assert!(POOL.alloc().is_some());
        }
        assert!(POOL.alloc().is_none());
    }

    #[test]
    fn free_slot_is_reusable() {
        let _guard = test_guard();
        POOL.reset();
        let slot = POOL.alloc().unwrap();
        assert_eq!(POOL.allocated_count(), 1);
        POOL.free(slot);
        assert_eq!(POOL.allocated_count(), 0);
        let slot2 = POOL.alloc().unwrap();
        assert!(slot2 < POOL_SIZE as u8);
    }
}
