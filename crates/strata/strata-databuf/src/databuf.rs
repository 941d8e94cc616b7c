//! Fixed-size circular buffer of blocks shared by one producer stage and
//! one consumer stage.
//!
//! # Protocol
//! - **Producer**: `wait_free(i)` → fill block `i` → `set_filled(i)` → `i = next_index(i)`
//! - **Consumer**: `wait_filled(i)` → read block `i` → `set_free(i)` → `i = next_index(i)`
//!
//! Both sides walk the slots in the same circular order, so the consumer
//! sees blocks in exactly the order the producer filled them, and at most
//! `n_block` blocks are ever in flight.
//!
//! # Single producer, single consumer
//! The buffer is `Sync` so both stages can hold it, but only one thread
//! may act as producer and only one as consumer. This is a convention:
//! the block accessors check the slot state, which catches a stage that
//! touches a slot it does not own, but two producers racing on the same
//! free slot are not detected.

use crate::error::DatabufError;
use crate::park;
use crate::ring::RingConfig;
use crate::shm_layout::{
    DATABUF_MAGIC, DATABUF_VERSION, DatabufHeader, SlotState, blocks_offset, bytes_for_databuf,
    states_offset,
};
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use strata_mmap::MmapRegion;

/// Busy-spin iterations before a waiter goes to sleep.
const SPIN_LIMIT: u32 = 128;

/// Types that may live in a databuf slot.
///
/// # Safety
/// The all-zero bit pattern must be a valid value of the type (fresh
/// mappings are zero-filled and blocks are never constructed), and the type
/// must not contain pointers or references, since the region may be shared
/// with other processes.
pub unsafe trait BlockLayout: Copy + 'static {}

unsafe impl BlockLayout for u8 {}
unsafe impl BlockLayout for u16 {}
unsafe impl BlockLayout for u32 {}
unsafe impl BlockLayout for u64 {}
unsafe impl BlockLayout for i64 {}
unsafe impl<T: BlockLayout, const N: usize> BlockLayout for [T; N] {}

/// Outcome of a wait that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum WaitStatus {
    /// The slot reached the requested state.
    Ready,
    /// The timeout elapsed first; the caller should report liveness and retry.
    TimedOut,
}

pub struct Databuf<T: BlockLayout> {
    /// Owns the mapping; everything else points into it.
    _region: MmapRegion,
    base: *mut u8,
    n_block: usize,
    _pd: PhantomData<T>,
}

// SAFETY: all shared mutation goes through the atomic header and state
// words; block contents are handed to at most one side at a time by the
// slot protocol described in the module docs.
unsafe impl<T: BlockLayout> Send for Databuf<T> {}
unsafe impl<T: BlockLayout> Sync for Databuf<T> {}

impl<T: BlockLayout> Databuf<T> {
    /// Creates a file-backed databuf that other processes can `attach` to.
    pub fn create<P: AsRef<Path>>(path: P, cfg: RingConfig) -> Result<Self, DatabufError> {
        let region = MmapRegion::create_rw(path, bytes_for_databuf::<T>(cfg.n_block))?;
        Ok(Self::init(region, cfg))
    }

    /// Creates a databuf in anonymous memory, for stages running as threads
    /// of one process.
    pub fn anonymous(cfg: RingConfig) -> Result<Self, DatabufError> {
        let region = MmapRegion::anonymous(bytes_for_databuf::<T>(cfg.n_block))?;
        Ok(Self::init(region, cfg))
    }

    /// Attaches to a databuf previously created with [`Databuf::create`].
    pub fn attach<P: AsRef<Path>>(path: P) -> Result<Self, DatabufError> {
        let mut region = MmapRegion::open_rw(path)?;
        if region.len() < size_of::<DatabufHeader>() {
            return Err(DatabufError::RegionTooSmall {
                need: size_of::<DatabufHeader>(),
                mapped: region.len(),
            });
        }
        let base = region.as_mut_ptr();

        // SAFETY: the mapping is at least header-sized and page aligned.
        let h = unsafe { &*(base as *const DatabufHeader) };
        h.validate::<T>()?;

        let n_block = h.n_block as usize;
        let need = bytes_for_databuf::<T>(n_block);
        if region.len() < need {
            return Err(DatabufError::RegionTooSmall {
                need,
                mapped: region.len(),
            });
        }

        Ok(Self {
            _region: region,
            base,
            n_block,
            _pd: PhantomData,
        })
    }

    fn init(mut region: MmapRegion, cfg: RingConfig) -> Self {
        let base = region.as_mut_ptr();

        // SAFETY: the region was just created by us and sized by
        // `bytes_for_databuf`; nobody else can observe it yet. Fresh
        // mappings are zeroed, so every state word already reads `Free`
        // and every block is a valid all-zero `T`.
        unsafe {
            ptr::write(
                base as *mut DatabufHeader,
                DatabufHeader {
                    magic: DATABUF_MAGIC,
                    version: DATABUF_VERSION,
                    n_block: cfg.n_block as u64,
                    block_size: size_of::<T>() as u64,
                    block_align: align_of::<T>() as u64,
                    epoch: AtomicU64::new(0),
                },
            );
        }

        Self {
            _region: region,
            base,
            n_block: cfg.n_block,
            _pd: PhantomData,
        }
    }

    #[inline(always)]
    fn header(&self) -> &DatabufHeader {
        // SAFETY: base points to an initialised or validated header
        unsafe { &*(self.base as *const DatabufHeader) }
    }

    #[inline(always)]
    fn state_word(&self, slot: usize) -> Result<&AtomicU32, DatabufError> {
        if slot >= self.n_block {
            return Err(DatabufError::SlotOutOfRange {
                slot,
                n_block: self.n_block,
            });
        }
        // SAFETY: slot is in range and the state array lies inside the region
        unsafe {
            let words = self.base.add(states_offset()) as *const AtomicU32;
            Ok(&*words.add(slot))
        }
    }

    #[inline(always)]
    fn block_ptr(&self, slot: usize) -> *mut T {
        // SAFETY: callers validate `slot` through `state_word` first
        unsafe { (self.base.add(blocks_offset::<T>(self.n_block)) as *mut T).add(slot) }
    }

    pub fn n_block(&self) -> usize {
        self.n_block
    }

    /// Number of slot transitions since creation.
    pub fn epoch(&self) -> u64 {
        self.header().epoch.load(Ordering::Acquire)
    }

    pub fn status(&self, slot: usize) -> Result<SlotState, DatabufError> {
        let word = self.state_word(slot)?.load(Ordering::Acquire);
        SlotState::from_word(word).ok_or(DatabufError::CorruptState { slot, word })
    }

    /// Bitmask of filled slots (bit `i` set when slot `i` is filled).
    pub fn total_status(&self) -> Result<u64, DatabufError> {
        let mut mask = 0u64;
        for slot in 0..self.n_block {
            if self.status(slot)? == SlotState::Filled {
                mask |= 1 << slot;
            }
        }
        Ok(mask)
    }

    /// Blocks until `slot` is filled or `timeout` elapses.
    pub fn wait_filled(&self, slot: usize, timeout: Duration) -> Result<WaitStatus, DatabufError> {
        self.wait_for(slot, SlotState::Filled, timeout)
    }

    /// Blocks until `slot` is free or `timeout` elapses.
    pub fn wait_free(&self, slot: usize, timeout: Duration) -> Result<WaitStatus, DatabufError> {
        self.wait_for(slot, SlotState::Free, timeout)
    }

    fn wait_for(
        &self,
        slot: usize,
        want: SlotState,
        timeout: Duration,
    ) -> Result<WaitStatus, DatabufError> {
        let word = self.state_word(slot)?;
        let deadline = Instant::now() + timeout;
        let mut spins = 0u32;

        loop {
            let current = word.load(Ordering::Acquire);
            if current == want as u32 {
                return Ok(WaitStatus::Ready);
            }
            if SlotState::from_word(current).is_none() {
                return Err(DatabufError::CorruptState {
                    slot,
                    word: current,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitStatus::TimedOut);
            }

            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
                continue;
            }

            park::park(word, current, deadline - now)
                .map_err(|source| DatabufError::Wait { slot, source })?;
        }
    }

    /// Producer side: marks `slot` filled and wakes the consumer.
    pub fn set_filled(&self, slot: usize) -> Result<(), DatabufError> {
        self.transition(slot, SlotState::Filled)
    }

    /// Consumer side: marks `slot` free and wakes the producer.
    pub fn set_free(&self, slot: usize) -> Result<(), DatabufError> {
        self.transition(slot, SlotState::Free)
    }

    fn transition(&self, slot: usize, to: SlotState) -> Result<(), DatabufError> {
        let word = self.state_word(slot)?;
        // Release publishes the block contents written before this call.
        word.store(to as u32, Ordering::Release);
        self.header().epoch.fetch_add(1, Ordering::AcqRel);
        park::wake_all(word);
        Ok(())
    }

    /// Marks every slot free. Only valid while no stage is running.
    pub fn clear(&self) -> Result<(), DatabufError> {
        for slot in 0..self.n_block {
            self.set_free(slot)?;
        }
        Ok(())
    }

    /// Producer side: mutable access to a block the producer owns.
    ///
    /// Fails with [`DatabufError::WrongState`] unless `slot` is free.
    pub fn with_free_block<R>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, DatabufError> {
        self.expect_state(slot, SlotState::Free)?;
        // SAFETY: a free slot belongs to the single producer until it calls
        // `set_filled`; the consumer does not touch it.
        let block = unsafe { &mut *self.block_ptr(slot) };
        Ok(f(block))
    }

    /// Consumer side: shared access to a block the consumer owns.
    ///
    /// Fails with [`DatabufError::WrongState`] unless `slot` is filled.
    pub fn with_filled_block<R>(
        &self,
        slot: usize,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R, DatabufError> {
        self.expect_state(slot, SlotState::Filled)?;
        // SAFETY: a filled slot is not written by the producer until the
        // consumer calls `set_free`.
        let block = unsafe { &*self.block_ptr(slot) };
        Ok(f(block))
    }

    fn expect_state(&self, slot: usize, expected: SlotState) -> Result<(), DatabufError> {
        let actual = self.status(slot)?;
        if actual != expected {
            return Err(DatabufError::WrongState {
                slot,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(5);

    #[test]
    fn fresh_databuf_is_all_free() {
        let db = Databuf::<u64>::anonymous(RingConfig::new(4)).unwrap();
        assert_eq!(db.n_block(), 4);
        for slot in 0..4 {
            assert_eq!(db.status(slot).unwrap(), SlotState::Free);
        }
        assert_eq!(db.total_status().unwrap(), 0);
        assert_eq!(db.epoch(), 0);
    }

    #[test]
    fn wait_times_out_without_transition() {
        let db = Databuf::<u64>::anonymous(RingConfig::new(2)).unwrap();
        assert_eq!(db.wait_filled(0, SHORT).unwrap(), WaitStatus::TimedOut);
        assert_eq!(db.wait_free(0, SHORT).unwrap(), WaitStatus::Ready);
    }

    #[test]
    fn transitions_are_visible_and_counted() {
        let db = Databuf::<u64>::anonymous(RingConfig::new(4)).unwrap();
        db.with_free_block(2, |b| *b = 42).unwrap();
        db.set_filled(2).unwrap();

        assert_eq!(db.status(2).unwrap(), SlotState::Filled);
        assert_eq!(db.total_status().unwrap(), 0b0100);
        assert_eq!(db.wait_filled(2, SHORT).unwrap(), WaitStatus::Ready);
        assert_eq!(db.with_filled_block(2, |b| *b).unwrap(), 42);

        db.set_free(2).unwrap();
        assert_eq!(db.total_status().unwrap(), 0);
        assert_eq!(db.epoch(), 2);
    }

    #[test]
    fn block_access_requires_ownership() {
        let db = Databuf::<u64>::anonymous(RingConfig::new(2)).unwrap();
        assert!(matches!(
            db.with_filled_block(0, |b| *b),
            Err(DatabufError::WrongState {
                expected: SlotState::Filled,
                actual: SlotState::Free,
                ..
            })
        ));
        db.set_filled(0).unwrap();
        assert!(matches!(
            db.with_free_block(0, |b| *b = 1),
            Err(DatabufError::WrongState { .. })
        ));
    }

    #[test]
    fn out_of_range_slot_is_an_error() {
        let db = Databuf::<u64>::anonymous(RingConfig::new(2)).unwrap();
        assert!(matches!(
            db.wait_filled(2, SHORT),
            Err(DatabufError::SlotOutOfRange { slot: 2, n_block: 2 })
        ));
        assert!(db.set_filled(5).is_err());
    }

    #[test]
    fn clear_frees_every_slot() {
        let db = Databuf::<u64>::anonymous(RingConfig::new(3)).unwrap();
        db.set_filled(0).unwrap();
        db.set_filled(2).unwrap();
        db.clear().unwrap();
        assert_eq!(db.total_status().unwrap(), 0);
    }

    #[test]
    fn blocked_waiter_is_woken_by_transition() {
        let db = std::sync::Arc::new(Databuf::<u64>::anonymous(RingConfig::new(1)).unwrap());
        let waiter = {
            let db = db.clone();
            std::thread::spawn(move || db.wait_filled(0, Duration::from_secs(10)).unwrap())
        };
        std::thread::sleep(Duration::from_millis(20));
        db.set_filled(0).unwrap();
        assert_eq!(waiter.join().unwrap(), WaitStatus::Ready);
    }
}
