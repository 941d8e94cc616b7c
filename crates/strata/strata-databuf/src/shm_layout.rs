//! Binary layout of a databuf region.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ DatabufHeader                                                │
//! │  magic │ version │ n_block │ block_size │ block_align │ epoch │
//! ├──────────────────────────────────────────────────────────────┤
//! │ slot state words: AtomicU32 × n_block (0 = free, 1 = filled) │
//! ├──────────── padding up to a CACHE_ALIGNMENT boundary ────────┤
//! │ block[0]                                                     │
//! │ block[1]                                                     │
//! │ ...                                                          │
//! │ block[n_block - 1]                                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Blocks are laid out at a stride of `size_of::<T>()`, which is always a
//! multiple of the block's alignment, so every block starts on the same
//! alignment boundary as the first one.

use crate::error::DatabufError;
use std::mem::{align_of, size_of};
use std::sync::atomic::{AtomicU32, AtomicU64};

/// ASCII "HSDBUF01".
pub const DATABUF_MAGIC: u64 = 0x4853_4442_5546_3031;

/// Increment on incompatible layout changes.
pub const DATABUF_VERSION: u64 = 1;

/// Blocks (and their payload regions) start on this boundary.
pub const CACHE_ALIGNMENT: usize = 256;

/// State of one slot. Only the producer moves a slot `Free -> Filled` and
/// only the consumer moves it `Filled -> Free`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free = 0,
    Filled = 1,
}

impl SlotState {
    pub fn from_word(word: u32) -> Option<Self> {
        match word {
            0 => Some(SlotState::Free),
            1 => Some(SlotState::Filled),
            _ => None,
        }
    }
}

#[repr(C)]
pub struct DatabufHeader {
    pub magic: u64,
    pub version: u64,
    pub n_block: u64,
    /// `size_of::<T>()` of the block type; checked when attaching.
    pub block_size: u64,
    pub block_align: u64,
    /// Bumped on every slot transition.
    pub epoch: AtomicU64,
}

impl DatabufHeader {
    pub fn validate<T>(&self) -> Result<(), DatabufError> {
        if self.magic != DATABUF_MAGIC {
            return Err(DatabufError::BadMagic(self.magic));
        }
        if self.version != DATABUF_VERSION {
            return Err(DatabufError::VersionMismatch {
                expected: DATABUF_VERSION,
                found: self.version,
            });
        }
        if self.n_block == 0 || self.n_block as usize > crate::ring::MAX_BLOCKS {
            return Err(DatabufError::BadBlockCount(self.n_block));
        }
        if self.block_size as usize != size_of::<T>() {
            return Err(DatabufError::BlockSizeMismatch {
                expected: size_of::<T>() as u64,
                found: self.block_size,
            });
        }
        Ok(())
    }
}

#[inline]
fn round_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// Offset of the slot state array from the start of the region.
#[inline]
pub fn states_offset() -> usize {
    round_up(size_of::<DatabufHeader>(), align_of::<AtomicU32>())
}

/// Offset of `block[0]` from the start of the region.
pub fn blocks_offset<T>(n_block: usize) -> usize {
    let align = CACHE_ALIGNMENT.max(align_of::<T>());
    round_up(states_offset() + n_block * size_of::<AtomicU32>(), align)
}

/// Total bytes required for a databuf of `n_block` blocks of `T`.
pub fn bytes_for_databuf<T>(n_block: usize) -> usize {
    blocks_offset::<T>(n_block) + n_block * size_of::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(512))]
    #[derive(Clone, Copy)]
    struct Wide([u8; 1024]);

    #[test]
    fn blocks_start_on_cache_boundary() {
        assert_eq!(blocks_offset::<u64>(4) % CACHE_ALIGNMENT, 0);
        assert_eq!(blocks_offset::<u64>(64) % CACHE_ALIGNMENT, 0);
        assert_eq!(blocks_offset::<Wide>(8) % 512, 0);
    }

    #[test]
    fn region_size_covers_every_block() {
        let n = 8;
        assert_eq!(
            bytes_for_databuf::<Wide>(n),
            blocks_offset::<Wide>(n) + n * size_of::<Wide>()
        );
    }

    #[test]
    fn unknown_state_word_is_rejected() {
        assert_eq!(SlotState::from_word(0), Some(SlotState::Free));
        assert_eq!(SlotState::from_word(1), Some(SlotState::Filled));
        assert_eq!(SlotState::from_word(7), None);
    }
}
