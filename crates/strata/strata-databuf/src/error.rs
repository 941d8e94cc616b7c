use crate::shm_layout::SlotState;

#[derive(Debug, thiserror::Error)]
pub enum DatabufError {
    #[error("slot {slot} out of range (databuf has {n_block} blocks)")]
    SlotOutOfRange { slot: usize, n_block: usize },

    #[error("slot {slot} holds invalid state word {word:#x}")]
    CorruptState { slot: usize, word: u32 },

    #[error("slot {slot} is {actual:?}, expected {expected:?}")]
    WrongState {
        slot: usize,
        expected: SlotState,
        actual: SlotState,
    },

    #[error("bad databuf magic {0:#x}")]
    BadMagic(u64),

    #[error("databuf version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },

    #[error("invalid block count {0}")]
    BadBlockCount(u64),

    #[error("block size mismatch: expected {expected}, found {found}")]
    BlockSizeMismatch { expected: u64, found: u64 },

    #[error("databuf region too small: need {need} bytes, mapped {mapped}")]
    RegionTooSmall { need: usize, mapped: usize },

    #[error("waiting on slot {slot} failed")]
    Wait {
        slot: usize,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
