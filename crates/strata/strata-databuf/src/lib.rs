mod databuf;
mod error;
mod park;
mod ring;
mod shm_layout;

pub use databuf::{BlockLayout, Databuf, WaitStatus};
pub use error::DatabufError;
pub use ring::{MAX_BLOCKS, RingConfig, next_index};
pub use shm_layout::{CACHE_ALIGNMENT, SlotState};
