pub mod block;
pub mod header;
pub mod wire;

pub use block::{
    COINC_PKT_PER_BLOCK, IN_PKT_PER_BLOCK, InputBlock, InputBlockHeader, MODULE_DATA_SIZE,
    N_INPUT_BLOCKS, N_OUTPUT_BLOCKS, OUT_MOD_PER_BLOCK, OutputBlock, OutputBlockHeader, Payload,
    StageBlock,
};
pub use header::{
    ACQ_MODE_IMG8, ACQ_MODE_IMG16, ACQ_MODE_PH, ImageDepth, ModuleHeader, PacketHeader,
    QUABO_BITS, QUABO_PER_MODULE,
};
pub use wire::{BIT8_PKT_DATA_SIZE, HEADER_SIZE, PKT_DATA_SIZE, PKT_SIZE, SCI_DATA_SIZE};
