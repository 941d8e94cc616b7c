//! Blocks transferred through the input and output databufs.
//!
//! Blocks are never constructed by value: they are several hundred KiB and
//! live in place inside a databuf mapping, reached only through
//! `Databuf::with_free_block` / `with_filled_block`. Every field is an
//! integer or an array of integers, so a zeroed block is an empty block.

use crate::header::{ModuleHeader, PacketHeader, QUABO_PER_MODULE};
use crate::wire::{PKT_DATA_SIZE, SCI_DATA_SIZE};
use strata_databuf::BlockLayout;

/// Blocks in the capture → compute databuf.
pub const N_INPUT_BLOCKS: usize = 4;
/// Blocks in the compute → output databuf.
pub const N_OUTPUT_BLOCKS: usize = 8;
/// Packets per input block.
pub const IN_PKT_PER_BLOCK: usize = 320;
/// Module images per output block.
pub const OUT_MOD_PER_BLOCK: usize = 320;
/// Coincidence packets per output block.
pub const COINC_PKT_PER_BLOCK: usize = 320;

/// Space reserved per module image (sized for 16-bit pixels).
pub const MODULE_DATA_SIZE: usize = QUABO_PER_MODULE * SCI_DATA_SIZE * 2;

const INPUT_BLOCK_SIZE: usize = IN_PKT_PER_BLOCK * PKT_DATA_SIZE;
const OUTPUT_IMG_BLOCK_SIZE: usize = OUT_MOD_PER_BLOCK * MODULE_DATA_SIZE;
const OUTPUT_COINC_BLOCK_SIZE: usize = COINC_PKT_PER_BLOCK * PKT_DATA_SIZE;

/// Raw byte region starting on a cache-alignment boundary.
#[repr(C, align(256))]
#[derive(Clone, Copy)]
pub struct Payload<const N: usize>(pub [u8; N]);

/// Header fields every block handed between stages carries.
pub trait StageBlock: BlockLayout {
    /// Transfer counter stamped by the producing stage.
    fn mcnt(&self) -> u64;
    fn set_mcnt(&mut self, mcnt: u64);
    /// Shutdown flag carried downstream.
    fn interrupted(&self) -> bool;
    fn set_interrupted(&mut self, on: bool);
    /// Empties the block for reuse; clears the shutdown flag.
    fn clear(&mut self);
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct InputBlockHeader {
    /// Transfer counter of the producing stage.
    pub mcnt: u64,
    pub pkt_head: [PacketHeader; IN_PKT_PER_BLOCK],
    /// Number of valid entries in `pkt_head`.
    pub n_pkt: u32,
    /// Bytes of payload in use.
    pub data_block_size: u32,
    pub intsig: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct InputBlock {
    pub header: InputBlockHeader,
    /// Packet `i` occupies `data[i * PKT_DATA_SIZE..][..PKT_DATA_SIZE]`.
    pub data: Payload<INPUT_BLOCK_SIZE>,
}

// SAFETY: integers and arrays of integers only; all-zero is an empty block.
unsafe impl BlockLayout for InputBlock {}

impl InputBlock {
    pub fn reset(&mut self) {
        self.header.n_pkt = 0;
        self.header.data_block_size = 0;
        self.header.intsig = 0;
    }

    pub fn len(&self) -> usize {
        (self.header.n_pkt as usize).min(IN_PKT_PER_BLOCK)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == IN_PKT_PER_BLOCK
    }

    /// Appends one packet; payloads longer than `PKT_DATA_SIZE` are
    /// truncated. Returns `false` when the block is full.
    pub fn push_packet(&mut self, header: PacketHeader, payload: &[u8]) -> bool {
        let i = self.len();
        if i == IN_PKT_PER_BLOCK {
            return false;
        }
        let n = payload.len().min(PKT_DATA_SIZE);
        let start = i * PKT_DATA_SIZE;
        self.data.0[start..start + n].copy_from_slice(&payload[..n]);
        self.data.0[start + n..start + PKT_DATA_SIZE].fill(0);
        self.header.pkt_head[i] = header;
        self.header.n_pkt += 1;
        self.header.data_block_size += PKT_DATA_SIZE as u32;
        true
    }

    pub fn packets(&self) -> impl Iterator<Item = (&PacketHeader, &[u8])> {
        self.header.pkt_head[..self.len()]
            .iter()
            .zip(self.data.0.chunks_exact(PKT_DATA_SIZE))
    }
}

impl StageBlock for InputBlock {
    fn mcnt(&self) -> u64 {
        self.header.mcnt
    }

    fn set_mcnt(&mut self, mcnt: u64) {
        self.header.mcnt = mcnt;
    }

    fn clear(&mut self) {
        self.reset();
    }

    fn interrupted(&self) -> bool {
        self.header.intsig != 0
    }

    fn set_interrupted(&mut self, on: bool) {
        self.header.intsig = on as u32;
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct OutputBlockHeader {
    pub mcnt: u64,
    pub img_pkt_head: [ModuleHeader; OUT_MOD_PER_BLOCK],
    /// Number of valid module images.
    pub img_block_size: u32,
    pub coin_pkt_head: [PacketHeader; COINC_PKT_PER_BLOCK],
    /// Number of valid coincidence packets.
    pub coinc_block_size: u32,
    pub intsig: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct OutputBlock {
    pub header: OutputBlockHeader,
    /// Module image `i` occupies `img_block[i * MODULE_DATA_SIZE..]`.
    pub img_block: Payload<OUTPUT_IMG_BLOCK_SIZE>,
    /// Coincidence packet `i` occupies `coinc_block[i * PKT_DATA_SIZE..]`.
    pub coinc_block: Payload<OUTPUT_COINC_BLOCK_SIZE>,
}

// SAFETY: integers and arrays of integers only; all-zero is an empty block.
unsafe impl BlockLayout for OutputBlock {}

impl OutputBlock {
    pub fn reset(&mut self) {
        self.header.img_block_size = 0;
        self.header.coinc_block_size = 0;
        self.header.intsig = 0;
    }

    pub fn image_count(&self) -> usize {
        (self.header.img_block_size as usize).min(OUT_MOD_PER_BLOCK)
    }

    pub fn coinc_count(&self) -> usize {
        (self.header.coinc_block_size as usize).min(COINC_PKT_PER_BLOCK)
    }

    /// Appends a module image. Returns `false` when the image table is full.
    pub fn push_image(&mut self, header: ModuleHeader, pixels: &[u8]) -> bool {
        let i = self.image_count();
        if i == OUT_MOD_PER_BLOCK {
            return false;
        }
        let n = pixels.len().min(MODULE_DATA_SIZE);
        let start = i * MODULE_DATA_SIZE;
        self.img_block.0[start..start + n].copy_from_slice(&pixels[..n]);
        self.img_block.0[start + n..start + MODULE_DATA_SIZE].fill(0);
        self.header.img_pkt_head[i] = header;
        self.header.img_block_size += 1;
        true
    }

    /// Appends a coincidence packet. Returns `false` when the table is full.
    pub fn push_coinc(&mut self, header: PacketHeader, pixels: &[u8]) -> bool {
        let i = self.coinc_count();
        if i == COINC_PKT_PER_BLOCK {
            return false;
        }
        let n = pixels.len().min(PKT_DATA_SIZE);
        let start = i * PKT_DATA_SIZE;
        self.coinc_block.0[start..start + n].copy_from_slice(&pixels[..n]);
        self.coinc_block.0[start + n..start + PKT_DATA_SIZE].fill(0);
        self.header.coin_pkt_head[i] = header;
        self.header.coinc_block_size += 1;
        true
    }

    /// Module images with their full `MODULE_DATA_SIZE` pixel regions.
    pub fn images(&self) -> impl Iterator<Item = (&ModuleHeader, &[u8])> {
        self.header.img_pkt_head[..self.image_count()]
            .iter()
            .zip(self.img_block.0.chunks_exact(MODULE_DATA_SIZE))
    }

    /// Coincidence packets with their `PKT_DATA_SIZE` pixel regions.
    pub fn coincidences(&self) -> impl Iterator<Item = (&PacketHeader, &[u8])> {
        self.header.coin_pkt_head[..self.coinc_count()]
            .iter()
            .zip(self.coinc_block.0.chunks_exact(PKT_DATA_SIZE))
    }
}

impl StageBlock for OutputBlock {
    fn mcnt(&self) -> u64 {
        self.header.mcnt
    }

    fn set_mcnt(&mut self, mcnt: u64) {
        self.header.mcnt = mcnt;
    }

    fn clear(&mut self) {
        self.reset();
    }

    fn interrupted(&self) -> bool {
        self.header.intsig != 0
    }

    fn set_interrupted(&mut self, on: bool) {
        self.header.intsig = on as u32;
    }
}
