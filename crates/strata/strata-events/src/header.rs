//! Packet and module headers.
//!
//! Both are plain values: copied by assignment, compared field by field,
//! never shared by reference across a slot boundary.

/// Sub-units (quabos) aggregated under one module.
pub const QUABO_PER_MODULE: usize = 4;

/// Bits of a board location / metadata id that select the quabo.
pub const QUABO_BITS: u32 = QUABO_PER_MODULE.trailing_zeros();

const _: () = assert!(
    QUABO_PER_MODULE.is_power_of_two(),
    "quabo fan-out must be a power of two"
);

/// Pulse-height (coincidence) acquisition.
pub const ACQ_MODE_PH: u8 = 0x1;
/// 16-bit imaging acquisition.
pub const ACQ_MODE_IMG16: u8 = 0x2;
/// 8-bit imaging acquisition.
pub const ACQ_MODE_IMG8: u8 = 0x3;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketHeader {
    /// Local receive time, seconds.
    pub tv_sec: i64,
    /// Local receive time, microseconds.
    pub tv_usec: i64,
    pub pkt_utc: u32,
    pub pkt_nsec: u32,
    pub pkt_num: u16,
    pub mod_num: u16,
    pub acq_mode: u8,
    pub qua_num: u8,
}

/// Headers of every quabo packet that went into one module image.
///
/// Equality covers the mode and each (packet header, status) pair; the
/// module number is implied by the packet headers.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ModuleHeader {
    pub pkt_head: [PacketHeader; QUABO_PER_MODULE],
    pub mod_num: u16,
    /// Bit depth of the image (8 or 16).
    pub mode: u8,
    /// Per-quabo completeness; zero means the quabo's packet is missing.
    pub status: [u8; QUABO_PER_MODULE],
}

impl PartialEq for ModuleHeader {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self
                .pkt_head
                .iter()
                .zip(self.status.iter())
                .eq(other.pkt_head.iter().zip(other.status.iter()))
    }
}

impl Eq for ModuleHeader {}

/// Pixel depth of a module image, selected by `ModuleHeader::mode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageDepth {
    Bit16,
    Bit8,
}

impl ImageDepth {
    pub fn from_mode(mode: u8) -> Option<Self> {
        match mode {
            16 => Some(ImageDepth::Bit16),
            8 => Some(ImageDepth::Bit8),
            _ => None,
        }
    }

    pub fn from_acq_mode(acq_mode: u8) -> Option<Self> {
        match acq_mode {
            ACQ_MODE_IMG16 => Some(ImageDepth::Bit16),
            ACQ_MODE_IMG8 => Some(ImageDepth::Bit8),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            ImageDepth::Bit16 => 16,
            ImageDepth::Bit8 => 8,
        }
    }

    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        self.bits() as usize / 8
    }

    /// Bytes of pixel data in one full module image.
    #[inline]
    pub fn module_image_bytes(self) -> usize {
        QUABO_PER_MODULE * crate::wire::SCI_DATA_SIZE * self.bytes_per_pixel()
    }
}
