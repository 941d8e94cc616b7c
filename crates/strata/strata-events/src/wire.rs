//! Quabo packet wire format.
//!
//! ```text
//! offset  size  field
//!   0      1    acq_mode
//!   1      1    packet version
//!   2      2    pkt_num      (little endian)
//!   4      2    board loc    (module << QUABO_BITS | quabo)
//!   6      4    pkt_utc
//!  10      4    pkt_nsec
//!  14      2    unused
//!  16      ..   pixel payload
//! ```

use crate::header::{PacketHeader, QUABO_BITS, QUABO_PER_MODULE};

/// Bytes of packet header on the wire.
pub const HEADER_SIZE: usize = 16;
/// Bytes of pixel data in a 16-bit packet.
pub const PKT_DATA_SIZE: usize = 512;
/// Bytes of pixel data in an 8-bit packet.
pub const BIT8_PKT_DATA_SIZE: usize = 256;
/// Largest packet on the wire.
pub const PKT_SIZE: usize = HEADER_SIZE + PKT_DATA_SIZE;
/// Pixels per quabo.
pub const SCI_DATA_SIZE: usize = 256;

impl PacketHeader {
    /// Decodes the wire header at the start of `packet`, stamping it with
    /// the local receive time. Returns `None` for runt packets.
    pub fn parse(packet: &[u8], tv_sec: i64, tv_usec: i64) -> Option<Self> {
        let h = packet.get(..HEADER_SIZE)?;
        let board_loc = u16::from_le_bytes([h[4], h[5]]);
        Some(PacketHeader {
            acq_mode: h[0],
            pkt_num: u16::from_le_bytes([h[2], h[3]]),
            mod_num: board_loc >> QUABO_BITS,
            qua_num: (board_loc as usize & (QUABO_PER_MODULE - 1)) as u8,
            pkt_utc: u32::from_le_bytes([h[6], h[7], h[8], h[9]]),
            pkt_nsec: u32::from_le_bytes([h[10], h[11], h[12], h[13]]),
            tv_sec,
            tv_usec,
        })
    }

    /// Encodes the wire header; the inverse of [`PacketHeader::parse`]
    /// apart from the receive timestamp.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut h = [0u8; HEADER_SIZE];
        let board_loc = (self.mod_num << QUABO_BITS) | self.qua_num as u16;
        h[0] = self.acq_mode;
        h[2..4].copy_from_slice(&self.pkt_num.to_le_bytes());
        h[4..6].copy_from_slice(&board_loc.to_le_bytes());
        h[6..10].copy_from_slice(&self.pkt_utc.to_le_bytes());
        h[10..14].copy_from_slice(&self.pkt_nsec.to_le_bytes());
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_location_splits_into_module_and_quabo() {
        let mut raw = [0u8; PKT_SIZE];
        raw[0] = 0x2;
        raw[2..4].copy_from_slice(&513u16.to_le_bytes());
        raw[4..6].copy_from_slice(&((14u16 << 2) | 3).to_le_bytes());
        raw[6..10].copy_from_slice(&1_700_000_000u32.to_le_bytes());
        raw[10..14].copy_from_slice(&999u32.to_le_bytes());

        let h = PacketHeader::parse(&raw, 5, 6).unwrap();
        assert_eq!(h.acq_mode, 0x2);
        assert_eq!(h.pkt_num, 513);
        assert_eq!(h.mod_num, 14);
        assert_eq!(h.qua_num, 3);
        assert_eq!(h.pkt_utc, 1_700_000_000);
        assert_eq!(h.pkt_nsec, 999);
        assert_eq!((h.tv_sec, h.tv_usec), (5, 6));

        assert_eq!(&h.encode()[..], &raw[..HEADER_SIZE]);
    }

    #[test]
    fn runt_packet_is_rejected() {
        assert!(PacketHeader::parse(&[0u8; HEADER_SIZE - 1], 0, 0).is_none());
    }
}
