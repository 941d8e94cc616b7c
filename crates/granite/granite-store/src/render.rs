//! TEXT header bodies written in front of each IMAGE record.

use std::fmt::Write;
use strata_events::{ModuleHeader, PacketHeader, SCI_DATA_SIZE};

/// Pixel bytes of one coincidence (pulse-height) record.
pub const COINC_IMAGE_BYTES: usize = SCI_DATA_SIZE * 2;

/// `{ quabo 0: { acq_mode: .., ..., status : ..}, quabo 1: ...}`
pub fn image_header_text(header: &ModuleHeader) -> String {
    let mut out = String::with_capacity(768);
    out.push_str("{ ");
    for (i, (pkt, status)) in header.pkt_head.iter().zip(header.status.iter()).enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(
            out,
            "quabo {i}: {{ acq_mode: {}, mod_num: {}, qua_num: {}, pkt_num : {}, pkt_nsec : {}, tv_sec : {}, tv_usec : {}, status : {}}}",
            pkt.acq_mode,
            pkt.mod_num,
            pkt.qua_num,
            pkt.pkt_num,
            pkt.pkt_nsec,
            pkt.tv_sec,
            pkt.tv_usec,
            status
        );
    }
    out.push('}');
    out
}

pub fn coinc_header_text(header: &PacketHeader) -> String {
    format!(
        "{{ acq_mode: {}, mod_num: {}, qua_num: {}, pkt_num : {}, pkt_nsec : {}, tv_sec : {}, tv_usec : {}}}",
        header.acq_mode,
        header.mod_num,
        header.qua_num,
        header.pkt_num,
        header.pkt_nsec,
        header.tv_sec,
        header.tv_usec
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_events::{ACQ_MODE_PH, QUABO_PER_MODULE};

    #[test]
    fn coinc_header_lists_every_field() {
        let h = PacketHeader {
            acq_mode: ACQ_MODE_PH,
            mod_num: 14,
            qua_num: 2,
            pkt_num: 9,
            pkt_nsec: 500,
            tv_sec: 1_630_077_706,
            tv_usec: 42,
            ..Default::default()
        };
        assert_eq!(
            coinc_header_text(&h),
            "{ acq_mode: 1, mod_num: 14, qua_num: 2, pkt_num : 9, pkt_nsec : 500, tv_sec : 1630077706, tv_usec : 42}"
        );
    }

    #[test]
    fn image_header_has_one_entry_per_quabo() {
        let mut h = ModuleHeader {
            mod_num: 3,
            mode: 16,
            ..Default::default()
        };
        h.status[1] = 1;
        h.pkt_head[1].qua_num = 1;
        let text = image_header_text(&h);

        assert!(text.starts_with("{ quabo 0: { acq_mode: 0,"));
        assert!(text.contains("quabo 1: { acq_mode: 0, mod_num: 0, qua_num: 1, pkt_num : 0, pkt_nsec : 0, tv_sec : 0, tv_usec : 0, status : 1}"));
        assert!(text.ends_with("status : 0}}"));
        assert_eq!(text.matches("quabo ").count(), QUABO_PER_MODULE);
        assert!(!text.as_bytes().contains(&0));
    }
}
