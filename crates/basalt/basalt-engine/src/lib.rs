//! Compute stage. No pixel processing happens yet: every image packet
//! becomes a module image holding that one quabo, and every pulse-height
//! packet becomes a coincidence record.

use strata_events::{
    ACQ_MODE_PH, ImageDepth, InputBlock, MODULE_DATA_SIZE, ModuleHeader, OutputBlock,
    PacketHeader, QUABO_PER_MODULE, SCI_DATA_SIZE,
};
use strata_stage::{StageError, Transform};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputeStats {
    pub images: u64,
    pub coincidences: u64,
    /// Packets with an unknown acquisition mode, a bad quabo index or no
    /// room left in the output block.
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct PassThrough {
    stats: ComputeStats,
}

impl PassThrough {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ComputeStats {
        self.stats
    }
}

/// Places one quabo's pixels at its offset inside a module image.
fn module_image(
    header: &PacketHeader,
    depth: ImageDepth,
    payload: &[u8],
) -> Option<(ModuleHeader, [u8; MODULE_DATA_SIZE])> {
    let quabo = header.qua_num as usize;
    if quabo >= QUABO_PER_MODULE {
        return None;
    }
    let mut module = ModuleHeader {
        mod_num: header.mod_num,
        mode: depth.bits(),
        ..Default::default()
    };
    module.pkt_head[quabo] = *header;
    module.status[quabo] = 1;

    let span = SCI_DATA_SIZE * depth.bytes_per_pixel();
    let mut pixels = [0u8; MODULE_DATA_SIZE];
    let n = payload.len().min(span);
    pixels[quabo * span..quabo * span + n].copy_from_slice(&payload[..n]);
    Some((module, pixels))
}

impl Transform for PassThrough {
    type In = InputBlock;
    type Out = OutputBlock;

    fn transform(
        &mut self,
        input: &InputBlock,
        output: &mut OutputBlock,
    ) -> Result<(), StageError> {
        for (header, payload) in input.packets() {
            let stored = if header.acq_mode == ACQ_MODE_PH {
                let ok = output.push_coinc(*header, payload);
                self.stats.coincidences += ok as u64;
                ok
            } else if let Some(depth) = ImageDepth::from_acq_mode(header.acq_mode) {
                match module_image(header, depth, payload) {
                    Some((module, pixels)) => {
                        let ok = output.push_image(module, &pixels);
                        self.stats.images += ok as u64;
                        ok
                    }
                    None => {
                        debug!(
                            quabo = header.qua_num,
                            module = header.mod_num,
                            "quabo index out of range"
                        );
                        false
                    }
                }
            } else {
                debug!(
                    acq_mode = header.acq_mode,
                    module = header.mod_num,
                    "unknown acquisition mode"
                );
                false
            };
            if !stored {
                self.stats.dropped += 1;
            }
        }
        Ok(())
    }
}
