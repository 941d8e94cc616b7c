//! Ring configuration and slot index arithmetic.

/// Upper bound on slots per databuf; `total_status` reports slots as a `u64` bitmask.
pub const MAX_BLOCKS: usize = 64;

/// Configuration for a databuf.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Number of blocks (slots) in the ring.
    pub n_block: usize,
}

impl RingConfig {
    /// Creates a new ring configuration with `n_block` slots.
    ///
    /// # Panics
    /// Panics if `n_block` is zero or larger than [`MAX_BLOCKS`].
    ///
    /// # Example
    /// ```
    /// use strata_databuf::RingConfig;
    /// let cfg = RingConfig::new(8);
    /// assert_eq!(cfg.n_block, 8);
    /// ```
    pub fn new(n_block: usize) -> Self {
        assert!(
            n_block > 0 && n_block <= MAX_BLOCKS,
            "block count must be within 1..={MAX_BLOCKS}"
        );
        Self { n_block }
    }
}

/// Advances a slot index in circular order.
///
/// Stages never skip a slot: after a successful transfer on slot `i` the
/// next slot they touch is `(i + 1) mod n_block`.
///
/// ```text
/// n_block = 4:  0 -> 1 -> 2 -> 3 -> 0 -> 1 ...
/// ```
#[inline(always)]
pub fn next_index(index: usize, n_block: usize) -> usize {
    (index + 1) % n_block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_wraps_at_block_count() {
        let mut idx = 0;
        let seen: Vec<usize> = (0..6)
            .map(|_| {
                let cur = idx;
                idx = next_index(idx, 4);
                cur
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    #[should_panic]
    fn zero_blocks_rejected() {
        RingConfig::new(0);
    }

    #[test]
    #[should_panic]
    fn too_many_blocks_rejected() {
        RingConfig::new(MAX_BLOCKS + 1);
    }
}
