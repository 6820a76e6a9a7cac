//! Block-level validity tracking for the audible buffer
//!
//! The source is split into fixed-length blocks (the last one possibly
//! shorter). A block is valid only if every frame in it was last written by
//! the filter using the coefficients currently in effect. Indices past the
//! last block are a caller bug and panic.

use std::ops::Range;

/// Reference block length in frames
pub const DEFAULT_BLOCK_LEN: usize = 5000;

/// Per-block "output matches current coefficients" flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCache {
    valid: Vec<bool>,
    block_len: usize,
    total_len: usize,
}

impl BlockCache {
    /// Create an all-invalid cache covering `total_len` frames
    ///
    /// # Panics
    /// If `block_len` is zero.
    pub fn new(total_len: usize, block_len: usize) -> Self {
        assert!(block_len > 0, "block length must be positive");
        Self {
            valid: vec![false; total_len.div_ceil(block_len)],
            block_len,
            total_len,
        }
    }

    /// Re-cover a new source length; every block becomes invalid
    pub fn resize(&mut self, total_len: usize) {
        self.total_len = total_len;
        self.valid.clear();
        self.valid.resize(total_len.div_ceil(self.block_len), false);
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn block_count(&self) -> usize {
        self.valid.len()
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Block containing frame `sample_pos`
    #[inline]
    pub fn index_of(&self, sample_pos: usize) -> usize {
        sample_pos / self.block_len
    }

    /// Frame range covered by a block
    pub fn block_range(&self, block: usize) -> Range<usize> {
        assert!(block < self.valid.len(), "block {block} out of range");
        let start = block * self.block_len;
        start..(start + self.block_len).min(self.total_len)
    }

    #[inline]
    pub fn is_valid(&self, block: usize) -> bool {
        self.valid[block]
    }

    #[inline]
    pub fn mark_valid(&mut self, block: usize) {
        self.valid[block] = true;
    }

    pub fn invalidate_all(&mut self) {
        self.valid.fill(false);
    }

    /// Invalidate every block but `keep`, whose flag is left untouched
    pub fn invalidate_all_except(&mut self, keep: usize) {
        let kept = self.valid[keep];
        self.valid.fill(false);
        self.valid[keep] = kept;
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Indices of the currently valid blocks
    pub fn valid_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.valid
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| v.then_some(i))
    }
}
