// src/utils.rs
// Utility functions shared by the scanner and the pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inclusive block range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks covered (both ends inclusive).
    pub fn len(&self) -> u64 {
        if self.to < self.from {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits `[from_block, to_block]` into consecutive, non-overlapping ranges of at most
/// `chunk_size` blocks. An inverted range yields no chunks; a zero chunk size is treated as 1.
pub fn create_block_chunks(from_block: u64, to_block: u64, chunk_size: u64) -> Vec<BlockRange> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current_from = from_block;
    while current_from <= to_block {
        let current_to = current_from
            .saturating_add(chunk_size - 1)
            .min(to_block);
        chunks.push(BlockRange::new(current_from, current_to));
        if current_to == u64::MAX {
            break;
        }
        current_from = current_to + 1;
    }
    chunks
}

/// First block of a scan window ending at `current_block`, clamped at genesis.
pub fn window_start(current_block: u64, scan_window: u64) -> u64 {
    current_block.saturating_sub(scan_window)
}

/// Retry delays growing linearly: `base`, `2 * base`, `3 * base`, ...
/// `attempts` is the total number of tries, so `attempts - 1` delays are produced.
pub fn linear_backoff(base: Duration, attempts: usize) -> impl Iterator<Item = Duration> {
    (1..attempts.max(1)).map(move |n| base * n as u32)
}
