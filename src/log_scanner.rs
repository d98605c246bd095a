//! # Chunked Log Scanner
//!
//! Enumerates Transfer events of the tracked token over a block range without exceeding
//! the endpoint's per-request block-range limit.
//!
//! The range is split into consecutive chunks of at most `max_block_range` blocks. Each
//! chunk gets a bounded number of attempts with a linearly growing pause between them.
//! A chunk that exhausts its attempts is recorded as [`ChunkOutcome::Omitted`] and the
//! scan moves on: missing chunks reduce completeness, they never abort the scan.
//!
//! A fixed pause separates consecutive chunks regardless of outcome.

use ethers::types::Address;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::Retry;

use crate::errors::{RpcError, RpcResult};
use crate::metrics;
use crate::rpc_client::ChainRpc;
use crate::settings::{ChainEndpoint, ScanSettings};
use crate::types::LogEvent;
use crate::utils::{create_block_chunks, linear_backoff, window_start, BlockRange};

/// Result of scanning one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Fetched {
        range: BlockRange,
        events: Vec<LogEvent>,
        attempts: usize,
    },
    Omitted {
        range: BlockRange,
        attempts: usize,
        error: RpcError,
    },
}

impl ChunkOutcome {
    pub fn range(&self) -> BlockRange {
        match self {
            ChunkOutcome::Fetched { range, .. } | ChunkOutcome::Omitted { range, .. } => *range,
        }
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self, ChunkOutcome::Omitted { .. })
    }
}

/// Every chunk outcome of one scan, in ascending block order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub range: BlockRange,
    pub chunks: Vec<ChunkOutcome>,
}

impl ScanReport {
    /// Events of all fetched chunks, concatenated in chunk order.
    pub fn events(&self) -> impl Iterator<Item = &LogEvent> {
        self.chunks.iter().flat_map(|chunk| match chunk {
            ChunkOutcome::Fetched { events, .. } => events.as_slice(),
            ChunkOutcome::Omitted { .. } => &[],
        })
    }

    pub fn event_count(&self) -> usize {
        self.events().count()
    }

    pub fn omitted(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.chunks.iter().filter(|c| c.is_omitted())
    }

    pub fn omitted_count(&self) -> usize {
        self.omitted().count()
    }
}

pub struct LogScanner {
    rpc: Arc<dyn ChainRpc>,
    token: Address,
    max_block_range: u64,
    attempts: usize,
    backoff_base: Duration,
    chunk_delay: Duration,
}

impl LogScanner {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        token: Address,
        max_block_range: u64,
        attempts: usize,
        backoff_base: Duration,
        chunk_delay: Duration,
    ) -> Self {
        Self {
            rpc,
            token,
            max_block_range: max_block_range.max(1),
            attempts: attempts.max(1),
            backoff_base,
            chunk_delay,
        }
    }

    /// Scanner tuned for `endpoint` with the shared scan settings.
    pub fn for_chain(
        rpc: Arc<dyn ChainRpc>,
        token: Address,
        endpoint: &ChainEndpoint,
        scan: &ScanSettings,
    ) -> Self {
        Self::new(
            rpc,
            token,
            endpoint.max_block_range(),
            scan.chunk_attempts,
            Duration::from_millis(scan.chunk_backoff_ms),
            Duration::from_millis(scan.chunk_delay_ms),
        )
    }

    pub fn chunks(&self, from_block: u64, to_block: u64) -> Vec<BlockRange> {
        create_block_chunks(from_block, to_block, self.max_block_range)
    }

    /// Scans `[from_block, to_block]` inclusive.
    pub async fn scan(&self, from_block: u64, to_block: u64) -> ScanReport {
        let chain = self.rpc.chain_name().to_string();
        let range = BlockRange::new(from_block, to_block);
        let chunks = self.chunks(from_block, to_block);
        let total = chunks.len();
        info!(
            "[{}] Scanning {} blocks ({}..={}) in {} chunks of <= {}",
            chain,
            range.len(),
            from_block,
            to_block,
            total,
            self.max_block_range
        );

        let mut report = ScanReport {
            range,
            chunks: Vec::with_capacity(total),
        };
        let mut found = 0usize;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let outcome = self.scan_chunk(chunk).await;
            match &outcome {
                ChunkOutcome::Fetched { events, .. } => found += events.len(),
                ChunkOutcome::Omitted {
                    range,
                    attempts,
                    error,
                } => {
                    warn!(
                        "[{}] Chunk {}/{} (blocks {}-{}) failed after {} attempts, skipping: {}",
                        chain,
                        i + 1,
                        total,
                        range.from,
                        range.to,
                        attempts,
                        error
                    );
                    metrics::increment_omitted_chunk(&chain);
                }
            }
            report.chunks.push(outcome);

            if (i + 1) % 10 == 0 || i + 1 == total {
                info!(
                    "[{}] Progress: {}/{} chunks ({} events so far)",
                    chain,
                    i + 1,
                    total,
                    found
                );
            }

            if i + 1 < total && !self.chunk_delay.is_zero() {
                sleep(self.chunk_delay).await;
            }
        }

        report
    }

    /// Scans the last `scan_window` blocks up to the current head.
    pub async fn scan_recent(&self, scan_window: u64) -> RpcResult<ScanReport> {
        let strategy = linear_backoff(self.backoff_base, self.attempts);
        let current = Retry::spawn(strategy, || self.rpc.block_number()).await?;
        let from_block = window_start(current, scan_window);
        Ok(self.scan(from_block, current).await)
    }

    async fn scan_chunk(&self, range: BlockRange) -> ChunkOutcome {
        let chain = self.rpc.chain_name();
        let mut attempts = 0usize;
        let strategy = linear_backoff(self.backoff_base, self.attempts);
        let result = Retry::spawn(strategy, || {
            attempts += 1;
            if attempts > 1 {
                debug!(
                    "[{}] Retrying blocks {}-{} (attempt {}/{})",
                    chain, range.from, range.to, attempts, self.attempts
                );
            }
            self.rpc.transfer_logs(self.token, range.from, range.to)
        })
        .await;

        match result {
            Ok(events) => ChunkOutcome::Fetched {
                range,
                events,
                attempts,
            },
            Err(error) => ChunkOutcome::Omitted {
                range,
                attempts,
                error,
            },
        }
    }
}
