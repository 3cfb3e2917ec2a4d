//! Range Scheduler — the heart of the pipeline (\S4.7). A bounded pool of
//! concurrent height-workers fetch/decode/resolve-denoms out of order; a
//! single committer drains a min-heap reorder buffer so the sink only ever
//! sees strictly increasing, gap-free heights. Grounded on
//! `chain_scraper::sync`'s cursor-driven "fetch a range, commit, advance"
//! loop, generalised from one chunked range to many concurrent single-
//! height workers feeding a reorder buffer, since \S4.7 requires
//! out-of-order fetch with in-order commit rather than chunked sequential
//! fetch.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::pin::Pin;
use std::time::Duration;

use futures::future::Future;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::FailurePolicy;
use crate::decoder::TransactionDecoder;
use crate::denom::DenomResolver;
use crate::descriptors::DescriptorResolver;
use crate::error::{DecodeError, FetchError, HeightUnrecoverable, SchedulerError, SinkError};
use crate::fetcher::BlockFetcher;
use crate::metrics::ExtractorMetrics;
use crate::sink::SinkPort;
use crate::transport::Transport;
use crate::types::HeightRecord;

#[derive(Debug, thiserror::Error)]
enum WorkerFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub struct SchedulerConfig {
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub cancellation_grace: Duration,
}

pub struct Scheduler<'a> {
    transport: &'a dyn Transport,
    descriptors: &'a DescriptorResolver,
    denoms: &'a DenomResolver,
    sink: &'a dyn SinkPort,
    config: SchedulerConfig,
    metrics: Option<&'a ExtractorMetrics>,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        descriptors: &'a DescriptorResolver,
        denoms: &'a DenomResolver,
        sink: &'a dyn SinkPort,
        config: SchedulerConfig,
        metrics: Option<&'a ExtractorMetrics>,
    ) -> Self {
        Self { transport, descriptors, denoms, sink, config, metrics }
    }

    /// Drives heights received on `heights` to completion, committing them
    /// strictly in order starting at `start_height`. Returns the last
    /// height successfully committed. `heights` is expected to yield
    /// heights in ascending order (the historical backfill range, or the
    /// Live Tailer's newly-observed heights); duplicates and gaps on the
    /// input are tolerated, since the reorder buffer only cares about the
    /// commit sequence, not the arrival sequence.
    #[instrument(skip(self, heights, cancel), fields(start_height))]
    pub async fn run(
        &self,
        mut heights: mpsc::Receiver<u64>,
        start_height: u64,
        cancel: CancellationToken,
    ) -> Result<u64, SchedulerError> {
        let mut next_commit = start_height;
        let mut heap: BinaryHeap<Reverse<u64>> = BinaryHeap::new();
        let mut buffer: HashMap<u64, Result<HeightRecord, WorkerFailure>> = HashMap::new();
        let mut inflight: FuturesUnordered<Pin<Box<dyn Future<Output = (u64, Result<HeightRecord, WorkerFailure>)> + '_>>> =
            FuturesUnordered::new();

        let mut heights_closed = false;
        let mut cancelled = false;

        loop {
            if cancelled && inflight.is_empty() {
                break;
            }
            if heights_closed && inflight.is_empty() && heap.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancelled => {
                    info!("cancellation requested, draining in-flight heights");
                    cancelled = true;
                }

                maybe_height = heights.recv(), if !heights_closed && !cancelled && inflight.len() < self.config.concurrency => {
                    match maybe_height {
                        Some(height) => inflight.push(Box::pin(self.process_height(height))),
                        None => heights_closed = true,
                    }
                }

                Some((height, result)) = inflight.next(), if !inflight.is_empty() => {
                    buffer.insert(height, result);
                    heap.push(Reverse(height));
                    if let Some(metrics) = self.metrics {
                        metrics.scheduler_inflight.set(inflight.len() as i64);
                    }

                    while let Some(&Reverse(top)) = heap.peek() {
                        if top < next_commit {
                            heap.pop();
                            buffer.remove(&top);
                            continue;
                        }
                        if top != next_commit {
                            break;
                        }
                        heap.pop();
                        let outcome = buffer.remove(&top).expect("heap entries always have a buffered outcome");
                        self.settle(top, outcome).await?;
                        next_commit += 1;
                    }
                }
            }
        }

        if cancelled {
            let grace = self.config.cancellation_grace;
            if timeout(grace, self.drain_remaining(&mut inflight, &mut heap, &mut buffer, &mut next_commit)).await.is_err() {
                warn!(grace_ms = grace.as_millis() as u64, "cancellation grace window elapsed with heights still in flight");
            }
            return Err(SchedulerError::Cancelled { last_committed: next_commit.saturating_sub(1) });
        }

        Ok(next_commit.saturating_sub(1))
    }

    async fn drain_remaining(
        &self,
        inflight: &mut FuturesUnordered<Pin<Box<dyn Future<Output = (u64, Result<HeightRecord, WorkerFailure>)> + '_>>>,
        heap: &mut BinaryHeap<Reverse<u64>>,
        buffer: &mut HashMap<u64, Result<HeightRecord, WorkerFailure>>,
        next_commit: &mut u64,
    ) -> Result<(), SchedulerError> {
        while let Some((height, result)) = inflight.next().await {
            buffer.insert(height, result);
            heap.push(Reverse(height));
        }
        while let Some(&Reverse(top)) = heap.peek() {
            if top != *next_commit {
                break;
            }
            heap.pop();
            let outcome = buffer.remove(&top).expect("heap entries always have a buffered outcome");
            self.settle(top, outcome).await?;
            *next_commit += 1;
        }
        Ok(())
    }

    /// Commits a successful height, or applies the failure policy to a
    /// failed one: strict aborts the whole run, skip records it and moves
    /// the cursor past it.
    async fn settle(&self, height: u64, outcome: Result<HeightRecord, WorkerFailure>) -> Result<(), SchedulerError> {
        match outcome {
            Ok(record) => {
                self.sink.commit_height(&record).await.map_err(SchedulerError::Sink)?;
                if let Some(metrics) = self.metrics {
                    metrics.blocks_processed_total.inc();
                    metrics.txs_processed_total.inc_by(record.transactions.len() as u64);
                    metrics.scheduler_commit_height.set(height as i64);
                }
                Ok(())
            }
            Err(failure) => match self.config.failure_policy {
                FailurePolicy::Strict => {
                    error!(height, error = %failure, "height unrecoverable under strict failure policy");
                    Err(SchedulerError::Unrecoverable(HeightUnrecoverable(height)))
                }
                FailurePolicy::Skip => {
                    warn!(height, error = %failure, "skipping height under skip failure policy");
                    self.sink.record_skip(height).await.map_err(SchedulerError::Sink)?;
                    self.advance_progress_past_skip(height).await.map_err(SchedulerError::Sink)?;
                    Ok(())
                }
            },
        }
    }

    /// The skip policy still needs the progress cursor to move past the
    /// skipped height so a restart resumes after it rather than retrying
    /// it forever.
    async fn advance_progress_past_skip(&self, height: u64) -> Result<(), SinkError> {
        self.sink.advance_cursor(height).await
    }

    #[instrument(skip(self), fields(height))]
    async fn process_height(&self, height: u64) -> (u64, Result<HeightRecord, WorkerFailure>) {
        let result = self.process_height_inner(height).await;
        (height, result)
    }

    async fn process_height_inner(&self, height: u64) -> Result<HeightRecord, WorkerFailure> {
        let fetcher = BlockFetcher::new(self.transport, self.descriptors);
        let block = fetcher.fetch_block(height).await?;

        let decoder = TransactionDecoder::new(self.transport, self.descriptors);
        let mut transactions = Vec::with_capacity(block.tx_hashes.len());
        for (index, tx_hash) in block.tx_hashes.iter().enumerate() {
            let tx = decoder.fetch_tx(tx_hash, height, index as u32).await?;
            transactions.push(tx);
        }

        let mut denoms = Vec::new();
        for tx in &transactions {
            denoms.extend(self.denoms.resolve_for_tx(tx).await);
        }

        debug!(height, txs = transactions.len(), denoms = denoms.len(), "height processed");
        Ok(HeightRecord { block, transactions, denoms })
    }
}
