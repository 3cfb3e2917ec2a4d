//! Live Tailer (\S4.8): once backfill drains, polls `LatestHeight()` on an
//! interval smoothed towards the observed block time and feeds newly
//! observed heights into the same dispatch channel the scheduler already
//! drains. Grounded on `SyncerEtaCalculator`'s moving-average shape
//! (`contract_sync/eta_calculator.rs`), simplified from an ETA estimate to a
//! single smoothed poll interval, and on `ForwardSequenceAwareSyncCursor`'s
//! poll-sleep-retry loop (`contract_sync/cursors/sequence_aware/forward.rs`)
//! for the overall tick shape.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::metrics::ExtractorMetrics;
use crate::probe::ChainProbe;

const SMOOTHING_ALPHA: f64 = 0.2;
const FLOOR: Duration = Duration::from_secs(1);
const CEILING: Duration = Duration::from_secs(30);
const BACKOFF_CEILING: Duration = Duration::from_secs(10);

/// Smooths the observed interval between distinct `LatestHeight` values
/// towards a poll interval, the way `SyncerEtaCalculator` smooths a block
/// rate: `EMA(0.2, observedInterval)`, floored and ceilinged per \S4.8.
struct PollIntervalEstimator {
    current: Duration,
    last_tick: Instant,
}

impl PollIntervalEstimator {
    fn new(bootstrap: Duration) -> Self {
        Self { current: bootstrap, last_tick: Instant::now() }
    }

    /// Folds in the time since the last *changed* tip observation.
    fn observe(&mut self) {
        let now = Instant::now();
        let observed = now.duration_since(self.last_tick);
        self.last_tick = now;

        let smoothed = self.current.as_secs_f64() * (1.0 - SMOOTHING_ALPHA)
            + observed.as_secs_f64() * SMOOTHING_ALPHA;
        self.current = Duration::from_secs_f64(smoothed).clamp(FLOOR, CEILING);
    }

    fn interval(&self) -> Duration {
        self.current
    }
}

pub struct LiveTailer<'a> {
    probe: &'a ChainProbe<'a>,
    stop_height: Option<u64>,
    metrics: Option<&'a ExtractorMetrics>,
}

impl<'a> LiveTailer<'a> {
    pub fn new(probe: &'a ChainProbe<'a>, stop_height: Option<u64>, metrics: Option<&'a ExtractorMetrics>) -> Self {
        Self { probe, stop_height, metrics }
    }

    /// Runs until `cancel` fires or the sender side closes. Sends every
    /// height in `(commit_cursor, latest]` on each tick; the scheduler and
    /// sink tolerate duplicate or already-committed heights, so a height
    /// re-sent after a restart or a race with the backfill range is safe.
    #[instrument(skip(self, heights, cancel), fields(commit_cursor))]
    pub async fn run(
        &self,
        mut commit_cursor: u64,
        heights: mpsc::Sender<u64>,
        bootstrap_interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut estimator = PollIntervalEstimator::new(bootstrap_interval);
        let mut backoff = bootstrap_interval;

        loop {
            if let Some(stop) = self.stop_height {
                if commit_cursor >= stop {
                    debug!(stop, "live tailer reached configured stop height");
                    return;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("live tailer cancelled");
                    return;
                }
                _ = tokio::time::sleep(backoff) => {}
            }

            match self.probe.latest_height().await {
                Ok(latest) if latest > commit_cursor => {
                    let upper = self.stop_height.map_or(latest, |stop| latest.min(stop));
                    for height in (commit_cursor + 1)..=upper {
                        if cancel.is_cancelled() {
                            return;
                        }
                        if heights.send(height).await.is_err() {
                            debug!("scheduler dispatch channel closed, stopping live tailer");
                            return;
                        }
                    }
                    commit_cursor = upper;
                    estimator.observe();
                    backoff = estimator.interval();
                    self.report_lag(latest, commit_cursor, estimator.interval());
                }
                Ok(latest) => {
                    // Tip unchanged: back off up to the ceiling instead of
                    // hammering LatestHeight every `estimator.interval()`.
                    backoff = (backoff * 2).min(BACKOFF_CEILING);
                    self.report_lag(latest, commit_cursor, estimator.interval());
                }
                Err(err) => {
                    warn!(error = %err, "live tailer poll failed, retrying after backoff");
                    backoff = (backoff * 2).min(BACKOFF_CEILING);
                }
            }
        }
    }

    /// `scheduler_lag_seconds` as the remaining height gap scaled by the
    /// current smoothed poll interval, which approximates seconds per block.
    fn report_lag(&self, latest: u64, commit_cursor: u64, block_interval: Duration) {
        if let Some(metrics) = self.metrics {
            let lag_seconds = latest.saturating_sub(commit_cursor) as f64 * block_interval.as_secs_f64();
            metrics.scheduler_lag_seconds.set(lag_seconds as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimator_smooths_towards_observed_interval_within_bounds() {
        let mut est = PollIntervalEstimator::new(Duration::from_secs(2));
        assert_eq!(est.interval(), Duration::from_secs(2));
        est.observe();
        // A single fast observation (effectively ~0s elapsed in this test)
        // should pull the estimate down, but never below the floor.
        assert!(est.interval() >= FLOOR);
        assert!(est.interval() <= CEILING);
    }
}
