//! Progress Store: reads/writes the singleton cursor row, grounded on
//! `scraper::block_cursor::BlockCursor`'s read-on-init, write-through shape
//! — simplified since the sink's `commit_height` already writes the cursor
//! transactionally per height, so this module only owns the startup read
//! and the `effective_start` computation from \S4.10.

use tracing::info;

use crate::sink::SinkPort;

/// `effective_start = max(configured_start, last_committed_height + 1)`,
/// per \S4.10: never re-derive a height already durably committed, but never
/// start earlier than the operator configured either.
pub async fn effective_start(sink: &dyn SinkPort, configured_start: u64) -> Result<u64, crate::error::SinkError> {
    let last_committed = sink.load_progress().await?;
    let resume_from = last_committed.saturating_add(1);
    let start = configured_start.max(resume_from);
    info!(configured_start, last_committed, effective_start = start, "resolved start height");
    Ok(start)
}
