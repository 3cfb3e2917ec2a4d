//! Chain Probe: determines the highest and earliest queryable heights,
//! grounded on `WasmGrpcProvider::latest_block_height`'s GetLatestBlock call
//! but generalised to add the Status-first fallback and pruned-node parsing
//! a single statically-known chain doesn't need.

use once_cell::sync::Lazy;
use prost_reflect::DynamicMessage;
use regex::Regex;
use tracing::{instrument, warn};

use crate::descriptors::DescriptorResolver;
use crate::error::{DescriptorError, ProbeError, TransportError};
use crate::transport::Transport;

/// Matches `height N is not available, lowest height is M`, tolerating
/// wrapping prefixes such as `rpc error: code = Unknown desc =` per \S4.3.
pub static PRUNED_HEIGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"height\s+(\d+)\s+is not available,\s*lowest height is\s+(\d+)")
        .expect("static regex is valid")
});

const STATUS_SERVICE: &str = "cosmos.base.node.v1beta1.Service";
const TENDERMINT_SERVICE: &str = "cosmos.base.tendermint.v1beta1.Service";

pub struct ChainProbe<'a> {
    transport: &'a dyn Transport,
    descriptors: &'a DescriptorResolver,
    max_retries: u32,
}

impl<'a> ChainProbe<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        descriptors: &'a DescriptorResolver,
        max_retries: u32,
    ) -> Self {
        Self {
            transport,
            descriptors,
            max_retries,
        }
    }

    /// Tries `Status` first (field `height`), falling back to
    /// `GetLatestBlock` (field `sdk_block.header.height`).
    #[instrument(skip(self))]
    pub async fn latest_height(&self) -> Result<u64, ProbeError> {
        match self.status_height().await {
            Ok(height) => Ok(height),
            Err(err) => {
                warn!(error = %err, "Status unavailable, falling back to GetLatestBlock");
                self.latest_block_height()
                    .await
                    .map_err(ProbeError::ChainUnreachable)
            }
        }
    }

    async fn status_height(&self) -> Result<u64, DescriptorError> {
        let request = self.descriptors.new_request(STATUS_SERVICE, "Status").await?;
        let response = self
            .descriptors
            .invoke(self.transport, STATUS_SERVICE, "Status", request)
            .await?;
        height_field(&response, "height")
    }

    async fn latest_block_height(&self) -> Result<u64, DescriptorError> {
        let request = self
            .descriptors
            .new_request(TENDERMINT_SERVICE, "GetLatestBlock")
            .await?;
        let response = self
            .descriptors
            .invoke(self.transport, TENDERMINT_SERVICE, "GetLatestBlock", request)
            .await?;
        let block = response
            .get_field_by_name("sdk_block")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| DescriptorError::Malformed("GetLatestBlock missing sdk_block".into()))?;
        let header = block
            .get_field_by_name("header")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| DescriptorError::Malformed("sdk_block missing header".into()))?;
        height_field(&header, "height")
    }

    /// Requests block at height 1. A clean success means the node is an
    /// archive node; a `height N is not available, lowest height is M`
    /// error learns the boundary in exactly one call; anything else is
    /// retried up to `max_retries` before giving up.
    #[instrument(skip(self))]
    pub async fn earliest_height(&self) -> Result<u64, ProbeError> {
        for attempt in 0..=self.max_retries {
            match self.try_block_at_height_one().await {
                Ok(()) => return Ok(1),
                Err(DescriptorError::Transport(TransportError::Status(status))) => {
                    if let Some(caps) = PRUNED_HEIGHT_RE.captures(status.message()) {
                        let lowest: u64 = caps[2].parse().map_err(|_| ProbeError::BoundaryUnknown)?;
                        return Ok(lowest);
                    }
                    if attempt == self.max_retries {
                        return Err(ProbeError::BoundaryUnknown);
                    }
                }
                Err(_) if attempt == self.max_retries => return Err(ProbeError::BoundaryUnknown),
                Err(_) => {}
            }
        }
        Err(ProbeError::BoundaryUnknown)
    }

    async fn try_block_at_height_one(&self) -> Result<(), DescriptorError> {
        let mut request = self
            .descriptors
            .new_request(TENDERMINT_SERVICE, "GetBlockByHeight")
            .await?;
        request.set_field_by_name("height", prost_reflect::Value::I64(1));
        self.descriptors
            .invoke(self.transport, TENDERMINT_SERVICE, "GetBlockByHeight", request)
            .await?;
        Ok(())
    }
}

fn height_field(message: &DynamicMessage, field: &str) -> Result<u64, DescriptorError> {
    message
        .get_field_by_name(field)
        .and_then(|v| v.as_i64().map(|h| h as u64).or_else(|| v.as_u64()))
        .ok_or_else(|| DescriptorError::Malformed(format!("missing or non-integer field `{field}`")))
}
