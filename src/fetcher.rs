//! Block Fetcher: given a height, retrieves the block and its tx hash list
//! over `GetBlockByHeight`, grounded on `chain_scraper::ensure_blocks`'s
//! shape of turning one RPC response into a typed record the rest of the
//! pipeline consumes.

use prost_reflect::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::instrument;

use crate::descriptors::DescriptorResolver;
use crate::error::FetchError;
use crate::transport::Transport;
use crate::types::Block;

const TENDERMINT_SERVICE: &str = "cosmos.base.tendermint.v1beta1.Service";

pub struct BlockFetcher<'a> {
    transport: &'a dyn Transport,
    descriptors: &'a DescriptorResolver,
}

impl<'a> BlockFetcher<'a> {
    pub fn new(transport: &'a dyn Transport, descriptors: &'a DescriptorResolver) -> Self {
        Self { transport, descriptors }
    }

    #[instrument(skip(self), fields(height))]
    pub async fn fetch_block(&self, height: u64) -> Result<Block, FetchError> {
        let mut request = self
            .descriptors
            .new_request(TENDERMINT_SERVICE, "GetBlockByHeight")
            .await?;
        request.set_field_by_name("height", Value::I64(height as i64));

        let response = self
            .descriptors
            .invoke(self.transport, TENDERMINT_SERVICE, "GetBlockByHeight", request)
            .await
            .map_err(|e| classify(e, height))?;

        let block_id = response
            .get_field_by_name("block_id")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| FetchError::Descriptor(malformed("missing block_id")))?;
        let block_hash = block_id
            .get_field_by_name("hash")
            .and_then(|v| v.as_bytes().map(hex::encode_upper))
            .ok_or_else(|| FetchError::Descriptor(malformed("missing block_id.hash")))?;

        let block = response
            .get_field_by_name("block")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| FetchError::Descriptor(malformed("missing block")))?;
        let header = block
            .get_field_by_name("header")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| FetchError::Descriptor(malformed("missing block.header")))?;

        let chain_id = header
            .get_field_by_name("chain_id")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let proposer = header
            .get_field_by_name("proposer_address")
            .and_then(|v| v.as_bytes().map(|b| b.to_vec()))
            .unwrap_or_default();
        let time = header
            .get_field_by_name("time")
            .and_then(|v| v.as_message().cloned())
            .and_then(|t| timestamp_to_datetime(&t))
            .unwrap_or_else(OffsetDateTime::now_utc);

        let data = block
            .get_field_by_name("data")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| FetchError::Descriptor(malformed("missing block.data")))?;
        let txs = data
            .get_field_by_name("txs")
            .and_then(|v| v.as_list().cloned())
            .unwrap_or_default();

        let tx_hashes = txs
            .iter()
            .filter_map(|v| v.as_bytes())
            .map(|raw| hex::encode_upper(Sha256::digest(raw)))
            .collect::<Vec<_>>();

        let raw_json = self
            .descriptors
            .message_to_canonical_json(&response)
            .map_err(FetchError::Descriptor)?;

        Ok(Block {
            height,
            block_hash,
            chain_id,
            time,
            proposer,
            tx_hashes,
            raw_json,
        })
    }
}

fn classify(err: crate::error::DescriptorError, height: u64) -> FetchError {
    if let crate::error::DescriptorError::Transport(crate::error::TransportError::Status(ref status)) = err {
        if status.code() == tonic::Code::NotFound || status.code() == tonic::Code::OutOfRange {
            return FetchError::HeightOutOfRange(height);
        }
    }
    FetchError::Descriptor(err)
}

fn malformed(msg: &str) -> crate::error::DescriptorError {
    crate::error::DescriptorError::Malformed(msg.to_string())
}

fn timestamp_to_datetime(ts: &prost_reflect::DynamicMessage) -> Option<OffsetDateTime> {
    let seconds = ts.get_field_by_name("seconds").and_then(|v| v.as_i64())?;
    OffsetDateTime::from_unix_timestamp(seconds).ok()
}
