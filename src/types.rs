//! The core data model shared across every component: blocks, transactions,
//! messages, events and denom metadata as they move from the wire through
//! decoding into the sink.

use serde_json::Value as Json;
use time::OffsetDateTime;

/// A fetched block, paired with the tx hashes found in `block.data.txs`.
#[derive(Debug, Clone)]
pub struct Block {
    pub height: u64,
    pub block_hash: String,
    pub chain_id: String,
    pub time: OffsetDateTime,
    pub proposer: Vec<u8>,
    pub tx_hashes: Vec<String>,
    pub raw_json: Json,
}

/// An optional `(code, log)` pair recorded on a failed transaction.
#[derive(Debug, Clone)]
pub struct TxError {
    pub code: u32,
    pub log: String,
}

#[derive(Debug, Clone)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub message_index: u32,
    pub type_url: String,
    pub sender: Option<String>,
    pub mentions: Vec<String>,
    pub metadata: Json,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_index: u32,
    pub attr_index: u32,
    pub event_type: String,
    pub attr_key: String,
    pub attr_value: Option<String>,
    pub msg_index: Option<u32>,
}

/// A fully decoded transaction, ready for the sink.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub tx_hash: String,
    pub height: u64,
    pub index_in_block: u32,
    pub fee: Vec<Coin>,
    pub gas_limit: u64,
    pub memo: Option<String>,
    pub error: Option<TxError>,
    pub time: OffsetDateTime,
    pub messages: Vec<Message>,
    pub events: Vec<Event>,
    pub proposal_ids: Vec<i32>,
    pub raw_json: Json,
}

/// Everything the Fetcher/Decoder produced for one height, still unordered
/// with respect to other in-flight heights — the unit the scheduler's
/// reorder buffer operates on.
#[derive(Debug, Clone)]
pub struct HeightRecord {
    pub block: Block,
    pub transactions: Vec<Transaction>,
    pub denoms: Vec<DenomMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenomMetadata {
    pub denom: String,
    pub base_denom: String,
    pub display_name: String,
    pub symbol: String,
    pub decimals: u32,
    pub is_ibc: bool,
    pub ibc_hash: Option<String>,
    pub ibc_path: Option<String>,
    pub hash_mismatch: bool,
    pub chain_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub last_committed_height: u64,
}
