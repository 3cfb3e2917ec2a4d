//! Test-only fakes for the `Transport`/`SinkPort` seam, plus a hand-built
//! descriptor pool standing in for a live reflection server. Mirrors the
//! way `DescriptorResolver::build` assembles a pool from
//! `FileDescriptorProto`s, just from literals instead of a wire reflection
//! stream.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use cosmos_extractor::descriptors::DescriptorResolver;
use cosmos_extractor::error::{SinkError, TransportError};
use cosmos_extractor::sink::SinkPort;
use cosmos_extractor::transport::Transport;
use cosmos_extractor::types::HeightRecord;
use prost::Message as _;
use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, ServiceDescriptorProto};
use prost_types::MethodDescriptorProto;
use sha2::{Digest, Sha256};

pub const TENDERMINT_SERVICE: &str = "cosmos.base.tendermint.v1beta1.Service";
pub const TX_SERVICE: &str = "cosmos.tx.v1beta1.Service";

fn field(name: &str, number: i32, ty: Type, label: Label, type_name: Option<&str>) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        r#type: Some(ty as i32),
        label: Some(label as i32),
        type_name: type_name.map(str::to_string),
        ..Default::default()
    }
}

fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    field(name, number, ty, Label::Optional, None)
}

fn repeated_scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    field(name, number, ty, Label::Repeated, None)
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    field(name, number, Type::Message, Label::Optional, Some(type_name))
}

fn repeated_message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    field(name, number, Type::Message, Label::Repeated, Some(type_name))
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto { name: Some(name.to_string()), field: fields, ..Default::default() }
}

fn method(name: &str, input_type: &str, output_type: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input_type.to_string()),
        output_type: Some(output_type.to_string()),
        ..Default::default()
    }
}

/// Builds the minimal pool needed to exercise `BlockFetcher` and
/// `TransactionDecoder` against canned gRPC responses: `google.protobuf.Any`/
/// `Timestamp`, a `GetBlockByHeight` service, and a `GetTx` service
/// referencing `Any`-wrapped `cosmos.bank.v1beta1.MsgSend`. No IBC denoms
/// appear in these fixtures, so `DenomTrace` is intentionally left out —
/// `DenomResolver`'s heuristic path (no RPC) covers the denoms used here.
pub fn build_pool() -> DescriptorPool {
    let mut pool = DescriptorPool::new();

    pool.add_file_descriptor_proto(FileDescriptorProto {
        name: Some("google/protobuf/any.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        message_type: vec![message(
            "Any",
            vec![scalar("type_url", 1, Type::String), scalar("value", 2, Type::Bytes)],
        )],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    })
    .unwrap();

    pool.add_file_descriptor_proto(FileDescriptorProto {
        name: Some("google/protobuf/timestamp.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        message_type: vec![message(
            "Timestamp",
            vec![scalar("seconds", 1, Type::Int64), scalar("nanos", 2, Type::Int32)],
        )],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    })
    .unwrap();

    pool.add_file_descriptor_proto(FileDescriptorProto {
        name: Some("cosmos/bank/v1beta1/bank.proto".to_string()),
        package: Some("cosmos.bank.v1beta1".to_string()),
        message_type: vec![
            message("Coin", vec![scalar("denom", 1, Type::String), scalar("amount", 2, Type::String)]),
            message(
                "MsgSend",
                vec![
                    scalar("from_address", 1, Type::String),
                    scalar("to_address", 2, Type::String),
                    repeated_message_field("amount", 3, ".cosmos.bank.v1beta1.Coin"),
                ],
            ),
        ],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    })
    .unwrap();

    pool.add_file_descriptor_proto(FileDescriptorProto {
        name: Some("cosmos/base/tendermint/v1beta1/query.proto".to_string()),
        package: Some("cosmos.base.tendermint.v1beta1".to_string()),
        dependency: vec!["google/protobuf/timestamp.proto".to_string()],
        message_type: vec![
            message("BlockID", vec![scalar("hash", 1, Type::Bytes)]),
            message(
                "Header",
                vec![
                    scalar("chain_id", 1, Type::String),
                    scalar("proposer_address", 2, Type::Bytes),
                    message_field("time", 3, ".google.protobuf.Timestamp"),
                ],
            ),
            message("Data", vec![repeated_scalar("txs", 1, Type::Bytes)]),
            message(
                "Block",
                vec![
                    message_field("header", 1, ".cosmos.base.tendermint.v1beta1.Header"),
                    message_field("data", 2, ".cosmos.base.tendermint.v1beta1.Data"),
                ],
            ),
            message("GetBlockByHeightRequest", vec![scalar("height", 1, Type::Int64)]),
            message(
                "GetBlockByHeightResponse",
                vec![
                    message_field("block_id", 1, ".cosmos.base.tendermint.v1beta1.BlockID"),
                    message_field("block", 2, ".cosmos.base.tendermint.v1beta1.Block"),
                ],
            ),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Service".to_string()),
            method: vec![method(
                "GetBlockByHeight",
                ".cosmos.base.tendermint.v1beta1.GetBlockByHeightRequest",
                ".cosmos.base.tendermint.v1beta1.GetBlockByHeightResponse",
            )],
            ..Default::default()
        }],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    })
    .unwrap();

    pool.add_file_descriptor_proto(FileDescriptorProto {
        name: Some("cosmos/tx/v1beta1/service.proto".to_string()),
        package: Some("cosmos.tx.v1beta1".to_string()),
        dependency: vec!["google/protobuf/any.proto".to_string()],
        message_type: vec![
            message("Coin", vec![scalar("denom", 1, Type::String), scalar("amount", 2, Type::String)]),
            message(
                "Fee",
                vec![
                    repeated_message_field("amount", 1, ".cosmos.tx.v1beta1.Coin"),
                    scalar("gas_limit", 2, Type::Uint64),
                ],
            ),
            message("AuthInfo", vec![message_field("fee", 1, ".cosmos.tx.v1beta1.Fee")]),
            message(
                "TxBody",
                vec![
                    repeated_message_field("messages", 1, ".google.protobuf.Any"),
                    scalar("memo", 2, Type::String),
                ],
            ),
            message(
                "Tx",
                vec![
                    message_field("body", 1, ".cosmos.tx.v1beta1.TxBody"),
                    message_field("auth_info", 2, ".cosmos.tx.v1beta1.AuthInfo"),
                ],
            ),
            message("EventAttribute", vec![scalar("key", 1, Type::Bytes), scalar("value", 2, Type::Bytes)]),
            message(
                "Event",
                vec![
                    scalar("type", 1, Type::String),
                    repeated_message_field("attributes", 2, ".cosmos.tx.v1beta1.EventAttribute"),
                ],
            ),
            message(
                "TxResponse",
                vec![
                    scalar("code", 1, Type::Uint32),
                    scalar("raw_log", 2, Type::String),
                    scalar("timestamp", 3, Type::String),
                    repeated_message_field("events", 4, ".cosmos.tx.v1beta1.Event"),
                ],
            ),
            message("GetTxRequest", vec![scalar("hash", 1, Type::String)]),
            message(
                "GetTxResponse",
                vec![
                    message_field("tx", 1, ".cosmos.tx.v1beta1.Tx"),
                    message_field("tx_response", 2, ".cosmos.tx.v1beta1.TxResponse"),
                ],
            ),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Service".to_string()),
            method: vec![method("GetTx", ".cosmos.tx.v1beta1.GetTxRequest", ".cosmos.tx.v1beta1.GetTxResponse")],
            ..Default::default()
        }],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    })
    .unwrap();

    pool
}

pub fn descriptors() -> DescriptorResolver {
    DescriptorResolver::from_pool(build_pool())
}

fn new_message(pool: &DescriptorPool, full_name: &str) -> DynamicMessage {
    DynamicMessage::new(pool.get_message_by_name(full_name).unwrap_or_else(|| panic!("missing {full_name}")))
}

/// Builds one `GetBlockByHeightResponse`, with `tx_count` synthetic tx
/// hashes so `BlockFetcher::fetch_block` reports them back for the scheduler
/// to dispatch `GetTx` calls against.
pub fn block_response(pool: &DescriptorPool, height: u64, chain_id: &str, tx_count: usize) -> (Vec<u8>, Vec<String>) {
    let mut block_id = new_message(pool, "cosmos.base.tendermint.v1beta1.BlockID");
    block_id.set_field_by_name("hash", Value::Bytes(vec![height as u8; 32].into()));

    let mut timestamp = new_message(pool, "google.protobuf.Timestamp");
    timestamp.set_field_by_name("seconds", Value::I64(1_700_000_000 + height as i64));

    let mut header = new_message(pool, "cosmos.base.tendermint.v1beta1.Header");
    header.set_field_by_name("chain_id", Value::String(chain_id.to_string()));
    header.set_field_by_name("proposer_address", Value::Bytes(vec![0xAB; 20].into()));
    header.set_field_by_name("time", Value::Message(timestamp));

    let tx_raw_bytes: Vec<Vec<u8>> = (0..tx_count).map(|i| format!("tx-{height}-{i}").into_bytes()).collect();
    let tx_hashes: Vec<String> = tx_raw_bytes.iter().map(|raw| hex::encode_upper(Sha256::digest(raw))).collect();

    let mut data = new_message(pool, "cosmos.base.tendermint.v1beta1.Data");
    data.set_field_by_name("txs", Value::List(tx_raw_bytes.into_iter().map(|b| Value::Bytes(b.into())).collect()));

    let mut block = new_message(pool, "cosmos.base.tendermint.v1beta1.Block");
    block.set_field_by_name("header", Value::Message(header));
    block.set_field_by_name("data", Value::Message(data));

    let mut response = new_message(pool, "cosmos.base.tendermint.v1beta1.GetBlockByHeightResponse");
    response.set_field_by_name("block_id", Value::Message(block_id));
    response.set_field_by_name("block", Value::Message(block));

    (response.encode_to_vec(), tx_hashes)
}

/// Builds one `GetTxResponse` for `tx_hash`, with a single `MsgSend` so the
/// decoder's sender/mentions extraction has something to exercise.
pub fn tx_response(pool: &DescriptorPool, from: &str, to: &str, denom: &str, amount: &str, failed: bool) -> Vec<u8> {
    let mut coin = new_message(pool, "cosmos.bank.v1beta1.Coin");
    coin.set_field_by_name("denom", Value::String(denom.to_string()));
    coin.set_field_by_name("amount", Value::String(amount.to_string()));

    let mut msg_send = new_message(pool, "cosmos.bank.v1beta1.MsgSend");
    msg_send.set_field_by_name("from_address", Value::String(from.to_string()));
    msg_send.set_field_by_name("to_address", Value::String(to.to_string()));
    msg_send.set_field_by_name("amount", Value::List(vec![Value::Message(coin.clone())]));

    let mut any = new_message(pool, "google.protobuf.Any");
    any.set_field_by_name("type_url", Value::String("/cosmos.bank.v1beta1.MsgSend".to_string()));
    any.set_field_by_name("value", Value::Bytes(msg_send.encode_to_vec().into()));

    let mut tx_coin = new_message(pool, "cosmos.tx.v1beta1.Coin");
    tx_coin.set_field_by_name("denom", Value::String(denom.to_string()));
    tx_coin.set_field_by_name("amount", Value::String("1000".to_string()));

    let mut fee = new_message(pool, "cosmos.tx.v1beta1.Fee");
    fee.set_field_by_name("amount", Value::List(vec![Value::Message(tx_coin)]));
    fee.set_field_by_name("gas_limit", Value::U64(200_000));

    let mut auth_info = new_message(pool, "cosmos.tx.v1beta1.AuthInfo");
    auth_info.set_field_by_name("fee", Value::Message(fee));

    let mut body = new_message(pool, "cosmos.tx.v1beta1.TxBody");
    body.set_field_by_name("messages", Value::List(vec![Value::Message(any)]));

    let mut tx = new_message(pool, "cosmos.tx.v1beta1.Tx");
    tx.set_field_by_name("body", Value::Message(body));
    tx.set_field_by_name("auth_info", Value::Message(auth_info));

    let mut tx_response = new_message(pool, "cosmos.tx.v1beta1.TxResponse");
    tx_response.set_field_by_name("code", Value::U32(if failed { 5 } else { 0 }));
    tx_response.set_field_by_name("raw_log", Value::String(if failed { "execution failed".to_string() } else { String::new() }));
    tx_response.set_field_by_name("timestamp", Value::String("2024-01-01T00:00:00Z".to_string()));

    let mut response = new_message(pool, "cosmos.tx.v1beta1.GetTxResponse");
    response.set_field_by_name("tx", Value::Message(tx));
    response.set_field_by_name("tx_response", Value::Message(tx_response));

    response.encode_to_vec()
}

/// Encodes the exact request bytes `BlockFetcher::fetch_block` produces for
/// `height`, so a [`FakeTransport`] can match on them deterministically.
pub async fn block_request_bytes(descriptors: &DescriptorResolver, height: u64) -> Vec<u8> {
    let mut request = descriptors.new_request(TENDERMINT_SERVICE, "GetBlockByHeight").await.unwrap();
    request.set_field_by_name("height", Value::I64(height as i64));
    request.encode_to_vec()
}

/// Encodes the exact request bytes `TransactionDecoder::fetch_tx` produces
/// for `tx_hash`.
pub async fn tx_request_bytes(descriptors: &DescriptorResolver, tx_hash: &str) -> Vec<u8> {
    let mut request = descriptors.new_request(TX_SERVICE, "GetTx").await.unwrap();
    request.set_field_by_name("hash", Value::String(tx_hash.to_string()));
    request.encode_to_vec()
}

type QueuedResponse = (std::time::Duration, Result<Vec<u8>, TransportError>);

/// A canned-response transport keyed on the exact `(path, request_bytes)` a
/// caller sends, so concurrent callers for different heights never cross
/// streams even though they share one instance. An optional per-response
/// delay lets scenario tests keep a height in flight long enough to land a
/// cancellation mid-processing.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<(String, Vec<u8>), VecDeque<QueuedResponse>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, path: &str, request_bytes: Vec<u8>, response: Result<Vec<u8>, TransportError>) {
        self.queue_delayed(path, request_bytes, response, std::time::Duration::ZERO);
    }

    pub fn queue_delayed(
        &self,
        path: &str,
        request_bytes: Vec<u8>,
        response: Result<Vec<u8>, TransportError>,
        delay: std::time::Duration,
    ) {
        self.responses
            .lock()
            .unwrap()
            .entry((path.to_string(), request_bytes))
            .or_default()
            .push_back((delay, response));
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn invoke(&self, path: &str, request_bytes: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let key = (path.to_string(), request_bytes);
        let popped = self.responses.lock().unwrap().get_mut(&key).and_then(VecDeque::pop_front);
        match popped {
            Some((delay, response)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                response
            }
            None => Err(TransportError::Timeout { method: key.0, timeout_ms: 0 }),
        }
    }
}

/// An in-memory sink recording commits/skips/cursor advances in arrival
/// order, so scenario tests can assert the scheduler only ever hands it
/// strictly increasing heights.
#[derive(Default)]
pub struct FakeSink {
    pub committed: Mutex<Vec<u64>>,
    pub skipped: Mutex<Vec<u64>>,
    cursor: Mutex<u64>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: u64) -> Self {
        Self { cursor: Mutex::new(cursor), ..Self::default() }
    }
}

#[async_trait]
impl SinkPort for FakeSink {
    async fn commit_height(&self, record: &HeightRecord) -> Result<(), SinkError> {
        let height = record.block.height;
        let mut committed = self.committed.lock().unwrap();
        assert!(
            committed.last().map(|&last| height > last).unwrap_or(true),
            "sink received out-of-order height {height} after {:?}",
            committed.last()
        );
        committed.push(height);
        *self.cursor.lock().unwrap() = height;
        Ok(())
    }

    async fn advance_cursor(&self, height: u64) -> Result<(), SinkError> {
        *self.cursor.lock().unwrap() = height;
        Ok(())
    }

    async fn load_progress(&self) -> Result<u64, SinkError> {
        Ok(*self.cursor.lock().unwrap())
    }

    async fn load_skipped_heights(&self) -> Result<Vec<u64>, SinkError> {
        Ok(self.skipped.lock().unwrap().clone())
    }

    async fn record_skip(&self, height: u64) -> Result<(), SinkError> {
        self.skipped.lock().unwrap().push(height);
        Ok(())
    }
}
