//! Transaction Decoder: resolves a tx hash to fee/gas/memo/error/messages/
//! events, grounded on `chain_scraper::ensure_txns`'s shape of turning one
//! `GetTx` response into typed records, with sender extraction organised as
//! the table-driven registry \S4.5 calls for (one file per well-known
//! Cosmos module, echoing how `hyperlane-cosmos::payloads` keeps one file
//! per module's message types).

use once_cell::sync::Lazy;
use prost_reflect::Value;
use regex::Regex;
use serde_json::Value as Json;
use time::OffsetDateTime;
use tracing::instrument;

use crate::descriptors::DescriptorResolver;
use crate::error::{DecodeError, DescriptorError};
use crate::transport::Transport;
use crate::types::{Coin, Event, Message, Transaction, TxError};

const TX_SERVICE: &str = "cosmos.tx.v1beta1.Service";

/// Addresses look like a bech32 human-readable prefix, `1`, then 38-58 data
/// characters. Used only to harvest `mentions`; it is a heuristic, not a
/// bech32 checksum validator.
static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{2,20}1[ac-hj-np-z02-9]{38,58}$").expect("static regex is valid")
});

type SenderExtractor = fn(&Json) -> Option<String>;

fn sender_registry(type_url: &str) -> Option<SenderExtractor> {
    Some(match type_url {
        "/cosmos.bank.v1beta1.MsgSend" | "/cosmos.bank.v1beta1.MsgMultiSend" => from_address,
        "/cosmos.staking.v1beta1.MsgDelegate"
        | "/cosmos.staking.v1beta1.MsgUndelegate"
        | "/cosmos.staking.v1beta1.MsgBeginRedelegate" => delegator_address,
        "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward"
        | "/cosmos.distribution.v1beta1.MsgSetWithdrawAddress" => delegator_address,
        "/cosmos.gov.v1beta1.MsgVote" | "/cosmos.gov.v1beta1.MsgDeposit" | "/cosmos.gov.v1.MsgVote" => voter_or_depositor,
        "/ibc.applications.transfer.v1.MsgTransfer" => sender,
        "/cosmwasm.wasm.v1.MsgExecuteContract" | "/cosmwasm.wasm.v1.MsgInstantiateContract" => sender,
        "/ethermint.evm.v1.MsgEthereumTx" => from,
        "/cosmos.authz.v1beta1.MsgExec" => exec_sender,
        _ => return None,
    })
}

fn from_address(m: &Json) -> Option<String> {
    str_field(m, "from_address")
}
fn delegator_address(m: &Json) -> Option<String> {
    str_field(m, "delegator_address")
}
fn voter_or_depositor(m: &Json) -> Option<String> {
    str_field(m, "voter").or_else(|| str_field(m, "depositor"))
}
fn sender(m: &Json) -> Option<String> {
    str_field(m, "sender")
}
fn from(m: &Json) -> Option<String> {
    str_field(m, "from")
}

/// `authz.MsgExec` recurses one level into its wrapped `msgs`, per \S4.5.
fn exec_sender(m: &Json) -> Option<String> {
    m.get("msgs")?.as_array()?.first().and_then(|inner| {
        let type_url = inner.get("@type")?.as_str()?;
        sender_registry(type_url)?(inner)
    })
}

fn str_field(m: &Json, key: &str) -> Option<String> {
    m.get(key)?.as_str().map(str::to_string)
}

pub struct TransactionDecoder<'a> {
    transport: &'a dyn Transport,
    descriptors: &'a DescriptorResolver,
}

impl<'a> TransactionDecoder<'a> {
    pub fn new(transport: &'a dyn Transport, descriptors: &'a DescriptorResolver) -> Self {
        Self { transport, descriptors }
    }

    #[instrument(skip(self), fields(tx_hash = %tx_hash))]
    pub async fn fetch_tx(&self, tx_hash: &str, height: u64, index_in_block: u32) -> Result<Transaction, DecodeError> {
        let mut request = self.descriptors.new_request(TX_SERVICE, "GetTx").await?;
        request.set_field_by_name("hash", Value::String(tx_hash.to_string()));

        let response = self
            .descriptors
            .invoke(self.transport, TX_SERVICE, "GetTx", request)
            .await
            .map_err(|e| classify(e, tx_hash))?;

        let raw_json = self
            .descriptors
            .message_to_canonical_json(&response)
            .map_err(DecodeError::Descriptor)?;

        let tx = response
            .get_field_by_name("tx")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| DecodeError::Descriptor(malformed("GetTx response missing tx")))?;
        let tx_response = response
            .get_field_by_name("tx_response")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| DecodeError::Descriptor(malformed("GetTx response missing tx_response")))?;

        let body = tx
            .get_field_by_name("body")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| DecodeError::Descriptor(malformed("tx missing body")))?;
        let auth_info = tx
            .get_field_by_name("auth_info")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| DecodeError::Descriptor(malformed("tx missing auth_info")))?;
        let fee_msg = auth_info
            .get_field_by_name("fee")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| DecodeError::Descriptor(malformed("auth_info missing fee")))?;

        let gas_limit = fee_msg
            .get_field_by_name("gas_limit")
            .and_then(|v| v.as_u64())
            .unwrap_or_default();
        let fee = fee_msg
            .get_field_by_name("amount")
            .and_then(|v| v.as_list().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|coin| coin.as_message())
            .map(|coin| Coin {
                denom: coin
                    .get_field_by_name("denom")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                amount: coin
                    .get_field_by_name("amount")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        let memo = body
            .get_field_by_name("memo")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|m| !m.is_empty());

        let code = tx_response.get_field_by_name("code").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let error = if code == 0 {
            None
        } else {
            Some(TxError {
                code,
                log: tx_response
                    .get_field_by_name("raw_log")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
            })
        };

        let time = tx_response
            .get_field_by_name("timestamp")
            .and_then(|v| v.as_str().map(str::to_string))
            .and_then(|s| time::OffsetDateTime::parse(&s, &time::format_description::well_known::Rfc3339).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        let raw_messages = body
            .get_field_by_name("messages")
            .and_then(|v| v.as_list().cloned())
            .unwrap_or_default();

        let mut messages = Vec::with_capacity(raw_messages.len());
        for (index, any_value) in raw_messages.iter().enumerate() {
            let any_msg = any_value
                .as_message()
                .ok_or_else(|| DecodeError::Descriptor(malformed("message is not an Any")))?;
            let metadata = self
                .descriptors
                .message_to_canonical_json(any_msg)
                .map_err(DecodeError::Descriptor)?;
            let type_url = metadata
                .get("@type")
                .and_then(Json::as_str)
                .map(str::to_string)
                .or_else(|| {
                    any_msg
                        .get_field_by_name("type_url")
                        .and_then(|v| v.as_str().map(str::to_string))
                })
                .unwrap_or_default();

            let extracted_sender = sender_registry(&type_url).and_then(|f| f(&metadata));
            let mentions = collect_mentions(&metadata);

            messages.push(Message {
                message_index: index as u32,
                type_url,
                sender: extracted_sender,
                mentions,
                metadata,
            });
        }

        let events = flatten_events(&tx_response);
        let proposal_ids = collect_proposal_ids(&messages);

        Ok(Transaction {
            tx_hash: tx_hash.to_string(),
            height,
            index_in_block,
            fee,
            gas_limit,
            memo,
            error,
            time,
            messages,
            events,
            proposal_ids,
            raw_json,
        })
    }
}

fn flatten_events(tx_response: &prost_reflect::DynamicMessage) -> Vec<Event> {
    let raw_events = tx_response
        .get_field_by_name("events")
        .and_then(|v| v.as_list().cloned())
        .unwrap_or_default();

    let mut events = Vec::new();
    for (event_index, event) in raw_events.iter().enumerate() {
        let Some(event) = event.as_message() else { continue };
        let event_type = event
            .get_field_by_name("type")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let attributes = event
            .get_field_by_name("attributes")
            .and_then(|v| v.as_list().cloned())
            .unwrap_or_default();

        // The sdk tags each event with a "msg_index" attribute correlating it
        // to body.messages[msg_index]; every attribute in the event shares it.
        let msg_index = attributes.iter().find_map(|attr| {
            let attr = attr.as_message()?;
            let key = attr.get_field_by_name("key").and_then(decode_attr_bytes)?;
            (key == "msg_index")
                .then(|| attr.get_field_by_name("value").and_then(decode_attr_bytes))
                .flatten()
                .and_then(|v| v.parse::<u32>().ok())
        });

        for (attr_index, attr) in attributes.iter().enumerate() {
            let Some(attr) = attr.as_message() else { continue };
            let key = attr
                .get_field_by_name("key")
                .and_then(decode_attr_bytes)
                .unwrap_or_default();
            let value = attr.get_field_by_name("value").and_then(decode_attr_bytes);
            events.push(Event {
                event_index: event_index as u32,
                attr_index: attr_index as u32,
                event_type: event_type.clone(),
                attr_key: key,
                attr_value: value,
                msg_index,
            });
        }
    }
    events
}

fn decode_attr_bytes(value: prost_reflect::Value) -> Option<String> {
    value
        .as_str()
        .map(str::to_string)
        .or_else(|| value.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned()))
}

/// Gathers every `proposal_id` surfaced by gov messages in the tx (vote,
/// deposit, submit-proposal) for the `transactions_main.proposal_ids` column.
fn collect_proposal_ids(messages: &[Message]) -> Vec<i32> {
    let mut ids: Vec<i32> = messages
        .iter()
        .filter(|m| m.type_url.starts_with("/cosmos.gov."))
        .filter_map(|m| m.metadata.get("proposal_id"))
        .filter_map(|v| v.as_str().and_then(|s| s.parse::<i32>().ok()).or_else(|| v.as_i64().map(|n| n as i32)))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn collect_mentions(value: &Json) -> Vec<String> {
    let mut found = Vec::new();
    walk_json_strings(value, &mut found);
    found.sort();
    found.dedup();
    found
}

fn walk_json_strings(value: &Json, out: &mut Vec<String>) {
    match value {
        Json::String(s) if ADDRESS_RE.is_match(s) => out.push(s.clone()),
        Json::Array(items) => items.iter().for_each(|v| walk_json_strings(v, out)),
        Json::Object(map) => map.values().for_each(|v| walk_json_strings(v, out)),
        _ => {}
    }
}

fn classify(err: DescriptorError, tx_hash: &str) -> DecodeError {
    if let DescriptorError::Transport(crate::error::TransportError::Status(ref status)) = err {
        if status.code() == tonic::Code::NotFound {
            return DecodeError::TxNotFound(tx_hash.to_string());
        }
    }
    DecodeError::Descriptor(err)
}

fn malformed(msg: &str) -> DescriptorError {
    DescriptorError::Malformed(msg.to_string())
}
