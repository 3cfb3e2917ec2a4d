//! Denom Resolver: observes denoms in decoded tx metadata, recognises IBC
//! denoms, queries `DenomTrace`, and caches/persists metadata. No teacher
//! module resolves IBC denom traces; the *shape* (an `Arc`-shared cache
//! behind one read/write lock, single-flight per key) is grounded in
//! `contract_sync::cursor`'s shared-cursor-behind-`Arc` idiom and
//! `chain_scraper`'s "ensure present, else fetch+insert" pattern, here
//! generalised from blocks/txns to denoms.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use prost_reflect::Value;
use regex::Regex;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{instrument, warn};

use crate::descriptors::DescriptorResolver;
use crate::error::DenomError;
use crate::metrics::ExtractorMetrics;
use crate::transport::Transport;
use crate::types::{DenomMetadata, Transaction};

const DENOM_TRACE_SERVICE: &str = "ibc.applications.transfer.v1.Query";

static IBC_DENOM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ibc/[0-9A-F]{64}$").expect("static regex is valid"));

/// symbol/decimals overrides for well-known native denoms; anything else
/// falls back to the prefix-stripped uppercase denom per \S4.6.
const KNOWN_DENOMS: &[(&str, &str)] = &[("uatom", "ATOM"), ("umfx", "MFX"), ("uosmo", "OSMO"), ("uakt", "AKT")];

enum Slot {
    Resolving(Arc<Notify>),
    Done,
}

pub struct DenomResolver {
    transport: Arc<dyn Transport>,
    descriptors: Arc<DescriptorResolver>,
    chain_id: String,
    cache: RwLock<HashMap<String, DenomMetadata>>,
    seen: RwLock<HashSet<String>>,
    inflight: Mutex<HashMap<String, Slot>>,
    metrics: Option<ExtractorMetrics>,
}

impl DenomResolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        descriptors: Arc<DescriptorResolver>,
        chain_id: String,
        metrics: Option<ExtractorMetrics>,
    ) -> Self {
        Self {
            transport,
            descriptors,
            chain_id,
            cache: RwLock::new(HashMap::new()),
            seen: RwLock::new(HashSet::new()),
            inflight: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Collects every denom string reachable in `tx`'s fee and decoded
    /// message metadata, resolves any not yet seen this session, and
    /// returns the metadata for ones newly resolved (the sink upserts
    /// these alongside the owning block).
    #[instrument(skip(self, tx), fields(tx_hash = %tx.tx_hash))]
    pub async fn resolve_for_tx(&self, tx: &Transaction) -> Vec<DenomMetadata> {
        let mut denoms: Vec<String> = tx.fee.iter().map(|c| c.denom.clone()).collect();
        for message in &tx.messages {
            collect_denoms(&message.metadata, &mut denoms);
        }
        denoms.sort();
        denoms.dedup();

        let mut resolved = Vec::new();
        for denom in denoms {
            if self.already_seen(&denom).await {
                continue;
            }
            match self.resolve_one(&denom).await {
                Ok(metadata) => resolved.push(metadata),
                Err(err) => {
                    warn!(denom = %denom, error = %err, "denom resolution failed, will retry next sighting");
                    // Per \S4.6, failure is logged and does not abort the tx;
                    // the denom is *not* added to `seen` so it's retried.
                }
            }
        }
        resolved
    }

    async fn already_seen(&self, denom: &str) -> bool {
        self.seen.read().await.contains(denom)
    }

    /// Single-flight: only one `DenomTrace` call is ever outstanding per
    /// hash, even under concurrent callers, per \S5/\S8 property 7.
    async fn resolve_one(&self, denom: &str) -> Result<DenomMetadata, DenomError> {
        loop {
            let notify = {
                let mut inflight = self.inflight.lock().await;
                match inflight.get(denom) {
                    Some(Slot::Done) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.denom_cache_hits_total.inc();
                        }
                        return Ok(self
                            .cache
                            .read()
                            .await
                            .get(denom)
                            .cloned()
                            .expect("Done slot implies cache entry"));
                    }
                    Some(Slot::Resolving(notify)) => Some(notify.clone()),
                    None => {
                        inflight.insert(denom.to_string(), Slot::Resolving(Arc::new(Notify::new())));
                        None
                    }
                }
            };

            if let Some(notify) = notify {
                notify.notified().await;
                continue;
            }

            if let Some(metrics) = &self.metrics {
                metrics.denom_cache_misses_total.inc();
            }

            let result = self.do_resolve(denom).await;

            return match result {
                Ok(metadata) => {
                    self.cache.write().await.insert(denom.to_string(), metadata.clone());
                    self.seen.write().await.insert(denom.to_string());
                    // Only publish `Done` once the cache entry it promises
                    // actually exists, so a waiter woken by notify_waiters()
                    // never observes `Done` with nothing cached for it.
                    let mut inflight = self.inflight.lock().await;
                    if let Some(Slot::Resolving(notify)) = inflight.insert(denom.to_string(), Slot::Done) {
                        notify.notify_waiters();
                    }
                    Ok(metadata)
                }
                Err(err) => {
                    // Roll the inflight slot back so a future sighting
                    // retries, and wake any waiters so they re-enter the
                    // loop and attempt resolution themselves instead of
                    // waiting on a slot that will never become `Done`.
                    let mut inflight = self.inflight.lock().await;
                    if let Some(Slot::Resolving(notify)) = inflight.remove(denom) {
                        notify.notify_waiters();
                    }
                    Err(err)
                }
            };
        }
    }

    async fn do_resolve(&self, denom: &str) -> Result<DenomMetadata, DenomError> {
        if IBC_DENOM_RE.is_match(denom) {
            self.resolve_ibc(denom).await
        } else {
            Ok(resolve_heuristic(denom, &self.chain_id))
        }
    }

    async fn resolve_ibc(&self, denom: &str) -> Result<DenomMetadata, DenomError> {
        let hash = denom.trim_start_matches("ibc/").to_string();
        let mut request = self
            .descriptors
            .new_request(DENOM_TRACE_SERVICE, "DenomTrace")
            .await?;
        request.set_field_by_name("hash", Value::String(denom.to_string()));

        let response = self
            .descriptors
            .invoke(&self.transport, DENOM_TRACE_SERVICE, "DenomTrace", request)
            .await?;

        let trace = response
            .get_field_by_name("denom_trace")
            .and_then(|v| v.as_message().cloned())
            .ok_or_else(|| DenomError::MalformedTrace(denom.to_string()))?;
        let path = trace
            .get_field_by_name("path")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let base_denom = trace
            .get_field_by_name("base_denom")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| DenomError::MalformedTrace(denom.to_string()))?;

        let computed = calculate_ibc_denom(&path, &base_denom);
        let hash_mismatch = computed.trim_start_matches("ibc/") != hash;

        let (symbol, decimals) = symbol_and_decimals(&base_denom);
        Ok(DenomMetadata {
            denom: denom.to_string(),
            base_denom: base_denom.clone(),
            display_name: symbol.clone(),
            symbol,
            decimals,
            is_ibc: true,
            ibc_hash: Some(hash),
            ibc_path: Some(path),
            hash_mismatch,
            chain_id: self.chain_id.clone(),
        })
    }
}

/// `CalculateIBCDenom(path, base_denom) = "ibc/" + upper(hex(sha256(path +
/// "/" + base_denom)))`, per \S4.6.
pub fn calculate_ibc_denom(path: &str, base_denom: &str) -> String {
    let digest = Sha256::digest(format!("{path}/{base_denom}").as_bytes());
    format!("ibc/{}", hex::encode_upper(digest))
}

fn resolve_heuristic(denom: &str, chain_id: &str) -> DenomMetadata {
    let decimals = if let Some(stripped) = denom.strip_prefix('u') {
        let _ = stripped;
        6
    } else if denom.starts_with('a') {
        18
    } else {
        6
    };
    let (symbol, _) = symbol_and_decimals(denom);
    DenomMetadata {
        denom: denom.to_string(),
        base_denom: denom.to_string(),
        display_name: symbol.clone(),
        symbol,
        decimals,
        is_ibc: false,
        ibc_hash: None,
        ibc_path: None,
        hash_mismatch: false,
        chain_id: chain_id.to_string(),
    }
}

fn symbol_and_decimals(denom: &str) -> (String, u32) {
    if let Some((_, symbol)) = KNOWN_DENOMS.iter().find(|(d, _)| *d == denom) {
        let decimals = if denom.starts_with('u') {
            6
        } else if denom.starts_with('a') {
            18
        } else {
            6
        };
        return (symbol.to_string(), decimals);
    }
    let stripped = denom.strip_prefix('u').or_else(|| denom.strip_prefix('a')).unwrap_or(denom);
    let decimals = if denom.starts_with('u') {
        6
    } else if denom.starts_with('a') {
        18
    } else {
        6
    };
    (stripped.to_uppercase(), decimals)
}

/// Walks a decoded message's metadata JSON collecting every string found
/// under a `denom` or `base_denom` key, recursing through `coins`/`amount`
/// arrays and `token` objects per \S4.6.
fn collect_denoms(value: &Json, out: &mut Vec<String>) {
    match value {
        Json::Object(map) => {
            for (key, val) in map {
                if (key == "denom" || key == "base_denom") && val.is_string() {
                    out.push(val.as_str().unwrap().to_string());
                } else {
                    collect_denoms(val, out);
                }
            }
        }
        Json::Array(items) => items.iter().for_each(|v| collect_denoms(v, out)),
        _ => {}
    }
}
