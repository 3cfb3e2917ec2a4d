//! gRPC Transport: dials the chain node and exposes a single `invoke`
//! primitive with retry and timeout, grounded on the tonic channel/client
//! construction in `providers::grpc::WasmGrpcProvider` but generalised to a
//! raw method path + byte payload instead of a compiled service client,
//! since the method descriptors here are only known at runtime.

mod codec;
pub mod retry;

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tonic::client::Grpc;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::{instrument, warn};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::metrics::ExtractorMetrics;

use codec::RawCodec;

/// The seam the rest of the pipeline is driven through, so a fake can stand
/// in for a dialed `ChainTransport` in tests without a live chain.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, path: &str, request_bytes: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// The message patterns classified as non-retryable "boundary" signals
/// rather than transient failures — see \S4.3/\S9 ("the pruned-boundary
/// message is not an error to retry but a value to parse").
pub fn is_pruned_boundary_message(message: &str) -> bool {
    crate::probe::PRUNED_HEIGHT_RE.is_match(message)
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub insecure: bool,
    pub call_timeout: Duration,
    pub max_retries: u32,
}

/// Dials once and exposes `invoke` over the shared, multiplexed channel.
#[derive(Clone)]
pub struct ChainTransport {
    channel: Channel,
    config: TransportConfig,
    metrics: Option<ExtractorMetrics>,
    next_attempt_log: std::sync::Arc<AtomicU32>,
}

impl ChainTransport {
    pub async fn connect(
        config: TransportConfig,
        metrics: Option<ExtractorMetrics>,
    ) -> Result<Self, TransportError> {
        let scheme = if config.insecure { "http" } else { "https" };
        let uri = format!("{scheme}://{}", config.endpoint);
        let mut endpoint = Endpoint::from_str(&uri)
            .map_err(TransportError::Dial)?
            .timeout(config.call_timeout);
        if !config.insecure {
            endpoint = endpoint
                .tls_config(tonic::transport::ClientTlsConfig::new())
                .map_err(TransportError::Dial)?;
        }
        let channel = endpoint.connect().await.map_err(TransportError::Dial)?;
        Ok(Self {
            channel,
            config,
            metrics,
            next_attempt_log: std::sync::Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Invokes a unary gRPC method at `path` (e.g.
    /// `/cosmos.tx.v1beta1.Service/GetTx`) with an already-encoded protobuf
    /// request, returning the raw response bytes. Retries per \S4.1: 3
    /// attempts by default, exponential backoff from 200ms capped at 5s with
    /// full jitter, on deadline-exceeded/unavailable/internal/
    /// resource-exhausted only.
    #[instrument(skip(self, request_bytes), fields(method = %path))]
    pub async fn invoke(&self, path: &str, request_bytes: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let uri: tonic::codegen::http::uri::PathAndQuery = path
            .parse()
            .map_err(|_| TransportError::Timeout {
                method: path.to_string(),
                timeout_ms: 0,
            })?;

        let mut attempt = 0u32;
        loop {
            let mut grpc = Grpc::new(self.channel.clone());
            let call = async {
                grpc.ready().await.map_err(TransportError::Dial)?;
                grpc.unary(Request::new(request_bytes.clone()), uri.clone(), RawCodec)
                    .await
                    .map_err(TransportError::from)
            };

            let started = Instant::now();
            let outcome = tokio::time::timeout(self.config.call_timeout, call).await;
            let elapsed = started.elapsed();
            let result = match outcome {
                Ok(r) => r,
                Err(_) => Err(TransportError::Timeout {
                    method: path.to_string(),
                    timeout_ms: self.config.call_timeout.as_millis() as u64,
                }),
            };

            if let Some(metrics) = &self.metrics {
                let outcome_label = if result.is_ok() { "ok" } else { "error" };
                metrics.record_rpc(path, outcome_label, elapsed.as_secs_f64());
            }

            match result {
                Ok(response) => return Ok(response.into_inner()),
                Err(err) => {
                    let status_message_is_boundary = matches!(&err, TransportError::Status(s) if is_pruned_boundary_message(s.message()));
                    if status_message_is_boundary || !err.is_retryable() || attempt >= self.config.max_retries {
                        if attempt >= self.config.max_retries && err.is_retryable() {
                            return Err(TransportError::RetriesExhausted {
                                method: path.to_string(),
                                attempts: attempt + 1,
                                source: Box::new(err),
                            });
                        }
                        return Err(err);
                    }
                    let wait = retry::transport_backoff(attempt);
                    warn!(attempt, ?wait, error = %err, "retrying gRPC call");
                    self.next_attempt_log.store(attempt, Ordering::Relaxed);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for ChainTransport {
    async fn invoke(&self, path: &str, request_bytes: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.invoke(path, request_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_message_is_recognised() {
        assert!(is_pruned_boundary_message(
            "rpc error: code = Unknown desc = height 100 is not available, lowest height is 500"
        ));
        assert!(!is_pruned_boundary_message("unavailable"));
    }
}
