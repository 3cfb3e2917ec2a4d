//! Per-component error enums, each convertible with `?` at call sites, plus
//! the classification into the error taxonomy that decides retry behaviour.

use thiserror::Error;

/// Which of the taxonomy kinds an error belongs to, independent of which
/// concrete enum carries it. The scheduler and top-level supervisor branch
/// on this, never on the concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Protocol,
    Boundary,
    Sink,
    Cancellation,
}

/// Errors from the gRPC transport: dialing, invoking, and timing out.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to dial {0}")]
    Dial(#[source] tonic::transport::Error),
    #[error("{0}")]
    Status(#[from] tonic::Status),
    #[error("call to {method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },
    #[error("retry budget ({attempts}) exhausted calling {method}: {source}")]
    RetriesExhausted {
        method: String,
        attempts: u32,
        #[source]
        source: Box<TransportError>,
    },
}

impl TransportError {
    /// Retryable per spec \S4.1: deadline exceeded, unavailable, internal,
    /// resource-exhausted. Not-found and invalid-argument are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status(status) => matches!(
                status.code(),
                tonic::Code::DeadlineExceeded
                    | tonic::Code::Unavailable
                    | tonic::Code::Internal
                    | tonic::Code::ResourceExhausted
            ),
            TransportError::Timeout { .. } => true,
            TransportError::Dial(_) => true,
            TransportError::RetriesExhausted { .. } => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transport
    }
}

/// Errors from reflection-backed descriptor resolution and JSON rendering.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("service `{service}` method `{method}` not exposed by reflection")]
    DescriptorMissing { service: String, method: String },
    #[error("reflection stream error: {0}")]
    Reflection(#[from] tonic::Status),
    #[error("malformed reflection response: {0}")]
    Malformed(String),
    #[error("Any value nested past depth 16 while unpacking {type_url}")]
    CyclicAny { type_url: String },
    #[error("no descriptor registered for type URL {0}")]
    UnknownTypeUrl(String),
    #[error("failed to decode message as {type_url}: {source}")]
    Decode {
        type_url: String,
        #[source]
        source: prost::DecodeError,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DescriptorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DescriptorError::Transport(e) => e.kind(),
            _ => ErrorKind::Protocol,
        }
    }
}

/// Errors specific to probing the queryable height boundary.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("chain unreachable: {0}")]
    ChainUnreachable(#[source] DescriptorError),
    #[error("boundary could not be determined after exhausting retries")]
    BoundaryUnknown,
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::ChainUnreachable(e) => e.kind(),
            ProbeError::BoundaryUnknown => ErrorKind::Boundary,
        }
    }
}

/// Errors fetching a block at a given height.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("height {0} is out of range")]
    HeightOutOfRange(u64),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport(e) => e.kind(),
            FetchError::Descriptor(e) => e.kind(),
            FetchError::HeightOutOfRange(_) => ErrorKind::Boundary,
        }
    }
}

/// Errors decoding a transaction into the structured record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("tx {0} not found")]
    TxNotFound(String),
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Transport(e) => e.kind(),
            DecodeError::Descriptor(e) => e.kind(),
            DecodeError::TxNotFound(_) => ErrorKind::Protocol,
        }
    }
}

/// Errors resolving denom metadata.
#[derive(Debug, Error)]
pub enum DenomError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("malformed denom trace response for {0}")]
    MalformedTrace(String),
}

impl DenomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DenomError::Transport(e) => e.kind(),
            DenomError::Descriptor(e) => e.kind(),
            DenomError::MalformedTrace(_) => ErrorKind::Protocol,
        }
    }
}

/// Errors from the relational sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("transaction rolled back for height {height}: {source}")]
    TransactionFailed {
        height: u64,
        #[source]
        source: sea_orm::DbErr,
    },
}

impl SinkError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Sink
    }
}

/// A height that exhausted its retry budget in strict failure-policy mode.
#[derive(Debug, Error)]
#[error("height {0} could not be recovered after exhausting retries")]
pub struct HeightUnrecoverable(pub u64);

/// Top-level errors the scheduler surfaces to its caller.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Unrecoverable(#[from] HeightUnrecoverable),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("cancelled after committing up to height {last_committed}")]
    Cancelled { last_committed: u64 },
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Unrecoverable(_) => ErrorKind::Protocol,
            SchedulerError::Sink(e) => e.kind(),
            SchedulerError::Cancelled { .. } => ErrorKind::Cancellation,
        }
    }
}

/// Errors loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error("{count} configuration error(s): {detail}")]
    Multiple { count: usize, detail: String },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}
