//! Error taxonomy (spec §7): startup errors are fatal, transient I/O and
//! protocol errors are logged and absorbed at their own layer, detector
//! anomalies are a first-class result rather than an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("leading type byte {0:#x} exceeds Mode ordinal")]
    UnknownType(u8),
    #[error("short read: expected {expected} bytes, source delivered {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("sensor type {0:?} is not supported for decode")]
    UnsupportedForDecode(crate::entities::SensorType),
    #[error("io error during packet codec operation: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("injection proxy is not in a state that permits this transition")]
    IllegalStateTransition,
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("io error while servicing a connection: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("startup failed: {component} did not come up: {source}")]
    Startup {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("control-plane rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("simulator deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("executor failed for a scheduled plan: {0}")]
    RunFailed(#[from] ExecutorError),
    #[error("structural hash computation failed unexpectedly")]
    HashFailure,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("bind failed on control-plane endpoint: {0}")]
    Bind(std::io::Error),
    #[error("io error on control-plane connection: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed rpc message: {0}")]
    Malformed(#[from] serde_json::Error),
}
