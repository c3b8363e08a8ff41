//! Error taxonomy for the tracker pipeline.
//!
//! The propagation policy follows the worker boundaries:
//! - `DecodeError`: contained in the ingestion loop (skip record, count, continue)
//! - `RpcError`: abandons the current tick or record, retried on the next one
//! - `IngestError::SubscriptionTerminated`: fatal for the push loop
//! - `HashLogError::Contention`: tick skipped, retried on the next one
//! - `ConfigError`: fatal at startup, before any worker spawns

use thiserror::Error;

/// A raw log could not be decoded into a Transfer event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has {0} topics, Transfer needs 3")]
    MissingTopics(usize),

    #[error("topic0 does not match the Transfer event signature")]
    SignatureMismatch,

    #[error("log payload is {0} bytes, amount must fit in a uint256 word")]
    OversizedAmount(usize),

    #[error("log carries no transaction hash")]
    MissingTxHash,

    #[error("abi unpack failed: {0}")]
    Abi(String),
}

/// Transient failure talking to the chain client. Never fatal for a loop.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("contract call failed: {0}")]
    Call(String),
}

/// Ingestion loop failures that escape the loop itself.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("log subscription terminated: {0}")]
    SubscriptionTerminated(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Shared hash-log file failures.
#[derive(Debug, Error)]
pub enum HashLogError {
    #[error("hash log is locked by another process")]
    Contention,

    #[error("hash log io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVariable(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("failed to read {path}: {source}")]
    AddressFile {
        path: String,
        source: std::io::Error,
    },
}
