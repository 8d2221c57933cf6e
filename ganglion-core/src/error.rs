// ganglion-core/src/error.rs

use std::net::SocketAddr;

/// Shared error enum that every crate's leaf errors convert into at its
/// public boundary. Internal helpers keep their own crate-local error
/// types and `?`-propagate; this enum is what callers outside the crate
/// actually match on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no known raft leader")]
    NoLeader,

    #[error("dial to {addr} timed out")]
    DialTimeout { addr: SocketAddr },

    #[error("tls handshake with {addr} failed: {source}")]
    TlsHandshake {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("session multiplexer open failed: {0}")]
    SessionOpen(String),

    #[error("unknown stream type byte {0:#04x}")]
    UnknownStreamType(u8),

    #[error("apply enqueue timed out after {0:?}")]
    EnqueueTimeout(std::time::Duration),

    #[error("tuple decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("gossip member is missing required tags: {0}")]
    InvalidNode(String),

    #[error("dual bootstrap detected, second node {0} ignored")]
    DualBootstrap(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors the tuple codec (C1) can raise while decoding a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognised protocol version")]
    UnknownVersion,
    #[error("record length exceeds configured maximum")]
    ExceedsMax,
    #[error("record shorter than the minimum header size")]
    Truncated,
    #[error("no schema registered for this (namespace, type) hash pair")]
    UnknownType,
}

