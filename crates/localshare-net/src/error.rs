use thiserror::Error;

use localshare_shared::SharedError;
use localshare_store::StoreError;

/// Errors from discovery, handshakes and message delivery.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Shared(#[from] SharedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The device has no usable ip/port.
    #[error("Device {0} has no known address")]
    NoAddress(String),

    #[error("Message has neither text nor a file")]
    EmptyMessage,

    #[error("Unknown peer '{0}'")]
    UnknownPeer(String),
}

/// Reasons a download attempt stops short of a verified file.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Message {0} references no file")]
    NoFile(i64),

    #[error("Message {0} is not linked to a reachable peer")]
    NoPeer(i64),

    /// `/downloadInfo` was unreachable or refused.
    #[error("Metadata request failed: {0}")]
    Metadata(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} for bytes {start}-{end}")]
    UnexpectedStatus { status: u16, start: u64, end: u64 },

    /// The stream closed before the whole range arrived.
    #[error("Bytes {start}-{end}: stream closed after {received} of {expected} bytes")]
    ShortRead {
        start: u64,
        end: u64,
        expected: u64,
        received: u64,
    },

    #[error("Bytes {start}-{end}: peer sent more than {expected} bytes")]
    Overrun { start: u64, end: u64, expected: u64 },

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
