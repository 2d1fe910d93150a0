use std::io;

use rotbridge_net::ChannelError;
use rotbridge_ot::{base, extension};

/// Invalid arguments. Always detected before any network activity.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the responder needs a remote address")]
    MissingRemoteAddress,
    #[error("remote address is not valid UTF-8")]
    NonUtf8Address,
    #[error("invalid port {0}")]
    InvalidPort(i64),
    #[error("invalid party {0}, expected 1 (initiator) or 2 (responder)")]
    InvalidParty(i32),
    #[error("invalid OT count {0}")]
    InvalidCount(i64),
    #[error("thread count must be at least 1")]
    ZeroThreads,
    #[error("output buffer is null")]
    NullBuffer,
    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid configuration")]
    Configuration(#[from] ConfigError),
    #[error("transport failure")]
    Transport(#[from] ChannelError),
    #[error("OT protocol failure")]
    Protocol(#[source] extension::Error),
    /// Only returned if verification is enabled.
    #[error("receiver output of OT {index} does not match the sender's messages")]
    CorrelationMismatch { index: usize },
    #[error("unable to start async runtime")]
    Runtime(#[source] io::Error),
}

impl From<extension::Error> for BridgeError {
    fn from(err: extension::Error) -> Self {
        match err {
            extension::Error::Channel(err)
            | extension::Error::BaseOT(base::Error::Channel(err)) => BridgeError::Transport(err),
            other => BridgeError::Protocol(other),
        }
    }
}
