//! Error types for the Whatsminer management protocol.
//!
//! Every client operation returns a [`WhatsminerError`]. The variants mirror
//! the status codes the device reports, plus the transport-level
//! [`Connectivity`](WhatsminerError::Connectivity) kind which is kept apart
//! from anything the device itself said.

use thiserror::Error;

pub type Result<T, E = WhatsminerError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WhatsminerError {
    /// Connection refused, reset, or timed out before a reply arrived.
    #[error("cannot reach miner: {0}")]
    Connectivity(String),

    #[error("invalid command {command}: {message}")]
    InvalidCommand { command: String, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Device refused the encrypted envelope before decrypting it.
    #[error("miner rejected encrypted request")]
    InvalidAuth,

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("unsupported API version: {0}")]
    UnsupportedVersion(String),

    /// Credentials are valid but lack the privilege for this command.
    #[error("API permission denied for {0}")]
    ApiPermissionDenied(String),

    #[error("command failed: {0}")]
    CommandError(String),

    #[error("token invalid")]
    TokenError,

    #[error("token budget exceeded")]
    TokenExceeded,

    /// Reply could not be decrypted or decoded. Usually a wrong password.
    #[error("decode failed: {0}")]
    DecodeError(String),

    /// Device is reachable but the mining process is not running.
    #[error("miner is offline")]
    MinerOffline,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl WhatsminerError {
    /// Token-family errors. The session must re-authenticate before reuse.
    pub fn is_token_failure(&self) -> bool {
        matches!(self, Self::TokenError | Self::TokenExceeded)
    }

    /// Errors that mean the stored credentials no longer work.
    pub fn is_auth_failure(&self) -> bool {
        self.is_token_failure() || matches!(self, Self::DecodeError(_))
    }
}

impl From<std::io::Error> for WhatsminerError {
    fn from(err: std::io::Error) -> Self {
        Self::Connectivity(err.to_string())
    }
}
