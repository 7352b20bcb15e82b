//! Error types for the session SDK

use thiserror::Error;

/// Main error type for the SDK
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Callback failure: {0}")]
    Callback(String),

    #[error("No credential available, authenticate first")]
    NotAuthenticated,
}

/// Credential lifecycle errors.
///
/// `Transient` means the refresh call itself failed (network) and should be
/// retried with the same backoff as connection retries. `Fatal` means the
/// server rejected the refresh token; the session terminates and the error
/// is surfaced to the caller.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Transient auth failure: {0}")]
    Transient(String),

    #[error("Fatal auth failure: {0}")]
    Fatal(String),
}

impl AuthError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Fatal(_))
    }
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to establish connection: {0}")]
    Connect(String),

    #[error("Connection lost: {0}")]
    Io(String),

    #[error("Send on closed channel")]
    ChannelClosed,

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Inbound frame decoding errors.
///
/// Decode failures never tear down the connection; they are reported on the
/// dispatcher's error channel and the receive loop continues.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing field `{0}`")]
    MissingField(&'static str),

    #[error("Malformed `{tag}` payload: {reason}")]
    MalformedPayload { tag: String, reason: String },
}

impl SdkError {
    /// Whether the session state machine may recover from this error by
    /// reconnecting. Fatal auth and decode errors are not connection faults.
    pub fn is_retryable(&self) -> bool {
        match self {
            SdkError::Auth(e) => !e.is_fatal(),
            SdkError::Transport(TransportError::ChannelClosed) => false,
            SdkError::Transport(_) => true,
            SdkError::Decode(_) => false,
            SdkError::Config(_) => false,
            SdkError::Api { .. } => false,
            SdkError::Callback(_) => false,
            SdkError::NotAuthenticated => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_auth_is_retryable() {
        let err = SdkError::Auth(AuthError::Transient("dns".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn fatal_auth_is_not_retryable() {
        let err = SdkError::Auth(AuthError::Fatal("invalid_grant".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn channel_closed_is_not_retryable() {
        assert!(!SdkError::Transport(TransportError::ChannelClosed).is_retryable());
        assert!(SdkError::Transport(TransportError::Io("reset".into())).is_retryable());
    }
}
