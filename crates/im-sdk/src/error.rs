//! SDK-wide error taxonomy (§7), composed from each component's leaf error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("SDK not initialized")]
    NotInitialized,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid content")]
    InvalidContent,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("timeout")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("database error: {0}")]
    DatabaseError(#[from] im_store::StoreError),
    #[error("packet loss: expected {expected}, received {received}, gap {gap}")]
    PacketLoss { expected: u32, received: u32, gap: u32 },
    #[error("kicked out: {0}")]
    KickedOut(String),
    #[error("max reconnect attempts reached")]
    MaxReconnectAttemptsReached,
    #[error("revoke time expired")]
    RevokeTimeExpired,
    #[error("permission denied")]
    PermissionDenied,
    #[error("message not found")]
    MessageNotFound,
    #[error("codec error: {0}")]
    Codec(#[from] im_protocol::CodecError),
    #[error("binary codec error: {0}")]
    BinaryCodec(#[from] im_protocol::BinaryCodecError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Custom(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Process exit codes for an embedding CLI (§6), kept as policy-free mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Normal = 0,
    AuthenticationFailed = 2,
    NetworkUnreachable = 3,
    MaxReconnectReached = 4,
    KickedOut = 5,
}

impl From<&SdkError> for Option<ExitCode> {
    fn from(err: &SdkError) -> Self {
        match err {
            SdkError::AuthenticationFailed(_) => Some(ExitCode::AuthenticationFailed),
            SdkError::NetworkError(_) => Some(ExitCode::NetworkUnreachable),
            SdkError::MaxReconnectAttemptsReached => Some(ExitCode::MaxReconnectReached),
            SdkError::KickedOut(_) => Some(ExitCode::KickedOut),
            _ => None,
        }
    }
}
