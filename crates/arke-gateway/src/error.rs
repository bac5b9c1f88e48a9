//! Gateway error types

use crate::protocol::CloseCode;

/// Errors that end a connection or a whole session
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("WebSocket error: {0}")]
    Transport(String),

    #[error("Failed to decode gateway payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Gateway closed the session: {0}")]
    FatalClose(CloseCode),

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Timed out waiting for the gateway handshake")]
    HandshakeTimeout,

    #[error("Connection closed before the handshake completed (code {code:?})")]
    Closed { code: Option<u16> },
}

impl GatewayError {
    /// Fatal errors stop every shard; everything else is retried
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalClose(_))
    }

    /// Close code attached to this error, if any
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::FatalClose(code) => Some(code.as_u16()),
            Self::Closed { code } => *code,
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
