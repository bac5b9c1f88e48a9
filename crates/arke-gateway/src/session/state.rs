//! Connection states

use std::fmt;

/// Where a session is in its connection lifecycle
///
/// Owned by the session task; observers see copies through the status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Transport connection being opened
    Connecting,
    /// Hello received, Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    Connected,
    /// Connection lost, waiting before the next attempt
    Reconnecting,
    /// Terminal
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Connection opening or open, but no READY or RESUMED yet
    #[must_use]
    pub const fn is_handshaking(self) -> bool {
        matches!(self, Self::Connecting | Self::Identifying | Self::Resuming)
    }

    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
