//! WebSocket transport boundary
//!
//! The session drives a connection through three calls: send a frame,
//! receive the next frame or close, and close. `TungsteniteTransport` is the
//! production implementation; tests plug in scripted servers.

mod tungstenite;

pub use self::tungstenite::TungsteniteTransport;

use crate::error::GatewayError;
use crate::protocol::GatewayFrame;
use async_trait::async_trait;

/// Something received from the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Frame(GatewayFrame),
    /// The connection closed, with the close code if one was sent
    Closed(Option<u16>),
}

/// Opens gateway connections
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, GatewayError>;
}

/// One open gateway connection
///
/// `receive` must be cancel safe: the session polls it inside `select!`
/// alongside its timers.
#[async_trait]
pub trait GatewayConnection: Send {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), GatewayError>;

    /// Next frame; a dropped stream is reported as `Closed(None)`
    ///
    /// A frame that fails to decode yields `Err(GatewayError::Decode)` and
    /// leaves the connection usable.
    async fn receive(&mut self) -> Result<Incoming, GatewayError>;

    async fn close(&mut self, code: u16) -> Result<(), GatewayError>;
}
