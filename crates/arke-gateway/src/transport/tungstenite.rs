//! `tokio-tungstenite` backed transport

use super::{GatewayConnection, GatewayTransport, Incoming};
use crate::error::GatewayError;
use crate::protocol::GatewayFrame;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::trace;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects with `tokio_tungstenite::connect_async`
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayTransport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, GatewayError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WsStream,
}

#[async_trait]
impl GatewayConnection for TungsteniteConnection {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), GatewayError> {
        let json = frame.to_json()?;
        trace!(frame = %frame, "Sending frame");
        self.stream.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Incoming, GatewayError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Incoming::Frame(GatewayFrame::from_json(&text)?));
                }
                Some(Ok(Message::Close(frame))) => {
                    return Ok(Incoming::Closed(frame.map(|f| f.code.into())));
                }
                // Ping/pong are answered by tungstenite; binary would need zlib
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(Incoming::Closed(None)),
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), GatewayError> {
        let frame = CloseFrame {
            code: code.into(),
            reason: "closing".into(),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}
