//! `tokio-tungstenite` transport against a local WebSocket gateway stub
//!
//! Run with: cargo test -p integration-tests --test tungstenite_transport

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arke_gateway::{
    CloseCode, GatewayError, GatewayFrame, GatewaySession, GatewayTransport, IdentifyQueue,
    Incoming, OpCode, ShardInfo, TungsteniteTransport,
};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use integration_tests::*;
use tokio::sync::mpsc;

/// What the stub saw from the client
#[derive(Debug, PartialEq)]
enum Seen {
    Frame(OpCode),
    Close(Option<u16>),
}

type Reports = mpsc::UnboundedSender<Seen>;

async fn send_frame(socket: &mut WebSocket, frame: &GatewayFrame) -> bool {
    match frame.to_json() {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(_) => false,
    }
}

/// Says Hello, answers heartbeats, and rejects the token once identified
async fn gateway(ws: WebSocketUpgrade, State(reports): State<Reports>) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        if !send_frame(&mut socket, &GatewayFrame::hello(45_000)).await {
            return;
        }

        while let Some(Ok(message)) = socket.recv().await {
            match message {
                Message::Text(text) => {
                    let Ok(frame) = GatewayFrame::from_json(&text) else {
                        continue;
                    };
                    let _ = reports.send(Seen::Frame(frame.op));
                    match frame.op {
                        OpCode::Heartbeat => {
                            send_frame(&mut socket, &GatewayFrame::heartbeat_ack()).await;
                        }
                        OpCode::Identify => {
                            let close = CloseFrame {
                                code: CloseCode::AuthenticationFailed.as_u16(),
                                reason: "Authentication failed.".into(),
                            };
                            let _ = socket.send(Message::Close(Some(close))).await;
                            return;
                        }
                        _ => {}
                    }
                }
                Message::Close(frame) => {
                    let _ = reports.send(Seen::Close(frame.map(|f| f.code)));
                    return;
                }
                _ => {}
            }
        }
    })
}

async fn spawn_gateway() -> Result<(SocketAddr, mpsc::UnboundedReceiver<Seen>)> {
    let (reports, seen) = mpsc::unbounded_channel();
    let app = Router::new().route("/", get(gateway)).with_state(reports);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, seen))
}

fn gateway_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/?v=10&encoding=json")
}

async fn next_seen(seen: &mut mpsc::UnboundedReceiver<Seen>) -> Result<Seen> {
    tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .context("stub saw nothing")?
        .context("stub gone")
}

#[tokio::test]
async fn test_frames_round_trip_over_websocket() -> Result<()> {
    let (addr, mut seen) = spawn_gateway().await?;
    let mut conn = TungsteniteTransport::new().connect(&gateway_url(addr)).await?;

    let hello = match conn.receive().await? {
        Incoming::Frame(frame) => frame,
        Incoming::Closed(code) => bail!("closed with {code:?} before Hello"),
    };
    assert_eq!(hello.as_hello().map(|h| h.heartbeat_interval), Some(45_000));

    conn.send(&GatewayFrame::heartbeat(Some(3))).await?;
    assert_eq!(next_seen(&mut seen).await?, Seen::Frame(OpCode::Heartbeat));
    match conn.receive().await? {
        Incoming::Frame(frame) => assert_eq!(frame.op, OpCode::HeartbeatAck),
        Incoming::Closed(code) => bail!("closed with {code:?} before the ack"),
    }

    conn.close(4000).await?;
    assert_eq!(next_seen(&mut seen).await?, Seen::Close(Some(4000)));
    Ok(())
}

#[tokio::test]
async fn test_close_code_reaches_session() -> Result<()> {
    let (addr, mut seen) = spawn_gateway().await?;
    let mut config = gateway_config(1);
    config.url = gateway_url(addr);

    let (events, _stream) = mpsc::channel(8);
    let queue = Arc::new(IdentifyQueue::from_config(&config));
    let session = GatewaySession::new(
        ShardInfo::new(0, 1),
        config,
        Arc::new(TungsteniteTransport::new()),
        queue,
        events,
    );

    let result = tokio::time::timeout(Duration::from_secs(10), session.run()).await?;
    assert!(matches!(
        result,
        Err(GatewayError::FatalClose(CloseCode::AuthenticationFailed))
    ));
    assert_eq!(next_seen(&mut seen).await?, Seen::Frame(OpCode::Identify));
    Ok(())
}
