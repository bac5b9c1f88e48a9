//! Test helpers for integration tests
//!
//! `MockHttpTransport` plays back scripted REST responses and logs every
//! request with the (possibly paused) tokio time it was sent at.
//! `MockGatewayTransport` hands each new connection to the test as a
//! `MockServer`, which plays the gateway side frame by frame.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arke_gateway::{
    GatewayConnection, GatewayError, GatewayFrame, GatewayTransport, Incoming, OpCode,
};
use arke_http::{HttpTransport, Method, Response, TransportError, TransportRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How long helpers wait for the code under test before giving up
///
/// Generous on purpose: under paused time it only elapses once every task is
/// idle.
pub const EXPECT_TIMEOUT: Duration = Duration::from_secs(600);

// ============================================================================
// REST
// ============================================================================

/// A request as it reached the transport
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub at: Instant,
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// Scripted HTTP transport
#[derive(Debug, Default)]
pub struct MockHttpTransport {
    script: Mutex<VecDeque<Response>>,
    fallback: Mutex<Option<Response>>,
    log: Mutex<Vec<RecordedRequest>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockHttpTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call takes `latency` before it answers
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    /// Queue a response for the next call
    pub fn push(&self, response: Response) {
        self.script.lock().push_back(response);
    }

    /// Answer used once the script is empty
    pub fn set_fallback(&self, response: Response) {
        *self.fallback.lock() = Some(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Highest number of calls that were in flight at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<Response, TransportError> {
        self.log.lock().push(RecordedRequest {
            at: Instant::now(),
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().pop_front();
        scripted
            .or_else(|| self.fallback.lock().clone())
            .ok_or_else(|| TransportError::Request("no scripted response".to_string()))
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Something the client sent on a mock connection
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOutput {
    Frame(GatewayFrame),
    Close(u16),
}

/// Client end of a mock connection
struct MockConnection {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    outgoing: mpsc::UnboundedSender<ClientOutput>,
}

#[async_trait]
impl GatewayConnection for MockConnection {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), GatewayError> {
        self.outgoing
            .send(ClientOutput::Frame(frame.clone()))
            .map_err(|_| GatewayError::Transport("mock server dropped".to_string()))
    }

    async fn receive(&mut self) -> Result<Incoming, GatewayError> {
        Ok(self.incoming.recv().await.unwrap_or(Incoming::Closed(None)))
    }

    async fn close(&mut self, code: u16) -> Result<(), GatewayError> {
        let _ = self.outgoing.send(ClientOutput::Close(code));
        Ok(())
    }
}

/// Server end of a mock connection
#[derive(Debug)]
pub struct MockServer {
    pub url: String,
    pub connected_at: Instant,
    to_client: Option<mpsc::UnboundedSender<Incoming>>,
    from_client: mpsc::UnboundedReceiver<ClientOutput>,
}

impl MockServer {
    pub fn send(&self, frame: GatewayFrame) {
        if let Some(sender) = &self.to_client {
            let _ = sender.send(Incoming::Frame(frame));
        }
    }

    pub fn hello(&self, heartbeat_interval_ms: u64) {
        self.send(GatewayFrame::hello(heartbeat_interval_ms));
    }

    pub fn ready(&self, sequence: u64, session_id: &str) {
        self.send(GatewayFrame::ready(sequence, session_id, None));
    }

    pub fn dispatch(&self, name: &str, sequence: u64, data: serde_json::Value) {
        self.send(GatewayFrame::dispatch(name, sequence, data));
    }

    pub fn heartbeat_ack(&self) {
        self.send(GatewayFrame::heartbeat_ack());
    }

    /// Close with a code, as a WebSocket close frame would
    pub fn close(&self, code: u16) {
        if let Some(sender) = &self.to_client {
            let _ = sender.send(Incoming::Closed(Some(code)));
        }
    }

    /// Drop the connection without a close frame
    pub fn drop_connection(&mut self) {
        self.to_client = None;
    }

    /// Next thing the client sent, `None` once it hung up
    pub async fn next_output(&mut self) -> Result<Option<ClientOutput>> {
        tokio::time::timeout(EXPECT_TIMEOUT, self.from_client.recv())
            .await
            .context("timed out waiting for the client")
    }

    /// Next frame that is not a heartbeat
    pub async fn expect_frame(&mut self) -> Result<GatewayFrame> {
        loop {
            match self.next_output().await? {
                Some(ClientOutput::Frame(frame)) if frame.op == OpCode::Heartbeat => {}
                Some(ClientOutput::Frame(frame)) => return Ok(frame),
                Some(ClientOutput::Close(code)) => bail!("client closed with {code}"),
                None => bail!("client hung up"),
            }
        }
    }

    /// Next non-heartbeat frame, which must carry `op`
    pub async fn expect_op(&mut self, op: OpCode) -> Result<GatewayFrame> {
        let frame = self.expect_frame().await?;
        if frame.op != op {
            bail!("expected {op}, client sent {frame}");
        }
        Ok(frame)
    }

    /// Next heartbeat, returning the sequence it carried
    pub async fn expect_heartbeat(&mut self) -> Result<Option<u64>> {
        loop {
            match self.next_output().await? {
                Some(ClientOutput::Frame(frame)) => {
                    if let Some(seq) = frame.as_heartbeat_seq() {
                        return Ok(seq);
                    }
                }
                Some(ClientOutput::Close(code)) => bail!("client closed with {code}"),
                None => bail!("client hung up"),
            }
        }
    }

    /// Skip frames until the client closes, returning the close code
    pub async fn expect_close(&mut self) -> Result<u16> {
        loop {
            match self.next_output().await? {
                Some(ClientOutput::Frame(_)) => {}
                Some(ClientOutput::Close(code)) => return Ok(code),
                None => bail!("client hung up without a close frame"),
            }
        }
    }

    /// Play the happy-path handshake and return the Identify frame
    pub async fn accept_identify(&mut self, session_id: &str) -> Result<GatewayFrame> {
        self.hello(45_000);
        let identify = self.expect_op(OpCode::Identify).await?;
        self.ready(0, session_id);
        Ok(identify)
    }
}

/// Connections accepted by a `MockGatewayTransport`, in connect order
#[derive(Debug)]
pub struct MockServers {
    receiver: mpsc::UnboundedReceiver<MockServer>,
}

impl MockServers {
    pub async fn next(&mut self) -> Result<MockServer> {
        tokio::time::timeout(EXPECT_TIMEOUT, self.receiver.recv())
            .await
            .context("timed out waiting for a connection")?
            .context("transport dropped")
    }

    /// A connection that is already waiting, if any
    pub fn try_next(&mut self) -> Option<MockServer> {
        self.receiver.try_recv().ok()
    }
}

/// Scripted gateway transport
#[derive(Debug)]
pub struct MockGatewayTransport {
    servers: mpsc::UnboundedSender<MockServer>,
    connects: AtomicUsize,
    refuse: AtomicUsize,
}

impl MockGatewayTransport {
    pub fn new() -> (Arc<Self>, MockServers) {
        let (servers, receiver) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            servers,
            connects: AtomicUsize::new(0),
            refuse: AtomicUsize::new(0),
        });
        (transport, MockServers { receiver })
    }

    /// Fail the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Connection attempts so far, refused ones included
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayTransport for MockGatewayTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, GatewayError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GatewayError::Connect("connection refused".to_string()));
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let server = MockServer {
            url: url.to_string(),
            connected_at: Instant::now(),
            to_client: Some(to_client),
            from_client,
        };
        self.servers
            .send(server)
            .map_err(|_| GatewayError::Connect("test finished".to_string()))?;

        Ok(Box::new(MockConnection { incoming, outgoing }))
    }
}
