//! Gateway session state machine
//!
//! A single task owns the connection, the heartbeat timer and the resume
//! data. Frames and timer ticks are handled one at a time from the same
//! `select!`, so the sequence number has exactly one writer.

use super::heartbeat::{BeatDue, Heartbeater};
use super::state::ConnectionState;
use crate::error::{GatewayError, GatewayResult};
use crate::event::Event;
use crate::protocol::{
    CloseAction, GatewayFrame, IdentifyPayload, IdentifyProperties, OpCode, ResumePayload,
};
use crate::shard::{IdentifyQueue, ShardInfo};
use crate::shutdown::ShutdownHandle;
use crate::transport::{GatewayConnection, GatewayTransport, Incoming};
use arke_common::GatewayConfig;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, timeout, Instant};

/// Close code sent when the session should stay resumable
const CLOSE_RESUMABLE: u16 = 4000;
/// Close code that invalidates the session server side
const CLOSE_NORMAL: u16 = 1000;

/// Snapshot of a session published to observers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub session_id: Option<String>,
    pub sequence: Option<u64>,
    /// Round trip of the last acknowledged heartbeat
    pub latency: Option<Duration>,
}

/// Why a connection ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    Reconnect,
    Shutdown,
}

/// One shard's gateway session
///
/// Resume data (session id, sequence, resume url) lives as long as the
/// session and survives reconnects until the gateway invalidates it.
pub struct GatewaySession {
    shard: ShardInfo,
    config: GatewayConfig,
    transport: Arc<dyn GatewayTransport>,
    identify_queue: Arc<IdentifyQueue>,
    events: mpsc::Sender<Event>,
    shutdown: ShutdownHandle,
    status: watch::Sender<SessionStatus>,

    state: ConnectionState,
    session_id: Option<String>,
    sequence: Option<u64>,
    resume_url: Option<String>,
    latency: Option<Duration>,
    /// Set once the current connection reached `Connected`
    established: bool,
}

impl GatewaySession {
    pub fn new(
        shard: ShardInfo,
        config: GatewayConfig,
        transport: Arc<dyn GatewayTransport>,
        identify_queue: Arc<IdentifyQueue>,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            shard,
            config,
            transport,
            identify_queue,
            events,
            shutdown: ShutdownHandle::new(),
            status,
            state: ConnectionState::Disconnected,
            session_id: None,
            sequence: None,
            resume_url: None,
            latency: None,
            established: false,
        }
    }

    /// Share a shutdown signal with other sessions
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Status updates for this session
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn shard(&self) -> ShardInfo {
        self.shard
    }

    /// Drive the session until shutdown, a fatal close, or exhausted reconnects
    ///
    /// Returns `Ok(())` on shutdown. Every error except
    /// [`GatewayError::FatalClose`] is retriable by starting a new session.
    pub async fn run(mut self) -> GatewayResult<()> {
        let mut failures = 0_u32;

        loop {
            if self.shutdown.is_shutdown() {
                self.close();
                return Ok(());
            }

            self.established = false;
            match self.connect_and_run().await {
                Ok(Disconnect::Shutdown) => {
                    self.close();
                    return Ok(());
                }
                Ok(Disconnect::Reconnect) => {}
                Err(err) if err.is_fatal() => {
                    tracing::error!(
                        shard_id = self.shard.id,
                        error = %err,
                        "Gateway closed the session for good"
                    );
                    self.close();
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        shard_id = self.shard.id,
                        error = %err,
                        "Gateway connection failed"
                    );
                }
            }

            if self.established {
                failures = 0;
                self.set_state(ConnectionState::Reconnecting);
                continue;
            }

            failures += 1;
            if failures > self.config.max_reconnect_attempts {
                self.close();
                return Err(GatewayError::ReconnectExhausted { attempts: failures });
            }

            let delay = self.config.reconnect_backoff.delay_for_attempt(failures - 1);
            tracing::debug!(
                shard_id = self.shard.id,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Waiting before reconnecting"
            );
            self.set_state(ConnectionState::Reconnecting);

            tokio::select! {
                () = self.shutdown.wait() => {
                    self.close();
                    return Ok(());
                }
                () = sleep(delay) => {}
            }
        }
    }

    /// Open one connection and run it to its end
    async fn connect_and_run(&mut self) -> GatewayResult<Disconnect> {
        let resume = self.can_resume();

        // Fresh sessions take an identify slot before connecting
        if !resume {
            tokio::select! {
                () = self.shutdown.wait() => return Ok(Disconnect::Shutdown),
                () = self.identify_queue.wait(self.shard.id) => {}
            }
        }

        self.set_state(ConnectionState::Connecting);
        let url = match (&self.resume_url, resume) {
            (Some(resume_url), true) => resume_endpoint(resume_url, &self.config.url),
            _ => self.config.url.clone(),
        };
        tracing::info!(shard_id = self.shard.id, url = %url, resume, "Connecting to gateway");

        let mut conn = match timeout(self.config.connect_timeout(), self.transport.connect(&url)).await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(GatewayError::Connect(format!(
                    "timed out after {}ms",
                    self.config.connect_timeout_ms
                )))
            }
        };

        let outcome = self.drive(conn.as_mut(), resume).await;

        let code = match &outcome {
            Ok(Disconnect::Shutdown) => CLOSE_NORMAL,
            _ if self.session_id.is_none() => CLOSE_NORMAL,
            _ => CLOSE_RESUMABLE,
        };
        if let Err(err) = conn.close(code).await {
            tracing::trace!(shard_id = self.shard.id, error = %err, "Close after disconnect failed");
        }

        outcome
    }

    /// Handshake, heartbeat and dispatch loop for one connection
    async fn drive(
        &mut self,
        conn: &mut dyn GatewayConnection,
        resume: bool,
    ) -> GatewayResult<Disconnect> {
        let handshake_deadline = Instant::now() + self.config.handshake_timeout();
        let mut heartbeat: Option<Heartbeater> = None;

        loop {
            let beat_at = heartbeat.as_ref().map(Heartbeater::deadline);
            let handshaking = self.state.is_handshaking();

            tokio::select! {
                biased;

                () = self.shutdown.wait() => return Ok(Disconnect::Shutdown),

                () = sleep_until(beat_at.unwrap_or(handshake_deadline)), if beat_at.is_some() => {
                    if let Some(heartbeat) = heartbeat.as_mut() {
                        match heartbeat.due() {
                            BeatDue::Zombied => {
                                tracing::warn!(
                                    shard_id = self.shard.id,
                                    "Heartbeat was not acknowledged, connection zombied"
                                );
                                return Ok(Disconnect::Reconnect);
                            }
                            BeatDue::Send => self.beat(conn, heartbeat).await?,
                        }
                    }
                }

                () = sleep_until(handshake_deadline), if handshaking => {
                    return Err(GatewayError::HandshakeTimeout);
                }

                incoming = conn.receive() => match incoming {
                    Ok(Incoming::Frame(frame)) => {
                        if let Some(disconnect) =
                            self.handle_frame(conn, frame, &mut heartbeat, resume).await?
                        {
                            return Ok(disconnect);
                        }
                    }
                    Ok(Incoming::Closed(code)) => return self.handle_close(code),
                    Err(GatewayError::Decode(err)) => {
                        tracing::warn!(
                            shard_id = self.shard.id,
                            error = %err,
                            "Dropping undecodable gateway frame"
                        );
                    }
                    Err(err) => return Err(err),
                },
            }
        }
    }

    async fn handle_frame(
        &mut self,
        conn: &mut dyn GatewayConnection,
        frame: GatewayFrame,
        heartbeat: &mut Option<Heartbeater>,
        resume: bool,
    ) -> GatewayResult<Option<Disconnect>> {
        tracing::trace!(shard_id = self.shard.id, frame = %frame, "Received frame");

        match frame.op {
            OpCode::Hello => {
                let Some(hello) = frame.as_hello() else {
                    tracing::warn!(shard_id = self.shard.id, "Hello without a heartbeat interval");
                    return Ok(None);
                };
                let interval = Duration::from_millis(hello.heartbeat_interval);
                *heartbeat = Some(Heartbeater::new(
                    interval,
                    self.config.heartbeat_timeout(interval),
                    rand::random::<f64>(),
                ));

                if resume && self.can_resume() {
                    self.send_resume(conn).await?;
                } else {
                    self.send_identify(conn).await?;
                }
            }

            OpCode::Dispatch => return self.handle_dispatch(frame).await,

            OpCode::Heartbeat => {
                if let Some(heartbeat) = heartbeat.as_mut() {
                    self.beat(conn, heartbeat).await?;
                }
            }

            OpCode::HeartbeatAck => {
                if let Some(latency) = heartbeat.as_mut().and_then(Heartbeater::record_ack) {
                    self.latency = Some(latency);
                    self.publish();
                }
            }

            OpCode::Reconnect => {
                tracing::info!(shard_id = self.shard.id, "Gateway requested a reconnect");
                return Ok(Some(Disconnect::Reconnect));
            }

            OpCode::InvalidSession => {
                let resumable = frame.as_invalid_session().unwrap_or(false);
                tracing::info!(shard_id = self.shard.id, resumable, "Session invalidated");
                if !resumable {
                    self.invalidate();
                }
                return Ok(Some(Disconnect::Reconnect));
            }

            op => {
                tracing::debug!(shard_id = self.shard.id, op = %op, "Ignoring unexpected opcode");
            }
        }

        Ok(None)
    }

    async fn handle_dispatch(&mut self, frame: GatewayFrame) -> GatewayResult<Option<Disconnect>> {
        let name = frame.event_name().unwrap_or_default().to_string();

        if let Some(ready) = frame.as_ready() {
            tracing::info!(
                shard_id = self.shard.id,
                session_id = %ready.session_id,
                "Session ready"
            );
            self.session_id = Some(ready.session_id);
            self.resume_url = ready.resume_gateway_url;
            self.sequence = frame.s;
            self.mark_connected();
        } else {
            if let Some(seq) = frame.s {
                self.sequence = Some(self.sequence.map_or(seq, |current| current.max(seq)));
            }
            if self.state == ConnectionState::Resuming {
                tracing::info!(shard_id = self.shard.id, event = %name, "Session resumed");
                self.mark_connected();
            } else {
                self.publish();
            }
        }

        let event = Event {
            shard_id: self.shard.id,
            name,
            sequence: frame.s,
            data: frame.d.unwrap_or(Value::Null),
        };
        tokio::select! {
            sent = self.events.send(event) => {
                if sent.is_err() {
                    tracing::info!(shard_id = self.shard.id, "Event stream dropped, shutting down");
                    self.shutdown.shutdown();
                    return Ok(Some(Disconnect::Shutdown));
                }
            }
            () = self.shutdown.wait() => return Ok(Some(Disconnect::Shutdown)),
        }

        Ok(None)
    }

    fn handle_close(&mut self, code: Option<u16>) -> GatewayResult<Disconnect> {
        match CloseAction::from_raw(code) {
            CloseAction::Resume => {
                tracing::info!(shard_id = self.shard.id, code = ?code, "Gateway connection closed");
                if self.state.is_connected() {
                    Ok(Disconnect::Reconnect)
                } else {
                    Err(GatewayError::Closed { code })
                }
            }
            CloseAction::Reidentify => {
                tracing::info!(
                    shard_id = self.shard.id,
                    code = ?code,
                    "Gateway closed with a non-resumable code"
                );
                self.invalidate();
                Ok(Disconnect::Reconnect)
            }
            CloseAction::Fatal(close_code) => {
                self.invalidate();
                Err(GatewayError::FatalClose(close_code))
            }
        }
    }

    async fn beat(
        &mut self,
        conn: &mut dyn GatewayConnection,
        heartbeat: &mut Heartbeater,
    ) -> GatewayResult<()> {
        conn.send(&GatewayFrame::heartbeat(self.sequence)).await?;
        heartbeat.record_sent();
        tracing::trace!(
            shard_id = self.shard.id,
            sequence = ?self.sequence,
            interval_ms = heartbeat.interval().as_millis() as u64,
            "Heartbeat sent"
        );
        Ok(())
    }

    async fn send_identify(&mut self, conn: &mut dyn GatewayConnection) -> GatewayResult<()> {
        let payload = IdentifyPayload {
            token: bare_token(&self.config.token).to_string(),
            intents: self.config.intents,
            properties: IdentifyProperties::library(),
            shard: Some(self.shard.as_array()),
            large_threshold: Some(self.config.large_threshold),
        };
        conn.send(&GatewayFrame::identify(&payload)?).await?;
        tracing::debug!(shard_id = self.shard.id, intents = %self.config.intents, "Identify sent");
        self.set_state(ConnectionState::Identifying);
        Ok(())
    }

    async fn send_resume(&mut self, conn: &mut dyn GatewayConnection) -> GatewayResult<()> {
        let (Some(session_id), Some(seq)) = (self.session_id.clone(), self.sequence) else {
            return self.send_identify(conn).await;
        };
        let payload = ResumePayload {
            token: bare_token(&self.config.token).to_string(),
            session_id,
            seq,
        };
        conn.send(&GatewayFrame::resume(&payload)?).await?;
        tracing::debug!(shard_id = self.shard.id, seq, "Resume sent");
        self.set_state(ConnectionState::Resuming);
        Ok(())
    }

    fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    fn mark_connected(&mut self) {
        self.established = true;
        self.set_state(ConnectionState::Connected);
    }

    /// Forget resume data; the next connection identifies
    fn invalidate(&mut self) {
        self.session_id = None;
        self.sequence = None;
        self.resume_url = None;
        self.publish();
    }

    fn close(&mut self) {
        self.invalidate();
        self.set_state(ConnectionState::Closed);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(
                shard_id = self.shard.id,
                from = %self.state,
                to = %state,
                "Session state changed"
            );
            self.state = state;
        }
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(SessionStatus {
            state: self.state,
            session_id: self.session_id.clone(),
            sequence: self.sequence,
            latency: self.latency,
        });
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("shard", &self.shard)
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// The gateway expects the raw token, without the REST `Bot ` prefix
fn bare_token(token: &str) -> &str {
    token.strip_prefix("Bot ").unwrap_or(token)
}

/// Resume url carrying the query of the configured gateway url
fn resume_endpoint(resume_url: &str, configured: &str) -> String {
    match configured.split_once('?') {
        Some((_, query)) if !resume_url.contains('?') => {
            format!("{}/?{query}", resume_url.trim_end_matches('/'))
        }
        _ => resume_url.to_string(),
    }
}
