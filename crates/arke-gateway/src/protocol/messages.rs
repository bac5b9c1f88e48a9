//! Gateway frame envelope
//!
//! Every message in both directions is `{op, d, s, t}`.

use super::{HelloPayload, IdentifyPayload, OpCode, ReadyPayload, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Operation code
    pub op: OpCode,

    /// Event name (Dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (Dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Payload data; heartbeats serialize a missing sequence as `null`
    #[serde(default)]
    pub d: Option<Value>,
}

impl GatewayFrame {
    fn bare(op: OpCode, d: Option<Value>) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d,
        }
    }

    // === Client frames ===

    /// Heartbeat (op=1) carrying the last sequence seen
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::bare(OpCode::Heartbeat, last_sequence.map(Value::from))
    }

    /// Identify (op=2)
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::bare(OpCode::Identify, Some(serde_json::to_value(payload)?)))
    }

    /// Resume (op=6)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::bare(OpCode::Resume, Some(serde_json::to_value(payload)?)))
    }

    // === Server frames ===

    /// Dispatch (op=0)
    #[must_use]
    pub fn dispatch(event: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event.into()),
            s: Some(sequence),
            d: Some(data),
        }
    }

    /// Hello (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::bare(
            OpCode::Hello,
            Some(serde_json::json!({ "heartbeat_interval": heartbeat_interval })),
        )
    }

    /// READY dispatch with the fields a session needs
    #[must_use]
    pub fn ready(sequence: u64, session_id: &str, resume_gateway_url: Option<&str>) -> Self {
        let mut data = serde_json::json!({ "session_id": session_id });
        if let Some(url) = resume_gateway_url {
            data["resume_gateway_url"] = Value::from(url);
        }
        Self::dispatch("READY", sequence, data)
    }

    /// Heartbeat ACK (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::bare(OpCode::HeartbeatAck, None)
    }

    /// Reconnect (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::bare(OpCode::Reconnect, None)
    }

    /// Invalid Session (op=9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::bare(OpCode::InvalidSession, Some(Value::Bool(resumable)))
    }

    // === Parsing ===

    fn data_as<T: serde::de::DeserializeOwned>(&self, op: OpCode) -> Option<T> {
        if self.op != op {
            return None;
        }
        self.d
            .as_ref()
            .and_then(|d| T::deserialize(d).ok())
    }

    pub fn as_hello(&self) -> Option<HelloPayload> {
        self.data_as(OpCode::Hello)
    }

    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        self.data_as(OpCode::Identify)
    }

    pub fn as_resume(&self) -> Option<ResumePayload> {
        self.data_as(OpCode::Resume)
    }

    /// Parse a READY dispatch
    pub fn as_ready(&self) -> Option<ReadyPayload> {
        if self.event_name() != Some("READY") {
            return None;
        }
        self.data_as(OpCode::Dispatch)
    }

    /// Resumable flag of an Invalid Session frame
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Sequence carried by a heartbeat frame
    pub fn as_heartbeat_seq(&self) -> Option<Option<u64>> {
        if self.op != OpCode::Heartbeat {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_u64))
    }

    pub fn event_name(&self) -> Option<&str> {
        self.t.as_deref()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayFrame(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayFrame(op={})", self.op)
        }
    }
}
