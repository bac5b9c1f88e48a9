//! Gateway session
//!
//! One task owns one connection at a time and drives it through the
//! handshake, heartbeats and dispatch handling. Resume data survives
//! reconnects for the lifetime of the session.

mod heartbeat;
mod session;
mod state;

pub use session::{GatewaySession, SessionStatus};
pub use state::ConnectionState;
