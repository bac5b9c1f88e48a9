//! # arke-gateway
//!
//! Gateway side of the client: one state machine per WebSocket connection
//! (handshake, heartbeats, resume) and a shard manager that staggers
//! identifies and restarts failed shards.

pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod shard;
pub mod shutdown;
pub mod transport;

pub use error::{GatewayError, GatewayResult};
pub use event::{Event, EventStream};
pub use protocol::{CloseAction, CloseCode, GatewayFrame, OpCode};
pub use session::{ConnectionState, GatewaySession, SessionStatus};
pub use shard::{IdentifyQueue, ShardInfo, ShardManager};
pub use shutdown::ShutdownHandle;
pub use transport::{GatewayConnection, GatewayTransport, Incoming, TungsteniteTransport};
