//! Gateway protocol definitions
//!
//! Op codes, close codes, the frame envelope and the handshake payloads the
//! session has to read or write. Event bodies stay opaque JSON.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseAction, CloseCode};
pub use messages::GatewayFrame;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload, ResumePayload};
