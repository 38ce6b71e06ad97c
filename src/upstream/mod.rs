//! Upstream chat side.
//!
//! Talks TMI (IRC over WebSocket) to the chat stream: the wire codec
//! ([`message`]), authenticated per-channel sessions ([`session`]), and the
//! process-wide bridge registry that owns one shared session per channel
//! ([`registry`]).

pub mod message;
mod registry;
mod session;

pub use message::ChatEvent;
pub use registry::BridgeRegistry;
pub use session::{SessionIdentity, SessionState, UpstreamSession, send_as_user};
