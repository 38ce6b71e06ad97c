//! Local client gateway.
//!
//! Everything on the local side of the relay: the WebSocket listening
//! surface and admission ([`server`]), the per-channel connection registry
//! and broadcast fan-out ([`connections`]), and the handler for frames sent
//! by local clients ([`inbound`]).

mod connections;
mod inbound;
mod server;

pub use connections::{ConnectionRegistry, OutboundSender};
pub use server::{DEFAULT_PORT, RelayState, router, serve};
