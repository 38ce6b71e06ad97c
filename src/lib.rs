//! relaycast bridges a Twitch chat channel to locally connected overlay
//! clients over WebSocket, and back.
//!
//! # Architecture
//!
//! ```text
//!  Twitch chat (TMI)                         local overlay clients
//!        │                                            ▲
//!        ▼                                            │ fan-out
//!  UpstreamSession ──events──► relay task ──► ConnectionRegistry
//!        ▲                                            │
//!        │ ensure_bridge (one shared session          │ frames
//!        │ per channel, lazy)                         ▼
//!  BridgeRegistry ◄──────────────────────── gateway (admission,
//!        ▲                                   inbound handling)
//!        │ re-injection fallback                      │
//!        └──────────── ephemeral session ◄────────────┘
//! ```
//!
//! Local connections are admitted on one WebSocket endpoint and tagged with
//! the `channel` query parameter. The first admission for a channel lazily
//! establishes a shared upstream session under the configured bot identity;
//! its chat events are sanitized and fanned out to all same-channel
//! connections. Frames sent by local clients are echoed locally and, when
//! credentials are supplied, re-injected upstream as that user with a
//! bot-identity fallback.

pub mod config;
pub mod error;
pub mod gateway;
pub mod payload;
pub mod sanitize;
pub mod upstream;

pub use config::Config;
pub use error::{ConfigError, Error, GatewayError, UpstreamError};
pub use gateway::{ConnectionRegistry, RelayState, router, serve};
pub use payload::{ChatPayload, ClientFrame};
pub use upstream::{BridgeRegistry, ChatEvent, SessionState, UpstreamSession};
