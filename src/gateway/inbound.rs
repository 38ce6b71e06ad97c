//! Inbound client message handling.
//!
//! Local clients speak JSON frames; only `type == "chat"` frames act. A
//! chat frame always produces an immediate local echo to the connection's
//! channel, and — when the client supplied credentials — a best-effort
//! re-injection upstream as that user, falling back to the shared bot
//! session when the authenticated send fails. No failure on this path is
//! ever surfaced to the originating client, and a frame that fails to parse
//! never closes the connection.

use secrecy::SecretString;
use tracing::{info, warn};

use crate::gateway::server::RelayState;
use crate::payload::{ChatPayload, ClientFrame};
use crate::upstream::send_as_user;

/// Process one text frame received from a local client on `channel`.
pub async fn process_frame(state: &RelayState, channel: &str, raw: &str) {
    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(channel, error = %e, "discarding malformed client frame");
            return;
        }
    };
    if !frame.is_chat() {
        return;
    }
    let Some(message) = frame.message else {
        warn!(channel, "discarding chat frame without message text");
        return;
    };

    // Local echo first; re-injection outcome never affects it.
    let payload = ChatPayload::from_overlay(
        channel,
        frame.username.as_deref(),
        &message,
        frame.badges,
        &state.config.bot_username,
    );
    state.connections.broadcast(channel, &payload).await;

    match (frame.username, frame.token) {
        (Some(username), Some(token)) => {
            reinject(state, channel, &username, SecretString::from(token), &message).await;
        }
        _ => info!(channel, "chat message accepted for local echo only"),
    }
}

/// Send `text` upstream as `username`, falling back to the shared bot
/// session on any failure.
async fn reinject(state: &RelayState, channel: &str, username: &str, token: SecretString, text: &str) {
    match send_as_user(&state.config.upstream_url, channel, username, token, text).await {
        Ok(()) => info!(channel, username, "message re-injected upstream as user"),
        Err(e) => {
            warn!(
                channel,
                username,
                error = %e,
                "authenticated re-injection failed, falling back to bot identity"
            );
            match state.bridges.ensure_bridge(channel).await {
                Ok(shared) => {
                    if let Err(e) = shared.say(text).await {
                        warn!(channel, error = %e, "fallback send via bot identity failed");
                    }
                }
                Err(e) => {
                    warn!(channel, error = %e, "no shared session available for fallback send");
                }
            }
        }
    }
}
