//! Wire types exchanged with local overlay clients.
//!
//! Two shapes cross the local WebSocket: [`ChatPayload`], the canonical
//! broadcast unit sent to clients, and [`ClientFrame`], the JSON frame a
//! client sends to the relay. Both mirror the overlay protocol exactly, so
//! field names are camelCase where the protocol says so.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sanitize::escape_markup;
use crate::upstream::ChatEvent;

/// Color applied to upstream messages that carry no color tag.
pub const UPSTREAM_DEFAULT_COLOR: &str = "#ccc";

/// Fixed color for locally-originated (overlay) messages.
pub const OVERLAY_COLOR: &str = "#00ff88";

/// The canonical broadcast unit delivered to every subscribed client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Speaker display name.
    pub user: String,
    /// Message text. Markup-escaped when the message came from upstream.
    pub message: String,
    /// Lowercased channel the message belongs to.
    pub channel: String,
    /// Display color, e.g. `#ccc`.
    pub color: String,
    /// Badge name to badge value (upstream versions, or `{"overlay": true}`).
    pub badges: BTreeMap<String, Value>,
    /// Emote id to occurrence ranges within the message text.
    pub emotes: BTreeMap<String, Vec<String>>,
    /// Present and true only for locally-originated payloads.
    #[serde(rename = "fromOverlay", default, skip_serializing_if = "is_false")]
    pub from_overlay: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ChatPayload {
    /// Build a broadcast payload from an upstream chat event.
    ///
    /// Applies the upstream trust boundary: text is markup-escaped, the
    /// display name falls back to the account login, and missing color,
    /// badges, and emotes get their defaults.
    pub fn from_upstream(event: ChatEvent) -> Self {
        let user = event.display_name.unwrap_or_else(|| event.login.clone());
        Self {
            user,
            message: escape_markup(&event.text),
            channel: event.channel,
            color: event.color.unwrap_or_else(|| UPSTREAM_DEFAULT_COLOR.to_string()),
            badges: event.badges,
            emotes: event.emotes,
            from_overlay: false,
        }
    }

    /// Build a broadcast payload for a locally-originated message.
    ///
    /// Local text is echoed verbatim; local clients sit inside the trust
    /// boundary. Without a supplied username the configured bot identity is
    /// used as the speaker.
    pub fn from_overlay(
        channel: &str,
        username: Option<&str>,
        message: &str,
        badges: Option<BTreeMap<String, Value>>,
        fallback_user: &str,
    ) -> Self {
        let badges = badges.unwrap_or_else(|| {
            BTreeMap::from([("overlay".to_string(), Value::Bool(true))])
        });
        Self {
            user: username.unwrap_or(fallback_user).to_string(),
            message: message.to_string(),
            channel: channel.to_string(),
            color: OVERLAY_COLOR.to_string(),
            badges,
            emotes: BTreeMap::new(),
            from_overlay: true,
        }
    }
}

/// A structured frame received from a local client.
///
/// Only `type == "chat"` frames trigger any action; everything else is
/// ignored. `username`/`token` are optional credentials for re-injecting
/// the message upstream under that user's identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    /// Frame type discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Identity to attribute the message to, if any.
    pub username: Option<String>,
    /// OAuth token matching `username`, if any.
    pub token: Option<String>,
    /// Message text. Required for `chat` frames.
    pub message: Option<String>,
    /// Badges to display on the local echo.
    pub badges: Option<BTreeMap<String, Value>>,
}

impl ClientFrame {
    /// Whether this frame is a chat message.
    pub fn is_chat(&self) -> bool {
        self.kind == "chat"
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn upstream_event(text: &str) -> ChatEvent {
        ChatEvent {
            channel: "somechannel".to_string(),
            login: "ronni".to_string(),
            display_name: Some("Ronni".to_string()),
            color: Some("#0D60D8".to_string()),
            badges: BTreeMap::from([("subscriber".to_string(), Value::String("6".to_string()))]),
            emotes: BTreeMap::from([("25".to_string(), vec!["0-4".to_string()])]),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_upstream_payload_escapes_markup() {
        let payload = ChatPayload::from_upstream(upstream_event("<script>alert(1)</script>"));
        assert_eq!(payload.message, "&lt;script&gt;alert(1)&lt;/script&gt;");
        assert!(!payload.message.contains('<'));
        assert!(!payload.message.contains('>'));
    }

    #[test]
    fn test_upstream_payload_keeps_tags() {
        let payload = ChatPayload::from_upstream(upstream_event("Kappa hi"));
        assert_eq!(payload.user, "Ronni");
        assert_eq!(payload.channel, "somechannel");
        assert_eq!(payload.color, "#0D60D8");
        assert_eq!(payload.badges["subscriber"], Value::String("6".to_string()));
        assert_eq!(payload.emotes["25"], vec!["0-4".to_string()]);
        assert!(!payload.from_overlay);
    }

    #[test]
    fn test_upstream_defaults_applied() {
        let mut event = upstream_event("hi");
        event.display_name = None;
        event.color = None;
        event.badges = BTreeMap::new();
        event.emotes = BTreeMap::new();

        let payload = ChatPayload::from_upstream(event);
        assert_eq!(payload.user, "ronni");
        assert_eq!(payload.color, UPSTREAM_DEFAULT_COLOR);
        assert!(payload.badges.is_empty());
        assert!(payload.emotes.is_empty());
    }

    #[test]
    fn test_overlay_payload_shape() {
        let payload =
            ChatPayload::from_overlay("somechannel", Some("viewer1"), "hello", None, "relaybot");
        assert_eq!(payload.user, "viewer1");
        assert_eq!(payload.message, "hello");
        assert_eq!(payload.color, OVERLAY_COLOR);
        assert_eq!(payload.badges["overlay"], Value::Bool(true));
        assert!(payload.emotes.is_empty());
        assert!(payload.from_overlay);
    }

    #[test]
    fn test_overlay_payload_falls_back_to_bot_identity() {
        let payload = ChatPayload::from_overlay("somechannel", None, "hello", None, "relaybot");
        assert_eq!(payload.user, "relaybot");
    }

    #[test]
    fn test_overlay_text_is_not_sanitized() {
        let payload =
            ChatPayload::from_overlay("somechannel", Some("viewer1"), "<b>hi</b>", None, "relaybot");
        assert_eq!(payload.message, "<b>hi</b>");
    }

    #[test]
    fn test_from_overlay_flag_serialized_only_when_true() {
        let local =
            ChatPayload::from_overlay("somechannel", Some("viewer1"), "hi", None, "relaybot");
        let json = serde_json::to_value(&local).unwrap();
        assert_eq!(json["fromOverlay"], Value::Bool(true));

        let upstream = ChatPayload::from_upstream(upstream_event("hi"));
        let json = serde_json::to_value(&upstream).unwrap();
        assert!(json.get("fromOverlay").is_none());
    }

    #[test]
    fn test_client_frame_parsing() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"chat","username":"viewer1","token":"oauth:t","message":"hi"}"#,
        )
        .unwrap();
        assert!(frame.is_chat());
        assert_eq!(frame.username.as_deref(), Some("viewer1"));
        assert_eq!(frame.message.as_deref(), Some("hi"));
        assert!(frame.badges.is_none());
    }

    #[test]
    fn test_client_frame_other_type() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(!frame.is_chat());
    }
}
