//! TMI wire codec.
//!
//! The upstream chat protocol is IRC over WebSocket with IRCv3 message tags.
//! This module parses inbound server lines into [`ServerLine`] values and
//! builds the handful of outbound lines the relay needs. One WebSocket text
//! frame may carry several `\r\n`-separated lines; callers split frames with
//! [`str::lines`] and feed each line through [`parse_line`].

use std::collections::BTreeMap;

use serde_json::Value;

/// An inbound chat message, decoded from a tagged `PRIVMSG` line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    /// Channel the message was spoken in, lowercased, `#` stripped.
    pub channel: String,
    /// Account login of the speaker, from the message prefix.
    pub login: String,
    /// Display name from the `display-name` tag, if set.
    pub display_name: Option<String>,
    /// Color from the `color` tag, if set.
    pub color: Option<String>,
    /// Badge name to badge version, from the `badges` tag.
    pub badges: BTreeMap<String, Value>,
    /// Emote id to occurrence ranges, from the `emotes` tag.
    pub emotes: BTreeMap<String, Vec<String>>,
    /// Raw message text.
    pub text: String,
}

/// A single decoded server line.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerLine {
    /// Keepalive probe; must be answered with a `PONG`.
    Ping { arg: String },
    /// A chat message in a joined channel.
    Privmsg(ChatEvent),
    /// `001` registration acknowledgement; login succeeded.
    Welcome,
    /// Server notice, e.g. `Login authentication failed`.
    Notice { text: String },
    /// Server asks the client to reconnect.
    Reconnect,
    /// Anything the relay does not act on.
    Other,
}

/// Parse one raw IRC line.
pub fn parse_line(line: &str) -> ServerLine {
    let mut rest = line.trim_end_matches(['\r', '\n']);
    if rest.is_empty() {
        return ServerLine::Other;
    }

    let mut tags: BTreeMap<String, String> = BTreeMap::new();
    if let Some(after) = rest.strip_prefix('@') {
        let Some((raw_tags, remainder)) = after.split_once(' ') else {
            return ServerLine::Other;
        };
        tags = parse_tags(raw_tags);
        rest = remainder;
    }

    let mut prefix: Option<&str> = None;
    if let Some(after) = rest.strip_prefix(':') {
        let Some((p, remainder)) = after.split_once(' ') else {
            return ServerLine::Other;
        };
        prefix = Some(p);
        rest = remainder;
    }

    let (command, params) = match rest.split_once(' ') {
        Some((c, p)) => (c, p),
        None => (rest, ""),
    };

    match command {
        "PING" => ServerLine::Ping {
            arg: trailing(params).unwrap_or(params).to_string(),
        },
        "001" => ServerLine::Welcome,
        "NOTICE" => ServerLine::Notice {
            text: trailing(params).unwrap_or_default().to_string(),
        },
        "RECONNECT" => ServerLine::Reconnect,
        "PRIVMSG" => parse_privmsg(&tags, prefix, params)
            .map(ServerLine::Privmsg)
            .unwrap_or(ServerLine::Other),
        _ => ServerLine::Other,
    }
}

fn parse_privmsg(
    tags: &BTreeMap<String, String>,
    prefix: Option<&str>,
    params: &str,
) -> Option<ChatEvent> {
    let (target, _) = params.split_once(' ')?;
    let channel = target.trim_start_matches('#').to_lowercase();
    let text = trailing(params)?.to_string();
    let login = prefix
        .map(|p| p.split('!').next().unwrap_or(p))
        .unwrap_or_default()
        .to_string();
    if channel.is_empty() || login.is_empty() {
        return None;
    }

    let display_name = tags.get("display-name").filter(|v| !v.is_empty()).cloned();
    let color = tags.get("color").filter(|v| !v.is_empty()).cloned();
    let badges = tags.get("badges").map(|v| parse_badges(v)).unwrap_or_default();
    let emotes = tags.get("emotes").map(|v| parse_emotes(v)).unwrap_or_default();

    Some(ChatEvent {
        channel,
        login,
        display_name,
        color,
        badges,
        emotes,
        text,
    })
}

/// Extract the trailing parameter (the part after ` :`, or the whole string
/// when it starts with `:`).
fn trailing(params: &str) -> Option<&str> {
    if let Some(t) = params.strip_prefix(':') {
        return Some(t);
    }
    params.split_once(" :").map(|(_, t)| t)
}

fn parse_tags(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.to_string(), unescape_tag_value(value)))
        })
        .collect()
}

/// Undo IRCv3 tag-value escaping (`\s`, `\:`, `\\`, `\r`, `\n`).
fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// `badges=broadcaster/1,subscriber/6` → `{"broadcaster": "1", "subscriber": "6"}`.
fn parse_badges(raw: &str) -> BTreeMap<String, Value> {
    raw.split(',')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (name, version) = entry.split_once('/')?;
            Some((name.to_string(), Value::String(version.to_string())))
        })
        .collect()
}

/// `emotes=25:0-4,12-16/1902:6-10` → `{"25": ["0-4", "12-16"], "1902": ["6-10"]}`.
fn parse_emotes(raw: &str) -> BTreeMap<String, Vec<String>> {
    raw.split('/')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (id, ranges) = entry.split_once(':')?;
            let ranges = ranges
                .split(',')
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
            Some((id.to_string(), ranges))
        })
        .collect()
}

/// `PASS` line for the login handshake. The `oauth:` scheme prefix is added
/// when the caller supplied a bare token.
pub fn pass_line(token: &str) -> String {
    if token.starts_with("oauth:") {
        format!("PASS {token}")
    } else {
        format!("PASS oauth:{token}")
    }
}

/// `NICK` line for the login handshake.
pub fn nick_line(login: &str) -> String {
    format!("NICK {}", login.to_lowercase())
}

/// Capability request enabling message tags and protocol commands.
pub fn cap_req_line() -> String {
    "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string()
}

/// `JOIN` line for a lowercased channel.
pub fn join_line(channel: &str) -> String {
    format!("JOIN #{}", channel.to_lowercase())
}

/// Keepalive reply matching a received `PING`.
pub fn pong_line(arg: &str) -> String {
    if arg.is_empty() {
        "PONG".to_string()
    } else {
        format!("PONG :{arg}")
    }
}

/// Outbound chat message line.
pub fn privmsg_line(channel: &str, text: &str) -> String {
    format!("PRIVMSG #{} :{}", channel.to_lowercase(), text)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const TAGGED_PRIVMSG: &str = "@badge-info=subscriber/8;badges=broadcaster/1,subscriber/6;\
color=#0D60D8;display-name=Ronni;emotes=25:0-4,12-16/1902:6-10;id=abc;mod=0 \
:ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #SomeChannel :Kappa Keepo Kappa";

    #[test]
    fn test_parses_tagged_privmsg() {
        let ServerLine::Privmsg(event) = parse_line(TAGGED_PRIVMSG) else {
            panic!("expected privmsg");
        };
        assert_eq!(event.channel, "somechannel");
        assert_eq!(event.login, "ronni");
        assert_eq!(event.display_name.as_deref(), Some("Ronni"));
        assert_eq!(event.color.as_deref(), Some("#0D60D8"));
        assert_eq!(event.text, "Kappa Keepo Kappa");
        assert_eq!(event.badges["broadcaster"], Value::String("1".to_string()));
        assert_eq!(event.badges["subscriber"], Value::String("6".to_string()));
        assert_eq!(event.emotes["25"], vec!["0-4", "12-16"]);
        assert_eq!(event.emotes["1902"], vec!["6-10"]);
    }

    #[test]
    fn test_privmsg_without_tags() {
        let line = ":ronni!ronni@host PRIVMSG #chan :hello world";
        let ServerLine::Privmsg(event) = parse_line(line) else {
            panic!("expected privmsg");
        };
        assert_eq!(event.display_name, None);
        assert_eq!(event.color, None);
        assert!(event.badges.is_empty());
        assert!(event.emotes.is_empty());
        assert_eq!(event.text, "hello world");
    }

    #[test]
    fn test_empty_tag_values_are_dropped() {
        let line = "@color=;display-name=;emotes= :u!u@h PRIVMSG #c :hi";
        let ServerLine::Privmsg(event) = parse_line(line) else {
            panic!("expected privmsg");
        };
        assert_eq!(event.display_name, None);
        assert_eq!(event.color, None);
        assert!(event.emotes.is_empty());
    }

    #[test]
    fn test_tag_value_unescaping() {
        let line = "@display-name=two\\swords :u!u@h PRIVMSG #c :hi";
        let ServerLine::Privmsg(event) = parse_line(line) else {
            panic!("expected privmsg");
        };
        assert_eq!(event.display_name.as_deref(), Some("two words"));
        assert_eq!(unescape_tag_value("a\\:b\\\\c\\rd\\ne"), "a;b\\c\rd\ne");
    }

    #[test]
    fn test_message_text_may_contain_colons() {
        let line = ":u!u@h PRIVMSG #c :look: http://example.com";
        let ServerLine::Privmsg(event) = parse_line(line) else {
            panic!("expected privmsg");
        };
        assert_eq!(event.text, "look: http://example.com");
    }

    #[test]
    fn test_ping_and_pong() {
        assert_eq!(
            parse_line("PING :tmi.twitch.tv"),
            ServerLine::Ping {
                arg: "tmi.twitch.tv".to_string()
            }
        );
        assert_eq!(pong_line("tmi.twitch.tv"), "PONG :tmi.twitch.tv");
        assert_eq!(pong_line(""), "PONG");
    }

    #[test]
    fn test_welcome_and_notice() {
        assert_eq!(
            parse_line(":tmi.twitch.tv 001 relaybot :Welcome, GLHF!"),
            ServerLine::Welcome
        );
        assert_eq!(
            parse_line(":tmi.twitch.tv NOTICE * :Login authentication failed"),
            ServerLine::Notice {
                text: "Login authentication failed".to_string()
            }
        );
    }

    #[test]
    fn test_reconnect_command() {
        assert_eq!(parse_line(":tmi.twitch.tv RECONNECT"), ServerLine::Reconnect);
    }

    #[test]
    fn test_unknown_lines_are_other() {
        assert_eq!(parse_line(":tmi.twitch.tv 372 x :motd"), ServerLine::Other);
        assert_eq!(parse_line(""), ServerLine::Other);
        assert_eq!(parse_line(":u!u@h JOIN #c"), ServerLine::Other);
    }

    #[test]
    fn test_handshake_lines() {
        assert_eq!(pass_line("abc123"), "PASS oauth:abc123");
        assert_eq!(pass_line("oauth:abc123"), "PASS oauth:abc123");
        assert_eq!(nick_line("RelayBot"), "NICK relaybot");
        assert_eq!(join_line("SomeChannel"), "JOIN #somechannel");
        assert_eq!(
            privmsg_line("SomeChannel", "hi there"),
            "PRIVMSG #somechannel :hi there"
        );
        assert_eq!(
            cap_req_line(),
            "CAP REQ :twitch.tv/tags twitch.tv/commands"
        );
    }
}
