//! Upstream chat sessions.
//!
//! An [`UpstreamSession`] owns one authenticated TMI connection for a single
//! channel. The connection lives in a spawned I/O task; the session handle
//! only pushes commands to it. Inbound chat events surface as a lazy,
//! unbounded stream that the caller consumes until the session is torn down.
//!
//! Two lifecycles share this type:
//! - long-lived sessions (one per channel, owned by the bridge registry)
//!   reconnect internally with backoff when the transport breaks;
//! - ephemeral re-injection sessions connect, send one message as a specific
//!   user, and are torn down on every exit path.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::UpstreamError;
use crate::upstream::message::{self, ChatEvent, ServerLine};

/// Established upstream WebSocket stream.
type TmiStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Initial delay between reconnection attempts.
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Ceiling for the reconnection backoff.
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Credential pair an upstream session authenticates with.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// Account login. Lowercased; TMI logins are case-insensitive.
    pub login: String,
    /// OAuth token for that account.
    pub token: SecretString,
}

impl SessionIdentity {
    pub fn new(login: impl Into<String>, token: SecretString) -> Self {
        Self {
            login: login.into().to_lowercase(),
            token,
        }
    }
}

/// Connection state of an upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

enum Command {
    Say {
        text: String,
        done: oneshot::Sender<Result<(), UpstreamError>>,
    },
    Quit,
}

/// Handle to one authenticated upstream connection for a single channel.
#[derive(Debug)]
pub struct UpstreamSession {
    channel: String,
    login: String,
    state: Arc<RwLock<SessionState>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl UpstreamSession {
    /// Connect, authenticate, and join `channel`.
    ///
    /// Returns the session handle plus the receiver of inbound chat events.
    /// With `reconnect` set, a broken transport is re-established internally
    /// with exponential backoff and the event stream keeps flowing; without
    /// it, the first transport failure ends the session.
    pub async fn establish(
        endpoint: &Url,
        channel: &str,
        identity: &SessionIdentity,
        reconnect: bool,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChatEvent>), UpstreamError> {
        let channel = channel.to_lowercase();
        let state = Arc::new(RwLock::new(SessionState::Connecting));

        let ws = match connect_and_join(endpoint, &channel, identity).await {
            Ok(ws) => ws,
            Err(e) => {
                *state.write().await = SessionState::Failed;
                return Err(e);
            }
        };
        *state.write().await = SessionState::Connected;
        info!(channel = %channel, login = %identity.login, "upstream session established");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let session = Self {
            channel: channel.clone(),
            login: identity.login.clone(),
            state: Arc::clone(&state),
            commands: commands_tx,
        };

        tokio::spawn(io_loop(
            ws,
            endpoint.clone(),
            channel,
            identity.clone(),
            reconnect,
            state,
            events_tx,
            commands_rx,
        ));

        Ok((session, events_rx))
    }

    /// Channel this session is joined to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Login this session authenticated as.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Current connection state.
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Send a chat message to this session's channel.
    ///
    /// Resolves once the line has been written to the transport.
    pub async fn say(&self, text: &str) -> Result<(), UpstreamError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(Command::Say {
                text: text.to_string(),
                done: done_tx,
            })
            .map_err(|_| UpstreamError::SessionClosed {
                channel: self.channel.clone(),
            })?;
        done_rx.await.map_err(|_| UpstreamError::SessionClosed {
            channel: self.channel.clone(),
        })?
    }

    /// Tear the session down. Idempotent.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(Command::Quit);
        *self.state.write().await = SessionState::Disconnected;
    }

    /// Session handle with no live transport behind it.
    #[cfg(test)]
    pub(crate) fn closed_for_tests(channel: &str, login: &str) -> Self {
        let (commands, _discarded) = mpsc::unbounded_channel();
        Self {
            channel: channel.to_string(),
            login: login.to_string(),
            state: Arc::new(RwLock::new(SessionState::Connected)),
            commands,
        }
    }
}

/// Connect to the endpoint, run the login handshake, and join the channel.
///
/// Consumes server lines until registration is acknowledged (`001`) or the
/// server reports a login failure.
async fn connect_and_join(
    endpoint: &Url,
    channel: &str,
    identity: &SessionIdentity,
) -> Result<TmiStream, UpstreamError> {
    let connect_err = |reason: String| UpstreamError::ConnectFailed {
        channel: channel.to_string(),
        reason,
    };

    let (mut ws, _response) = connect_async(endpoint.as_str())
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    for line in [
        message::pass_line(identity.token.expose_secret()),
        message::nick_line(&identity.login),
        message::cap_req_line(),
    ] {
        ws.send(Message::text(line))
            .await
            .map_err(|e| connect_err(e.to_string()))?;
    }

    while let Some(frame) = ws.next().await {
        let frame = frame.map_err(|e| connect_err(e.to_string()))?;
        let Message::Text(text) = frame else { continue };
        for line in text.lines() {
            match message::parse_line(line) {
                ServerLine::Welcome => {
                    ws.send(Message::text(message::join_line(channel)))
                        .await
                        .map_err(|e| connect_err(e.to_string()))?;
                    return Ok(ws);
                }
                ServerLine::Ping { arg } => {
                    ws.send(Message::text(message::pong_line(&arg)))
                        .await
                        .map_err(|e| connect_err(e.to_string()))?;
                }
                ServerLine::Notice { text } if is_login_failure(&text) => {
                    return Err(UpstreamError::AuthFailed {
                        channel: channel.to_string(),
                        reason: text,
                    });
                }
                _ => {}
            }
        }
    }

    Err(connect_err("connection closed before registration".to_string()))
}

fn is_login_failure(notice: &str) -> bool {
    let lowered = notice.to_lowercase();
    lowered.contains("authentication failed") || lowered.contains("improperly formatted auth")
}

enum LoopExit {
    Quit,
    Transport(String),
}

/// Owns the transport for the life of the session: relays inbound chat
/// events, answers keepalives, writes outbound sends, and (for long-lived
/// sessions) re-establishes a broken transport.
#[allow(clippy::too_many_arguments)]
async fn io_loop(
    mut ws: TmiStream,
    endpoint: Url,
    channel: String,
    identity: SessionIdentity,
    reconnect: bool,
    state: Arc<RwLock<SessionState>>,
    events: mpsc::UnboundedSender<ChatEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    loop {
        match run_connected(&mut ws, &channel, &identity.login, &events, &mut commands).await {
            LoopExit::Quit => {
                let _ = ws.close(None).await;
                *state.write().await = SessionState::Disconnected;
                debug!(channel = %channel, "upstream session closed");
                return;
            }
            LoopExit::Transport(reason) => {
                if !reconnect {
                    *state.write().await = SessionState::Failed;
                    debug!(channel = %channel, reason = %reason, "upstream session ended");
                    return;
                }
                warn!(channel = %channel, reason = %reason, "upstream transport lost, reconnecting");
                *state.write().await = SessionState::Connecting;

                let mut delay = RECONNECT_BASE_DELAY;
                loop {
                    tokio::time::sleep(delay).await;
                    match connect_and_join(&endpoint, &channel, &identity).await {
                        Ok(new_ws) => {
                            ws = new_ws;
                            *state.write().await = SessionState::Connected;
                            info!(channel = %channel, "upstream session re-established");
                            break;
                        }
                        Err(e) => {
                            warn!(channel = %channel, error = %e, "reconnect attempt failed");
                            delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                        }
                    }
                }
            }
        }
    }
}

/// Drive one connected phase until the caller quits or the transport breaks.
async fn run_connected(
    ws: &mut TmiStream,
    channel: &str,
    login: &str,
    events: &mpsc::UnboundedSender<ChatEvent>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> LoopExit {
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                None | Some(Command::Quit) => return LoopExit::Quit,
                Some(Command::Say { text, done }) => {
                    let result = ws
                        .send(Message::text(message::privmsg_line(channel, &text)))
                        .await
                        .map_err(|e| UpstreamError::SendFailed {
                            channel: channel.to_string(),
                            reason: e.to_string(),
                        });
                    let broke = result.is_err();
                    let _ = done.send(result);
                    if broke {
                        return LoopExit::Transport("outbound send failed".to_string());
                    }
                }
            },
            frame = ws.next() => match frame {
                None => return LoopExit::Transport("connection closed".to_string()),
                Some(Err(e)) => return LoopExit::Transport(e.to_string()),
                Some(Ok(Message::Text(text))) => {
                    for line in text.lines() {
                        match message::parse_line(line) {
                            ServerLine::Ping { arg } => {
                                if ws.send(Message::text(message::pong_line(&arg))).await.is_err() {
                                    return LoopExit::Transport("keepalive reply failed".to_string());
                                }
                            }
                            // Echoes of this session's own sends stay local.
                            ServerLine::Privmsg(event) if event.login != login => {
                                let _ = events.send(event);
                            }
                            ServerLine::Reconnect => {
                                return LoopExit::Transport("server requested reconnect".to_string());
                            }
                            _ => {}
                        }
                    }
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Re-inject a message upstream as a specific user.
///
/// Builds an ephemeral, non-reconnecting session authenticated as that user,
/// sends the one message, and tears the session down regardless of outcome.
pub async fn send_as_user(
    endpoint: &Url,
    channel: &str,
    username: &str,
    token: SecretString,
    text: &str,
) -> Result<(), UpstreamError> {
    let identity = SessionIdentity::new(username, token);
    let (session, events) = UpstreamSession::establish(endpoint, channel, &identity, false).await?;
    drop(events);
    let result = session.say(text).await;
    session.disconnect().await;
    result
}
