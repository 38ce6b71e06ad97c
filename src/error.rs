//! Error types for relaycast.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the local listening surface.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("Server error: {0}")]
    Serve(String),
}

/// Errors from upstream chat sessions.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Failed to connect upstream for channel {channel}: {reason}")]
    ConnectFailed { channel: String, reason: String },

    #[error("Upstream authentication failed for channel {channel}: {reason}")]
    AuthFailed { channel: String, reason: String },

    #[error("Upstream session for channel {channel} is closed")]
    SessionClosed { channel: String },

    #[error("Failed to send to channel {channel}: {reason}")]
    SendFailed { channel: String, reason: String },
}
