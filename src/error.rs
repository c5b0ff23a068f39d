use thiserror::Error;

/// Network-level failure. The request may or may not have reached the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection refused at {0} (is the bot server running?)")]
    ConnectionRefused(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Could not resolve host for {0}")]
    Dns(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request failed: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Protocol error: expected a JSON response, got: {raw}")]
    Protocol { raw: String },

    #[error("Protocol error: the join response carried no '{field}'")]
    MissingId { field: String },
}

impl ProbeError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 2 for invalid usage, 1 for everything that went wrong after it.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Transport(_)
            | Self::Server { .. }
            | Self::Protocol { .. }
            | Self::MissingId { .. } => 1,
        }
    }
}
