use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Malformed control message: expected at least 3 frames, got {frames}")]
    MalformedMessage { frames: usize },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Frame too large: {len} bytes (max {max} bytes)")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Outbound queue full for peer {0}")]
    WouldBlock(String),

    #[error("Channel disconnected")]
    Disconnected,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// Whether the failed operation may succeed if attempted again unchanged.
    ///
    /// Only a full outbound queue is transient; every other failure is
    /// permanent for the message at hand.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::WouldBlock(_))
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
