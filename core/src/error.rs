/// Error types for the chat client
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VibeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("No active conversation")]
    NoActiveConversation,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Chat session closed")]
    SessionClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for VibeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        VibeError::WebSocket(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, VibeError>;
