/// VibeApp chat client core
///
/// REST client, real-time transport and the chat session state machine
/// (history, presence, typing signal, read receipts) behind a chat window.

pub mod api;
pub mod config;
pub mod error;
pub mod inbox;
pub mod session;
pub mod transport;
pub mod types;

pub use api::{ApiClient, ChatBackend};
pub use config::Config;
pub use error::{Result, VibeError};
pub use session::{ChatSession, ChatSessionHandle, SessionView};
pub use transport::TransportClient;
