/// Chat session: the state machine behind one open chat window
pub mod controller;
pub mod presence;
pub mod receipts;
pub mod registrar;
pub mod room;
pub mod stream;
pub mod typing;

pub use controller::{ChatSession, ChatSessionHandle, SessionView};
pub use presence::{PresenceState, PresenceTracker};
pub use stream::{HistoryOutcome, LoadState, LoadTicket, MessageStream};
pub use typing::{QuietTimer, TypingDebouncer};
