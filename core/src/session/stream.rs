/// Message stream for the active conversation
///
/// Append-only, keyed by message id: a message that arrives twice (send
/// response and socket echo) keeps the position of its first arrival.
use crate::error::VibeError;
use crate::types::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// History loading status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// Identity of one history fetch, captured when it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub conversation_id: String,
    generation: u64,
}

/// What happened to a finished history fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    Applied(usize),
    /// Conversation changed while the fetch was in flight
    Stale,
    Failed,
}

#[derive(Debug, Default)]
pub struct MessageStream {
    conversation_id: Option<String>,
    generation: u64,
    messages: Vec<Message>,
    ids: HashSet<String>,
    load_state: LoadState,
}

impl MessageStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    /// Activate a conversation: clears the sequence and issues a ticket
    /// for the history fetch that will fill it.
    pub fn begin_load(&mut self, conversation_id: &str) -> LoadTicket {
        self.generation += 1;
        self.conversation_id = Some(conversation_id.to_string());
        self.messages.clear();
        self.ids.clear();
        self.load_state = LoadState::Loading;
        LoadTicket {
            conversation_id: conversation_id.to_string(),
            generation: self.generation,
        }
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation
            && self.conversation_id.as_deref() == Some(ticket.conversation_id.as_str())
    }

    /// Apply a finished fetch if its ticket still matches the activation
    pub fn apply_history(
        &mut self,
        ticket: &LoadTicket,
        result: Result<Vec<Message>, VibeError>,
    ) -> HistoryOutcome {
        if !self.is_current(ticket) {
            debug!("Discarding stale history for {}", ticket.conversation_id);
            return HistoryOutcome::Stale;
        }

        match result {
            Ok(page) => {
                // Anything appended while the fetch was in flight goes after the page
                let live = std::mem::take(&mut self.messages);
                self.ids.clear();
                for msg in page.into_iter().chain(live) {
                    self.push_unique(msg);
                }
                self.load_state = LoadState::Loaded;
                HistoryOutcome::Applied(self.messages.len())
            }
            Err(e) => {
                self.load_state = LoadState::Failed(e.to_string());
                HistoryOutcome::Failed
            }
        }
    }

    /// Socket-delivered message; no-op unless it targets the active room
    pub fn append_incoming(&mut self, msg: Message) -> bool {
        self.append_for_active(msg)
    }

    /// Message created by our own send call
    pub fn append_outgoing(&mut self, msg: Message) -> bool {
        self.append_for_active(msg)
    }

    fn append_for_active(&mut self, msg: Message) -> bool {
        if self.conversation_id.as_deref() != Some(msg.conversation_id()) {
            debug!(
                "Ignoring message {} for inactive conversation {}",
                msg.id,
                msg.conversation_id()
            );
            return false;
        }
        self.push_unique(msg)
    }

    fn push_unique(&mut self, msg: Message) -> bool {
        if !self.ids.insert(msg.id.clone()) {
            debug!("Duplicate message {} ignored", msg.id);
            return false;
        }
        self.messages.push(msg);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatStub, Ref};
    use chrono::Utc;

    fn msg(id: &str, chat: &str, text: &str) -> Message {
        Message {
            id: id.to_string(),
            chat: Ref::Doc(ChatStub { id: chat.to_string() }),
            sender: Ref::Id("u2".to_string()),
            text: text.to_string(),
            created_at: Utc::now(),
            is_read: false,
        }
    }

    fn ids(stream: &MessageStream) -> Vec<&str> {
        stream.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_history_then_incoming() {
        let mut stream = MessageStream::new();
        let ticket = stream.begin_load("c1");
        assert_eq!(
            stream.apply_history(&ticket, Ok(vec![msg("1", "c1", "hi")])),
            HistoryOutcome::Applied(1)
        );

        assert!(stream.append_incoming(msg("2", "c1", "yo")));
        assert!(!stream.append_incoming(msg("3", "c2", "elsewhere")));
        assert_eq!(ids(&stream), vec!["1", "2"]);
    }

    #[test]
    fn test_stale_history_discarded() {
        let mut stream = MessageStream::new();
        let ticket_a = stream.begin_load("a");
        let ticket_b = stream.begin_load("b");
        stream.apply_history(&ticket_b, Ok(vec![msg("b1", "b", "bee")]));

        assert_eq!(
            stream.apply_history(&ticket_a, Ok(vec![msg("a1", "a", "ay")])),
            HistoryOutcome::Stale
        );
        assert_eq!(ids(&stream), vec!["b1"]);
    }

    #[test]
    fn test_reopening_same_conversation_invalidates_old_ticket() {
        let mut stream = MessageStream::new();
        let first = stream.begin_load("c1");
        let second = stream.begin_load("c1");

        assert_eq!(stream.apply_history(&first, Ok(vec![])), HistoryOutcome::Stale);
        assert_eq!(stream.apply_history(&second, Ok(vec![])), HistoryOutcome::Applied(0));
    }

    #[test]
    fn test_failed_history_sets_state() {
        let mut stream = MessageStream::new();
        let ticket = stream.begin_load("c1");
        let outcome = stream.apply_history(
            &ticket,
            Err(VibeError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
        );
        assert_eq!(outcome, HistoryOutcome::Failed);
        assert!(matches!(stream.load_state(), LoadState::Failed(_)));
        assert!(stream.is_empty());
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let mut stream = MessageStream::new();
        let ticket = stream.begin_load("c1");
        stream.apply_history(&ticket, Ok(vec![]));

        assert!(stream.append_outgoing(msg("9", "c1", "mine")));
        assert!(!stream.append_incoming(msg("9", "c1", "mine")));
        assert_eq!(stream.len(), 1);
    }

    #[test]
    fn test_messages_arriving_during_load_kept_after_page() {
        let mut stream = MessageStream::new();
        let ticket = stream.begin_load("c1");
        stream.append_incoming(msg("3", "c1", "live"));
        // Page overlaps the live message
        stream.apply_history(
            &ticket,
            Ok(vec![msg("1", "c1", "old"), msg("3", "c1", "live")]),
        );
        assert_eq!(ids(&stream), vec!["1", "3"]);
    }

    #[test]
    fn test_outgoing_in_call_order() {
        let mut stream = MessageStream::new();
        let ticket = stream.begin_load("c1");
        stream.apply_history(&ticket, Ok(vec![]));
        assert!(stream.is_empty());

        for i in 0..5 {
            stream.append_outgoing(msg(&i.to_string(), "c1", "x"));
        }
        assert_eq!(ids(&stream), vec!["0", "1", "2", "3", "4"]);
    }
}
