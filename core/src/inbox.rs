/// Conversation list kept fresh by inbound messages
use crate::api::ApiClient;
use crate::error::Result;
use crate::transport::{EventKind, HandlerId, TransportClient};
use crate::types::{Conversation, User};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ConversationList {
    chats: Arc<RwLock<Vec<Conversation>>>,
    /// Total unread count, republished on every replace
    unread: Arc<watch::Sender<u32>>,
}

impl Default for ConversationList {
    fn default() -> Self {
        let (unread, _) = watch::channel(0);
        Self {
            chats: Arc::new(RwLock::new(Vec::new())),
            unread: Arc::new(unread),
        }
    }
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload from `GET /chat`; returns the number of conversations
    pub async fn refresh(&self, api: &ApiClient) -> Result<usize> {
        let chats = api.list_chats().await?;
        let count = chats.len();
        self.replace(chats).await;
        debug!("Conversation list refreshed ({} chats)", count);
        Ok(count)
    }

    pub async fn replace(&self, chats: Vec<Conversation>) {
        let unread = chats.iter().map(|c| c.unread_count).sum();
        *self.chats.write().await = chats;
        self.unread.send_replace(unread);
    }

    pub async fn all(&self) -> Vec<Conversation> {
        self.chats.read().await.clone()
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Conversation> {
        let chats = self.chats.read().await;
        chats.iter().find(|c| c.id == conversation_id).cloned()
    }

    /// The other participant of a cached conversation
    pub async fn partner_of(&self, conversation_id: &str, me: &str) -> Option<User> {
        self.get(conversation_id)
            .await
            .and_then(|c| c.partner(me).cloned())
    }

    pub fn total_unread(&self) -> u32 {
        *self.unread.borrow()
    }

    /// Receiver that wakes whenever the list is replaced
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.unread.subscribe()
    }

    /// Refresh in the background whenever any message arrives
    pub fn follow(&self, transport: &TransportClient, api: ApiClient) -> HandlerId {
        let list = self.clone();
        transport.on(EventKind::MessageReceived, move |_| {
            let list = list.clone();
            let api = api.clone();
            tokio::spawn(async move {
                if let Err(e) = list.refresh(&api).await {
                    warn!("Failed to refresh conversation list: {}", e);
                }
            });
        })
    }
}
