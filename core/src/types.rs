/// Shared data model for the REST backend and the real-time channel
///
/// Documents use MongoDB-style `_id` keys and camelCase field names.
/// References between documents arrive either as a bare id or as the
/// populated document, see [`Ref`].
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anything addressable by a backend id
pub trait Identified {
    fn id(&self) -> &str;
}

/// A reference that the backend may or may not have populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(String),
    Doc(T),
}

impl<T: Identified> Ref<T> {
    /// Id of the referenced document, populated or not
    pub fn id(&self) -> &str {
        match self {
            Ref::Id(id) => id,
            Ref::Doc(doc) => doc.id(),
        }
    }

    /// The populated document, if any
    pub fn doc(&self) -> Option<&T> {
        match self {
            Ref::Id(_) => None,
            Ref::Doc(doc) => Some(doc),
        }
    }
}

/// A user profile as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub followers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub following: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_requests: Vec<String>,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            name: None,
            email: None,
            avatar: None,
            is_online: false,
            last_seen: None,
            followers: Vec::new(),
            following: Vec::new(),
            follow_requests: Vec::new(),
        }
    }

    /// Name to show in lists
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Minimal view of a conversation nested inside a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStub {
    #[serde(rename = "_id")]
    pub id: String,
}

impl Identified for ChatStub {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Preview of the latest message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, alias = "content")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identified for MessageSummary {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A two-participant conversation (owned by the backend)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub participants: Vec<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<Ref<MessageSummary>>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// The participant that is not `me`
    pub fn partner(&self, me: &str) -> Option<&User> {
        self.participants.iter().find(|p| p.id != me)
    }
}

impl Identified for Conversation {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    /// Owning conversation
    #[serde(rename = "chatId")]
    pub chat: Ref<ChatStub>,
    pub sender: Ref<User>,
    #[serde(alias = "content")]
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    pub fn conversation_id(&self) -> &str {
        self.chat.id()
    }

    pub fn sender_id(&self) -> &str {
        self.sender.id()
    }
}

impl Identified for Message {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Presence broadcast for one user (`user status` event)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: String,
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Inbox notification (follow requests and the like)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Ref<User>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of a successful login: the user plus the bearer token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}
