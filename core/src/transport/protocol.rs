/// Event schemas and packet codec for the real-time channel
///
/// Frames are Engine.IO v4 text packets carrying socket.io packets on the
/// default namespace. Only the subset the chat client needs is understood:
///
///   0{json}            open (server handshake)
///   2 / 3              ping / pong
///   40[{json}]         namespace connect (ack)
///   41                 namespace disconnect
///   44{json}           namespace connect error
///   42["event",data]   event
use crate::error::{Result, VibeError};
use crate::types::{Message, User, UserStatus};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Inbound event names
pub const EV_CONNECTED: &str = "connected";
pub const EV_TYPING: &str = "typing";
pub const EV_STOP_TYPING: &str = "stop typing";
pub const EV_USER_STATUS: &str = "user status";
pub const EV_MESSAGE_RECEIVED: &str = "message received";

/// Outbound-only event names
pub const EV_SETUP: &str = "setup";
pub const EV_JOIN_CHAT: &str = "join chat";
pub const EV_NEW_MESSAGE: &str = "new message";

/// Events the client emits
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Register the local user's presence
    Setup(User),
    /// Join a conversation room
    JoinChat(String),
    /// Local user started typing in a room
    Typing(String),
    /// Local user stopped typing in a room
    StopTyping(String),
    /// Ask the server to broadcast a freshly created message
    NewMessage(Message),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Setup(_) => EV_SETUP,
            ClientEvent::JoinChat(_) => EV_JOIN_CHAT,
            ClientEvent::Typing(_) => EV_TYPING,
            ClientEvent::StopTyping(_) => EV_STOP_TYPING,
            ClientEvent::NewMessage(_) => EV_NEW_MESSAGE,
        }
    }

    fn payload(&self) -> std::result::Result<Value, serde_json::Error> {
        match self {
            ClientEvent::Setup(user) => serde_json::to_value(user),
            ClientEvent::JoinChat(room) | ClientEvent::Typing(room) | ClientEvent::StopTyping(room) => {
                Ok(Value::String(room.clone()))
            }
            ClientEvent::NewMessage(msg) => serde_json::to_value(msg),
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientEvent({})", self.name())
    }
}

/// Kinds of inbound events, used to key handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Typing,
    StopTyping,
    UserStatus,
    MessageReceived,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Connected,
        EventKind::Typing,
        EventKind::StopTyping,
        EventKind::UserStatus,
        EventKind::MessageReceived,
    ];
}

/// Events the server delivers, validated at the transport boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Acknowledges `setup`
    Connected,
    /// Partner started typing in a room
    Typing(String),
    /// Partner stopped typing in a room
    StopTyping(String),
    UserStatus(UserStatus),
    MessageReceived(Message),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Connected => EventKind::Connected,
            ServerEvent::Typing(_) => EventKind::Typing,
            ServerEvent::StopTyping(_) => EventKind::StopTyping,
            ServerEvent::UserStatus(_) => EventKind::UserStatus,
            ServerEvent::MessageReceived(_) => EventKind::MessageReceived,
        }
    }

    /// Parse a named event and its (optional) first argument
    pub fn from_parts(name: &str, payload: Option<Value>) -> Result<Self> {
        match name {
            EV_CONNECTED => Ok(ServerEvent::Connected),
            EV_TYPING => Ok(ServerEvent::Typing(room_arg(name, payload)?)),
            EV_STOP_TYPING => Ok(ServerEvent::StopTyping(room_arg(name, payload)?)),
            EV_USER_STATUS => Ok(ServerEvent::UserStatus(typed_arg(name, payload)?)),
            EV_MESSAGE_RECEIVED => Ok(ServerEvent::MessageReceived(typed_arg(name, payload)?)),
            other => Err(VibeError::Protocol(format!("Unknown event: {}", other))),
        }
    }
}

/// Rooms travel as plain strings, some servers wrap them as `{_id}`
fn room_arg(name: &str, payload: Option<Value>) -> Result<String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Room {
        Id(String),
        Doc {
            #[serde(rename = "_id")]
            id: String,
        },
    }

    let value = payload.ok_or_else(|| VibeError::Protocol(format!("'{}' without room", name)))?;
    match serde_json::from_value::<Room>(value) {
        Ok(Room::Id(id)) | Ok(Room::Doc { id }) => Ok(id),
        Err(e) => Err(VibeError::Protocol(format!("Invalid '{}' room: {}", name, e))),
    }
}

fn typed_arg<T: serde::de::DeserializeOwned>(name: &str, payload: Option<Value>) -> Result<T> {
    let value = payload.ok_or_else(|| VibeError::Protocol(format!("'{}' without payload", name)))?;
    serde_json::from_value(value)
        .map_err(|e| VibeError::Protocol(format!("Invalid '{}' payload: {}", name, e)))
}

/// One decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake (raw JSON body)
    Open(Value),
    Ping,
    Pong,
    /// Namespace connected
    Connect,
    /// Namespace disconnected by the server
    Disconnect,
    /// Namespace refused
    ConnectError(String),
    Event(ServerEvent),
    /// Engine.IO close
    Close,
}

impl Packet {
    /// Decode a text frame
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let engine = chars
            .next()
            .ok_or_else(|| VibeError::Protocol("Empty frame".to_string()))?;
        let rest = chars.as_str();

        match engine {
            '0' => {
                let body = if rest.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(rest)?
                };
                Ok(Packet::Open(body))
            }
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => Self::decode_socket(rest),
            other => Err(VibeError::Protocol(format!("Unknown engine packet type '{}'", other))),
        }
    }

    fn decode_socket(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| VibeError::Protocol("Empty socket packet".to_string()))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Packet::Connect),
            '1' => Ok(Packet::Disconnect),
            '4' => {
                let reason = serde_json::from_str::<Value>(rest)
                    .ok()
                    .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
                    .unwrap_or_else(|| rest.to_string());
                Ok(Packet::ConnectError(reason))
            }
            '2' => {
                // Optional ack id precedes the array
                let start = rest
                    .find('[')
                    .ok_or_else(|| VibeError::Protocol("Event without arguments".to_string()))?;
                let mut args: Vec<Value> = serde_json::from_str(&rest[start..])?;
                if args.is_empty() {
                    return Err(VibeError::Protocol("Event without name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(VibeError::Protocol(format!("Invalid event name: {}", other)))
                    }
                };
                let payload = if args.is_empty() { None } else { Some(args.remove(0)) };
                Ok(Packet::Event(ServerEvent::from_parts(&name, payload)?))
            }
            other => Err(VibeError::Protocol(format!("Unsupported socket packet type '{}'", other))),
        }
    }
}

/// Frame that answers a ping
pub const PONG_FRAME: &str = "3";

/// Frame that opens the default namespace
pub const CONNECT_FRAME: &str = "40";

/// Encode an outbound event as a text frame
pub fn encode_event(event: &ClientEvent) -> Result<String> {
    let args = Value::Array(vec![Value::String(event.name().to_string()), event.payload()?]);
    Ok(format!("42{}", serde_json::to_string(&args)?))
}
