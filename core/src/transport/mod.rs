/// Real-time transport modules
pub mod client;
pub mod protocol;

pub use client::{ConnectionState, HandlerId, LoopbackPeer, TransportClient};
pub use protocol::{ClientEvent, EventKind, Packet, ServerEvent};
