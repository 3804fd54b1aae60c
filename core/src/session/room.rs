/// Room membership with deferred join
///
/// A join requested before the transport is ready is remembered and
/// emitted on the `connected` ack instead of being dropped.
use crate::error::Result;
use crate::transport::{ClientEvent, TransportClient};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct RoomMembership {
    active: Option<String>,
    joined: bool,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Make `room` the active room and join it if the transport allows
    pub fn activate(&mut self, room: &str, transport: &TransportClient) -> Result<()> {
        self.active = Some(room.to_string());
        self.joined = false;
        self.join_pending(transport)
    }

    /// Transport became ready: flush a deferred join
    pub fn on_ready(&mut self, transport: &TransportClient) -> Result<()> {
        self.join_pending(transport)
    }

    fn join_pending(&mut self, transport: &TransportClient) -> Result<()> {
        let Some(room) = self.active.as_deref() else {
            return Ok(());
        };
        if self.joined {
            return Ok(());
        }
        if !transport.is_ready() {
            debug!("Deferring join of {} until transport is ready", room);
            return Ok(());
        }
        transport.emit(ClientEvent::JoinChat(room.to_string()))?;
        self.joined = true;
        info!("Joined room {}", room);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ServerEvent;

    #[test]
    fn test_join_deferred_until_ready() {
        let (transport, mut rx) = TransportClient::loopback();
        let mut room = RoomMembership::new();

        room.activate("c1", &transport).unwrap();
        assert!(rx.try_recv().is_err());

        transport.deliver(ServerEvent::Connected);
        room.on_ready(&transport).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::JoinChat("c1".to_string()));

        // Second ack does not re-join
        room.on_ready(&transport).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_join_immediately_when_ready() {
        let (transport, mut rx) = TransportClient::loopback();
        transport.deliver(ServerEvent::Connected);

        let mut room = RoomMembership::new();
        room.activate("c1", &transport).unwrap();
        room.activate("c2", &transport).unwrap();

        assert_eq!(rx.try_recv().unwrap(), ClientEvent::JoinChat("c1".to_string()));
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::JoinChat("c2".to_string()));
        assert_eq!(room.active(), Some("c2"));
    }
}
