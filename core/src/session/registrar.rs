/// Session registrar: announces the local user on the transport
use crate::error::Result;
use crate::transport::{ClientEvent, TransportClient};
use crate::types::User;
use tracing::info;

pub struct Registrar {
    user: User,
    announced: bool,
}

impl Registrar {
    pub fn new(user: User) -> Self {
        Self {
            user,
            announced: false,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Emit `setup` once per connection; later calls are no-ops
    pub fn announce(&mut self, transport: &TransportClient) -> Result<()> {
        if self.announced {
            return Ok(());
        }
        transport.emit(ClientEvent::Setup(self.user.clone()))?;
        self.announced = true;
        info!("Announced presence for {}", self.user.username);
        Ok(())
    }
}
