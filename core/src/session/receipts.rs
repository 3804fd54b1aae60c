/// Read-receipt synchronizer: best-effort, fire-and-forget
use crate::api::ChatBackend;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ReadReceiptSynchronizer {
    backend: Arc<dyn ChatBackend>,
}

impl ReadReceiptSynchronizer {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Mark the conversation read in the background. Failures are logged
    /// and dropped; nothing is awaited.
    pub fn mark_read(&self, conversation_id: &str) {
        let backend = self.backend.clone();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            match backend.mark_read(&conversation_id).await {
                Ok(()) => debug!("Marked {} read", conversation_id),
                Err(e) => debug!("mark_read({}) failed: {}", conversation_id, e),
            }
        });
    }
}
