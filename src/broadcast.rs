//! Administrator broadcast fan-out.
//!
//! Delivery is best effort: the recipient list is capped per invocation
//! and a failed send (blocked bot, deleted account) is counted and
//! skipped, never propagated. The admin gets a sent/attempted tally.

use tracing::{info, warn};

use crate::gateway::TextGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub sent: usize,
}

pub async fn broadcast(
    gateway: &dyn TextGateway,
    recipients: &[String],
    text: &str,
    batch_cap: usize,
) -> BroadcastReport {
    let batch = &recipients[..recipients.len().min(batch_cap)];
    let mut sent = 0usize;
    for chat_id in batch {
        match gateway.send_text(chat_id, text, true).await {
            Ok(()) => sent += 1,
            Err(e) => warn!("broadcast delivery to {chat_id} failed: {e}"),
        }
    }
    info!("broadcast complete: {sent}/{} delivered", batch.len());
    BroadcastReport {
        attempted: batch.len(),
        sent,
    }
}
