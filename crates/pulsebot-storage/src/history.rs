//! Per-user message history.
//!
//! Each appended event mints a sequence number from the global counter,
//! stores an addressable payload under `message:{seq}` with its own TTL,
//! and pushes the sequence number onto the user's list, which is trimmed
//! to capacity on every write (sliding window, not TTL eviction).
//!
//! The multi-step write is deliberately not transactional: a trim or
//! counter bump that fails after the push is tolerated and self-heals on
//! the next write.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::keys;
use crate::kv::{KeyValueStore, KvResult};
use crate::now_rfc3339;
use crate::users::UserRecordStore;
use pulsebot_core::text::truncate_chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Free text authored by the user.
    Text,
    /// A slash command invocation.
    Command,
    /// Bot-authored text.
    Bot,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Command => "command",
            MessageKind::Bot => "bot",
        }
    }

    pub fn parse(s: &str) -> MessageKind {
        match s {
            "command" => MessageKind::Command,
            "bot" => MessageKind::Bot,
            _ => MessageKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub seq: u64,
    pub user_id: String,
    pub text: String,
    pub kind: MessageKind,
    pub timestamp: String,
}

impl MessageEvent {
    fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let seq = fields.get("seq")?.parse().ok()?;
        Some(MessageEvent {
            seq,
            user_id: fields.get("user_id").cloned().unwrap_or_default(),
            text: fields.get("text").cloned().unwrap_or_default(),
            kind: MessageKind::parse(fields.get("kind").map(String::as_str).unwrap_or("")),
            timestamp: fields.get("timestamp").cloned().unwrap_or_default(),
        })
    }
}

#[derive(Clone)]
pub struct MessageHistoryStore {
    kv: Arc<dyn KeyValueStore>,
    users: UserRecordStore,
    capacity: usize,
    message_ttl_secs: u64,
    stats_ttl_secs: u64,
    text_cap: usize,
}

impl MessageHistoryStore {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        users: UserRecordStore,
        capacity: usize,
        message_ttl_secs: u64,
        stats_ttl_secs: u64,
        text_cap: usize,
    ) -> Self {
        Self {
            kv,
            users,
            capacity,
            message_ttl_secs,
            stats_ttl_secs,
            text_cap,
        }
    }

    /// Append an event and return its sequence number, or `None` when
    /// the store is unavailable. Callers must not treat `None` as fatal.
    pub async fn append_message(
        &self,
        user_id: &str,
        text: &str,
        kind: MessageKind,
    ) -> Option<u64> {
        match self.try_append(user_id, text, kind).await {
            Ok(seq) => Some(seq),
            Err(e) => {
                warn!("failed to append message for user {user_id}: {e}");
                None
            }
        }
    }

    async fn try_append(&self, user_id: &str, text: &str, kind: MessageKind) -> KvResult<u64> {
        let seq = self.kv.increment(keys::GLOBAL_MESSAGE_SEQ).await? as u64;
        let now = now_rfc3339();

        let msg_key = keys::message(seq);
        self.kv
            .hash_set(
                &msg_key,
                &[
                    ("seq", seq.to_string()),
                    ("user_id", user_id.to_string()),
                    ("text", truncate_chars(text, self.text_cap)),
                    ("kind", kind.as_str().to_string()),
                    ("timestamp", now),
                ],
            )
            .await?;
        self.kv.expire(&msg_key, self.message_ttl_secs).await?;

        let list_key = keys::user_messages(user_id);
        self.kv.list_push_front(&list_key, &seq.to_string()).await?;
        self.kv
            .list_trim(&list_key, 0, self.capacity as i64 - 1)
            .await?;

        // Bookkeeping past this point is best effort; the event itself
        // is already durable and addressable.
        if let Err(e) = self.users.increment_message_count(user_id).await {
            warn!("message count bump failed for user {user_id}: {e}");
        }
        if let Err(e) = self.users.touch_last_seen(user_id).await {
            warn!("last-seen refresh failed for user {user_id}: {e}");
        }
        if let Err(e) = self.bump_daily_counter().await {
            warn!("daily message counter bump failed: {e}");
        }

        Ok(seq)
    }

    async fn bump_daily_counter(&self) -> KvResult<()> {
        let key = keys::daily_messages(&keys::today());
        self.kv.increment(&key).await?;
        self.kv.expire(&key, self.stats_ttl_secs).await
    }

    /// Newest-first events, at most `limit`. Sequence numbers whose
    /// payload already expired are skipped silently.
    pub async fn get_history(&self, user_id: &str, limit: usize) -> KvResult<Vec<MessageEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let list_key = keys::user_messages(user_id);
        let ids = self.kv.list_range(&list_key, 0, limit as i64 - 1).await?;

        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(seq) = id.parse::<u64>() else { continue };
            let fields = self.kv.hash_get_all(&keys::message(seq)).await?;
            if fields.is_empty() {
                continue;
            }
            if let Some(event) = MessageEvent::from_fields(&fields) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn store_with_capacity(capacity: usize) -> (Arc<MemoryKv>, MessageHistoryStore) {
        let kv: Arc<MemoryKv> = Arc::new(MemoryKv::new());
        let users = UserRecordStore::new(kv.clone(), keys::DEFAULT_USER_TTL_DAYS * keys::SECS_PER_DAY);
        let history = MessageHistoryStore::new(
            kv.clone(),
            users,
            capacity,
            keys::DEFAULT_MESSAGE_TTL_DAYS * keys::SECS_PER_DAY,
            keys::DEFAULT_STATS_TTL_DAYS * keys::SECS_PER_DAY,
            keys::DEFAULT_MESSAGE_TEXT_CAP,
        );
        (kv, history)
    }

    #[tokio::test]
    async fn test_append_returns_strictly_increasing_sequence_across_users() {
        let (_kv, history) = store_with_capacity(50);
        let a = history.append_message("1", "hi", MessageKind::Text).await.unwrap();
        let b = history.append_message("2", "hey", MessageKind::Text).await.unwrap();
        let c = history.append_message("1", "again", MessageKind::Text).await.unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_capacity_overflow_evicts_oldest() {
        let (_kv, history) = store_with_capacity(3);
        for i in 1..=4 {
            history
                .append_message("1", &format!("msg {i}"), MessageKind::Text)
                .await
                .unwrap();
        }
        let events = history.get_history("1", 10).await.unwrap();
        assert_eq!(events.len(), 3);
        // newest first; "msg 1" fell off the tail
        let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 4", "msg 3", "msg 2"]);
    }

    #[tokio::test]
    async fn test_text_capped_on_write() {
        let (_kv, history) = store_with_capacity(50);
        let long = "x".repeat(2000);
        history.append_message("1", &long, MessageKind::Text).await.unwrap();
        let events = history.get_history("1", 1).await.unwrap();
        assert_eq!(events[0].text.chars().count(), 500);
    }

    #[tokio::test]
    async fn test_append_updates_user_bookkeeping() {
        let (kv, history) = store_with_capacity(50);
        history.append_message("1", "hi", MessageKind::Text).await.unwrap();
        history.append_message("1", "hey", MessageKind::Text).await.unwrap();

        let user = kv.hash_get_all("user:1").await.unwrap();
        assert_eq!(user.get("message_count").map(String::as_str), Some("2"));
        assert!(user.contains_key("last_seen"));

        let today = keys::today();
        let counter = kv.get(&keys::daily_messages(&today)).await.unwrap();
        assert_eq!(counter.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_get_history_skips_expired_payloads() {
        let (kv, history) = store_with_capacity(50);
        history.append_message("1", "kept", MessageKind::Text).await.unwrap();

        // a list entry whose payload hash already expired
        kv.list_push_front("user:1:messages", "999999").await.unwrap();

        let events = history.get_history("1", 10).await.unwrap();
        let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_append_on_offline_store_returns_none() {
        let kv: Arc<crate::kv::OfflineKv> = Arc::new(crate::kv::OfflineKv);
        let users = UserRecordStore::new(kv.clone(), 60);
        let history = MessageHistoryStore::new(kv, users, 50, 60, 60, 500);
        assert!(history.append_message("1", "hi", MessageKind::Text).await.is_none());
    }

    #[tokio::test]
    async fn test_message_kind_roundtrip() {
        for kind in [MessageKind::Text, MessageKind::Command, MessageKind::Bot] {
            assert_eq!(MessageKind::parse(kind.as_str()), kind);
        }
        assert_eq!(MessageKind::parse("unknown"), MessageKind::Text);
    }
}
