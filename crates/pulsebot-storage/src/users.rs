//! Per-user profile records.
//!
//! One hash per user with a rolling retention TTL: any write refreshes
//! the expiry, so a record disappears only after the full inactivity
//! window. `created_at` is written once, on first observation of the
//! identifier; `last_seen` never moves backwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::keys;
use crate::kv::{KeyValueStore, KvResult};
use crate::now_rfc3339;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    pub handle: String,
    pub display_name: String,
    pub locale: String,
    pub created_at: String,
    pub last_seen: String,
    pub message_count: u64,
}

impl UserRecord {
    /// Build from raw hash fields, treating anything missing or
    /// malformed as empty/zero. Partial records must never abort a scan.
    pub fn from_fields(user_id: &str, fields: &HashMap<String, String>) -> Self {
        let get = |name: &str| fields.get(name).cloned().unwrap_or_default();
        UserRecord {
            user_id: user_id.to_string(),
            handle: get("handle"),
            display_name: get("display_name"),
            locale: get("locale"),
            created_at: get("created_at"),
            last_seen: get("last_seen"),
            message_count: fields
                .get("message_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

/// Profile fields supplied by an incoming event.
#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub handle: String,
    pub display_name: String,
    pub locale: String,
}

#[derive(Clone)]
pub struct UserRecordStore {
    kv: Arc<dyn KeyValueStore>,
    user_ttl_secs: u64,
}

impl UserRecordStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, user_ttl_secs: u64) -> Self {
        Self { kv, user_ttl_secs }
    }

    /// Merge the supplied fields into the stored record. Sets
    /// `created_at` only when absent, advances `last_seen`
    /// monotonically, and refreshes the retention window.
    pub async fn upsert_profile(&self, user_id: &str, profile: &ProfileFields) -> KvResult<()> {
        let key = keys::user(user_id);
        let existing = self.kv.hash_get_all(&key).await?;
        let now = now_rfc3339();

        let created_at = existing
            .get("created_at")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| now.clone());
        let last_seen = match existing.get("last_seen") {
            Some(prev) if prev.as_str() > now.as_str() => prev.clone(),
            _ => now,
        };

        self.kv
            .hash_set(
                &key,
                &[
                    ("handle", profile.handle.clone()),
                    ("display_name", profile.display_name.clone()),
                    ("locale", profile.locale.clone()),
                    ("created_at", created_at),
                    ("last_seen", last_seen),
                ],
            )
            .await?;
        self.kv.expire(&key, self.user_ttl_secs).await
    }

    pub async fn get_profile(&self, user_id: &str) -> KvResult<Option<UserRecord>> {
        let fields = self.kv.hash_get_all(&keys::user(user_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(UserRecord::from_fields(user_id, &fields)))
    }

    /// Refresh `last_seen` and drop the day-bucketed active marker that
    /// feeds the `active_today` aggregate.
    pub async fn touch_last_seen(&self, user_id: &str) -> KvResult<()> {
        let key = keys::user(user_id);
        self.kv
            .hash_set(&key, &[("last_seen", now_rfc3339())])
            .await?;
        self.kv.expire(&key, self.user_ttl_secs).await?;
        self.kv
            .set(
                &keys::active_marker(&keys::today(), user_id),
                "1",
                Some(keys::ACTIVE_MARKER_TTL_SECS),
            )
            .await
    }

    pub async fn increment_message_count(&self, user_id: &str) -> KvResult<i64> {
        self.kv
            .hash_increment(&keys::user(user_id), "message_count", 1)
            .await
    }
}
