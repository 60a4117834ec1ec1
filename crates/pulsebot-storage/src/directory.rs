//! On-demand user directory search.
//!
//! There is no secondary index: a search enumerates user-record keys and
//! filters in memory. Result order follows key enumeration order, which
//! is implementation-defined; there is no relevance ranking.

use std::sync::Arc;

use crate::keys;
use crate::kv::{KeyValueStore, KvResult};
use crate::users::UserRecord;

pub const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Clone)]
pub struct DirectoryIndex {
    kv: Arc<dyn KeyValueStore>,
}

impl DirectoryIndex {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Case-insensitive substring match against handle, display name,
    /// or the raw identifier. Partially malformed records are matched
    /// on whatever fields they have; they never abort the scan.
    pub async fn search(&self, term: &str, max_results: usize) -> KvResult<Vec<UserRecord>> {
        let needle = term.to_lowercase();
        let mut matches = Vec::new();

        for key in self.user_record_keys().await? {
            if matches.len() >= max_results {
                break;
            }
            let Some(user_id) = keys::user_id_from_key(&key) else {
                continue;
            };
            let fields = self.kv.hash_get_all(&key).await?;
            let record = UserRecord::from_fields(user_id, &fields);
            if record.handle.to_lowercase().contains(&needle)
                || record.display_name.to_lowercase().contains(&needle)
                || record.user_id.contains(term)
            {
                matches.push(record);
            }
        }
        Ok(matches)
    }

    /// All known user identifiers, in enumeration order. Used by the
    /// broadcast fan-out.
    pub async fn all_user_ids(&self) -> KvResult<Vec<String>> {
        Ok(self
            .user_record_keys()
            .await?
            .iter()
            .filter_map(|k| keys::user_id_from_key(k))
            .map(str::to_string)
            .collect())
    }

    async fn user_record_keys(&self) -> KvResult<Vec<String>> {
        let all = self.kv.keys_matching(keys::USER_KEY_PATTERN).await?;
        Ok(all
            .into_iter()
            .filter(|k| keys::is_user_record_key(k))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    async fn seed_user(kv: &MemoryKv, id: &str, handle: &str, name: &str) {
        kv.hash_set(
            &keys::user(id),
            &[
                ("handle", handle.to_string()),
                ("display_name", name.to_string()),
            ],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_over_handle_and_name() {
        let kv = Arc::new(MemoryKv::new());
        seed_user(&kv, "1", "alice_w", "").await;
        seed_user(&kv, "2", "", "Alice Smith").await;
        seed_user(&kv, "3", "bob", "Bob").await;
        // a list key sharing the prefix must not be scanned as a record
        kv.list_push_front("user:1:messages", "10").await.unwrap();

        let dir = DirectoryIndex::new(kv);
        let found = dir.search("alice", 10).await.unwrap();
        assert_eq!(found.len(), 2);
        let mut ids: Vec<&str> = found.iter().map(|r| r.user_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_search_caps_results() {
        let kv = Arc::new(MemoryKv::new());
        for i in 0..20 {
            seed_user(&kv, &i.to_string(), &format!("alice{i}"), "").await;
        }
        let dir = DirectoryIndex::new(kv);
        let found = dir.search("alice", DEFAULT_MAX_RESULTS).await.unwrap();
        assert_eq!(found.len(), 10);
    }

    #[tokio::test]
    async fn test_search_matches_raw_identifier() {
        let kv = Arc::new(MemoryKv::new());
        seed_user(&kv, "123456", "someone", "Someone").await;
        let dir = DirectoryIndex::new(kv);
        let found = dir.search("3456", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, "123456");
    }

    #[tokio::test]
    async fn test_search_tolerates_malformed_records() {
        let kv = Arc::new(MemoryKv::new());
        // record with no fields at all
        kv.hash_set(&keys::user("9"), &[]).await.unwrap();
        seed_user(&kv, "1", "alice", "").await;

        let dir = DirectoryIndex::new(kv);
        let found = dir.search("alice", 10).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_all_user_ids_excludes_message_lists() {
        let kv = Arc::new(MemoryKv::new());
        seed_user(&kv, "1", "a", "").await;
        seed_user(&kv, "2", "b", "").await;
        kv.list_push_front("user:2:messages", "5").await.unwrap();

        let dir = DirectoryIndex::new(kv);
        let mut ids = dir.all_user_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
