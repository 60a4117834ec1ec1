//! Key/value store adapter.
//!
//! All higher-level stores go through the [`KeyValueStore`] trait so the
//! backend can be swapped for an in-memory double in tests and for the
//! offline adapter when the remote store is unreachable at startup.
//!
//! The production backend is a remote Redis-compatible service that is
//! request-count-limited (a fixed daily command budget), so [`RedisKv`]
//! bumps a shared day-bucketed command counter on every data operation
//! and warns when usage approaches the budget.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::keys;
use pulsebot_core::error::PulseBotError;

pub type KvResult<T> = Result<T, PulseBotError>;

/// Default bound for a single remote operation, connect included.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Narrow contract over the remote key/value service. Absent keys are
/// `None`/empty, never an error; every operation may fail with
/// `StoreUnavailable` and callers degrade instead of crashing.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> KvResult<()>;
    async fn increment(&self, key: &str) -> KvResult<i64>;
    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> KvResult<()>;
    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> KvResult<i64>;
    async fn hash_get_all(&self, key: &str) -> KvResult<HashMap<String, String>>;
    async fn list_push_front(&self, key: &str, value: &str) -> KvResult<()>;
    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> KvResult<()>;
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<()>;
    async fn keys_matching(&self, pattern: &str) -> KvResult<Vec<String>>;

    /// Connectivity probe for the stats view. Does not consume budget.
    async fn ping(&self) -> bool;

    /// Human-readable used-memory figure, when the backend reports one.
    async fn memory_usage(&self) -> Option<String>;
}

/// Redis-backed adapter over a multiplexed connection manager.
pub struct RedisKv {
    conn: ConnectionManager,
    op_timeout: Duration,
    daily_budget: u64,
}

impl RedisKv {
    /// Connect with a bounded timeout. A failure here is reported to the
    /// caller, which is expected to fall back to [`OfflineKv`].
    pub async fn connect(
        url: &str,
        op_timeout: Duration,
        daily_budget: u64,
    ) -> KvResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| PulseBotError::StoreUnavailable(e.to_string()))?;
        let conn = match tokio::time::timeout(op_timeout, client.get_connection_manager()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(PulseBotError::StoreUnavailable(e.to_string())),
            Err(_) => {
                return Err(PulseBotError::StoreUnavailable(format!(
                    "connect timed out after {op_timeout:?}"
                )))
            }
        };
        Ok(Self {
            conn,
            op_timeout,
            daily_budget,
        })
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>> + Send,
    ) -> KvResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(PulseBotError::StoreUnavailable(e.to_string())),
            Err(_) => Err(PulseBotError::StoreUnavailable(format!(
                "operation timed out after {:?}",
                self.op_timeout
            ))),
        }
    }

    /// Bump the shared daily command counter. Best effort: a failure here
    /// must not fail the data operation it accounts for.
    async fn note_command(&self) {
        let key = keys::command_budget(&keys::today());
        let mut conn = self.conn.clone();
        let fut = async move {
            let count: i64 = conn.incr(&key, 1).await?;
            let _: () = conn.expire(&key, keys::BUDGET_TTL_SECS as i64).await?;
            redis::RedisResult::Ok(count)
        };
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(count)) => {
                let warn_at = (self.daily_budget * 8 / 10) as i64;
                if count >= warn_at && (count == warn_at || count % 1000 == 0) {
                    warn!(
                        "approaching daily store command budget: {count}/{}",
                        self.daily_budget
                    );
                }
            }
            _ => debug!("failed to update command budget counter"),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let v: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(v)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> KvResult<()> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        match ttl_secs {
            Some(ttl) => {
                let _: () = self.bounded(conn.set_ex(key, value, ttl)).await?;
            }
            None => {
                let _: () = self.bounded(conn.set(key, value)).await?;
            }
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> KvResult<i64> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let v: i64 = self.bounded(conn.incr(key, 1)).await?;
        Ok(v)
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> KvResult<()> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let _: () = self.bounded(conn.hset_multiple(key, fields)).await?;
        Ok(())
    }

    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> KvResult<i64> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let v: i64 = self.bounded(conn.hincr(key, field, by)).await?;
        Ok(v)
    }

    async fn hash_get_all(&self, key: &str) -> KvResult<HashMap<String, String>> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let v: HashMap<String, String> = self.bounded(conn.hgetall(key)).await?;
        Ok(v)
    }

    async fn list_push_front(&self, key: &str, value: &str) -> KvResult<()> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let _: () = self.bounded(conn.lpush(key, value)).await?;
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> KvResult<()> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let _: () = self
            .bounded(conn.ltrim(key, start as isize, stop as isize))
            .await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let v: Vec<String> = self
            .bounded(conn.lrange(key, start as isize, stop as isize))
            .await?;
        Ok(v)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<()> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let _: () = self.bounded(conn.expire(key, ttl_secs as i64)).await?;
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> KvResult<Vec<String>> {
        self.note_command().await;
        let mut conn = self.conn.clone();
        let v: Vec<String> = self.bounded(conn.keys(pattern)).await?;
        Ok(v)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("PING");
        let fut = cmd.query_async::<String>(&mut conn);
        matches!(tokio::time::timeout(self.op_timeout, fut).await, Ok(Ok(_)))
    }

    async fn memory_usage(&self) -> Option<String> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("INFO");
        cmd.arg("memory");
        let fut = cmd.query_async::<String>(&mut conn);
        let info = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(info)) => info,
            _ => return None,
        };
        info.lines()
            .find_map(|line| line.strip_prefix("used_memory_human:"))
            .map(|v| v.trim().to_string())
    }
}

/// Degraded-mode adapter used when the remote store cannot be reached at
/// startup: every data operation reports `StoreUnavailable` so handlers
/// produce their "feature unavailable" responses.
pub struct OfflineKv;

fn offline<T>() -> KvResult<T> {
    Err(PulseBotError::StoreUnavailable("storage offline".into()))
}

#[async_trait]
impl KeyValueStore for OfflineKv {
    async fn get(&self, _key: &str) -> KvResult<Option<String>> {
        offline()
    }
    async fn set(&self, _key: &str, _value: &str, _ttl_secs: Option<u64>) -> KvResult<()> {
        offline()
    }
    async fn increment(&self, _key: &str) -> KvResult<i64> {
        offline()
    }
    async fn hash_set(&self, _key: &str, _fields: &[(&str, String)]) -> KvResult<()> {
        offline()
    }
    async fn hash_increment(&self, _key: &str, _field: &str, _by: i64) -> KvResult<i64> {
        offline()
    }
    async fn hash_get_all(&self, _key: &str) -> KvResult<HashMap<String, String>> {
        offline()
    }
    async fn list_push_front(&self, _key: &str, _value: &str) -> KvResult<()> {
        offline()
    }
    async fn list_trim(&self, _key: &str, _start: i64, _stop: i64) -> KvResult<()> {
        offline()
    }
    async fn list_range(&self, _key: &str, _start: i64, _stop: i64) -> KvResult<Vec<String>> {
        offline()
    }
    async fn expire(&self, _key: &str, _ttl_secs: u64) -> KvResult<()> {
        offline()
    }
    async fn keys_matching(&self, _pattern: &str) -> KvResult<Vec<String>> {
        offline()
    }
    async fn ping(&self) -> bool {
        false
    }
    async fn memory_usage(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Scalar(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

/// In-memory adapter for tests and local development. TTLs are recorded
/// but never enforced; `keys_matching` supports the prefix patterns the
/// key layout actually uses (`prefix*` or an exact key).
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
    ttls: Mutex<HashMap<String, u64>>,
    ops: AtomicU64,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of data operations performed. Lets tests assert that a
    /// denied command never touched the store.
    pub fn op_count(&self) -> u64 {
        self.ops.load(Ordering::SeqCst)
    }

    /// Last TTL recorded for a key, if any.
    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.ttls.lock().unwrap().get(key).copied()
    }

    fn note(&self) {
        self.ops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.note();
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(Entry::Scalar(v)) => Ok(Some(v.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> KvResult<()> {
        self.note();
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), Entry::Scalar(value.to_string()));
        if let Some(ttl) = ttl_secs {
            self.ttls.lock().unwrap().insert(key.to_string(), ttl);
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> KvResult<i64> {
        self.note();
        let mut entries = self.entries.lock().unwrap();
        let next = match entries.get(key) {
            Some(Entry::Scalar(v)) => v.parse::<i64>().unwrap_or(0) + 1,
            _ => 1,
        };
        entries.insert(key.to_string(), Entry::Scalar(next.to_string()));
        Ok(next)
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> KvResult<()> {
        self.note();
        let mut entries = self.entries.lock().unwrap();
        let hash = match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()))
        {
            Entry::Hash(h) => h,
            other => {
                *other = Entry::Hash(HashMap::new());
                match other {
                    Entry::Hash(h) => h,
                    _ => unreachable!(),
                }
            }
        };
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> KvResult<i64> {
        self.note();
        let mut entries = self.entries.lock().unwrap();
        let hash = match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()))
        {
            Entry::Hash(h) => h,
            _ => return offline(),
        };
        let next = hash
            .get(field)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            + by;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hash_get_all(&self, key: &str) -> KvResult<HashMap<String, String>> {
        self.note();
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(Entry::Hash(h)) => Ok(h.clone()),
            _ => Ok(HashMap::new()),
        }
    }

    async fn list_push_front(&self, key: &str, value: &str) -> KvResult<()> {
        self.note();
        let mut entries = self.entries.lock().unwrap();
        let list = match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(l) => l,
            _ => return offline(),
        };
        list.push_front(value.to_string());
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> KvResult<()> {
        self.note();
        let mut entries = self.entries.lock().unwrap();
        if let Some(Entry::List(list)) = entries.get_mut(key) {
            let len = list.len() as i64;
            let start = start.clamp(0, len);
            let stop = stop.min(len - 1);
            let kept: VecDeque<String> = if stop < start {
                VecDeque::new()
            } else {
                list.iter()
                    .skip(start as usize)
                    .take((stop - start + 1) as usize)
                    .cloned()
                    .collect()
            };
            *list = kept;
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        self.note();
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(Entry::List(list)) => {
                let len = list.len() as i64;
                let start = start.clamp(0, len);
                let stop = if stop < 0 { len - 1 } else { stop.min(len - 1) };
                if stop < start {
                    return Ok(Vec::new());
                }
                Ok(list
                    .iter()
                    .skip(start as usize)
                    .take((stop - start + 1) as usize)
                    .cloned()
                    .collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<()> {
        self.note();
        self.ttls.lock().unwrap().insert(key.to_string(), ttl_secs);
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> KvResult<Vec<String>> {
        self.note();
        let entries = self.entries.lock().unwrap();
        let keys = match pattern.strip_suffix('*') {
            Some(prefix) => entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => entries
                .keys()
                .filter(|k| k.as_str() == pattern)
                .cloned()
                .collect(),
        };
        Ok(keys)
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn memory_usage(&self) -> Option<String> {
        None
    }
}
