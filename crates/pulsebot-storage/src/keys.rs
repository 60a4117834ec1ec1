//! Key layout and retention windows.
//!
//! The backing store is a single shared keyspace, so every key carries a
//! typed prefix. Per-user data uses the hash variant: one hash per user
//! plus one list of message sequence numbers.
//!
//! ```text
//! user:{id}                    → hash {handle, display_name, locale,
//!                                      created_at, last_seen, message_count},
//!                                rolling 90-day TTL
//! user:{id}:messages           → list of sequence numbers, trimmed to capacity
//! message:{seq}                → hash event payload, 30-day TTL
//! stats:messages:{YYYY-MM-DD}  → daily message counter, 7-day TTL
//! stats:active:{YYYY-MM-DD}:{id} → active-today marker, 1-day TTL
//! budget:commands:{YYYY-MM-DD} → daily command-budget counter, 7-day TTL
//! global:message_id            → global sequence counter, no TTL
//! ```
//!
//! Day buckets use UTC so counters are stable across deployment timezones.

use chrono::Utc;

pub const GLOBAL_MESSAGE_SEQ: &str = "global:message_id";

pub const USER_KEY_PATTERN: &str = "user:*";
pub const MESSAGE_KEY_PATTERN: &str = "message:*";

pub const SECS_PER_DAY: u64 = 86_400;

/// Retention defaults; `Config` carries the tunable counterparts.
pub const DEFAULT_USER_TTL_DAYS: u64 = 90;
pub const DEFAULT_MESSAGE_TTL_DAYS: u64 = 30;
pub const DEFAULT_STATS_TTL_DAYS: u64 = 7;
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
pub const DEFAULT_MESSAGE_TEXT_CAP: usize = 500;
pub const ACTIVE_MARKER_TTL_SECS: u64 = SECS_PER_DAY;
pub const BUDGET_TTL_SECS: u64 = DEFAULT_STATS_TTL_DAYS * SECS_PER_DAY;

pub fn user(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn user_messages(user_id: &str) -> String {
    format!("user:{user_id}:messages")
}

pub fn message(seq: u64) -> String {
    format!("message:{seq}")
}

pub fn daily_messages(date: &str) -> String {
    format!("stats:messages:{date}")
}

pub fn active_marker(date: &str, user_id: &str) -> String {
    format!("stats:active:{date}:{user_id}")
}

pub fn active_marker_pattern(date: &str) -> String {
    format!("stats:active:{date}:*")
}

pub fn command_budget(date: &str) -> String {
    format!("budget:commands:{date}")
}

/// `user:*` matches both record hashes and `:messages` lists; only keys
/// without a sub-suffix are user records.
pub fn is_user_record_key(key: &str) -> bool {
    match key.strip_prefix("user:") {
        Some(rest) => !rest.contains(':'),
        None => false,
    }
}

pub fn user_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix("user:").filter(|rest| !rest.contains(':'))
}

/// Current UTC day bucket, `YYYY-MM-DD`.
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
