pub mod directory;
pub mod history;
pub mod keys;
pub mod kv;
pub mod stats;
pub mod users;

use chrono::{SecondsFormat, Utc};

/// UTC timestamp in the format stored for `created_at`/`last_seen`/events.
/// RFC 3339 with second precision sorts lexicographically, which is what
/// the monotonic last-seen check relies on.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
