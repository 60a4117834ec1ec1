//! Command surface.
//!
//! Every handler returns the reply text; delivery is the caller's
//! concern. Admin-only handlers check the gate before touching the
//! store, so a denied invocation performs no store operations at all.

use tracing::warn;

use crate::broadcast;
use crate::directory::DEFAULT_MAX_RESULTS;
use crate::gateway::TextGateway;
use crate::history::MessageKind;
use crate::runtime::AppState;
use crate::text::{snippet, truncate_chars};
use crate::users::ProfileFields;

pub const ACCESS_DENIED: &str = "This command is for the administrator only.";
pub const STORE_UNAVAILABLE: &str =
    "Storage is currently unavailable. Please try again in a moment.";
const SEARCH_USAGE: &str = "Usage: /search <name, handle, or id>";
const BROADCAST_USAGE: &str = "Usage: /broadcast <message>";
const SNIPPET_LEN: usize = 50;
/// RFC 3339 prefix up to minutes: `2026-08-23T12:34`.
const TIMESTAMP_DISPLAY_LEN: usize = 16;

/// Identity fields of the message author, as the transport reports them.
#[derive(Debug, Clone, Default)]
pub struct IncomingUser {
    pub id: String,
    pub display_name: String,
    pub handle: String,
    pub locale: String,
}

impl IncomingUser {
    fn profile_fields(&self) -> ProfileFields {
        ProfileFields {
            handle: self.handle.clone(),
            display_name: self.display_name.clone(),
            locale: self.locale.clone(),
        }
    }
}

/// Dispatch one incoming text update and produce the reply.
pub async fn route_incoming(
    state: &AppState,
    gateway: &dyn TextGateway,
    user: &IncomingUser,
    text: &str,
) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return handle_text(state, user, trimmed).await;
    };

    let (raw_cmd, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    // group chats suffix commands with @botname
    let cmd = raw_cmd.split('@').next().unwrap_or(raw_cmd);

    match cmd {
        "start" => handle_start(state, user).await,
        "profile" => handle_profile(state, user).await,
        "stats" => handle_stats(state, user).await,
        "last" | "history" => handle_last(state, user).await,
        "search" => handle_search(state, user, args).await,
        "admin" => handle_admin(state, user).await,
        "broadcast" => handle_broadcast(state, gateway, user, args).await,
        _ => "Unknown command. Send /start to see what I can do.".to_string(),
    }
}

async fn record_command(state: &AppState, user_id: &str, text: &str) {
    // Best effort; append_message already logs its own failures.
    let _ = state
        .history
        .append_message(user_id, text, MessageKind::Command)
        .await;
}

pub async fn handle_start(state: &AppState, user: &IncomingUser) -> String {
    if let Err(e) = state
        .users
        .upsert_profile(&user.id, &user.profile_fields())
        .await
    {
        warn!("profile upsert on /start failed for {}: {e}", user.id);
    }
    record_command(state, &user.id, "/start").await;

    let name = if user.display_name.is_empty() {
        "there"
    } else {
        user.display_name.as_str()
    };
    format!(
        "Hello {name}! I keep track of your activity here.\n\n\
         *Commands*\n\
         /profile — your profile and recent messages\n\
         /stats — global bot statistics\n\
         /last — your last saved messages\n\n\
         Anything else you send me is saved to your history."
    )
}

pub async fn handle_profile(state: &AppState, user: &IncomingUser) -> String {
    let record = match state.users.get_profile(&user.id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            record_command(state, &user.id, "/profile").await;
            return "No profile yet. Send /start or any message first.".to_string();
        }
        Err(e) => {
            warn!("profile read failed for {}: {e}", user.id);
            return STORE_UNAVAILABLE.to_string();
        }
    };

    let handle = if record.handle.is_empty() {
        "(none)".to_string()
    } else {
        format!("@{}", record.handle)
    };
    let mut reply = format!(
        "*Your profile*\n\n\
         Name: {}\n\
         Handle: {}\n\
         First seen: {}\n\
         Last seen: {}\n\
         Messages saved: {}",
        record.display_name,
        handle,
        truncate_chars(&record.created_at, TIMESTAMP_DISPLAY_LEN),
        truncate_chars(&record.last_seen, TIMESTAMP_DISPLAY_LEN),
        record.message_count,
    );

    match state.history.get_history(&user.id, 5).await {
        Ok(events) if !events.is_empty() => {
            reply.push_str("\n\n*Recent messages*");
            for (i, event) in events.iter().enumerate() {
                reply.push_str(&format!(
                    "\n{}. [{}] {}",
                    i + 1,
                    truncate_chars(&event.timestamp, TIMESTAMP_DISPLAY_LEN),
                    snippet(&event.text, SNIPPET_LEN),
                ));
            }
        }
        Ok(_) => {}
        Err(e) => warn!("history read failed for {}: {e}", user.id),
    }

    record_command(state, &user.id, "/profile").await;
    reply
}

pub async fn handle_stats(state: &AppState, user: &IncomingUser) -> String {
    let stats = state.stats.global_stats().await;
    record_command(state, &user.id, "/stats").await;

    format!(
        "*Bot statistics*\n\n\
         Users: {}\n\
         Messages today: {}\n\
         Active today: {}\n\
         Store: {}\n\
         Store memory: {}\n\
         Store commands today: {}/{}",
        stats.total_users,
        stats.messages_today,
        stats.active_today,
        if stats.store_online { "online" } else { "offline" },
        stats.memory_used.as_deref().unwrap_or("n/a"),
        stats.commands_today,
        state.stats.daily_command_budget(),
    )
}

pub async fn handle_last(state: &AppState, user: &IncomingUser) -> String {
    let events = match state.history.get_history(&user.id, 5).await {
        Ok(events) => events,
        Err(e) => {
            warn!("history read failed for {}: {e}", user.id);
            return STORE_UNAVAILABLE.to_string();
        }
    };
    record_command(state, &user.id, "/last").await;

    if events.is_empty() {
        return "No saved messages yet.".to_string();
    }
    let mut reply = "*Your last messages*".to_string();
    for (i, event) in events.iter().enumerate() {
        reply.push_str(&format!(
            "\n{}. [{}] {}",
            i + 1,
            truncate_chars(&event.timestamp, TIMESTAMP_DISPLAY_LEN),
            snippet(&event.text, SNIPPET_LEN),
        ));
    }
    reply
}

pub async fn handle_search(state: &AppState, user: &IncomingUser, args: &str) -> String {
    if !state.config.is_admin(&user.id) {
        return ACCESS_DENIED.to_string();
    }
    let term = args.trim();
    if term.is_empty() {
        return SEARCH_USAGE.to_string();
    }

    let found = match state.directory.search(term, DEFAULT_MAX_RESULTS).await {
        Ok(found) => found,
        Err(e) => {
            warn!("directory search failed: {e}");
            return STORE_UNAVAILABLE.to_string();
        }
    };
    record_command(state, &user.id, &format!("/search {term}")).await;

    if found.is_empty() {
        return format!("No users matching '{term}'.");
    }
    let mut reply = format!("*Users matching '{term}'*");
    for (i, record) in found.iter().enumerate() {
        let handle = if record.handle.is_empty() {
            "(no handle)".to_string()
        } else {
            format!("@{}", record.handle)
        };
        reply.push_str(&format!(
            "\n{}. {} {} — id {}, {} messages",
            i + 1,
            record.display_name,
            handle,
            record.user_id,
            record.message_count,
        ));
    }
    reply
}

pub async fn handle_admin(state: &AppState, user: &IncomingUser) -> String {
    if !state.config.is_admin(&user.id) {
        return ACCESS_DENIED.to_string();
    }
    let used = state.stats.commands_used_today().await;
    record_command(state, &user.id, "/admin").await;

    format!(
        "*Admin panel*\n\n\
         /search <term> — find users\n\
         /broadcast <message> — message every known user\n\
         /stats — global statistics\n\n\
         Store commands today: {}/{}",
        used,
        state.stats.daily_command_budget(),
    )
}

pub async fn handle_broadcast(
    state: &AppState,
    gateway: &dyn TextGateway,
    user: &IncomingUser,
    args: &str,
) -> String {
    if !state.config.is_admin(&user.id) {
        return ACCESS_DENIED.to_string();
    }
    let body = args.trim();
    if body.is_empty() {
        return BROADCAST_USAGE.to_string();
    }

    let recipients = match state.directory.all_user_ids().await {
        Ok(recipients) => recipients,
        Err(e) => {
            warn!("recipient enumeration failed: {e}");
            return STORE_UNAVAILABLE.to_string();
        }
    };
    if recipients.is_empty() {
        return "No known users to broadcast to.".to_string();
    }

    let text = format!("📢 Message from the administrator:\n\n{body}");
    let report = broadcast::broadcast(
        gateway,
        &recipients,
        &text,
        state.config.broadcast_batch,
    )
    .await;
    record_command(state, &user.id, &format!("/broadcast {}", snippet(body, SNIPPET_LEN))).await;

    format!(
        "Broadcast delivered to {}/{} users ({} known).",
        report.sent,
        report.attempted,
        recipients.len(),
    )
}

pub async fn handle_text(state: &AppState, user: &IncomingUser, text: &str) -> String {
    if text.is_empty() {
        return "Send me some text and I'll save it to your history.".to_string();
    }
    if let Err(e) = state
        .users
        .upsert_profile(&user.id, &user.profile_fields())
        .await
    {
        warn!("profile upsert failed for {}: {e}", user.id);
    }
    match state
        .history
        .append_message(&user.id, text, MessageKind::Text)
        .await
    {
        Some(seq) => format!("Saved as message #{seq}. Use /last to review your history."),
        None => "Message received, but storage is unavailable so it was not saved.".to_string(),
    }
}
