//! Outbound delivery seam.
//!
//! Command handlers and the broadcast fan-out talk to a [`TextGateway`]
//! trait object rather than the Telegram client directly, so both can be
//! exercised in tests with an in-process double.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

use crate::text::split_text;

/// Telegram caps a single message at 4096 chars.
pub const MAX_MESSAGE_LEN: usize = 4096;

#[async_trait]
pub trait TextGateway: Send + Sync {
    /// Deliver `text` to a chat. `formatted` requests Markdown rendering;
    /// implementations may fall back to plain text when rendering fails.
    async fn send_text(&self, chat_id: &str, text: &str, formatted: bool) -> Result<(), String>;
}

pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl TextGateway for TelegramGateway {
    async fn send_text(&self, chat_id: &str, text: &str, formatted: bool) -> Result<(), String> {
        let id: i64 = chat_id
            .parse()
            .map_err(|_| format!("invalid chat id '{chat_id}'"))?;
        for chunk in split_text(text, MAX_MESSAGE_LEN) {
            send_chunk(&self.bot, ChatId(id), &chunk, formatted).await?;
        }
        Ok(())
    }
}

async fn send_chunk(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    formatted: bool,
) -> Result<(), String> {
    if formatted {
        match bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Markdown)
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) => {
                // Unbalanced markers in user-supplied text make Telegram
                // reject the whole message; retry unformatted.
                warn!("Markdown send to {chat_id} failed, retrying as plain text: {e}");
            }
        }
    }
    bot.send_message(chat_id, text)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
pub mod test_gateway {
    use super::*;
    use std::sync::Mutex;

    /// Records deliveries; ids listed in `fail_for` are rejected.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail_for: Vec<String>,
    }

    impl RecordingGateway {
        pub fn failing_for(ids: &[&str]) -> Self {
            RecordingGateway {
                sent: Mutex::new(Vec::new()),
                fail_for: ids.iter().map(|s| s.to_string()).collect(),
            }
        }

        pub fn deliveries(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGateway for RecordingGateway {
        async fn send_text(
            &self,
            chat_id: &str,
            text: &str,
            _formatted: bool,
        ) -> Result<(), String> {
            if self.fail_for.iter().any(|id| id == chat_id) {
                return Err(format!("simulated delivery failure to {chat_id}"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }
}
