use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{info, warn};

use crate::commands::{self, IncomingUser};
use crate::gateway::{TelegramGateway, TextGateway};
use crate::runtime::AppState;

pub async fn run_bot(state: AppState, bot: Bot) -> anyhow::Result<()> {
    let state = Arc::new(state);
    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(
    bot: Bot,
    msg: teloxide::types::Message,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };

    let user = IncomingUser {
        id: from.id.0.to_string(),
        display_name: from.first_name.clone(),
        handle: from.username.clone().unwrap_or_default(),
        locale: from.language_code.clone().unwrap_or_default(),
    };

    info!(
        "update from {}: {}",
        user.id,
        text.chars().take(100).collect::<String>()
    );

    let gateway = TelegramGateway::new(bot);
    let reply = commands::route_incoming(&state, &gateway, &user, text).await;
    if let Err(e) = gateway
        .send_text(&msg.chat.id.0.to_string(), &reply, true)
        .await
    {
        warn!("reply delivery to chat {} failed: {e}", msg.chat.id);
    }

    Ok(())
}
