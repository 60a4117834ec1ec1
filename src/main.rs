use std::sync::Arc;
use std::time::Duration;

use pulsebot::config::Config;
use pulsebot::kv::{KeyValueStore, OfflineKv, RedisKv};
use pulsebot::runtime::AppState;
use pulsebot::{logging, telegram};
use teloxide::Bot;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_console_logging();

    let config = Config::load()?;
    info!("Starting PulseBot...");

    let kv: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => {
            match RedisKv::connect(
                url,
                Duration::from_secs(config.store_timeout_secs),
                config.daily_command_budget,
            )
            .await
            {
                Ok(store) => {
                    info!("Key/value store connected");
                    Arc::new(store)
                }
                Err(e) => {
                    warn!("Key/value store connection failed, running degraded: {e}");
                    Arc::new(OfflineKv)
                }
            }
        }
        None => {
            warn!("No redis_url configured; storage features are disabled");
            Arc::new(OfflineKv)
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);
    let state = AppState::new(config, kv);

    let used = state.stats.commands_used_today().await;
    info!(
        "Store command budget: {}/{} used today",
        used,
        state.stats.daily_command_budget()
    );

    telegram::run_bot(state, bot).await?;

    Ok(())
}
