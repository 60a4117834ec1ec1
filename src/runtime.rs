use std::sync::Arc;

use crate::config::Config;
use crate::directory::DirectoryIndex;
use crate::history::MessageHistoryStore;
use crate::keys;
use crate::kv::KeyValueStore;
use crate::stats::StatsAggregator;
use crate::users::UserRecordStore;

/// Shared handles injected into every update handler.
pub struct AppState {
    pub config: Config,
    pub users: UserRecordStore,
    pub history: MessageHistoryStore,
    pub stats: StatsAggregator,
    pub directory: DirectoryIndex,
}

impl AppState {
    pub fn new(config: Config, kv: Arc<dyn KeyValueStore>) -> Self {
        let users = UserRecordStore::new(kv.clone(), config.user_ttl_days * keys::SECS_PER_DAY);
        let history = MessageHistoryStore::new(
            kv.clone(),
            users.clone(),
            config.history_capacity,
            config.message_ttl_days * keys::SECS_PER_DAY,
            config.stats_ttl_days * keys::SECS_PER_DAY,
            config.message_text_cap,
        );
        let stats = StatsAggregator::new(kv.clone(), config.daily_command_budget);
        let directory = DirectoryIndex::new(kv);
        Self {
            config,
            users,
            history,
            stats,
            directory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn test_state_wires_configured_retention() {
        let mut config = Config::test_defaults();
        config.history_capacity = 2;
        let kv = Arc::new(MemoryKv::new());
        let state = AppState::new(config, kv);

        for i in 0..3 {
            state
                .history
                .append_message("1", &format!("m{i}"), crate::history::MessageKind::Text)
                .await
                .unwrap();
        }
        let events = state.history.get_history("1", 10).await.unwrap();
        assert_eq!(events.len(), 2);
    }
}
