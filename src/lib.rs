pub mod broadcast;
pub mod commands;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod runtime;
pub mod telegram;

pub use pulsebot_core::error;
pub use pulsebot_core::text;
pub use pulsebot_storage::directory;
pub use pulsebot_storage::history;
pub use pulsebot_storage::keys;
pub use pulsebot_storage::kv;
pub use pulsebot_storage::stats;
pub use pulsebot_storage::users;
