use cuelab_domain::editor::EditorConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub store_path: String,
    pub lock_ttl_secs: u64,
    pub session_timeout_secs: u64,
    pub event_log_cap: usize,
    pub event_channel_capacity: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("store_path", "./data/documents")?
            .set_default("lock_ttl_secs", 300)?
            .set_default("session_timeout_secs", 1800)?
            .set_default("event_log_cap", 1000)?
            .set_default("event_channel_capacity", 256)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig {
            lock_ttl_ms: self.lock_ttl_secs as i64 * 1_000,
            session_timeout_ms: self.session_timeout_secs as i64 * 1_000,
            event_log_cap: self.event_log_cap,
            event_channel_capacity: self.event_channel_capacity,
        }
    }
}
