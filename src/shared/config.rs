use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub drafts: DraftConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Path of the lightweight reachability endpoint, relative to `base_url`.
    pub probe_path: String,
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub probe_interval_secs: u64,
    pub drain_interval_secs: u64,
    pub retry_sweep_interval_secs: u64,
    pub retry_delay_secs: u64,
    pub max_retries: u32,
    pub history_limit: usize,
    pub search_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftConfig {
    pub debounce_secs: u64,
    pub restore_window_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://data/gatehouse.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            remote: RemoteConfig {
                base_url: "http://localhost:8080/api".to_string(),
                probe_path: "health".to_string(),
                request_timeout_secs: 30,
                probe_timeout_secs: 5,
            },
            sync: SyncConfig {
                probe_interval_secs: 30,
                drain_interval_secs: 300, // 5 minutes
                retry_sweep_interval_secs: 60,
                retry_delay_secs: 5,
                max_retries: 3,
                history_limit: 50,
                search_limit: 25,
            },
            drafts: DraftConfig {
                debounce_secs: 2,
                restore_window_secs: 3600, // 1 hour
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("GATEHOUSE_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("GATEHOUSE_REMOTE_URL") {
            if !v.trim().is_empty() {
                cfg.remote.base_url = v.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("GATEHOUSE_PROBE_PATH") {
            if !v.trim().is_empty() {
                cfg.remote.probe_path = v.trim().trim_start_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("GATEHOUSE_PROBE_INTERVAL_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.probe_interval_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("GATEHOUSE_DRAIN_INTERVAL_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.drain_interval_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("GATEHOUSE_RETRY_DELAY_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.retry_delay_secs = value;
            }
        }
        if let Ok(v) = std::env::var("GATEHOUSE_MAX_RETRIES") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.max_retries = value.min(u32::MAX as u64) as u32;
            }
        }
        if let Ok(v) = std::env::var("GATEHOUSE_HISTORY_LIMIT") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.history_limit = value.max(1) as usize;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.remote.base_url.trim().is_empty() {
            return Err("Remote base_url must not be empty".to_string());
        }
        if self.remote.probe_timeout_secs == 0 {
            return Err("Remote probe_timeout_secs must be greater than 0".to_string());
        }
        if self.sync.max_retries == 0 {
            return Err("Sync max_retries must be greater than 0".to_string());
        }
        if self.sync.history_limit == 0 {
            return Err("Sync history_limit must be greater than 0".to_string());
        }
        if self.drafts.restore_window_secs == 0 {
            return Err("Draft restore_window_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn default_timings_match_engine_contract() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.sync.probe_interval_secs, 30);
        assert_eq!(cfg.remote.probe_timeout_secs, 5);
        assert_eq!(cfg.sync.drain_interval_secs, 300);
        assert_eq!(cfg.sync.retry_sweep_interval_secs, 60);
        assert_eq!(cfg.sync.retry_delay_secs, 5);
        assert_eq!(cfg.sync.max_retries, 3);
        assert_eq!(cfg.drafts.debounce_secs, 2);
        assert_eq!(cfg.drafts.restore_window_secs, 3600);
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let mut cfg = AppConfig::default();
        cfg.sync.max_retries = 0;
        assert!(cfg.validate().is_err());
    }
}
