use contracts::enums::platform::Platform;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Worker pool, retry policy and adapter limits
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestionConfig {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: i32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub http_timeout_secs: u64,
    pub page_delay_ms: u64,
    /// Incremental pulls re-read this many days before the last sync
    pub pull_lookback_days: u32,
    pub visibility_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 1000,
            max_attempts: 5,
            backoff_base_secs: 30,
            backoff_cap_secs: 3600,
            http_timeout_secs: 30,
            page_delay_ms: 500,
            pull_lookback_days: 30,
            visibility_timeout_secs: 600,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl IngestionConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn pull_lookback(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.pull_lookback_days))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

/// Cron expressions (with seconds field) for the in-process scheduler
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub ingestion_sweep: String,
    pub daily_analytics: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ingestion_sweep: "0 0 3 * * *".to_string(),
            daily_analytics: "0 30 4 * * *".to_string(),
        }
    }
}

/// Shared secret for the externally triggered cron endpoints
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CronConfig {
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhooksConfig {
    /// platform code -> HMAC secret
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

impl WebhooksConfig {
    pub fn secret_for(&self, platform: Platform) -> Option<&str> {
        self.secrets
            .get(platform.code())
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlatformsConfig {
    pub gumroad_base_url: String,
    pub payhip_base_url: String,
    pub lulu_base_url: String,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            gumroad_base_url: "https://api.gumroad.com".to_string(),
            payhip_base_url: "https://payhip.com".to_string(),
            lulu_base_url: "https://api.lulu.com".to_string(),
        }
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[database]
path = "target/db/authorstack.db"

[server]
host = "0.0.0.0"
port = 3000

[ingestion]
workers = 4
max_attempts = 5
backoff_base_secs = 30
backoff_cap_secs = 3600
http_timeout_secs = 30
page_delay_ms = 500
pull_lookback_days = 30
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. `$AUTHORSTACK_CONFIG`
/// 2. Next to the executable (for production)
/// 3. Falls back to embedded default config
pub fn load_config() -> anyhow::Result<Config> {
    if let Ok(explicit) = std::env::var("AUTHORSTACK_CONFIG") {
        let config_path = PathBuf::from(explicit);
        tracing::info!("Loading config from: {}", config_path.display());
        let contents = std::fs::read_to_string(&config_path)?;
        return parse_config(&contents);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                return parse_config(&contents);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    parse_config(DEFAULT_CONFIG)
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(contents)?;
    if config.ingestion.max_attempts < 1 {
        anyhow::bail!("ingestion.max_attempts must be at least 1");
    }
    if config.ingestion.workers == 0 {
        anyhow::bail!("ingestion.workers must be at least 1");
    }
    for code in config.webhooks.secrets.keys() {
        if Platform::from_code(code).is_none() {
            tracing::warn!("Webhook secret configured for unknown platform '{}'", code);
        }
    }
    Ok(config)
}

/// Get the database file path from configuration
/// Resolves relative paths relative to the executable directory
pub fn get_database_path(config: &Config) -> anyhow::Result<PathBuf> {
    let db_path_str = &config.database.path;
    let db_path = Path::new(db_path_str);

    if db_path.is_absolute() {
        return Ok(db_path.to_path_buf());
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return Ok(exe_dir.join(db_path));
        }
    }

    Ok(PathBuf::from(db_path_str))
}
