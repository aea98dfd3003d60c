use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub screener: ScreenerConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// API server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Batched-scan orchestration parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Initial symbols claimed per step
    pub batch_size: u32,
    /// Lower bound for adaptive batch sizing
    pub min_batch_size: u32,
    /// Upper bound for adaptive batch sizing
    pub max_batch_size: u32,
    /// Concurrent symbol evaluations within one step
    pub concurrency: usize,
    /// Per-symbol evaluation timeout in milliseconds
    pub symbol_timeout_ms: u64,
    /// Host invocation wall-clock budget in milliseconds
    pub invocation_budget_ms: u64,
    /// Safety margin subtracted from the budget before stepping
    pub safety_margin_ms: u64,
    /// Minimum hours between completed full scans (unforced starts)
    pub restart_cooldown_hours: u64,
    /// Maximum symbols accepted by a quick scan
    pub quick_scan_limit: usize,
    /// Optional path to a universe file (one symbol per line)
    #[serde(default)]
    pub universe_file: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            min_batch_size: 5,
            max_batch_size: 100,
            concurrency: 8,
            symbol_timeout_ms: 5_000,
            invocation_budget_ms: 9_000,
            safety_margin_ms: 500,
            restart_cooldown_hours: 4,
            quick_scan_limit: 10,
            universe_file: None,
        }
    }
}

impl ScanConfig {
    pub fn symbol_timeout(&self) -> Duration {
        Duration::from_millis(self.symbol_timeout_ms)
    }

    /// Wall-clock budget available to one step after the safety margin.
    pub fn step_budget(&self) -> Duration {
        Duration::from_millis(self.invocation_budget_ms.saturating_sub(self.safety_margin_ms))
    }
}

/// Trend-template thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenerConfig {
    /// Criterion 8: minimum percent above the 52-week low
    pub min_pct_above_low: f64,
    /// Criterion 9: maximum percent below the 52-week high
    pub max_pct_from_high: f64,
    /// Trading days between the two 200-SMA samples for the trend check
    pub trend_lookback_days: usize,
    /// Minimum closes required to evaluate a symbol at all
    pub min_history_days: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            min_pct_above_low: 30.0,
            max_pct_from_high: 25.0,
            trend_lookback_days: 22,
            min_history_days: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// Chart API base URL
    pub base_url: String,
    /// Exchange suffix appended to bare symbols
    pub exchange_suffix: String,
    /// HTTP client timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            exchange_suffix: ".NS".to_string(),
            request_timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelegramConfig {
    /// Bot token; notifications are disabled when unset
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Chat ids seeded into the subscriber registry at startup
    #[serde(default)]
    pub chat_ids: Vec<String>,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRENDSCAN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRENDSCAN_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("TRENDSCAN")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.scan.batch_size == 0 {
            errors.push("scan.batch_size must be positive".to_string());
        }

        if self.scan.min_batch_size == 0 || self.scan.min_batch_size > self.scan.max_batch_size {
            errors.push("scan.min_batch_size must be in 1..=scan.max_batch_size".to_string());
        }

        if self.scan.concurrency == 0 {
            errors.push("scan.concurrency must be positive".to_string());
        }

        if self.scan.safety_margin_ms >= self.scan.invocation_budget_ms {
            errors.push(
                "scan.safety_margin_ms must be smaller than scan.invocation_budget_ms".to_string(),
            );
        }

        if self.scan.quick_scan_limit == 0 {
            errors.push("scan.quick_scan_limit must be positive".to_string());
        }

        if self.screener.min_pct_above_low < 0.0 {
            errors.push("screener.min_pct_above_low must be non-negative".to_string());
        }

        if !(0.0..=100.0).contains(&self.screener.max_pct_from_high) {
            errors.push("screener.max_pct_from_high must be between 0 and 100".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
