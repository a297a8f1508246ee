use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub shrinkage: ShrinkageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the play-by-play provider
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-call HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per call, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Shared cooldown after the first 429, doubled per consecutive 429
    #[serde(default = "default_cooldown_base_secs")]
    pub cooldown_base_secs: u64,
    #[serde(default = "default_cooldown_max_secs")]
    pub cooldown_max_secs: u64,
}

fn default_base_url() -> String {
    "https://api-web.nhle.com".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    4000
}

fn default_cooldown_base_secs() -> u64 {
    5
}

fn default_cooldown_max_secs() -> u64 {
    120
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            cooldown_base_secs: default_cooldown_base_secs(),
            cooldown_max_secs: default_cooldown_max_secs(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
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

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between iterations while any game is live
    #[serde(default = "default_active_interval_secs")]
    pub active_interval_secs: u64,
    /// Sleep between iterations while nothing is live
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,
    /// Minimum seconds between two fetches of the same game when its
    /// freshness marker has not changed
    #[serde(default = "default_game_cooldown_secs")]
    pub game_cooldown_secs: u64,
    /// Re-evaluate the cadence every N iterations
    #[serde(default = "default_cadence_reevaluate_every")]
    pub cadence_reevaluate_every: u32,
    /// Also poll this many previous dates (late games cross midnight UTC)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// A processing pass ignores games fetched more recently than this
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Settled, unprocessed games retried after each cycle
    #[serde(default = "default_retry_batch")]
    pub retry_batch: usize,
}

fn default_active_interval_secs() -> u64 {
    30
}

fn default_idle_interval_secs() -> u64 {
    600
}

fn default_game_cooldown_secs() -> u64 {
    60
}

fn default_cadence_reevaluate_every() -> u32 {
    5
}

fn default_lookback_days() -> u32 {
    1
}

fn default_settle_secs() -> u64 {
    300
}

fn default_retry_batch() -> usize {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            active_interval_secs: default_active_interval_secs(),
            idle_interval_secs: default_idle_interval_secs(),
            game_cooldown_secs: default_game_cooldown_secs(),
            cadence_reevaluate_every: default_cadence_reevaluate_every(),
            lookback_days: default_lookback_days(),
            settle_secs: default_settle_secs(),
            retry_batch: default_retry_batch(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    /// Concurrent per-game workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Page size when listing unprocessed games
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    200
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
        }
    }
}

/// Temporal windows used by the event feature extractor
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_lookback_events")]
    pub lookback_events: usize,
    #[serde(default = "default_rebound_window_secs")]
    pub rebound_window_secs: f64,
    #[serde(default = "default_pass_window_secs")]
    pub pass_window_secs: f64,
}

fn default_lookback_events() -> usize {
    15
}

fn default_rebound_window_secs() -> f64 {
    3.0
}

fn default_pass_window_secs() -> f64 {
    3.0
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            lookback_events: default_lookback_events(),
            rebound_window_secs: default_rebound_window_secs(),
            pass_window_secs: default_pass_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    pub xg_model_path: PathBuf,
    pub xg_manifest_path: PathBuf,
    pub xa_model_path: PathBuf,
    pub xa_manifest_path: PathBuf,
    /// Rebound-of-rebound shots closer than this to their source are damped
    #[serde(default = "default_flurry_window_secs")]
    pub flurry_window_secs: f64,
}

fn default_flurry_window_secs() -> f64 {
    1.5
}

/// Prior strengths (pseudo-sample sizes) per entity type
#[derive(Debug, Clone, Deserialize)]
pub struct ShrinkageConfig {
    #[serde(default = "default_goalie_prior_strength")]
    pub goalie_prior_strength: f64,
    #[serde(default = "default_shooter_prior_strength")]
    pub shooter_prior_strength: f64,
    /// Allowed |Σ n·(raw − prior)| / Σ n before the prior is flagged
    #[serde(default = "default_consistency_tolerance")]
    pub consistency_tolerance: f64,
}

fn default_goalie_prior_strength() -> f64 {
    400.0
}

fn default_shooter_prior_strength() -> f64 {
    150.0
}

fn default_consistency_tolerance() -> f64 {
    1e-6
}

impl Default for ShrinkageConfig {
    fn default() -> Self {
        Self {
            goalie_prior_strength: default_goalie_prior_strength(),
            shooter_prior_strength: default_shooter_prior_strength(),
            consistency_tolerance: default_consistency_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Optional directory for a daily rolling log file
    #[serde(default)]
    pub directory: Option<PathBuf>,
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
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .set_default("scoring.flurry_window_secs", default_flurry_window_secs())?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("RINK_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (RINK_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("RINK")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.upstream.max_attempts == 0 {
            errors.push("upstream.max_attempts must be at least 1".to_string());
        }
        if self.upstream.timeout_secs == 0 {
            errors.push("upstream.timeout_secs must be positive".to_string());
        }
        if self.upstream.cooldown_base_secs > self.upstream.cooldown_max_secs {
            errors.push("upstream.cooldown_base_secs exceeds cooldown_max_secs".to_string());
        }

        if self.scheduler.active_interval_secs == 0 || self.scheduler.idle_interval_secs == 0 {
            errors.push("scheduler intervals must be positive".to_string());
        }
        if self.scheduler.active_interval_secs > self.scheduler.idle_interval_secs {
            errors.push(
                "scheduler.active_interval_secs should not exceed idle_interval_secs".to_string(),
            );
        }
        if self.scheduler.retry_batch == 0 {
            errors.push("scheduler.retry_batch must be at least 1".to_string());
        }
        if self.scheduler.cadence_reevaluate_every == 0 {
            errors.push("scheduler.cadence_reevaluate_every must be at least 1".to_string());
        }

        if self.backfill.workers == 0 {
            errors.push("backfill.workers must be at least 1".to_string());
        }

        if self.extraction.lookback_events == 0 {
            errors.push("extraction.lookback_events must be at least 1".to_string());
        }
        if !(self.extraction.rebound_window_secs > 0.0) {
            errors.push("extraction.rebound_window_secs must be positive".to_string());
        }
        if !(self.extraction.pass_window_secs > 0.0) {
            errors.push("extraction.pass_window_secs must be positive".to_string());
        }
        if !(self.scoring.flurry_window_secs >= 0.0) {
            errors.push("scoring.flurry_window_secs must be non-negative".to_string());
        }

        if !(self.shrinkage.goalie_prior_strength > 0.0)
            || !(self.shrinkage.shooter_prior_strength > 0.0)
        {
            errors.push("shrinkage prior strengths must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
