//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by `ROUTESLOT_CONFIG` env var
//! 3. **Environment variables**: `ROUTESLOT__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: provider/admin HTTP listeners
//! - [`SlotsConfig`]: the two slot reservations
//! - [`HealthThresholds`]: latency breakpoints for the health curve
//! - [`SelectionConfig`]: eligibility gates and scoring weights
//! - [`AssignmentConfig`]: cooldown, quarantine, and stale-lock settings
//! - [`StoreConfig`]: proxy database location
//! - [`EngineConfig`]: routing-engine process and control API
//! - [`LoggingConfig`]: log level and format
//!
//! The resolved [`AppConfig`] is immutable; components receive the section they need
//! at construction time.
//!
//! # Example
//!
//! ```toml
//! [slots]
//! others = 1000
//! dedicated = 200
//!
//! [engine]
//! binary = "/usr/local/bin/mihomo"
//! controller_port = 9090
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the provider and admin listeners bind to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the routing engine fetches provider documents from. Defaults to `18080`.
    #[serde(default = "default_provider_port")]
    pub provider_port: u16,

    /// Port for the admin API. Defaults to `18081`.
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    /// Maximum in-flight admin requests. Defaults to `512`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_provider_port() -> u16 {
    18080
}

fn default_admin_port() -> u16 {
    18081
}

fn default_max_concurrent_requests() -> usize {
    512
}

/// Slot namespace partition. `others` covers `[1, others]`, `dedicated` covers the
/// following `dedicated` indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsConfig {
    /// Size of the `OTHERS` reservation. Defaults to `1000`.
    #[serde(default = "default_others_slots")]
    pub others: u32,

    /// Size of the `DEDICATED` reservation. Defaults to `200`.
    #[serde(default = "default_dedicated_slots")]
    pub dedicated: u32,
}

fn default_others_slots() -> u32 {
    1000
}

fn default_dedicated_slots() -> u32 {
    200
}

impl SlotsConfig {
    /// Total number of slot identities.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.others.saturating_add(self.dedicated)
    }
}

/// Latency breakpoints (milliseconds) of the piecewise-linear health curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HealthThresholds {
    /// Below this latency the health score is 100. Defaults to `300`.
    #[serde(default = "default_excellent_ms")]
    pub excellent_ms: u64,

    /// End of the 100→80 segment. Defaults to `800`.
    #[serde(default = "default_good_ms")]
    pub good_ms: u64,

    /// End of the 80→50 segment. Defaults to `2000`.
    #[serde(default = "default_acceptable_ms")]
    pub acceptable_ms: u64,

    /// At or above this latency the health score is 0. Defaults to `5000`.
    #[serde(default = "default_failed_ms")]
    pub failed_ms: u64,
}

fn default_excellent_ms() -> u64 {
    300
}
fn default_good_ms() -> u64 {
    800
}
fn default_acceptable_ms() -> u64 {
    2000
}
fn default_failed_ms() -> u64 {
    5000
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self { excellent_ms: 300, good_ms: 800, acceptable_ms: 2000, failed_ms: 5000 }
    }
}

/// Weights of the three score components.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeights {
    pub health: f64,
    pub success_rate: f64,
    pub fairness: f64,
}

impl ScoreWeights {
    /// Weights used when the caller prefers high-quality proxies.
    #[must_use]
    pub const fn high_quality() -> Self {
        Self { health: 0.6, success_rate: 0.3, fairness: 0.1 }
    }

    /// Weights used for regular selection.
    #[must_use]
    pub const fn balanced() -> Self {
        Self { health: 0.4, success_rate: 0.4, fairness: 0.2 }
    }
}

fn default_high_quality_weights() -> ScoreWeights {
    ScoreWeights::high_quality()
}

fn default_balanced_weights() -> ScoreWeights {
    ScoreWeights::balanced()
}

/// Proxy eligibility gates and scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionConfig {
    /// Minimum `health_quality` for tested proxies. Untested proxies are always eligible.
    /// Defaults to `30.0`.
    #[serde(default = "default_min_health_quality")]
    pub min_health_quality: f64,

    /// Minimum success rate (0-100) for proxies that have history. `0` disables the gate.
    #[serde(default)]
    pub min_success_rate: f64,

    #[serde(default = "default_high_quality_weights")]
    pub high_quality_weights: ScoreWeights,

    #[serde(default = "default_balanced_weights")]
    pub balanced_weights: ScoreWeights,

    /// Latency breakpoints shared with the assignment registry.
    #[serde(default)]
    pub health: HealthThresholds,
}

fn default_min_health_quality() -> f64 {
    30.0
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_health_quality: 30.0,
            min_success_rate: 0.0,
            high_quality_weights: ScoreWeights::high_quality(),
            balanced_weights: ScoreWeights::balanced(),
            health: HealthThresholds::default(),
        }
    }
}

/// Binding lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Seconds a released proxy stays ineligible. Defaults to `60`.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Failures after which a proxy is quarantined. Defaults to `5`.
    #[serde(default = "default_max_fail_before_quarantine")]
    pub max_fail_before_quarantine: u64,

    /// Selection attempts when concurrent callers win the claim race. Defaults to `5`.
    #[serde(default = "default_claim_retries")]
    pub claim_retries: u32,

    /// Claims older than this without a release are reclaimed. Defaults to `1800`.
    #[serde(default = "default_stale_lock_seconds")]
    pub stale_lock_seconds: u64,

    /// Interval of the stale-lock sweep. Defaults to `60`.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Whether `assign` asks the selector for high-quality weighting. Defaults to `true`.
    #[serde(default = "default_prefer_high_quality")]
    pub prefer_high_quality: bool,
}

fn default_cooldown_seconds() -> u64 {
    60
}
fn default_max_fail_before_quarantine() -> u64 {
    5
}
fn default_claim_retries() -> u32 {
    5
}
fn default_stale_lock_seconds() -> u64 {
    1800
}
fn default_sweep_interval_seconds() -> u64 {
    60
}
fn default_prefer_high_quality() -> bool {
    true
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 60,
            max_fail_before_quarantine: 5,
            claim_retries: 5,
            stale_lock_seconds: 1800,
            sweep_interval_seconds: 60,
            prefer_high_quality: true,
        }
    }
}

impl AssignmentConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    #[must_use]
    pub fn stale_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_lock_seconds)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Proxy store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `SQLite` database URL. Defaults to `sqlite://./db/proxies.db?mode=rwc`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Connection pool size. Defaults to `8`.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://./db/proxies.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    8
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_url: default_database_url(), max_connections: 8 }
    }
}

/// Routing-engine process, control API, and startup verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine executable. Defaults to `mihomo` (resolved through `PATH`).
    #[serde(default = "default_engine_binary")]
    pub binary: PathBuf,

    /// Directory passed to the engine with `-d`.
    #[serde(default = "default_engine_config_dir")]
    pub config_dir: PathBuf,

    /// File name of the generated configuration inside `config_dir`.
    #[serde(default = "default_engine_config_file")]
    pub config_file: String,

    #[serde(default = "default_controller_host")]
    pub controller_host: String,

    #[serde(default = "default_controller_port")]
    pub controller_port: u16,

    /// Bearer secret for the control API.
    #[serde(default)]
    pub controller_secret: Option<String>,

    /// Name of the TUN device the engine is asked to create.
    #[serde(default = "default_tun_device")]
    pub tun_device: String,

    /// Substrings used to recognise the engine's interface.
    #[serde(default = "default_interface_patterns")]
    pub interface_patterns: Vec<String>,

    /// Host route injected through the TUN device.
    #[serde(default = "default_route_cidr")]
    pub route_cidr: String,

    #[serde(default = "default_interface_timeout_seconds")]
    pub interface_timeout_seconds: u64,

    #[serde(default = "default_api_timeout_seconds")]
    pub api_timeout_seconds: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Slot used by the startup smoke test.
    #[serde(default = "default_smoke_test_slot")]
    pub smoke_test_slot: u32,

    /// Attempts for control-API commands during the smoke test.
    #[serde(default = "default_switch_attempts")]
    pub switch_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Provider refresh interval written into the engine configuration.
    #[serde(default = "default_provider_interval_seconds")]
    pub provider_interval_seconds: u64,

    /// Slot `n` gets a local mixed listener on `listener_base_port + n`.
    #[serde(default = "default_listener_base_port")]
    pub listener_base_port: u16,

    /// File receiving every engine output line.
    #[serde(default = "default_engine_log_path")]
    pub log_path: PathBuf,

    /// Emit the provider-initialization counter every N providers...
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    /// ...or after this many milliseconds, whichever comes first.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_engine_binary() -> PathBuf {
    PathBuf::from("mihomo")
}
fn default_engine_config_dir() -> PathBuf {
    PathBuf::from("./engine")
}
fn default_engine_config_file() -> String {
    "config.yaml".to_string()
}
fn default_controller_host() -> String {
    "127.0.0.1".to_string()
}
fn default_controller_port() -> u16 {
    9090
}
fn default_tun_device() -> String {
    "routeslot0".to_string()
}
fn default_interface_patterns() -> Vec<String> {
    vec!["routeslot".to_string(), "tun".to_string(), "mihomo".to_string()]
}
fn default_route_cidr() -> String {
    "198.18.0.0/15".to_string()
}
fn default_interface_timeout_seconds() -> u64 {
    30
}
fn default_api_timeout_seconds() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_smoke_test_slot() -> u32 {
    1
}
fn default_switch_attempts() -> u32 {
    4
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    4000
}
fn default_provider_interval_seconds() -> u64 {
    30
}
fn default_listener_base_port() -> u16 {
    20000
}
fn default_engine_log_path() -> PathBuf {
    PathBuf::from("./logs/engine.log")
}
fn default_progress_every() -> u64 {
    100
}
fn default_progress_interval_ms() -> u64 {
    2000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            config_dir: default_engine_config_dir(),
            config_file: default_engine_config_file(),
            controller_host: default_controller_host(),
            controller_port: default_controller_port(),
            controller_secret: None,
            tun_device: default_tun_device(),
            interface_patterns: default_interface_patterns(),
            route_cidr: default_route_cidr(),
            interface_timeout_seconds: default_interface_timeout_seconds(),
            api_timeout_seconds: default_api_timeout_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            smoke_test_slot: default_smoke_test_slot(),
            switch_attempts: default_switch_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            provider_interval_seconds: default_provider_interval_seconds(),
            listener_base_port: default_listener_base_port(),
            log_path: default_engine_log_path(),
            progress_every: default_progress_every(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Full path of the generated engine configuration.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(&self.config_file)
    }

    /// Base URL of the engine's control API.
    #[must_use]
    pub fn controller_url(&self) -> String {
        format!("http://{}:{}", self.controller_host, self.controller_port)
    }

    #[must_use]
    pub fn interface_timeout(&self) -> Duration {
        Duration::from_secs(self.interface_timeout_seconds)
    }

    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Root application configuration containing all subsystem settings.
///
/// Loaded with the `ROUTESLOT` prefix for environment overrides using `__` as a separator
/// (e.g. `ROUTESLOT__SLOTS__OTHERS=500`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment. Defaults to `"development"`.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub slots: SlotsConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub assignment: AssignmentConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            provider_port: default_provider_port(),
            admin_port: default_admin_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self { others: default_others_slots(), dedicated: default_dedicated_slots() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: ServerConfig::default(),
            slots: SlotsConfig::default(),
            selection: SelectionConfig::default(),
            assignment: AssignmentConfig::default(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("ROUTESLOT").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The path can be overridden with the `ROUTESLOT_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("ROUTESLOT_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Socket address of the provider listener.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn provider_addr(&self) -> Result<SocketAddr, String> {
        Self::parse_addr(&self.server.bind_address, self.server.provider_port)
    }

    /// Socket address of the admin listener.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn admin_addr(&self) -> Result<SocketAddr, String> {
        Self::parse_addr(&self.server.bind_address, self.server.admin_port)
    }

    fn parse_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
        format!("{host}:{port}")
            .parse()
            .map_err(|_| format!("Invalid socket address: {host}:{port}"))
    }

    /// URL the routing engine uses to reach the provider listener.
    #[must_use]
    pub fn provider_base_url(&self) -> String {
        let host = match self.server.bind_address.as_str() {
            "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
            other => other,
        };
        format!("http://{host}:{}", self.server.provider_port)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.slots.total() == 0 {
            return Err("At least one slot must be reserved (slots.others + slots.dedicated)"
                .to_string());
        }

        let h = &self.selection.health;
        if !(h.excellent_ms < h.good_ms && h.good_ms < h.acceptable_ms && h.acceptable_ms < h.failed_ms)
        {
            return Err(format!(
                "Health thresholds must be strictly increasing, got {}/{}/{}/{}",
                h.excellent_ms, h.good_ms, h.acceptable_ms, h.failed_ms
            ));
        }

        if !(0.0..=100.0).contains(&self.selection.min_health_quality) {
            return Err("selection.min_health_quality must be within 0..=100".to_string());
        }

        if !(0.0..=100.0).contains(&self.selection.min_success_rate) {
            return Err("selection.min_success_rate must be within 0..=100".to_string());
        }

        if self.assignment.max_fail_before_quarantine == 0 {
            return Err("assignment.max_fail_before_quarantine must be greater than 0".to_string());
        }

        if self.assignment.claim_retries == 0 {
            return Err("assignment.claim_retries must be greater than 0".to_string());
        }

        if self.assignment.sweep_interval_seconds == 0 {
            return Err("assignment.sweep_interval_seconds must be greater than 0".to_string());
        }

        if self.engine.smoke_test_slot == 0 || self.engine.smoke_test_slot > self.slots.total() {
            return Err(format!(
                "engine.smoke_test_slot {} is outside the slot range 1..={}",
                self.engine.smoke_test_slot,
                self.slots.total()
            ));
        }

        if self.engine.switch_attempts == 0 {
            return Err("engine.switch_attempts must be greater than 0".to_string());
        }

        if self.engine.interface_patterns.is_empty() {
            return Err("engine.interface_patterns cannot be empty".to_string());
        }

        if u32::from(self.engine.listener_base_port) + self.slots.total() > u32::from(u16::MAX) {
            return Err(format!(
                "engine.listener_base_port {} leaves no room for {} slot listeners",
                self.engine.listener_base_port,
                self.slots.total()
            ));
        }

        if self.server.provider_port == 0 || self.server.admin_port == 0 {
            return Err("Provider and admin ports must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
