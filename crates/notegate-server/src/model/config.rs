//! Configuration management for the Notegate server
//!
//! Configuration is loaded from `conf/notegate.yml` (optional), the
//! `NOTEGATE_*` environment and command-line overrides. Every tunable of
//! the admission layer is exposed through a getter with a documented
//! default.

use std::time::Duration;

use clap::Parser;
use config::{Config, Environment};

use notegate_core::{RateLimitPolicy, RouteLimit};

use crate::startup::logging::LoggingConfig;

const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_DAILY_WRITE_QUOTA: u32 = 100;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;
const DEFAULT_LOCK_TTL_SECONDS: u64 = 10;
const DEFAULT_TOKEN_EXPIRE_SECONDS: i64 = 18000;

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "notegate-server")]
struct Cli {
    #[arg(short, long)]
    address: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(long = "token-secret", env = "NOTEGATE_TOKEN_SECRET")]
    token_secret: Option<String>,
}

/// Application configuration loaded from config file and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new() -> Self {
        let args = Cli::parse();
        let mut config_builder = Config::builder()
            .add_source(
                Environment::with_prefix("notegate")
                    .separator(".")
                    .try_parsing(true),
            )
            .add_source(config::File::with_name("conf/notegate.yml").required(false));

        if let Some(v) = args.address {
            config_builder = config_builder
                .set_override("server.address", v)
                .expect("Failed to set server address override");
        }
        if let Some(v) = args.port {
            config_builder = config_builder
                .set_override("server.port", v)
                .expect("Failed to set server port override");
        }
        if let Some(v) = args.token_secret {
            config_builder = config_builder
                .set_override("auth.token_secret", v)
                .expect("Failed to set token secret override");
        }

        let config = config_builder
            .build()
            .expect("Failed to build configuration - check conf/notegate.yml");

        Configuration { config }
    }

    /// Wrap an already-built `Config` (used by tests and embedders).
    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or("0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("server.port")
            .unwrap_or(DEFAULT_SERVER_PORT.into()) as u16
    }

    // ========================================================================
    // Identity Configuration
    // ========================================================================

    pub fn token_secret(&self) -> String {
        self.config
            .get_string("auth.token_secret")
            .unwrap_or("notegate".to_string())
    }

    pub fn token_expire_seconds(&self) -> i64 {
        self.config
            .get_int("auth.token_expire_seconds")
            .unwrap_or(DEFAULT_TOKEN_EXPIRE_SECONDS)
    }

    // ========================================================================
    // Admission Configuration
    // ========================================================================

    /// Routes that bypass the admission pipeline entirely.
    pub fn public_paths(&self) -> Vec<String> {
        self.config
            .get_array("admission.public_paths")
            .map(|values| {
                values
                    .into_iter()
                    .filter_map(|v| v.into_string().ok())
                    .collect()
            })
            .unwrap_or_else(|_| vec!["/".to_string(), "/health".to_string()])
    }

    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths().iter().any(|p| p == path)
    }

    fn default_route_limit(&self) -> RouteLimit {
        let fallback = RouteLimit::default();
        RouteLimit {
            capacity: self
                .config
                .get_int("admission.rate_limit.capacity")
                .unwrap_or(fallback.capacity.into()) as u32,
            window_seconds: self
                .config
                .get_int("admission.rate_limit.window_seconds")
                .unwrap_or(fallback.window_seconds as i64) as u64,
        }
    }

    /// Per-route rate limits from the `admission.routes` table, each entry
    /// a `{ capacity, window_seconds }` pair keyed by route prefix.
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        let default = self.default_route_limit();
        let mut policy = RateLimitPolicy::new(default);

        if let Ok(table) = self.config.get_table("admission.routes") {
            for (route, value) in table {
                if let Ok(entry) = value.into_table() {
                    let capacity = entry
                        .get("capacity")
                        .and_then(|v| v.clone().into_int().ok())
                        .unwrap_or(default.capacity.into())
                        as u32;
                    let window_seconds = entry
                        .get("window_seconds")
                        .and_then(|v| v.clone().into_int().ok())
                        .unwrap_or(default.window_seconds as i64)
                        as u64;
                    policy = policy.with_route(
                        route,
                        RouteLimit {
                            capacity,
                            window_seconds,
                        },
                    );
                }
            }
        }

        policy
    }

    pub fn daily_write_quota(&self) -> u32 {
        self.config
            .get_int("admission.quota.daily_limit")
            .unwrap_or(DEFAULT_DAILY_WRITE_QUOTA.into()) as u32
    }

    // ========================================================================
    // Cache Configuration
    // ========================================================================

    pub fn list_cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.config
                .get_int("cache.list_ttl_seconds")
                .unwrap_or(DEFAULT_CACHE_TTL_SECONDS as i64) as u64,
        )
    }

    pub fn detail_cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.config
                .get_int("cache.detail_ttl_seconds")
                .unwrap_or(DEFAULT_CACHE_TTL_SECONDS as i64) as u64,
        )
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    /// Lock TTL: the crashed-holder safety net. Must exceed the expected
    /// critical-section duration.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(
            self.config
                .get_int("lock.ttl_seconds")
                .unwrap_or(DEFAULT_LOCK_TTL_SECONDS as i64) as u64,
        )
    }

    // ========================================================================
    // Event Configuration
    // ========================================================================

    pub fn notes_channel(&self) -> String {
        self.config
            .get_string("events.channel")
            .unwrap_or(notegate_common::NOTES_CHANNEL.to_string())
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(true),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
        )
    }
}
