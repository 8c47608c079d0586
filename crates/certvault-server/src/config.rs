//! Configuration management for the Certvault server
//!
//! Values come from `conf/application.yml` (optional), then environment
//! variables prefixed with `CERTVAULT_` (nested keys separated by `__`, e.g.
//! `CERTVAULT_DB__HOST`), then command line flags.

use std::time::Duration;

use anyhow::{Context, anyhow};
use certvault_persistence::{
    DEFAULT_LOCK_TIMEOUT, DEFAULT_PORT, DEFAULT_QUERY_TIMEOUT, PoolOptions, StorageOptions,
    parse_isolation_level,
};
use clap::Parser;
use config::{Config, Environment, File};

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "certvault-server", about = "SQL-backed certificate storage demo server")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
    /// Full database URL, overrides the db.* connection fields
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    /// Create the tables from the built-in schema on startup
    #[arg(long = "provision")]
    pub provision: bool,
    /// SQL script to execute on startup
    #[arg(long = "schema-file")]
    pub schema_file: Option<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration using the process arguments.
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name(&args.config_file).required(false))
            .add_source(
                Environment::with_prefix("CERTVAULT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.database_url {
            builder = builder.set_override("db.url", v)?;
        }
        if let Some(v) = args.port {
            builder = builder.set_override("server.port", i64::from(v))?;
        }
        if args.provision {
            builder = builder.set_override("storage.provision_schema", true)?;
        }
        if let Some(v) = args.schema_file {
            builder = builder.set_override("storage.schema_file", v)?;
        }

        let config = builder
            .build()
            .with_context(|| format!("failed to build configuration from {}", args.config_file))?;

        Ok(Configuration { config })
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
            .ok()
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    // ========================================================================
    // Storage Configuration
    // ========================================================================

    pub fn provision_schema(&self) -> bool {
        self.config
            .get_bool("storage.provision_schema")
            .unwrap_or(false)
    }

    pub fn schema_file(&self) -> Option<String> {
        self.config
            .get_string("storage.schema_file")
            .ok()
            .filter(|s| !s.is_empty())
    }

    pub fn lock_timeout(&self) -> Duration {
        self.duration_ms("storage.lock_timeout_ms")
            .unwrap_or(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn query_timeout(&self) -> Duration {
        self.duration_ms("storage.query_timeout_ms")
            .unwrap_or(DEFAULT_QUERY_TIMEOUT)
    }

    pub fn storage_options(&self) -> anyhow::Result<StorageOptions> {
        let port = self.config.get_int("db.port").unwrap_or(DEFAULT_PORT as i64);
        let port = u16::try_from(port).map_err(|_| anyhow!("db.port {} is out of range", port))?;

        let isolation = match self.optional_string("db.isolation") {
            Some(value) => parse_isolation_level(&value)
                .ok_or_else(|| anyhow!("unknown db.isolation level '{}'", value))?,
            None => StorageOptions::default().isolation,
        };

        let defaults = PoolOptions::default();
        let pool = PoolOptions {
            max_connections: self.pool_u32("db.pool.max_connections", defaults.max_connections),
            min_connections: self.pool_u32("db.pool.min_connections", defaults.min_connections),
            connect_timeout: self.pool_secs("db.pool.connect_timeout_secs", defaults.connect_timeout),
            acquire_timeout: self.pool_secs("db.pool.acquire_timeout_secs", defaults.acquire_timeout),
            idle_timeout: self.pool_secs("db.pool.idle_timeout_secs", defaults.idle_timeout),
            max_lifetime: self.pool_secs("db.pool.max_lifetime_secs", defaults.max_lifetime),
        };

        let mut options = StorageOptions::new(
            &self
                .config
                .get_string("db.user")
                .unwrap_or("certvault".to_string()),
            &self
                .config
                .get_string("db.host")
                .unwrap_or("localhost".to_string()),
            port,
            &self
                .config
                .get_string("db.database")
                .unwrap_or("certvault".to_string()),
        )
        .with_lock_timeout(self.lock_timeout())
        .with_query_timeout(self.query_timeout())
        .with_isolation(isolation)
        .with_pool(pool);

        options.password = self.optional_string("db.password");
        options.cert = self.optional_string("db.sslcert");
        options.key = self.optional_string("db.sslkey");
        options.root_cert = self.optional_string("db.sslrootcert");
        options.url = self.optional_string("db.url");
        options.sql_logging = self.config.get_bool("db.sql_logging").unwrap_or(false);

        Ok(options)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.optional_string("logging.path"),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(false),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
        )
    }

    fn optional_string(&self, key: &str) -> Option<String> {
        self.config
            .get_string(key)
            .ok()
            .filter(|s| !s.is_empty())
    }

    fn duration_ms(&self, key: &str) -> Option<Duration> {
        self.config
            .get_int(key)
            .ok()
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
    }

    fn pool_u32(&self, key: &str, default: u32) -> u32 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(default)
    }

    fn pool_secs(&self, key: &str, default: Duration) -> Duration {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}
