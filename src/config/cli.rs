use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::cache::CacheBackendKind;

/// Command-line arguments for the catalog binary.
#[derive(Debug, Parser)]
#[command(name = "catalog", version, about = "Product catalog API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CATALOG_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API (default when no subcommand is given).
    Serve(Box<ServeArgs>),
    /// Apply the bundled SQL migrations and exit.
    Migrate(MigrateArgs),
    /// Insert randomly generated products.
    Seed(SeedArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", env = "DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct SeedArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Number of products to insert.
    #[arg(long, default_value_t = 1000)]
    pub count: u64,

    /// Rows per INSERT statement.
    #[arg(long = "batch-size", default_value_t = 500)]
    pub batch_size: u32,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Apply pending migrations before serving.
    #[arg(
        long = "database-run-migrations",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub database_run_migrations: Option<bool>,

    /// Enable or disable the read-through cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Cache backend (redis|memory).
    #[arg(long = "cache-backend", value_name = "BACKEND", value_parser = parse_backend)]
    pub cache_backend: Option<CacheBackendKind>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", env = "REDIS_URL", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Override the cache entry lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Collapse concurrent misses for the same key.
    #[arg(
        long = "cache-single-flight",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_single_flight: Option<bool>,

    /// Entry limit for the in-process cache.
    #[arg(long = "cache-memory-capacity", value_name = "COUNT")]
    pub cache_memory_capacity: Option<usize>,

    /// Namespace prepended to every cache key.
    #[arg(long = "cache-key-prefix", value_name = "PREFIX")]
    pub cache_key_prefix: Option<String>,

    /// Page size when the request omits `limit`.
    #[arg(long = "listing-default-limit", value_name = "COUNT")]
    pub listing_default_limit: Option<u32>,

    /// Largest accepted `limit`.
    #[arg(long = "listing-max-limit", value_name = "COUNT")]
    pub listing_max_limit: Option<u32>,

    /// Allowed CORS origins; repeat the flag for several.
    #[arg(long = "cors-allowed-origin", value_name = "ORIGIN")]
    pub cors_allowed_origins: Vec<String>,
}

fn parse_backend(value: &str) -> Result<CacheBackendKind, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "redis" => Ok(CacheBackendKind::Redis),
        "memory" => Ok(CacheBackendKind::Memory),
        other => Err(format!("unknown cache backend `{other}` (expected redis or memory)")),
    }
}
