use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

use crate::cache::DeviceClass;

/// Command-line arguments for the frontcache binary.
#[derive(Debug, Parser)]
#[command(name = "frontcache", version, about = "Storefront full-page cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FRONTCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the invalidation hook listener.
    Serve(Box<ServeArgs>),
    /// Print the canonical string and cache key for a page.
    Key(KeyArgs),
    /// Remove every cached page from the configured store.
    Purge(PurgeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the cache backend (memory|files).
    #[arg(long = "cache-driver", value_name = "DRIVER")]
    pub driver: Option<String>,

    /// Override the directory used by the files backend.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub directory: Option<PathBuf>,

    /// Override the time-to-live of cached pages.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

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
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    /// Request path with its query string, e.g. `/shoes?page=2`.
    #[arg(long, value_name = "URL")]
    pub url: String,

    /// Locale identifier.
    #[arg(long, value_name = "ID", default_value = "")]
    pub lang: String,

    /// Shop identifier.
    #[arg(long, value_name = "ID", default_value = "")]
    pub shop: String,

    /// Device class; only used when devices are cached separately.
    #[arg(long, value_enum, value_name = "DEVICE")]
    pub device: Option<DeviceArg>,

    /// Force device splitting regardless of configuration.
    #[arg(long = "separate-devices", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub separate_devices: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub cache: CacheOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceArg {
    Desktop,
    Tablet,
    Mobile,
}

impl From<DeviceArg> for DeviceClass {
    fn from(value: DeviceArg) -> Self {
        match value {
            DeviceArg::Desktop => DeviceClass::Desktop,
            DeviceArg::Tablet => DeviceClass::Tablet,
            DeviceArg::Mobile => DeviceClass::Mobile,
        }
    }
}
