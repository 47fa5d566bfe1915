//! Configuration for the channel runtime.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Defaults embedded in the binary (`config/default.toml`)
//! 2. An optional user-specified TOML file
//! 3. Environment variables prefixed with `HYPRSTREAM_CHANNELS__`
//!    (e.g. `HYPRSTREAM_CHANNELS__IO_THREAD__NAME=my-io`)
//! 4. Command-line arguments

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "HYPRSTREAM_CHANNELS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of demo channels to open
    #[arg(long, default_value_t = 3)]
    pub channels: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log filter directives, e.g. `hyprstream_channels=trace`
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// Top-level runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Thread that owns every channel
    #[serde(default = "default_io_thread")]
    pub io_thread: IoThreadConfig,
    /// Thread that receives completion callbacks
    #[serde(default = "default_callback_thread")]
    pub callback_thread: IoThreadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for one dedicated task thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoThreadConfig {
    /// Thread name, as shown in logs and debuggers
    pub name: String,
    /// Stack size in bytes (None for the platform default)
    #[serde(default)]
    pub stack_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for IoThreadConfig {
    fn default() -> Self {
        default_io_thread()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            filter: None,
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            io_thread: default_io_thread(),
            callback_thread: default_callback_thread(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ChannelsConfig {
    /// Load configuration from the embedded defaults, `path` and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HYPRSTREAM_CHANNELS")
                .prefix_separator("__")
                .separator("__"),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load from all sources, then apply command-line overrides.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = Self::load(args.config.as_deref())?;
        if let Some(level) = &args.log_level {
            config.logging.level = level.clone();
        }
        if let Some(filter) = &args.log_filter {
            config.logging.filter = Some(filter.clone());
        }
        Ok(config)
    }
}

fn default_io_thread() -> IoThreadConfig {
    IoThreadConfig {
        name: "hyprstream-io".to_string(),
        stack_size: None,
    }
}

fn default_callback_thread() -> IoThreadConfig {
    IoThreadConfig {
        name: "hyprstream-callback".to_string(),
        stack_size: None,
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
