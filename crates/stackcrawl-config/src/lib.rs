//! stackcrawl configuration system
//!
//! Provides the runtime knobs consumed by the capture engine and its peer
//! services:
//! - Collector mode and collection cadence (`[gc]`)
//! - Processor count override (`[threading]`)
//! - Frame buffer sizing for stack captures (`[stack_trace]`)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.stackcrawl/config.toml)
//! 2. Project config (./stackcrawl.toml, searched upward)
//! 3. Environment variables (STACKCRAWL_*)
//!
//! # Example
//!
//! ```no_run
//! use stackcrawl_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("server gc: {}", config.runtime.server_gc());
//! ```

pub mod loader;
pub mod runtime;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use runtime::{GcConfig, GrowthStrategy, RuntimeConfig, StackTraceConfig, ThreadingConfig};
