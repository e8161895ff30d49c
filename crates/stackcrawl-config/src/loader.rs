//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::runtime::{GrowthStrategy, RuntimeConfig};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = "stackcrawl.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.stackcrawl/config.toml) - lowest priority
/// 2. Project config (./stackcrawl.toml) - overrides global
/// 3. Environment variables (STACKCRAWL_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective runtime configuration
    pub runtime: RuntimeConfig,

    /// Directory where stackcrawl.toml was found
    pub config_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.stackcrawl/config.toml
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find stackcrawl.toml, merges it over the
    /// global config if one exists, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (config_root, project) = self.find_project_config(start_dir)?;

        let mut runtime = self.load_global_config().unwrap_or_default();
        runtime.merge(&project);
        self.apply_env_overrides(&mut runtime)?;

        Ok(Config {
            runtime,
            config_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = RuntimeConfig::load_from_file(config_path)?;

        let mut runtime = self.load_global_config().unwrap_or_default();
        runtime.merge(&project);
        self.apply_env_overrides(&mut runtime)?;

        Ok(Config {
            runtime,
            config_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Load configuration from the environment only (no files)
    pub fn load_from_env(&self) -> ConfigResult<Config> {
        let mut runtime = RuntimeConfig::default();
        self.apply_env_overrides(&mut runtime)?;
        Ok(Config {
            runtime,
            config_root: None,
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, RuntimeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = RuntimeConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, RuntimeConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.stackcrawl/config.toml
    fn load_global_config(&mut self) -> ConfigResult<RuntimeConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = Self::global_config_dir()?.join("config.toml");
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional
        if !path.exists() {
            return Ok(RuntimeConfig::default());
        }

        RuntimeConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// Recognized variables:
    /// - STACKCRAWL_SERVER_GC (true/false/1/0/yes/no)
    /// - STACKCRAWL_PROCESSOR_COUNT
    /// - STACKCRAWL_STACK_TRACE_CAPACITY
    /// - STACKCRAWL_STACK_TRACE_GROWTH (double/exact)
    /// - STACKCRAWL_MAX_FRAMES
    fn apply_env_overrides(&self, config: &mut RuntimeConfig) -> ConfigResult<()> {
        if let Ok(server) = env::var("STACKCRAWL_SERVER_GC") {
            let server = matches!(server.to_lowercase().as_str(), "true" | "1" | "yes");
            config.gc.get_or_insert_with(Default::default).server = Some(server);
        }

        if let Some(count) = env_usize("STACKCRAWL_PROCESSOR_COUNT")? {
            config
                .threading
                .get_or_insert_with(Default::default)
                .processor_count = Some(count);
        }

        if let Some(capacity) = env_usize("STACKCRAWL_STACK_TRACE_CAPACITY")? {
            config
                .stack_trace
                .get_or_insert_with(Default::default)
                .initial_capacity = Some(capacity);
        }

        if let Ok(growth) = env::var("STACKCRAWL_STACK_TRACE_GROWTH") {
            let strategy = GrowthStrategy::parse(&growth).ok_or_else(|| ConfigError::InvalidValue {
                field: "STACKCRAWL_STACK_TRACE_GROWTH".to_string(),
                reason: format!("must be 'double' or 'exact', got '{}'", growth),
            })?;
            config.stack_trace.get_or_insert_with(Default::default).growth = Some(strategy);
        }

        if let Some(max) = env_usize("STACKCRAWL_MAX_FRAMES")? {
            config.stack_trace.get_or_insert_with(Default::default).max_frames = Some(max);
        }

        config.validate()
    }

    /// Get the global configuration directory (~/.stackcrawl)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".stackcrawl"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the directory holding the project config
    pub fn config_root(&self) -> Option<&Path> {
        self.config_root.as_deref()
    }

    /// Check if a project config file was found
    pub fn is_project(&self) -> bool {
        self.config_root.is_some()
    }
}

fn env_usize(name: &str) -> ConfigResult<Option<usize>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name.to_string(),
                reason: format!("'{}' is not a valid count: {}", raw, e),
            }),
        Err(_) => Ok(None),
    }
}
