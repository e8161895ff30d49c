//! Runtime Configuration (stackcrawl.toml)
//!
//! The same schema is used for the project file and the global user file;
//! the loader merges them field by field.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of frame slots reserved before the first append
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Default number of allocations between automatic collections
pub const DEFAULT_COLLECT_AFTER_ALLOCATIONS: usize = 1024;

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Collector settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc: Option<GcConfig>,

    /// Threading settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threading: Option<ThreadingConfig>,

    /// Stack trace capture settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<StackTraceConfig>,
}

/// Collector settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GcConfig {
    /// Run the collector in server mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<bool>,

    /// Allocations between automatic collections (must be > 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_after_allocations: Option<usize>,
}

/// Threading settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ThreadingConfig {
    /// Overrides the processor count reported to managed code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_count: Option<usize>,
}

/// Stack trace capture settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct StackTraceConfig {
    /// Frame slots reserved up front
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_capacity: Option<usize>,

    /// How the frame buffer grows when full
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth: Option<GrowthStrategy>,

    /// Hard ceiling on frame slots; growing past it fails the capture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frames: Option<usize>,
}

/// Frame buffer growth strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GrowthStrategy {
    /// Double the capacity (amortized O(1) appends)
    #[default]
    Double,
    /// Grow to exactly the requested size
    Exact,
}

impl GrowthStrategy {
    /// Parse a strategy name as used in config files and environment variables
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "double" => Some(Self::Double),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse_file(&content, path)
    }

    /// Parse configuration text, attributing errors to `path`
    pub fn parse_file(content: &str, path: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the runtime configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(gc) = &self.gc {
            validate_positive("gc.collect_after_allocations", gc.collect_after_allocations)?;
        }

        if let Some(threading) = &self.threading {
            validate_positive("threading.processor_count", threading.processor_count)?;
        }

        if let Some(stack_trace) = &self.stack_trace {
            validate_positive("stack_trace.max_frames", stack_trace.max_frames)?;

            if let (Some(initial), Some(max)) =
                (stack_trace.initial_capacity, stack_trace.max_frames)
            {
                if initial > max {
                    return Err(ConfigError::InvalidValue {
                        field: "stack_trace.initial_capacity".to_string(),
                        reason: format!("{} exceeds max_frames ({})", initial, max),
                    });
                }
            }
        }

        Ok(())
    }

    /// Merge another configuration into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &RuntimeConfig) {
        if let Some(other_gc) = &other.gc {
            let gc = self.gc.get_or_insert_with(GcConfig::default);
            if other_gc.server.is_some() {
                gc.server = other_gc.server;
            }
            if other_gc.collect_after_allocations.is_some() {
                gc.collect_after_allocations = other_gc.collect_after_allocations;
            }
        }

        if let Some(other_threading) = &other.threading {
            let threading = self.threading.get_or_insert_with(ThreadingConfig::default);
            if other_threading.processor_count.is_some() {
                threading.processor_count = other_threading.processor_count;
            }
        }

        if let Some(other_trace) = &other.stack_trace {
            let trace = self.stack_trace.get_or_insert_with(StackTraceConfig::default);
            if other_trace.initial_capacity.is_some() {
                trace.initial_capacity = other_trace.initial_capacity;
            }
            if other_trace.growth.is_some() {
                trace.growth = other_trace.growth;
            }
            if other_trace.max_frames.is_some() {
                trace.max_frames = other_trace.max_frames;
            }
        }
    }

    /// Whether the collector runs in server mode (default: false)
    pub fn server_gc(&self) -> bool {
        self.gc.as_ref().and_then(|gc| gc.server).unwrap_or(false)
    }

    /// Allocations between automatic collections
    pub fn collect_after_allocations(&self) -> usize {
        self.gc
            .as_ref()
            .and_then(|gc| gc.collect_after_allocations)
            .unwrap_or(DEFAULT_COLLECT_AFTER_ALLOCATIONS)
    }

    /// Processor count override, if configured
    pub fn processor_count(&self) -> Option<usize> {
        self.threading.as_ref().and_then(|t| t.processor_count)
    }

    /// Initial frame buffer capacity
    pub fn initial_capacity(&self) -> usize {
        self.stack_trace
            .as_ref()
            .and_then(|s| s.initial_capacity)
            .unwrap_or(DEFAULT_INITIAL_CAPACITY)
    }

    /// Frame buffer growth strategy
    pub fn growth(&self) -> GrowthStrategy {
        self.stack_trace
            .as_ref()
            .and_then(|s| s.growth)
            .unwrap_or_default()
    }

    /// Frame buffer ceiling, if configured
    pub fn max_frames(&self) -> Option<usize> {
        self.stack_trace.as_ref().and_then(|s| s.max_frames)
    }
}

fn validate_positive(field: &str, value: Option<usize>) -> ConfigResult<()> {
    if value == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
