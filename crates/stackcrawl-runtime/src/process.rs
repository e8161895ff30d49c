//! Process-wide state and termination
//!
//! The latched exit code, GC mode and processor count live in one
//! [`ProcessContext`]. Termination goes through a [`Terminator`] so hosts can
//! route it somewhere other than `std::process`.

use crate::capture::StackTrace;
use stackcrawl_config::{ConfigLoader, RuntimeConfig};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

/// Everything `fail_fast` knows about the failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailFastReport {
    pub message: String,
    pub error_source: Option<String>,
    /// Rendered exception object, when one was passed
    pub exception: Option<String>,
    pub stack_trace: Option<StackTrace>,
}

impl fmt::Display for FailFastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Process terminated. {}", self.message)?;
        if let Some(source) = &self.error_source {
            writeln!(f, "Source: {source}")?;
        }
        if let Some(exception) = &self.exception {
            writeln!(f, "Exception: {exception}")?;
        }
        if let Some(trace) = &self.stack_trace {
            writeln!(f, "{trace}")?;
        }
        Ok(())
    }
}

/// Ends the process
pub trait Terminator: Send + Sync + fmt::Debug {
    /// Exit immediately with `code`, skipping orderly shutdown
    fn exit(&self, code: i32) -> !;

    /// Abort after a fatal error has been reported
    fn fail_fast(&self, report: &FailFastReport) -> !;
}

/// Terminates through `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTerminator;

impl Terminator for SystemTerminator {
    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }

    fn fail_fast(&self, report: &FailFastReport) -> ! {
        eprint!("{report}");
        std::process::abort()
    }
}

/// Latched exit code, collector mode, processor count and terminator
#[derive(Debug)]
pub struct ProcessContext {
    exit_code: AtomicI32,
    server_gc: bool,
    processor_count: NonZeroUsize,
    terminator: Box<dyn Terminator>,
}

impl ProcessContext {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_terminator(config, Box::new(SystemTerminator))
    }

    pub fn with_terminator(config: &RuntimeConfig, terminator: Box<dyn Terminator>) -> Self {
        let processor_count = config
            .processor_count()
            .and_then(NonZeroUsize::new)
            .or_else(|| std::thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN);

        tracing::debug!(
            server_gc = config.server_gc(),
            processor_count = processor_count.get(),
            "process context initialized"
        );

        Self {
            exit_code: AtomicI32::new(0),
            server_gc: config.server_gc(),
            processor_count,
            terminator,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    /// Latch `code`; the last write wins
    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
    }

    pub fn is_server_gc(&self) -> bool {
        self.server_gc
    }

    pub fn processor_count(&self) -> NonZeroUsize {
        self.processor_count
    }

    pub fn terminate(&self, code: i32) -> ! {
        tracing::info!(code, "process exit requested");
        self.terminator.exit(code)
    }

    pub fn fail_fast(&self, report: &FailFastReport) -> ! {
        tracing::error!(
            message = %report.message,
            source = report.error_source.as_deref().unwrap_or(""),
            exception = report.exception.as_deref().unwrap_or(""),
            frames = report.stack_trace.as_ref().map_or(0, StackTrace::len),
            "fail fast"
        );
        self.terminator.fail_fast(report)
    }
}

static GLOBAL: OnceLock<Arc<ProcessContext>> = OnceLock::new();

/// The process-wide context, built on first use from the configuration of
/// the working directory
pub fn global() -> Arc<ProcessContext> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(ProcessContext::new(&load_process_config()))))
}

fn load_process_config() -> RuntimeConfig {
    let mut loader = ConfigLoader::new();
    let loaded = match std::env::current_dir() {
        Ok(dir) => loader.load_from_directory(&dir),
        Err(_) => loader.load_from_env(),
    };
    match loaded {
        Ok(config) => config.runtime,
        Err(err) => {
            tracing::warn!(error = %err, "falling back to default runtime configuration");
            RuntimeConfig::default()
        }
    }
}
