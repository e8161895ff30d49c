//! Stackcrawl Runtime - managed stack capture and the native call boundary
//!
//! This library provides:
//! - A code manager mapping instruction pointers to JIT-emitted methods
//! - Per-thread activation chains and the `FrameSource` unwind interface
//! - Stack-crawl marks and the skip/stop-aware stack walker
//! - A relocating managed heap with handles and no-GC regions
//! - Fast/Safe boundary calls with write-once output handles
//! - System services: stack capture, exit code, fail-fast, loader messages

/// Stackcrawl runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod boundary;
pub mod capture;
pub mod code;
pub mod error;
pub mod frame;
pub mod gc;
pub mod marker;
pub mod messages;
pub mod process;
pub mod system;

// Re-export commonly used types
pub use boundary::{fast_call, safe_call, BoundaryCall, CallKind, OutHandle};
pub use capture::{
    BufferPolicy, CaptureSession, FrameBuffer, OffsetKind, StackTrace, StackTraceElement,
    StackWalker, WalkSummary,
};
pub use code::{CodeManager, MethodDesc, MethodId};
pub use error::{
    BoundaryError, BoundaryResult, CaptureError, CaptureResult, GcError, GcResult,
};
pub use frame::{FrameAddress, FrameChain, FrameSource, IpKind, RawFrame};
pub use gc::{Handle, ManagedHeap, ManagedObject};
pub use marker::{MarkKind, StackCrawlMark};
pub use process::{FailFastReport, ProcessContext, SystemTerminator, Terminator};
pub use system::SystemServices;
