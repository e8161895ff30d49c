//! Error types for capture, collection and boundary crossings

use crate::frame::FrameAddress;
use crate::gc::Handle;
use std::thread::ThreadId;
use thiserror::Error;

/// Failures of a single stack capture.
///
/// Unresolvable frames never show up here: the walker treats them as
/// transparent. A capture fails only when it cannot start or cannot store
/// what it found.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// No frame at or after the marker exists on this stack
    #[error("stack crawl mark at {mark} could not be located on the current stack")]
    MarkerNotFound { mark: FrameAddress },

    /// The marker was stamped on a different thread
    #[error("stack crawl mark belongs to thread {expected:?}, walk is running on {actual:?}")]
    MarkerThreadMismatch { expected: ThreadId, actual: ThreadId },

    /// The frame buffer could not grow
    #[error("frame buffer exhausted: needed {requested} slots, limit is {limit}")]
    BufferExhausted { requested: usize, limit: usize },

    /// The allocator refused the frame buffer's storage
    #[error("frame buffer allocation of {requested} slots failed")]
    AllocationFailed { requested: usize },
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Collector and handle table errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GcError {
    /// Handle was released, or belongs to a slot that has since been reused
    #[error("stale or invalid handle {0}")]
    InvalidHandle(Handle),

    /// A collection was requested while a fast call holds a no-GC region
    #[error("collection requested inside a no-GC region ({depth} active)")]
    CollectionInNoGcRegion { depth: usize },

    /// A managed allocation was attempted from a fast call
    #[error("managed allocation attempted inside a no-GC region")]
    AllocationInNoGcRegion,
}

/// Result type for collector operations
pub type GcResult<T> = Result<T, GcError>;

/// Failures surfaced to managed callers at the native boundary
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoundaryError {
    /// Scalar argument failed validation
    #[error("{call}: invalid argument '{name}': {reason}")]
    InvalidArgument {
        call: &'static str,
        name: &'static str,
        reason: String,
    },

    /// Handle refers to an object of the wrong shape
    #[error("{call}: expected {expected} object, found {found}")]
    UnexpectedObject {
        call: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Output handle was written more than once
    #[error("{call}: output handle written twice")]
    OutputAlreadyWritten { call: &'static str },

    /// Call reported success without writing its output handle
    #[error("{call}: returned without writing its output handle")]
    OutputNotWritten { call: &'static str },

    #[error(transparent)]
    Gc(#[from] GcError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Result type for boundary operations
pub type BoundaryResult<T> = Result<T, BoundaryError>;
