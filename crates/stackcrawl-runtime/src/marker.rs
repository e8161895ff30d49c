//! Stack-crawl marks
//!
//! A mark is stamped at the managed call site before control crosses into
//! the boundary layer. The walker starts from the frame the mark names, so
//! however many native stubs the boundary pushes in between, they sit below
//! the mark and never reach the result.

use crate::error::{CaptureError, CaptureResult};
use crate::frame::{self, FrameAddress, FrameSource, RawFrame, STACK_BASE};
use std::thread::{self, ThreadId};

/// Where the walk should start relative to the marked frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKind {
    /// Start at the marked frame itself
    LookForMe,
    /// Start at the caller of the marked frame
    LookForMyCaller,
}

/// Token identifying the logical call site that asked for a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackCrawlMark {
    thread: ThreadId,
    address: FrameAddress,
    kind: MarkKind,
}

impl StackCrawlMark {
    /// Mark the innermost managed frame of the calling thread
    ///
    /// With no managed frame on the stack the mark points at the stack base,
    /// which no frame can match, so any walk from it fails.
    pub fn here() -> Self {
        Self::stamp(MarkKind::LookForMe)
    }

    /// Mark the caller of the innermost managed frame of the calling thread
    pub fn caller() -> Self {
        Self::stamp(MarkKind::LookForMyCaller)
    }

    fn stamp(kind: MarkKind) -> Self {
        let address = frame::with_current(|chain| {
            chain
                .innermost_managed()
                .map(|r| r.address)
                .unwrap_or(FrameAddress::new(STACK_BASE))
        });
        Self {
            thread: thread::current().id(),
            address,
            kind,
        }
    }

    /// Mark an explicit frame address on `thread`
    pub fn at(thread: ThreadId, address: FrameAddress, kind: MarkKind) -> Self {
        Self {
            thread,
            address,
            kind,
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn address(&self) -> FrameAddress {
        self.address
    }

    pub fn kind(&self) -> MarkKind {
        self.kind
    }

    /// Find the first frame at or after (outward of) the mark
    pub fn locate<S: FrameSource>(&self, source: &S) -> CaptureResult<RawFrame> {
        if source.thread() != self.thread {
            return Err(CaptureError::MarkerThreadMismatch {
                expected: self.thread,
                actual: source.thread(),
            });
        }

        source
            .frames()
            .find(|f| f.address >= self.address)
            .ok_or(CaptureError::MarkerNotFound { mark: self.address })
    }
}
