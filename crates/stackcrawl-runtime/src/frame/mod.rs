//! Physical call frames as seen by the stack walker
//!
//! The walker never touches activation records directly. It goes through a
//! [`FrameSource`], which hands out [`RawFrame`]s innermost-first and knows
//! how to unwind from a frame to its caller. The execution engine's
//! per-thread [`FrameChain`] is the production source; tests and hosts can
//! supply their own.
//!
//! Stacks grow downward: an inner (more recent) frame always has a lower
//! address than its caller.

mod chain;

pub use chain::{
    enter_managed, enter_native, with_current, ActivationGuard, ActivationRecord, FrameChain,
    FrameKind, MANAGED_FRAME_SIZE, NATIVE_FRAME_SIZE, STACK_BASE,
};

use serde::Serialize;
use std::fmt;
use std::thread::ThreadId;

/// Address of an activation record on a thread's stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameAddress(usize);

impl FrameAddress {
    pub const fn new(address: usize) -> Self {
        Self(address)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// What the instruction pointer of a frame denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IpKind {
    /// The exact instruction that faulted or is executing
    Faulting,
    /// A saved return address: the call site is the instruction before it
    ReturnAddress,
}

/// One physical frame handed to the walker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    pub address: FrameAddress,
    pub ip: usize,
    pub ip_kind: IpKind,
}

impl RawFrame {
    /// Instruction pointer to use for method lookup
    ///
    /// Return addresses are pulled back by one byte so a call that is the
    /// last instruction of a method still resolves to that method.
    pub fn lookup_ip(&self) -> usize {
        match self.ip_kind {
            IpKind::Faulting => self.ip,
            IpKind::ReturnAddress => self.ip.saturating_sub(1),
        }
    }
}

/// Unwind interface over one thread's stack.
///
/// Implementations must hand out frames with strictly increasing addresses
/// as the walk moves outward; the walker treats anything else as a corrupt
/// chain and stops.
pub trait FrameSource {
    /// Thread that owns the stack
    fn thread(&self) -> ThreadId;

    /// The most recently pushed frame, if any
    fn innermost(&self) -> Option<RawFrame>;

    /// The caller of `frame`, or `None` at the root of the stack
    fn caller_of(&self, frame: &RawFrame) -> Option<RawFrame>;

    /// Innermost-first iterator over every frame
    fn frames(&self) -> Frames<'_, Self>
    where
        Self: Sized,
    {
        Frames {
            source: self,
            next: self.innermost(),
        }
    }
}

/// Iterator returned by [`FrameSource::frames`]
pub struct Frames<'a, S: FrameSource> {
    source: &'a S,
    next: Option<RawFrame>,
}

impl<S: FrameSource> Iterator for Frames<'_, S> {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        let frame = self.next.take()?;
        self.next = self
            .source
            .caller_of(&frame)
            .filter(|caller| caller.address > frame.address);
        Some(frame)
    }
}
