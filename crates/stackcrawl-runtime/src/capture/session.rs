//! Capture session: the per-request aggregate handed to the walker

use super::buffer::{BufferPolicy, FrameBuffer};
use super::element::StackTraceElement;
use crate::frame::FrameAddress;

/// Skip count, stop boundary and frame buffer for one capture.
///
/// Built per call, filled by exactly one walk, then consumed by
/// [`CaptureSession::into_elements`]. Sessions are never reused.
#[derive(Debug)]
pub struct CaptureSession {
    skip: usize,
    stop_stack: Option<FrameAddress>,
    buffer: FrameBuffer,
}

impl CaptureSession {
    /// No skip, unbounded walk, empty buffer with the default policy
    pub fn new() -> Self {
        Self::with_policy(BufferPolicy::default())
    }

    pub fn with_policy(policy: BufferPolicy) -> Self {
        Self {
            skip: 0,
            stop_stack: None,
            buffer: FrameBuffer::new(policy),
        }
    }

    /// Omit the first `skip` resolvable frames
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Stop at the first frame whose address is at or above `stop`
    pub fn stop_at(mut self, stop: Option<FrameAddress>) -> Self {
        self.stop_stack = stop;
        self
    }

    pub fn skip_count(&self) -> usize {
        self.skip
    }

    pub fn stop_stack(&self) -> Option<FrameAddress> {
        self.stop_stack
    }

    /// Whether `address` lies on or beyond the stop boundary
    pub fn is_past_boundary(&self, address: FrameAddress) -> bool {
        self.stop_stack.is_some_and(|stop| address >= stop)
    }

    pub fn elements_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn elements_allocated(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut FrameBuffer {
        &mut self.buffer
    }

    /// Move the collected elements out, discarding the session
    pub fn into_elements(self) -> Vec<StackTraceElement> {
        self.buffer.finalize()
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}
