//! Stack trace capture
//!
//! A capture binds a [`CaptureSession`] (skip count, stop boundary, frame
//! buffer) to one [`StackWalker`] pass over a [`FrameSource`]:
//!
//! ```text
//! StackCrawlMark ──locate──▶ first frame ──unwind──▶ ... ──▶ root / stop
//!                               │
//!                    resolve ─▶ skip? ─▶ FrameBuffer::append
//! ```
//!
//! [`FrameSource`]: crate::frame::FrameSource

mod buffer;
mod element;
mod session;
mod walker;

pub use buffer::{BufferPolicy, FrameBuffer};
pub use element::{OffsetKind, StackTrace, StackTraceElement};
pub use session::CaptureSession;
pub use walker::{StackWalker, WalkSummary};
