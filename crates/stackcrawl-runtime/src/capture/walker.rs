//! Stack walker
//!
//! Starts at the frame named by a [`StackCrawlMark`] and unwinds outward,
//! resolving every frame against the code manager. Frames that do not map to
//! a managed method are stepped over without being counted. The walk ends at
//! the root of the stack, at the session's stop boundary, or when unwinding
//! stops moving outward.

use super::element::{OffsetKind, StackTraceElement};
use super::session::CaptureSession;
use crate::code::CodeManager;
use crate::error::CaptureResult;
use crate::frame::{FrameSource, IpKind, RawFrame};
use crate::marker::{MarkKind, StackCrawlMark};

/// Counters describing one finished walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Frames examined, transparent ones included
    pub visited: usize,
    /// Frames with no managed method behind them
    pub transparent: usize,
    /// Resolvable frames omitted by the skip count or the mark kind
    pub skipped: usize,
    /// Elements appended to the session buffer
    pub emitted: usize,
    /// The stop boundary ended the walk
    pub truncated: bool,
    /// A caller did not lie outward of its callee
    pub corrupt: bool,
}

/// Walks frame sources against one code manager
#[derive(Debug, Clone, Copy)]
pub struct StackWalker<'a> {
    code: &'a CodeManager,
}

impl<'a> StackWalker<'a> {
    pub fn new(code: &'a CodeManager) -> Self {
        Self { code }
    }

    /// Fill `session` with the frames of `source` starting at `mark`.
    ///
    /// Fails only when the mark cannot be located or the buffer cannot
    /// grow. On failure the session contents are unspecified and must be
    /// discarded.
    pub fn walk<S: FrameSource>(
        &self,
        source: &S,
        mark: &StackCrawlMark,
        session: &mut CaptureSession,
    ) -> CaptureResult<WalkSummary> {
        let start = mark.locate(source)?;

        let mut summary = WalkSummary::default();
        let mut omit_marked = mark.kind() == MarkKind::LookForMyCaller;
        let mut skipped = 0;
        let mut cursor = Some(start);

        while let Some(frame) = cursor {
            if session.is_past_boundary(frame.address) {
                summary.truncated = true;
                break;
            }
            summary.visited += 1;

            match self.resolve(&frame) {
                None => {
                    summary.transparent += 1;
                    tracing::trace!(address = %frame.address, ip = frame.ip, "transparent frame");
                }
                Some(element) if omit_marked => {
                    omit_marked = false;
                    summary.skipped += 1;
                    tracing::trace!(method = %element.method.full_name(), "omitted marked frame");
                }
                Some(element) if skipped < session.skip_count() => {
                    skipped += 1;
                    summary.skipped += 1;
                    tracing::trace!(method = %element.method.full_name(), "skipped frame");
                }
                Some(element) => {
                    tracing::trace!(
                        method = %element.method.full_name(),
                        offset = element.native_offset,
                        "captured frame"
                    );
                    session.buffer_mut().append(element)?;
                    summary.emitted += 1;
                }
            }

            cursor = match source.caller_of(&frame) {
                Some(caller) if caller.address <= frame.address => {
                    tracing::warn!(
                        frame = %frame.address,
                        caller = %caller.address,
                        "frame chain does not unwind outward, truncating walk"
                    );
                    summary.corrupt = true;
                    None
                }
                next => next,
            };
        }

        tracing::debug!(
            visited = summary.visited,
            transparent = summary.transparent,
            skipped = summary.skipped,
            emitted = summary.emitted,
            truncated = summary.truncated,
            "stack walk finished"
        );

        Ok(summary)
    }

    fn resolve(&self, frame: &RawFrame) -> Option<StackTraceElement> {
        let (method, native_offset) = self.code.resolve(frame.lookup_ip())?;
        let offset_kind = match frame.ip_kind {
            IpKind::Faulting => OffsetKind::Exact,
            IpKind::ReturnAddress => OffsetKind::Approximate,
        };
        Some(StackTraceElement {
            method,
            native_offset,
            ip: frame.ip,
            frame: frame.address,
            offset_kind,
        })
    }
}
