//! Resolved stack frames and captured traces

use crate::code::{MethodDesc, MethodId};
use crate::frame::FrameAddress;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// How trustworthy the reported offset is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetKind {
    /// The offset of the faulting or executing instruction
    Exact,
    /// The call site, derived from a saved return address
    Approximate,
}

/// One resolved frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackTraceElement {
    pub method: Arc<MethodDesc>,
    pub native_offset: u32,
    pub ip: usize,
    pub frame: FrameAddress,
    pub offset_kind: OffsetKind,
}

impl StackTraceElement {
    pub fn method_id(&self) -> MethodId {
        self.method.id
    }

    pub fn is_exact(&self) -> bool {
        self.offset_kind == OffsetKind::Exact
    }
}

impl fmt::Display for StackTraceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {} +{:#x}", self.method.full_name(), self.native_offset)?;
        if !self.is_exact() {
            write!(f, " (approximate)")?;
        }
        Ok(())
    }
}

/// A finished capture, innermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StackTrace {
    frames: Vec<StackTraceElement>,
}

impl StackTrace {
    pub fn new(frames: Vec<StackTraceElement>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[StackTraceElement] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// `Type.Method` names, innermost first
    pub fn method_names(&self) -> Vec<String> {
        self.frames.iter().map(|e| e.method.full_name()).collect()
    }

    /// JSON document for diagnostic tooling
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn into_frames(self) -> Vec<StackTraceElement> {
        self.frames
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.frames.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "   {element}")?;
        }
        Ok(())
    }
}
