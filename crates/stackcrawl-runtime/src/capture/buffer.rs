//! Growable frame buffer

use super::element::StackTraceElement;
use crate::error::{CaptureError, CaptureResult};
use stackcrawl_config::{GrowthStrategy, RuntimeConfig};

/// Sizing rules for a [`FrameBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPolicy {
    /// Slots reserved by the first append
    pub initial_capacity: usize,
    pub growth: GrowthStrategy,
    /// Growing past this many slots fails the capture
    pub max_frames: Option<usize>,
}

impl BufferPolicy {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            initial_capacity: config.initial_capacity(),
            growth: config.growth(),
            max_frames: config.max_frames(),
        }
    }

    /// Capacity to allocate when `needed` slots do not fit in `current`
    fn next_capacity(&self, current: usize, needed: usize) -> usize {
        let grown = match self.growth {
            _ if current == 0 => self.initial_capacity,
            GrowthStrategy::Double => current.saturating_mul(2),
            GrowthStrategy::Exact => needed,
        };
        let target = grown.max(needed);
        match self.max_frames {
            Some(max) => target.min(max),
            None => target,
        }
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

/// Capacity-tracked, append-only sequence of resolved frames.
///
/// Storage is allocated lazily on the first append and reallocated (allocate,
/// move, free old) whenever the element count would exceed capacity. It is
/// never shrunk while in use.
#[derive(Debug)]
pub struct FrameBuffer {
    elements: Vec<StackTraceElement>,
    allocated: usize,
    reallocations: usize,
    policy: BufferPolicy,
}

impl FrameBuffer {
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            elements: Vec::new(),
            allocated: 0,
            reallocations: 0,
            policy,
        }
    }

    /// Ensure room for at least `needed` elements
    pub fn reserve(&mut self, needed: usize) -> CaptureResult<()> {
        if needed <= self.allocated {
            return Ok(());
        }

        if let Some(limit) = self.policy.max_frames {
            if needed > limit {
                return Err(CaptureError::BufferExhausted {
                    requested: needed,
                    limit,
                });
            }
        }

        let capacity = self.policy.next_capacity(self.allocated, needed);
        let mut storage: Vec<StackTraceElement> = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| CaptureError::AllocationFailed {
                requested: capacity,
            })?;
        storage.append(&mut self.elements);

        tracing::debug!(
            from = self.allocated,
            to = capacity,
            count = storage.len(),
            "frame buffer grown"
        );

        if self.allocated > 0 {
            self.reallocations += 1;
        }
        self.elements = storage;
        self.allocated = capacity;
        Ok(())
    }

    /// Append at index `len()`, growing first when full
    pub fn append(&mut self, element: StackTraceElement) -> CaptureResult<()> {
        if self.elements.len() == self.allocated {
            self.reserve(self.elements.len() + 1)?;
        }
        self.elements.push(element);
        Ok(())
    }

    /// Elements written so far
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Slots currently allocated
    pub fn capacity(&self) -> usize {
        self.allocated
    }

    /// Times existing storage was replaced by a larger allocation
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    pub fn as_slice(&self) -> &[StackTraceElement] {
        &self.elements
    }

    /// Hand the exact-length contents to the caller
    pub fn finalize(self) -> Vec<StackTraceElement> {
        let mut elements = self.elements;
        elements.shrink_to_fit();
        elements
    }
}
