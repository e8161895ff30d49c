//! Native/managed call boundary
//!
//! Every service reachable from managed code is described by a
//! [`BoundaryCall`] that states how it crosses the boundary:
//!
//! - **Fast** calls take scalars and existing handles, run inside a no-GC
//!   region and may neither allocate managed memory nor trigger a collection.
//! - **Safe** calls may allocate, block and collect. They run with a native
//!   marshaling frame on the thread's frame chain and inside a tracing span.
//!
//! Managed values only cross as [`Handle`]s. Results come back through
//! write-once [`OutHandle`]s.

mod handles;

pub use handles::{ObjectHandleOnStack, OutHandle, StringHandleOnStack};

use crate::capture::StackTrace;
use crate::error::{BoundaryError, BoundaryResult};
use crate::frame::{self, ActivationGuard};
use crate::gc::{CollectionStats, Handle, ManagedHeap, ManagedObject, NoGcRegion};
use tracing::span::EnteredSpan;

/// Transition kind of a boundary call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Fast,
    Safe,
}

/// Static descriptor of one boundary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryCall {
    pub name: &'static str,
    pub kind: CallKind,
    /// Never returns to the caller
    pub diverges: bool,
}

impl BoundaryCall {
    pub const fn fast(name: &'static str) -> Self {
        Self {
            name,
            kind: CallKind::Fast,
            diverges: false,
        }
    }

    pub const fn safe(name: &'static str) -> Self {
        Self {
            name,
            kind: CallKind::Safe,
            diverges: false,
        }
    }

    /// Safe call that terminates the process
    pub const fn diverging(name: &'static str) -> Self {
        Self {
            name,
            kind: CallKind::Safe,
            diverges: true,
        }
    }
}

/// View of the heap available to a fast call
#[derive(Debug)]
pub struct FastContext<'h> {
    heap: &'h ManagedHeap,
    call: &'static str,
    _region: NoGcRegion<'h>,
}

impl FastContext<'_> {
    pub fn call(&self) -> &'static str {
        self.call
    }

    /// Read the object behind `handle` in place
    pub fn read<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&ManagedObject) -> R,
    ) -> BoundaryResult<R> {
        Ok(self.heap.with_object(handle, f)?)
    }

    /// Ask for a collection; always refused while the call is running
    pub fn collect(&self) -> BoundaryResult<CollectionStats> {
        Ok(self.heap.collect()?)
    }

    /// Ask for an allocation; always refused while the call is running
    pub fn alloc(&self, object: ManagedObject) -> BoundaryResult<Handle> {
        Ok(self.heap.alloc(object)?)
    }
}

/// View of the heap available to a safe call
#[derive(Debug)]
pub struct SafeContext<'h> {
    heap: &'h ManagedHeap,
    call: &'static str,
}

impl SafeContext<'_> {
    pub fn call(&self) -> &'static str {
        self.call
    }

    pub fn alloc(&self, object: ManagedObject) -> BoundaryResult<Handle> {
        Ok(self.heap.alloc(object)?)
    }

    pub fn read<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&ManagedObject) -> R,
    ) -> BoundaryResult<R> {
        Ok(self.heap.with_object(handle, f)?)
    }

    pub fn collect(&self) -> BoundaryResult<CollectionStats> {
        Ok(self.heap.collect()?)
    }

    /// Copy out the string behind `handle`
    pub fn string(&self, handle: Handle) -> BoundaryResult<String> {
        self.read(handle, |object| match object {
            ManagedObject::String(s) => Ok(s.clone()),
            other => Err(self.unexpected("String", other)),
        })?
    }

    /// Copy out the captured trace behind `handle`
    pub fn stack_trace(&self, handle: Handle) -> BoundaryResult<StackTrace> {
        self.read(handle, |object| match object {
            ManagedObject::StackTrace(trace) => Ok(trace.clone()),
            other => Err(self.unexpected("StackTrace", other)),
        })?
    }

    fn unexpected(&self, expected: &'static str, found: &ManagedObject) -> BoundaryError {
        BoundaryError::UnexpectedObject {
            call: self.call,
            expected,
            found: found.type_name(),
        }
    }
}

/// A safe call in progress: its marshaling frame and span stay active until
/// the transition is dropped
#[derive(Debug)]
pub struct SafeTransition<'h> {
    ctx: SafeContext<'h>,
    _frame: ActivationGuard,
    _span: EnteredSpan,
}

impl<'h> SafeTransition<'h> {
    pub fn context(&self) -> &SafeContext<'h> {
        &self.ctx
    }
}

/// Enter a fast call; the no-GC region lasts as long as the context
pub fn enter_fast<'h>(heap: &'h ManagedHeap, call: &BoundaryCall) -> FastContext<'h> {
    debug_assert_eq!(call.kind, CallKind::Fast, "{} is not a fast call", call.name);
    FastContext {
        heap,
        call: call.name,
        _region: heap.enter_no_gc(),
    }
}

/// Enter a safe call, pushing its marshaling frame
pub fn enter_safe<'h>(heap: &'h ManagedHeap, call: &BoundaryCall) -> SafeTransition<'h> {
    debug_assert_eq!(call.kind, CallKind::Safe, "{} is not a safe call", call.name);
    let span = tracing::debug_span!("boundary_call", call = call.name).entered();
    SafeTransition {
        ctx: SafeContext {
            heap,
            call: call.name,
        },
        _frame: frame::enter_native(call.name),
        _span: span,
    }
}

/// Run a fast call inside a no-GC region
pub fn fast_call<R>(
    heap: &ManagedHeap,
    call: &BoundaryCall,
    f: impl FnOnce(&FastContext<'_>) -> BoundaryResult<R>,
) -> BoundaryResult<R> {
    f(&enter_fast(heap, call))
}

/// Run a safe call behind a marshaling frame
pub fn safe_call<R>(
    heap: &ManagedHeap,
    call: &BoundaryCall,
    f: impl FnOnce(&SafeContext<'_>) -> BoundaryResult<R>,
) -> BoundaryResult<R> {
    let transition = enter_safe(heap, call);
    let result = f(transition.context());
    if let Err(err) = &result {
        tracing::debug!(error = %err, "boundary call failed");
    }
    result
}

/// Run a safe call that must produce exactly one handle through `out`
pub fn safe_call_with_output(
    heap: &ManagedHeap,
    call: &BoundaryCall,
    f: impl FnOnce(&SafeContext<'_>, &mut ObjectHandleOnStack<'_>) -> BoundaryResult<()>,
) -> BoundaryResult<Handle> {
    let mut slot = None;
    safe_call(heap, call, |ctx| {
        let mut out = OutHandle::new(&mut slot, call.name);
        f(ctx, &mut out)
    })?;
    slot.ok_or(BoundaryError::OutputNotWritten { call: call.name })
}
