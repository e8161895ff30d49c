//! Write-once output handles

use super::SafeContext;
use crate::error::{BoundaryError, BoundaryResult};
use crate::gc::{Handle, ManagedObject};

/// Output slot a boundary call fills exactly once
#[derive(Debug)]
pub struct OutHandle<'a, T> {
    slot: &'a mut Option<T>,
    call: &'static str,
}

/// Output slot receiving a managed object
pub type ObjectHandleOnStack<'a> = OutHandle<'a, Handle>;

/// Output slot receiving a managed string
pub type StringHandleOnStack<'a> = OutHandle<'a, Handle>;

impl<'a, T> OutHandle<'a, T> {
    pub fn new(slot: &'a mut Option<T>, call: &'static str) -> Self {
        Self { slot, call }
    }

    pub fn is_written(&self) -> bool {
        self.slot.is_some()
    }

    /// Store `value`; a second write is rejected and leaves the first intact
    pub fn write(&mut self, value: T) -> BoundaryResult<()> {
        if self.slot.is_some() {
            return Err(BoundaryError::OutputAlreadyWritten { call: self.call });
        }
        *self.slot = Some(value);
        Ok(())
    }
}

impl OutHandle<'_, Handle> {
    /// Allocate `object` on the managed heap and store its handle
    pub fn set_object(
        &mut self,
        ctx: &SafeContext<'_>,
        object: ManagedObject,
    ) -> BoundaryResult<()> {
        if self.is_written() {
            return Err(BoundaryError::OutputAlreadyWritten { call: self.call });
        }
        let handle = ctx.alloc(object)?;
        self.write(handle)
    }

    /// Allocate a managed string and store its handle
    pub fn set_string(
        &mut self,
        ctx: &SafeContext<'_>,
        value: impl Into<String>,
    ) -> BoundaryResult<()> {
        self.set_object(ctx, ManagedObject::String(value.into()))
    }
}
