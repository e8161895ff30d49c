//! Per-thread chain of activation records
//!
//! The execution engine pushes a record on every managed method entry and
//! the boundary layer pushes one for every native stub it runs. Each record
//! is assigned an address below its caller's, the way a hardware stack grows.
//!
//! ## Stack Layout Example
//!
//! ```text
//! STACK_BASE ─┐
//!             │ Program.Main        0x7fef_ffc0   (outermost)
//!             │ Worker.Run          0x7fef_ff80
//!             │ [capture stub]      0x7fef_ff60   (native, transparent)
//!             ▼                                   (innermost)
//! ```

use super::{FrameAddress, FrameSource, IpKind, RawFrame};
use crate::code::MethodDesc;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

/// Highest address of every simulated thread stack
pub const STACK_BASE: usize = 0x7ff0_0000;

/// Bytes reserved for a managed activation record
pub const MANAGED_FRAME_SIZE: usize = 0x40;

/// Bytes reserved for a native stub record
pub const NATIVE_FRAME_SIZE: usize = 0x20;

/// Instruction pointer recorded for native stubs (never inside the code heap)
const NATIVE_STUB_IP: usize = 0x1000;

/// Kind of code that owns a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// JIT-compiled managed method
    Managed,
    /// Native stub: trampoline, marshaling frame or host code
    Native(&'static str),
}

/// One activation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRecord {
    pub address: FrameAddress,
    pub ip: usize,
    pub ip_kind: IpKind,
    pub kind: FrameKind,
}

impl ActivationRecord {
    fn raw(&self) -> RawFrame {
        RawFrame {
            address: self.address,
            ip: self.ip,
            ip_kind: self.ip_kind,
        }
    }
}

/// A thread's activation records, outermost first
#[derive(Debug, Clone)]
pub struct FrameChain {
    thread: ThreadId,
    records: Vec<ActivationRecord>,
}

impl FrameChain {
    /// Empty chain owned by the calling thread
    pub fn new() -> Self {
        Self::for_thread(thread::current().id())
    }

    /// Empty chain attributed to `thread`
    pub fn for_thread(thread: ThreadId) -> Self {
        Self {
            thread,
            records: Vec::new(),
        }
    }

    /// Lowest address currently in use (the stack pointer)
    fn stack_pointer(&self) -> usize {
        self.records
            .last()
            .map(|r| r.address.get())
            .unwrap_or(STACK_BASE)
    }

    /// Push a record of `size` bytes and return its address
    pub fn push(
        &mut self,
        ip: usize,
        ip_kind: IpKind,
        kind: FrameKind,
        size: usize,
    ) -> FrameAddress {
        let address = FrameAddress::new(self.stack_pointer() - size.max(1));
        self.records.push(ActivationRecord {
            address,
            ip,
            ip_kind,
            kind,
        });
        address
    }

    /// Push a managed frame suspended at the call instruction at `offset`
    ///
    /// The record holds the return address, one byte past the call site.
    pub fn push_managed(&mut self, method: &MethodDesc, offset: u32) -> FrameAddress {
        self.push(
            method.ip_at(offset) + 1,
            IpKind::ReturnAddress,
            FrameKind::Managed,
            MANAGED_FRAME_SIZE,
        )
    }

    /// Push a native stub frame
    pub fn push_native(&mut self, name: &'static str) -> FrameAddress {
        self.push(
            NATIVE_STUB_IP,
            IpKind::ReturnAddress,
            FrameKind::Native(name),
            NATIVE_FRAME_SIZE,
        )
    }

    /// Pop the innermost record
    pub fn pop(&mut self) -> Option<ActivationRecord> {
        self.records.pop()
    }

    /// Number of records
    pub fn depth(&self) -> usize {
        self.records.len()
    }

    /// Records innermost-first
    pub fn records(&self) -> impl Iterator<Item = &ActivationRecord> {
        self.records.iter().rev()
    }

    /// Innermost managed record, if any
    pub fn innermost_managed(&self) -> Option<&ActivationRecord> {
        self.records().find(|r| r.kind == FrameKind::Managed)
    }

    /// Update the instruction pointer of the record at `address`
    pub fn set_ip(&mut self, address: FrameAddress, ip: usize, ip_kind: IpKind) -> bool {
        match self.index_of(address) {
            Some(index) => {
                let record = &mut self.records[index];
                record.ip = ip;
                record.ip_kind = ip_kind;
                true
            }
            None => false,
        }
    }

    fn index_of(&self, address: FrameAddress) -> Option<usize> {
        // Addresses strictly decrease with the index.
        self.records
            .binary_search_by(|r| address.cmp(&r.address))
            .ok()
    }
}

impl Default for FrameChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FrameChain {
    fn thread(&self) -> ThreadId {
        self.thread
    }

    fn innermost(&self) -> Option<RawFrame> {
        self.records.last().map(ActivationRecord::raw)
    }

    fn caller_of(&self, frame: &RawFrame) -> Option<RawFrame> {
        let index = self.index_of(frame.address)?;
        let caller = index.checked_sub(1)?;
        Some(self.records[caller].raw())
    }
}

thread_local! {
    static CURRENT_CHAIN: RefCell<FrameChain> = RefCell::new(FrameChain::new());
}

/// Run `f` with the calling thread's frame chain.
///
/// The chain is borrowed for the duration of `f`; entering or leaving frames
/// from inside `f` panics, since the stack must not move while it is walked.
pub fn with_current<R>(f: impl FnOnce(&FrameChain) -> R) -> R {
    CURRENT_CHAIN.with(|chain| f(&chain.borrow()))
}

fn with_current_mut<R>(f: impl FnOnce(&mut FrameChain) -> R) -> R {
    CURRENT_CHAIN.with(|chain| f(&mut chain.borrow_mut()))
}

/// Enter `method` on the calling thread, suspended at the call at `offset`
pub fn enter_managed(method: &MethodDesc, offset: u32) -> ActivationGuard {
    let address = with_current_mut(|chain| chain.push_managed(method, offset));
    tracing::trace!(method = %method.full_name(), %address, "enter managed frame");
    ActivationGuard {
        address,
        code_start: Some(method.code_start),
        _not_send: PhantomData,
    }
}

/// Enter a native stub named `name` on the calling thread
pub fn enter_native(name: &'static str) -> ActivationGuard {
    let address = with_current_mut(|chain| chain.push_native(name));
    tracing::trace!(stub = name, %address, "enter native frame");
    ActivationGuard {
        address,
        code_start: None,
        _not_send: PhantomData,
    }
}

/// Keeps a record on the calling thread's chain; pops it on drop.
///
/// Guards must be dropped in reverse order of creation, which scoping
/// guarantees for ordinary use.
#[must_use = "the frame is popped as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ActivationGuard {
    address: FrameAddress,
    code_start: Option<usize>,
    _not_send: PhantomData<*const ()>,
}

impl ActivationGuard {
    /// Address of the guarded record
    pub fn address(&self) -> FrameAddress {
        self.address
    }

    /// Record that the method is now suspended at the call at `offset`
    pub fn call_at(&self, offset: u32) {
        self.update(offset as usize + 1, IpKind::ReturnAddress);
    }

    /// Record that the instruction at `offset` faulted
    pub fn fault_at(&self, offset: u32) {
        self.update(offset as usize, IpKind::Faulting);
    }

    fn update(&self, offset: usize, ip_kind: IpKind) {
        if let Some(code_start) = self.code_start {
            let ip = code_start + offset;
            with_current_mut(|chain| chain.set_ip(self.address, ip, ip_kind));
        }
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        with_current_mut(|chain| {
            let popped = chain.pop();
            debug_assert_eq!(
                popped.map(|r| r.address),
                Some(self.address),
                "activation guards dropped out of order"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeManager;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_assigns_descending_addresses() {
        let code = CodeManager::new();
        let main = code.emit("Program", "Main", 32);

        let mut chain = FrameChain::new();
        let outer = chain.push_managed(&main, 4);
        let stub = chain.push_native("stub");
        let inner = chain.push_managed(&main, 8);

        assert_eq!(outer.get(), STACK_BASE - MANAGED_FRAME_SIZE);
        assert_eq!(stub.get(), outer.get() - NATIVE_FRAME_SIZE);
        assert_eq!(inner.get(), stub.get() - MANAGED_FRAME_SIZE);
    }

    #[test]
    fn test_unwind_walks_outward() {
        let code = CodeManager::new();
        let main = code.emit("Program", "Main", 32);

        let mut chain = FrameChain::new();
        let outer = chain.push_managed(&main, 4);
        let inner = chain.push_managed(&main, 8);

        let addresses: Vec<_> = chain.frames().map(|f| f.address).collect();
        assert_eq!(addresses, vec![inner, outer]);
    }

    #[test]
    fn test_caller_of_unknown_frame_is_none() {
        let mut chain = FrameChain::new();
        chain.push_native("stub");

        let bogus = RawFrame {
            address: FrameAddress::new(0x1234),
            ip: 0,
            ip_kind: IpKind::ReturnAddress,
        };
        assert_eq!(chain.caller_of(&bogus), None);
    }

    #[test]
    fn test_guards_push_and_pop_thread_chain() {
        let code = CodeManager::new();
        let main = code.emit("Program", "Main", 32);

        let before = with_current(FrameChain::depth);
        {
            let frame = enter_managed(&main, 0);
            frame.fault_at(12);
            let _stub = enter_native("stub");

            with_current(|chain| {
                assert_eq!(chain.depth(), before + 2);
                let managed = chain.innermost_managed().unwrap();
                assert_eq!(managed.ip, main.ip_at(12));
                assert_eq!(managed.ip_kind, IpKind::Faulting);
            });
        }
        assert_eq!(with_current(FrameChain::depth), before);
    }

    #[test]
    fn test_call_at_records_return_address() {
        let code = CodeManager::new();
        let main = code.emit("Program", "Main", 32);

        let frame = enter_managed(&main, 0);
        frame.call_at(7);

        with_current(|chain| {
            let record = chain.innermost_managed().unwrap();
            assert_eq!(record.ip, main.ip_at(8));
            assert_eq!(record.ip_kind, IpKind::ReturnAddress);
            assert_eq!(chain.innermost().unwrap().lookup_ip(), main.ip_at(7));
        });
    }
}
