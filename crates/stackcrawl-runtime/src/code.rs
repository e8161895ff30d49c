//! Code manager for JIT-emitted method bodies
//!
//! Every method the execution engine compiles gets a contiguous range in the
//! code heap. The stack walker asks the code manager to map an instruction
//! pointer back to `(method, offset)`. Addresses outside every registered
//! range belong to native code (trampolines, marshaling stubs, the host) and
//! do not resolve.
//!
//! ```text
//! code heap
//! ┌──────────────┬─guard─┬──────────────┬─guard─┬─────
//! │ Program.Main │       │ Worker.Run   │       │ ...
//! └──────────────┴───────┴──────────────┴───────┴─────
//!  ^code_start            ^code_start
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Base address of the simulated code heap
pub const CODE_HEAP_BASE: usize = 0x4000_0000;

/// Method bodies start on this boundary
const CODE_ALIGNMENT: usize = 16;

/// Unmapped gap left after every method body
const GUARD_SIZE: usize = 16;

/// Identifier of a compiled method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MethodId(u32);

impl MethodId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Descriptor of one compiled method body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDesc {
    pub id: MethodId,
    pub declaring_type: String,
    pub name: String,
    pub code_start: usize,
    pub code_size: usize,
}

impl MethodDesc {
    /// `Type.Method`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }

    /// Whether `ip` falls inside this method's body
    pub fn contains(&self, ip: usize) -> bool {
        ip >= self.code_start && ip - self.code_start < self.code_size
    }

    /// Instruction pointer at `offset` bytes into the body
    pub fn ip_at(&self, offset: u32) -> usize {
        self.code_start + offset as usize
    }
}

#[derive(Debug, Default)]
struct CodeHeap {
    next_address: usize,
    by_start: BTreeMap<usize, Arc<MethodDesc>>,
    by_id: Vec<Arc<MethodDesc>>,
}

/// Registry of compiled method bodies, shared by every thread
#[derive(Debug)]
pub struct CodeManager {
    heap: RwLock<CodeHeap>,
}

impl CodeManager {
    pub fn new() -> Self {
        Self {
            heap: RwLock::new(CodeHeap {
                next_address: CODE_HEAP_BASE,
                ..CodeHeap::default()
            }),
        }
    }

    /// Reserve a body of `code_size` bytes for `declaring_type.name`
    ///
    /// A zero-sized request still gets one byte so the method stays resolvable.
    pub fn emit(&self, declaring_type: &str, name: &str, code_size: usize) -> Arc<MethodDesc> {
        let mut heap = self.heap.write().unwrap_or_else(|e| e.into_inner());

        let code_size = code_size.max(1);
        let code_start = heap.next_address;
        let id = MethodId(heap.by_id.len() as u32 + 1);

        let method = Arc::new(MethodDesc {
            id,
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
            code_start,
            code_size,
        });

        let end = code_start + code_size + GUARD_SIZE;
        heap.next_address = (end + CODE_ALIGNMENT - 1) & !(CODE_ALIGNMENT - 1);
        heap.by_start.insert(code_start, Arc::clone(&method));
        heap.by_id.push(Arc::clone(&method));

        tracing::debug!(
            method = %method.full_name(),
            id = %id,
            code_start,
            code_size,
            "emitted method body"
        );

        method
    }

    /// Map an instruction pointer to its method and the offset inside it
    pub fn resolve(&self, ip: usize) -> Option<(Arc<MethodDesc>, u32)> {
        let heap = self.heap.read().unwrap_or_else(|e| e.into_inner());
        let (_, method) = heap.by_start.range(..=ip).next_back()?;
        if !method.contains(ip) {
            return None;
        }
        Some((Arc::clone(method), (ip - method.code_start) as u32))
    }

    /// Look up a method by id
    pub fn method(&self, id: MethodId) -> Option<Arc<MethodDesc>> {
        let heap = self.heap.read().unwrap_or_else(|e| e.into_inner());
        heap.by_id.get((id.0 as usize).checked_sub(1)?).cloned()
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.heap.read().unwrap_or_else(|e| e.into_inner()).by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CodeManager {
    fn default() -> Self {
        Self::new()
    }
}
