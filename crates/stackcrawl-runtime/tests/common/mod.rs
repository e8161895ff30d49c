//! Shared helpers for integration tests

#![allow(dead_code)]

use stackcrawl_config::RuntimeConfig;
use stackcrawl_runtime::frame::enter_managed;
use stackcrawl_runtime::{
    BufferPolicy, CodeManager, FrameAddress, ManagedHeap, MethodDesc, ProcessContext, StackTrace,
    SystemServices,
};
use std::sync::Arc;

/// Offset of the call instruction every test frame is suspended at
pub const CALL_OFFSET: u32 = 6;

pub fn services() -> SystemServices {
    SystemServices::new(&RuntimeConfig::default())
}

/// Services with a private process context, for tests that write the exit
/// code
pub fn isolated_services() -> SystemServices {
    services_with_policy(Arc::new(CodeManager::new()), BufferPolicy::default())
}

/// Services over a shared code manager with an explicit buffer policy
pub fn services_with_policy(code: Arc<CodeManager>, policy: BufferPolicy) -> SystemServices {
    let config = RuntimeConfig::default();
    SystemServices::from_parts(
        code,
        Arc::new(ManagedHeap::new(&config)),
        Arc::new(ProcessContext::new(&config)),
        policy,
    )
}

/// Emit `Frame0` (outermost) through `Frame{depth-1}` (innermost)
pub fn emit_frames(code: &CodeManager, depth: usize) -> Vec<Arc<MethodDesc>> {
    (0..depth)
        .map(|i| code.emit("Tests", &format!("Frame{i}"), 32))
        .collect()
}

/// Run `f` with `methods` entered on the current thread, outermost first.
///
/// `f` receives the frame addresses in entry order.
pub fn with_frames<R>(methods: &[Arc<MethodDesc>], f: impl FnOnce(&[FrameAddress]) -> R) -> R {
    fn nest<R>(
        methods: &[Arc<MethodDesc>],
        addresses: &mut Vec<FrameAddress>,
        f: impl FnOnce(&[FrameAddress]) -> R,
    ) -> R {
        match methods.split_first() {
            None => f(addresses),
            Some((method, rest)) => {
                let guard = enter_managed(method, CALL_OFFSET);
                addresses.push(guard.address());
                nest(rest, addresses, f)
            }
        }
    }

    nest(methods, &mut Vec::with_capacity(methods.len()), f)
}

/// Method names of `trace`, innermost first
pub fn names(trace: &StackTrace) -> Vec<String> {
    trace.frames().iter().map(|e| e.method.name.clone()).collect()
}

/// Expected names for frames `Frame{from}` down to `Frame0`
pub fn expected_names(from: usize) -> Vec<String> {
    (0..=from).rev().map(|i| format!("Frame{i}")).collect()
}
