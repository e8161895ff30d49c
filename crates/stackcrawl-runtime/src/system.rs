//! Managed-facing system services
//!
//! [`SystemServices`] is what managed code calls into: stack capture, exit
//! code and termination, processor and GC queries, and loader exception
//! messages. Each entry point has a [`BoundaryCall`] descriptor in [`calls`].

use crate::boundary::{
    enter_fast, enter_safe, safe_call, safe_call_with_output, BoundaryCall, SafeContext,
};
use crate::capture::{BufferPolicy, CaptureSession, StackTrace, StackWalker};
use crate::code::CodeManager;
use crate::error::{BoundaryError, BoundaryResult, CaptureResult};
use crate::frame::{self, FrameAddress, FrameSource};
use crate::gc::{Handle, ManagedHeap, ManagedObject};
use crate::marker::StackCrawlMark;
use crate::messages;
use crate::process::{self, FailFastReport, ProcessContext};
use stackcrawl_config::RuntimeConfig;
use std::sync::Arc;

/// Boundary descriptors of every system service
pub mod calls {
    use crate::boundary::BoundaryCall;

    pub const CAPTURE_STACK_TRACE: BoundaryCall = BoundaryCall::safe("capture_stack_trace");
    pub const GET_PROCESSOR_COUNT: BoundaryCall = BoundaryCall::safe("get_processor_count");
    pub const IS_SERVER_GC: BoundaryCall = BoundaryCall::fast("is_server_gc");
    pub const SET_EXIT_CODE: BoundaryCall = BoundaryCall::fast("set_exit_code");
    pub const GET_EXIT_CODE: BoundaryCall = BoundaryCall::fast("get_exit_code");
    pub const EXIT: BoundaryCall = BoundaryCall::diverging("exit");
    pub const FAIL_FAST: BoundaryCall = BoundaryCall::diverging("fail_fast");
    pub const TYPE_LOAD_EXCEPTION_MESSAGE: BoundaryCall =
        BoundaryCall::safe("type_load_exception_message");
    pub const FILE_LOAD_EXCEPTION_MESSAGE: BoundaryCall =
        BoundaryCall::safe("file_load_exception_message");
    pub const MESSAGE_FOR_HRESULT: BoundaryCall = BoundaryCall::safe("message_for_hresult");
    pub const CPU_ID: BoundaryCall = BoundaryCall::safe("cpu_id");
    pub const READ_OBJECT: BoundaryCall = BoundaryCall::safe("read_object");

    pub const ALL: &[BoundaryCall] = &[
        CAPTURE_STACK_TRACE,
        GET_PROCESSOR_COUNT,
        IS_SERVER_GC,
        SET_EXIT_CODE,
        GET_EXIT_CODE,
        EXIT,
        FAIL_FAST,
        TYPE_LOAD_EXCEPTION_MESSAGE,
        FILE_LOAD_EXCEPTION_MESSAGE,
        MESSAGE_FOR_HRESULT,
        CPU_ID,
        READ_OBJECT,
    ];
}

/// Runtime services exposed across the boundary
#[derive(Debug, Clone)]
pub struct SystemServices {
    code: Arc<CodeManager>,
    heap: Arc<ManagedHeap>,
    process: Arc<ProcessContext>,
    policy: BufferPolicy,
}

impl SystemServices {
    /// Services attached to the process-wide [`ProcessContext`].
    ///
    /// `config` sizes the heap and the capture buffer; exit code, GC mode and
    /// processor count come from [`process::global`].
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::from_parts(
            Arc::new(CodeManager::new()),
            Arc::new(ManagedHeap::new(config)),
            process::global(),
            BufferPolicy::from_config(config),
        )
    }

    pub fn from_parts(
        code: Arc<CodeManager>,
        heap: Arc<ManagedHeap>,
        process: Arc<ProcessContext>,
        policy: BufferPolicy,
    ) -> Self {
        Self {
            code,
            heap,
            process,
            policy,
        }
    }

    pub fn code(&self) -> &CodeManager {
        &self.code
    }

    pub fn heap(&self) -> &ManagedHeap {
        &self.heap
    }

    pub fn process(&self) -> &ProcessContext {
        &self.process
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    /// Capture the calling thread's stack into a managed trace object.
    ///
    /// `skip` omits that many resolvable frames after the mark; `stop_at`
    /// ends the walk at the first frame at or above that address.
    pub fn capture_stack_trace(
        &self,
        mark: &StackCrawlMark,
        skip: i32,
        stop_at: Option<FrameAddress>,
    ) -> BoundaryResult<Handle> {
        let call = &calls::CAPTURE_STACK_TRACE;
        let skip = usize::try_from(skip).map_err(|_| BoundaryError::InvalidArgument {
            call: call.name,
            name: "skip",
            reason: format!("must not be negative, got {skip}"),
        })?;

        safe_call_with_output(&self.heap, call, |ctx, out| {
            let trace = self.capture(mark, skip, stop_at)?;
            out.set_object(ctx, ManagedObject::StackTrace(trace))
        })
    }

    /// Capture the calling thread's stack without touching the managed heap
    pub fn capture(
        &self,
        mark: &StackCrawlMark,
        skip: usize,
        stop_at: Option<FrameAddress>,
    ) -> CaptureResult<StackTrace> {
        frame::with_current(|chain| self.capture_from(chain, mark, skip, stop_at))
    }

    /// Capture from an arbitrary frame source
    pub fn capture_from<S: FrameSource>(
        &self,
        source: &S,
        mark: &StackCrawlMark,
        skip: usize,
        stop_at: Option<FrameAddress>,
    ) -> CaptureResult<StackTrace> {
        let mut session = CaptureSession::with_policy(self.policy)
            .skip(skip)
            .stop_at(stop_at);
        StackWalker::new(&self.code).walk(source, mark, &mut session)?;
        Ok(StackTrace::new(session.into_elements()))
    }

    /// Copy out the trace behind a handle returned by
    /// [`capture_stack_trace`](Self::capture_stack_trace)
    pub fn stack_trace_of(&self, handle: Handle) -> BoundaryResult<StackTrace> {
        safe_call(&self.heap, &calls::READ_OBJECT, |ctx| ctx.stack_trace(handle))
    }

    /// Copy out the string behind a handle
    pub fn string_of(&self, handle: Handle) -> BoundaryResult<String> {
        safe_call(&self.heap, &calls::READ_OBJECT, |ctx| ctx.string(handle))
    }

    pub fn get_processor_count(&self) -> i32 {
        let _safe = enter_safe(&self.heap, &calls::GET_PROCESSOR_COUNT);
        i32::try_from(self.process.processor_count().get()).unwrap_or(i32::MAX)
    }

    pub fn is_server_gc(&self) -> bool {
        let _fast = enter_fast(&self.heap, &calls::IS_SERVER_GC);
        self.process.is_server_gc()
    }

    pub fn set_exit_code(&self, code: i32) {
        let _fast = enter_fast(&self.heap, &calls::SET_EXIT_CODE);
        self.process.set_exit_code(code);
    }

    pub fn get_exit_code(&self) -> i32 {
        let _fast = enter_fast(&self.heap, &calls::GET_EXIT_CODE);
        self.process.exit_code()
    }

    /// Exit with `code` immediately, bypassing orderly shutdown
    pub fn exit(&self, code: i32) -> ! {
        let _safe = enter_safe(&self.heap, &calls::EXIT);
        self.process.set_exit_code(code);
        self.process.terminate(code)
    }

    /// Report a fatal error with the caller's stack and abort
    ///
    /// If the report cannot be completed (stale exception handle, mark not on
    /// this stack) only the message and source are reported; termination
    /// still happens.
    pub fn fail_fast(
        &self,
        mark: &StackCrawlMark,
        message: &str,
        exception: Option<Handle>,
        error_source: Option<&str>,
    ) -> ! {
        let mut report = FailFastReport {
            message: message.to_string(),
            error_source: error_source.map(str::to_string),
            ..FailFastReport::default()
        };

        let safe = enter_safe(&self.heap, &calls::FAIL_FAST);
        match self.fail_fast_details(safe.context(), mark, exception) {
            Ok((exception, trace)) => {
                report.exception = exception;
                report.stack_trace = Some(trace);
            }
            Err(err) => tracing::warn!(error = %err, "incomplete fail-fast report"),
        }

        self.process.fail_fast(&report)
    }

    fn fail_fast_details(
        &self,
        ctx: &SafeContext<'_>,
        mark: &StackCrawlMark,
        exception: Option<Handle>,
    ) -> BoundaryResult<(Option<String>, StackTrace)> {
        let exception = exception
            .map(|handle| ctx.read(handle, render))
            .transpose()?;
        let trace = self.capture(mark, 0, None)?;
        Ok((exception, trace))
    }

    pub fn type_load_exception_message(&self, resource_id: u32) -> BoundaryResult<Handle> {
        self.message(&calls::TYPE_LOAD_EXCEPTION_MESSAGE, || {
            messages::type_load_message(resource_id).to_string()
        })
    }

    pub fn file_load_exception_message(&self, hresult: u32) -> BoundaryResult<Handle> {
        self.message(&calls::FILE_LOAD_EXCEPTION_MESSAGE, || {
            messages::file_load_message(hresult)
        })
    }

    pub fn message_for_hresult(&self, hresult: u32) -> BoundaryResult<Handle> {
        self.message(&calls::MESSAGE_FOR_HRESULT, || messages::hresult_message(hresult))
    }

    fn message(
        &self,
        call: &BoundaryCall,
        text: impl FnOnce() -> String,
    ) -> BoundaryResult<Handle> {
        safe_call_with_output(&self.heap, call, |ctx, out| out.set_string(ctx, text()))
    }

    /// Raw `cpuid` registers `[eax, ebx, ecx, edx]`
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub fn cpu_id(&self, function_id: i32, sub_function_id: i32) -> [i32; 4] {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::__cpuid_count;
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::__cpuid_count;

        let _safe = enter_safe(&self.heap, &calls::CPU_ID);
        // SAFETY: every CPU this target can run on implements cpuid.
        #[allow(unused_unsafe)]
        let regs = unsafe { __cpuid_count(function_id as u32, sub_function_id as u32) };
        [regs.eax as i32, regs.ebx as i32, regs.ecx as i32, regs.edx as i32]
    }
}

fn render(object: &ManagedObject) -> String {
    match object {
        ManagedObject::String(s) => s.clone(),
        ManagedObject::StackTrace(trace) => trace.to_string(),
        ManagedObject::Exception {
            message,
            stack_trace: Some(trace),
        } => format!("{message}\n{trace}"),
        ManagedObject::Exception { message, .. } => message.clone(),
    }
}
