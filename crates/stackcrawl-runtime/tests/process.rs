//! Process services: exit code, termination and loader messages

mod common;

use common::{emit_frames, isolated_services, services, with_frames};
use pretty_assertions::assert_eq;
use rstest::rstest;
use stackcrawl_config::RuntimeConfig;
use stackcrawl_runtime::frame::{with_current, FrameKind};
use stackcrawl_runtime::messages::{self, resource};
use stackcrawl_runtime::process;
use stackcrawl_runtime::{
    BufferPolicy, CodeManager, FailFastReport, ManagedHeap, ManagedObject, ProcessContext,
    StackCrawlMark, SystemServices, Terminator,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Unwinds instead of terminating so tests can observe the request
#[derive(Debug, Default)]
struct RecordingTerminator {
    report: Arc<Mutex<Option<FailFastReport>>>,
}

#[derive(Debug, PartialEq)]
enum Terminated {
    Exit { code: i32, frame: Option<FrameKind> },
    FailFast,
}

impl Terminator for RecordingTerminator {
    fn exit(&self, code: i32) -> ! {
        let frame = with_current(|chain| chain.records().next().map(|r| r.kind));
        panic::resume_unwind(Box::new(Terminated::Exit { code, frame }))
    }

    fn fail_fast(&self, report: &FailFastReport) -> ! {
        *self.report.lock().unwrap() = Some(report.clone());
        panic::resume_unwind(Box::new(Terminated::FailFast))
    }
}

fn recording_services() -> (SystemServices, Arc<Mutex<Option<FailFastReport>>>) {
    let config = RuntimeConfig::default();
    let terminator = RecordingTerminator::default();
    let report = Arc::clone(&terminator.report);
    let services = SystemServices::from_parts(
        Arc::new(CodeManager::new()),
        Arc::new(ManagedHeap::new(&config)),
        Arc::new(ProcessContext::with_terminator(&config, Box::new(terminator))),
        BufferPolicy::from_config(&config),
    );
    (services, report)
}

fn terminated(f: impl FnOnce()) -> Terminated {
    let payload = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_err();
    *payload.downcast::<Terminated>().unwrap()
}

#[test]
fn test_exit_code_last_write_wins() {
    let services = isolated_services();
    assert_eq!(services.get_exit_code(), 0);

    services.set_exit_code(42);
    assert_eq!(services.get_exit_code(), 42);

    services.set_exit_code(-1);
    assert_eq!(services.get_exit_code(), -1);
}

#[test]
fn test_processor_count_is_positive_and_stable() {
    let services = services();
    let first = services.get_processor_count();
    assert!(first >= 1);
    for _ in 0..8 {
        assert_eq!(services.get_processor_count(), first);
    }
}

#[test]
fn test_global_context_is_shared() {
    let a = process::global();
    let b = process::global();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.processor_count().get() >= 1);
}

#[test]
fn test_services_share_process_exit_code() {
    let a = SystemServices::new(&RuntimeConfig::default());
    let b = SystemServices::new(&RuntimeConfig::default());

    a.set_exit_code(42);

    assert_eq!(b.get_exit_code(), 42);
    assert_eq!(process::global().exit_code(), 42);
}

#[test]
fn test_exit_latches_code_and_terminates() {
    let (services, _) = recording_services();

    let outcome = terminated(|| services.exit(3));

    assert_eq!(
        outcome,
        Terminated::Exit {
            code: 3,
            frame: Some(FrameKind::Native("exit")),
        }
    );
    assert_eq!(services.get_exit_code(), 3);
}

#[test]
fn test_fail_fast_reports_exception_and_caller_stack() {
    let (services, report) = recording_services();
    let methods = emit_frames(services.code(), 3);
    let exception = services
        .heap()
        .alloc(ManagedObject::Exception {
            message: "index out of range".into(),
            stack_trace: None,
        })
        .unwrap();

    let outcome = terminated(|| {
        with_frames(&methods, |_| {
            services.fail_fast(
                &StackCrawlMark::here(),
                "unrecoverable state",
                Some(exception),
                Some("Worker"),
            );
        })
    });

    assert_eq!(outcome, Terminated::FailFast);
    let report = report.lock().unwrap().take().unwrap();
    assert_eq!(report.message, "unrecoverable state");
    assert_eq!(report.error_source.as_deref(), Some("Worker"));
    assert_eq!(report.exception.as_deref(), Some("index out of range"));
    assert_eq!(
        report.stack_trace.unwrap().method_names(),
        vec!["Tests.Frame2", "Tests.Frame1", "Tests.Frame0"]
    );
}

#[test]
fn test_fail_fast_without_stack_still_terminates() {
    let (services, report) = recording_services();

    let outcome = std::thread::scope(|scope| {
        let payload = scope
            .spawn(|| {
                services.fail_fast(&StackCrawlMark::here(), "no frames", None, None);
            })
            .join()
            .unwrap_err();
        *payload.downcast::<Terminated>().unwrap()
    });

    assert_eq!(outcome, Terminated::FailFast);
    let report = report.lock().unwrap().take().unwrap();
    assert_eq!(report.message, "no frames");
    assert!(report.stack_trace.is_none());
}

#[rstest]
#[case(messages::COR_E_FILENOTFOUND, "The system cannot find the file specified.")]
#[case(messages::FUSION_E_INVALID_NAME, "The given assembly name was invalid.")]
#[case(0x8000_FFFF, "Exception from HRESULT: 0x8000FFFF")]
fn test_message_for_hresult(#[case] hresult: u32, #[case] expected: &str) {
    let services = services();
    let handle = services.message_for_hresult(hresult).unwrap();
    assert_eq!(services.string_of(handle).unwrap(), expected);
}

#[test]
fn test_loader_messages_are_managed_strings() {
    let services = services();

    let type_load = services
        .type_load_exception_message(resource::CLASSLOAD_GENERAL)
        .unwrap();
    let file_load = services
        .file_load_exception_message(messages::E_ACCESSDENIED)
        .unwrap();

    assert_eq!(
        services.string_of(type_load).unwrap(),
        "Could not load type '{0}' from assembly '{1}'."
    );
    assert_eq!(
        services.string_of(file_load).unwrap(),
        "Could not load file or assembly '{0}'. Access is denied."
    );
}
