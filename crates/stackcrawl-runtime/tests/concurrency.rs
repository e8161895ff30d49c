//! Captures on independent threads

mod common;

use common::{emit_frames, names, services, with_frames};
use pretty_assertions::assert_eq;
use stackcrawl_runtime::{StackCrawlMark, StackTrace, SystemServices};
use std::sync::{Arc, Barrier};

fn capture_here(services: &SystemServices) -> StackTrace {
    let handle = services
        .capture_stack_trace(&StackCrawlMark::here(), 0, None)
        .unwrap();
    services.stack_trace_of(handle).unwrap()
}

#[test]
fn test_concurrent_captures_see_only_their_own_stack() {
    let services = services();
    let shallow = emit_frames(services.code(), 2);
    let deep: Vec<_> = (0..7)
        .map(|i| services.code().emit("Deep", &format!("Level{i}"), 48))
        .collect();

    let solo_shallow = with_frames(&shallow, |_| capture_here(&services));
    let solo_deep = with_frames(&deep, |_| capture_here(&services));

    let barrier = Arc::new(Barrier::new(2));
    let (concurrent_shallow, concurrent_deep) = std::thread::scope(|scope| {
        let a = scope.spawn(|| {
            with_frames(&shallow, |_| {
                barrier.wait();
                (0..50).map(|_| capture_here(&services)).collect::<Vec<_>>()
            })
        });
        let b = scope.spawn(|| {
            with_frames(&deep, |_| {
                barrier.wait();
                (0..50).map(|_| capture_here(&services)).collect::<Vec<_>>()
            })
        });
        (a.join().unwrap(), b.join().unwrap())
    });

    for trace in concurrent_shallow {
        assert_eq!(names(&trace), names(&solo_shallow));
    }
    for trace in concurrent_deep {
        assert_eq!(trace, solo_deep);
    }
}
