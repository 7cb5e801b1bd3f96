//! End-to-end integration tests
//!
//! These tests drive the real client against the mock debuggee binary over
//! its standard streams, covering the full path: framing, correlation,
//! event dispatch, and session teardown.

use std::path::Path;
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

use unity_debug::common::logging;
use unity_debug::{ClientOptions, DebugClient, DebugEvent, Error};

static LOGGING: Once = Once::new();

fn mock_debuggee() -> &'static Path {
    LOGGING.call_once(logging::init);
    Path::new(env!("CARGO_BIN_EXE_mock_debuggee"))
}

fn connect() -> DebugClient {
    DebugClient::initialize_with(
        mock_debuggee(),
        ClientOptions {
            request_timeout: Duration::from_secs(10),
        },
    )
    .expect("initialize against mock debuggee")
}

/// Wait for the next event, bounded so a missing event fails the test
/// instead of hanging it.
fn next_event(events: &mut UnboundedReceiver<DebugEvent>) -> DebugEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match events.try_recv() {
            Ok(event) => return event,
            Err(TryRecvError::Empty) => {
                assert!(Instant::now() < deadline, "timed out waiting for event");
                thread::sleep(Duration::from_millis(10));
            }
            Err(TryRecvError::Disconnected) => panic!("event channel closed"),
        }
    }
}

fn assert_no_event(events: &mut UnboundedReceiver<DebugEvent>) {
    thread::sleep(Duration::from_millis(100));
    match events.try_recv() {
        Ok(event) => panic!("unexpected event: {:?}", event),
        Err(_) => {}
    }
}

#[test]
fn initialize_with_bad_path_fails_fast() {
    let err = DebugClient::initialize("/no/such/debuggee").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn attach_succeeds_and_reports_main_thread() {
    let mut client = connect();
    let mut events = client.take_event_receiver().unwrap();

    client.attach("Unity Editor").unwrap();

    assert_eq!(
        next_event(&mut events),
        DebugEvent::ThreadStarted { thread_id: 1 }
    );
}

#[test]
fn attach_rejection_is_recoverable() {
    let client = connect();

    let err = client.attach("missing").unwrap_err();
    assert!(err.is_recoverable());
    match err {
        Error::BadRequest(message) => assert_eq!(message, "no target"),
        other => panic!("expected BadRequest, got {:?}", other),
    }

    // A rejected request only fails that call; the session stays usable.
    client.attach("Unity Editor").unwrap();
}

#[test]
fn breakpoints_accumulate_per_file() {
    let mut client = connect();
    let mut events = client.take_event_receiver().unwrap();

    client.attach("Unity Editor").unwrap();
    assert_eq!(
        next_event(&mut events),
        DebugEvent::ThreadStarted { thread_id: 1 }
    );

    client.add_breakpoint("/a.cs", 10).unwrap();
    assert_eq!(
        next_event(&mut events),
        DebugEvent::BreakpointHit {
            path: "/a.cs".to_string(),
            line: 10
        }
    );

    // The second add must carry {10, 20}, not {20}: the mock echoes one
    // stop per line it received.
    client.add_breakpoint("/a.cs", 20).unwrap();
    assert_eq!(
        next_event(&mut events),
        DebugEvent::BreakpointHit {
            path: "/a.cs".to_string(),
            line: 10
        }
    );
    assert_eq!(
        next_event(&mut events),
        DebugEvent::BreakpointHit {
            path: "/a.cs".to_string(),
            line: 20
        }
    );

    assert_eq!(client.breakpoint_lines("/a.cs"), vec![10, 20]);
}

#[test]
fn duplicate_breakpoint_sends_nothing() {
    let mut client = connect();
    let mut events = client.take_event_receiver().unwrap();

    client.attach("Unity Editor").unwrap();
    assert_eq!(
        next_event(&mut events),
        DebugEvent::ThreadStarted { thread_id: 1 }
    );

    client.add_breakpoint("/a.cs", 10).unwrap();
    assert_eq!(
        next_event(&mut events),
        DebugEvent::BreakpointHit {
            path: "/a.cs".to_string(),
            line: 10
        }
    );

    // Adding the same line again is a no-op: no request, no echoed stop.
    client.add_breakpoint("/a.cs", 10).unwrap();
    assert_no_event(&mut events);

    assert_eq!(client.breakpoint_lines("/a.cs"), vec![10]);
}

#[test]
fn breakpoints_are_tracked_per_file() {
    let client = connect();
    client.attach("Unity Editor").unwrap();

    client.add_breakpoint("/a.cs", 10).unwrap();
    client.add_breakpoint("/b.cs", 7).unwrap();

    assert_eq!(client.breakpoint_lines("/a.cs"), vec![10]);
    assert_eq!(client.breakpoint_lines("/b.cs"), vec![7]);
    assert!(client.breakpoint_lines("/c.cs").is_empty());
}

#[test]
fn thread_lifecycle_events_arrive_in_order() {
    let mut client = connect();
    let mut events = client.take_event_receiver().unwrap();

    client.attach("churn").unwrap();

    assert_eq!(
        next_event(&mut events),
        DebugEvent::ThreadStarted { thread_id: 1 }
    );
    assert_eq!(
        next_event(&mut events),
        DebugEvent::ThreadStarted { thread_id: 2 }
    );
    assert_eq!(
        next_event(&mut events),
        DebugEvent::ThreadExited { thread_id: 2 }
    );
}

#[test]
fn unrecognized_event_is_delivered_out_of_band() {
    let mut client = connect();
    let mut events = client.take_event_receiver().unwrap();

    // The unknown event must not fail this call or any later one.
    client.attach("noisy").unwrap();

    assert_eq!(
        next_event(&mut events),
        DebugEvent::Unrecognized {
            event: "customTelemetry".to_string()
        }
    );

    client.add_breakpoint("/a.cs", 3).unwrap();
}

#[test]
fn unmatched_request_seq_terminates_session() {
    let client = connect();

    let err = client.attach("desync").unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);
    assert!(!err.is_recoverable());

    // Correlation can no longer be trusted; later calls fail fast.
    let err = client.attach("Unity Editor").unwrap_err();
    assert!(matches!(err, Error::Disconnected), "got {:?}", err);
}

#[test]
fn debuggee_exit_resolves_pending_calls() {
    let client = connect();

    let err = client.attach("quit").unwrap_err();
    assert!(matches!(err, Error::Disconnected), "got {:?}", err);

    let err = client.add_breakpoint("/a.cs", 10).unwrap_err();
    assert!(matches!(err, Error::Disconnected), "got {:?}", err);
}

#[test]
fn unanswered_request_times_out() {
    let client = DebugClient::initialize_with(
        mock_debuggee(),
        ClientOptions {
            request_timeout: Duration::from_secs(1),
        },
    )
    .unwrap();

    let start = Instant::now();
    let err = client.attach("stall").unwrap_err();
    assert!(matches!(err, Error::Timeout(1)), "got {:?}", err);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[test]
fn concurrent_callers_correlate_independently() {
    let client = Arc::new(connect());
    client.attach("Unity Editor").unwrap();

    let mut handles = Vec::new();
    for i in 0..4u32 {
        let client = Arc::clone(&client);
        handles.push(thread::spawn(move || {
            let path = format!("/file{}.cs", i);
            client.add_breakpoint(&path, 10 + i).unwrap();
            client.add_breakpoint(&path, 20 + i).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..4u32 {
        let path = format!("/file{}.cs", i);
        assert_eq!(client.breakpoint_lines(path), vec![10 + i, 20 + i]);
    }
}

#[test]
fn corrupt_frame_fails_the_session() {
    let client = connect();

    let err = client.attach("garble").unwrap_err();
    assert!(matches!(err, Error::Framing(_)), "got {:?}", err);

    let err = client.attach("Unity Editor").unwrap_err();
    assert!(matches!(err, Error::Disconnected), "got {:?}", err);
}
