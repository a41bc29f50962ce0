mod common;
use common::*;

use cryo_bridge::error::{Error, Result as DeviceResult};
use cryo_bridge::retry::RetryPolicy;
use cryo_bridge::ErrorKind;

use std::cell::Cell;
use std::time::{Duration, Instant};

fn timeout() -> Error {
    Error::io(
        "read",
        std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"),
    )
}

#[test]
fn succeeds_after_transient_failures() {
    common_setup();

    let calls = Cell::new(0);
    let result = RetryPolicy::immediate(5).run(|| {
        calls.set(calls.get() + 1);
        if calls.get() < 3 {
            Err(timeout())
        } else {
            Ok(calls.get())
        }
    });

    assert_eq!(result.unwrap(), 3);
}

#[test]
fn exhausting_attempts_surfaces_last_failure() {
    common_setup();

    let calls = Cell::new(0);
    let result: DeviceResult<()> = RetryPolicy::immediate(4).run(|| {
        calls.set(calls.get() + 1);
        Err(timeout())
    });

    assert_eq!(result.unwrap_err().kind(), ErrorKind::TransientIo);
    assert_eq!(calls.get(), 4);
}

#[test]
fn non_transient_failures_are_not_retried() {
    common_setup();

    let calls = Cell::new(0);
    let result: DeviceResult<()> = RetryPolicy::immediate(5).run(|| {
        calls.set(calls.get() + 1);
        Err(Error::Exception {
            operation: "read".to_string(),
            code: "IllegalDataAddress".to_string(),
        })
    });

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Exception);
    assert_eq!(calls.get(), 1);
}

#[test]
fn predicate_selects_retried_kinds() {
    common_setup();

    let calls = Cell::new(0);
    let policy = RetryPolicy::immediate(3).retry_on(|kind| kind == ErrorKind::Decode);
    let result: DeviceResult<()> = policy.run(|| {
        calls.set(calls.get() + 1);
        Err(Error::Decode("garbage".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(calls.get(), 3);
}

#[test]
fn waits_within_window() {
    common_setup();

    let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(20));
    let calls = Cell::new(0);
    let started = Instant::now();
    let _: DeviceResult<()> = policy.run(|| {
        calls.set(calls.get() + 1);
        Err(timeout())
    });

    // two waits between three attempts
    assert_eq!(calls.get(), 3);
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[test]
fn default_policy() {
    common_setup();

    assert_eq!(RetryPolicy::default().max_attempts(), 5);
    assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
}
