// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Once;
use std::time::{Duration, Instant};

use osal::error::{Error, EALREADY};
use osal::thread::{self, Priority, TaskState, Thread, ThreadConfig};

/// Start logging and the scheduler, once per test binary.
pub fn boot() {
    static BOOT: Once = Once::new();
    BOOT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        match osal::sys::start_scheduler() {
            Ok(()) | Err(Error(EALREADY)) => (),
            Err(err) => panic!("starting the scheduler: {}", err),
        }
    });
}

/// Spawn a thread running `body`, which then exits.
pub fn spawn<F>(name: &str, priority: Priority, body: F) -> Thread
    where F: FnOnce() + Send + 'static,
{
    let config = ThreadConfig::new(name).priority(priority);
    Thread::new(&config, move || {
        body();
        thread::exit();
    })
    .expect("creating a thread")
}

/// Poll `cond` until it holds, or a second passes.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Wait for a thread to block in the kernel.
pub fn wait_blocked(thread: &Thread) {
    assert!(
        eventually(|| thread.state() == TaskState::Blocked),
        "{:?} never blocked",
        thread,
    );
}

/// How long the tests wait for something that should happen promptly.
pub const PROMPT: Duration = Duration::from_secs(2);
