// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use osal::error::{Error, EAGAIN, EBUSY, EINVAL, ENOSPC};
use osal::raw::k_isr_yield_count;
use osal::sys::isr::yield_from_isr;
use osal::sys::sync::{Semaphore, SemaphoreConfig};
use osal::thread::Priority;
use osal::time::Timeout;
use quickcheck_macros::quickcheck;

use common::{boot, spawn, wait_blocked, PROMPT};

#[test]
fn post_releases_a_waiter() {
    boot();
    let gate = Arc::new(Semaphore::new(&SemaphoreConfig::counting(0, 1)).unwrap());
    let (tx, rx) = mpsc::channel();

    let waiter = {
        let gate = gate.clone();
        spawn("gated", Priority::Normal, move || {
            tx.send(gate.wait()).unwrap();
        })
    };
    wait_blocked(&waiter);
    assert!(rx.try_recv().is_err());

    gate.post().unwrap();
    assert_eq!(rx.recv_timeout(PROMPT).unwrap(), Ok(()));
    // The token went to the waiter.
    assert_eq!(gate.count(), 0);
}

#[test]
fn counting_limits() {
    boot();
    let sem = Semaphore::new(&SemaphoreConfig::counting(2, 3)).unwrap();
    assert_eq!(sem.count(), 2);
    sem.post().unwrap();
    assert_eq!(sem.post(), Err(Error(ENOSPC)));
    assert_eq!(sem.count(), 3);

    for _ in 0..3 {
        sem.try_wait().unwrap();
    }
    assert_eq!(sem.try_wait(), Err(Error(EBUSY)));
    assert_eq!(sem.count(), 0);
    sem.delete().unwrap();
}

#[test]
fn binary_starts_empty() {
    boot();
    let config = SemaphoreConfig {
        initial_count: 5,
        max_count: 9,
        binary: true,
    };
    let sem = Semaphore::new(&config).unwrap();
    assert_eq!(sem.count(), 0);
    sem.post().unwrap();
    assert_eq!(sem.post(), Err(Error(ENOSPC)));
    sem.wait().unwrap();
}

#[test]
fn invalid_configuration() {
    assert_eq!(
        Semaphore::new(&SemaphoreConfig::counting(0, 0)).unwrap_err(),
        Error(EINVAL)
    );
    assert_eq!(
        Semaphore::new(&SemaphoreConfig::counting(3, 2)).unwrap_err(),
        Error(EINVAL)
    );
}

#[test]
fn timed_wait_expires() {
    boot();
    let sem = Semaphore::new(&SemaphoreConfig::binary()).unwrap();
    let start = Instant::now();
    assert_eq!(sem.timed_wait(Timeout::from_ms(50)), Err(Error(EAGAIN)));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50), "woke early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(500), "woke late: {:?}", elapsed);
}

#[test]
fn interrupt_post_requests_a_yield() {
    boot();
    let sem = Arc::new(Semaphore::new(&SemaphoreConfig::binary()).unwrap());
    let (tx, rx) = mpsc::channel();

    let handler = {
        let sem = sem.clone();
        spawn("handler", Priority::High, move || {
            tx.send(sem.wait()).unwrap();
        })
    };
    wait_blocked(&handler);

    // Nobody to take this one.
    let idle = Semaphore::new(&SemaphoreConfig::binary()).unwrap();
    let status = idle.isr_post();
    assert_eq!(status.result, Ok(()));
    assert!(!status.yield_requested);

    let before = k_isr_yield_count();
    let status = sem.isr_post();
    assert_eq!(status.result, Ok(()));
    assert!(status.yield_requested);
    yield_from_isr(status.yield_requested);
    assert!(k_isr_yield_count() > before);

    assert_eq!(rx.recv_timeout(PROMPT).unwrap(), Ok(()));

    // A full binary semaphore rejects the post, and asks for nothing.
    let status = idle.isr_post();
    assert_eq!(status.result, Err(Error(ENOSPC)));
    assert!(!status.yield_requested);
    assert_eq!(idle.isr_wait().finish(), Ok(()));
    assert_eq!(idle.isr_wait().finish(), Err(Error(EBUSY)));
}

/// Posts and non-blocking waits, in any order, keep the count between zero and the maximum.
#[quickcheck]
fn count_stays_in_bounds(max: u8, initial: u8, posts: Vec<bool>) {
    let max = u32::from(max % 8) + 1;
    let initial = u32::from(initial) % (max + 1);
    let sem = Semaphore::new(&SemaphoreConfig::counting(initial, max)).unwrap();

    let mut model = initial;
    for post in posts {
        if post {
            let result = sem.post();
            if model < max {
                assert_eq!(result, Ok(()));
                model += 1;
            } else {
                assert_eq!(result, Err(Error(ENOSPC)));
            }
        } else {
            let result = sem.try_wait();
            if model > 0 {
                assert_eq!(result, Ok(()));
                model -= 1;
            } else {
                assert_eq!(result, Err(Error(EBUSY)));
            }
        }
        assert_eq!(sem.count(), model);
    }
    sem.delete().unwrap();
}

#[test]
fn paused_waiter_keeps_a_late_token() {
    boot();
    let sem = Arc::new(Semaphore::new(&SemaphoreConfig::counting(0, 1)).unwrap());
    let (tx, rx) = mpsc::channel();

    let mut waiter = {
        let sem = sem.clone();
        spawn("late", Priority::Normal, move || {
            tx.send(sem.timed_wait(Timeout::from_ms(50))).unwrap();
        })
    };
    wait_blocked(&waiter);

    // The deadline passes while it is paused.
    waiter.pause().unwrap();
    std::thread::sleep(Duration::from_millis(120));
    sem.post().unwrap();
    // Nobody that can run was waiting.
    assert_eq!(sem.count(), 1);

    waiter.resume().unwrap();
    assert_eq!(rx.recv_timeout(PROMPT).unwrap(), Ok(()));
    assert_eq!(sem.count(), 0);
}

#[test]
fn paused_waiter_is_passed_over() {
    boot();
    let sem = Arc::new(Semaphore::new(&SemaphoreConfig::counting(0, 1)).unwrap());
    let (tx, rx) = mpsc::channel();

    let mut waiters = Vec::new();
    for name in ["first", "second"] {
        let sem = sem.clone();
        let tx = tx.clone();
        let t = spawn(name, Priority::Normal, move || {
            sem.wait().unwrap();
            tx.send(name).unwrap();
        });
        wait_blocked(&t);
        waiters.push(t);
    }

    waiters[0].pause().unwrap();
    sem.post().unwrap();
    assert_eq!(rx.recv_timeout(PROMPT).unwrap(), "second");

    // Back in line, with nothing to take yet.
    waiters[0].resume().unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    sem.post().unwrap();
    assert_eq!(rx.recv_timeout(PROMPT).unwrap(), "first");
}
