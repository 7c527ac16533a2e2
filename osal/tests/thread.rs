// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use osal::clock;
use osal::error::{Error, EAGAIN, EINVAL, ENOMEM, ESRCH};
use osal::thread::{self, Priority, StackSize, TaskState, Thread, ThreadConfig};
use osal::time::{NoWait, Timeout};

use common::{boot, eventually, spawn, wait_blocked, PROMPT};

#[test]
fn pause_and_resume() {
    boot();
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut worker = {
        let ticks = ticks.clone();
        spawn("ticker", Priority::Normal, move || loop {
            ticks.fetch_add(1, Ordering::SeqCst);
            clock::delay(2);
        })
    };
    assert!(eventually(|| ticks.load(Ordering::SeqCst) > 0));
    assert!(worker.is_running());
    assert!(!worker.is_paused());

    // Never paused.
    assert_eq!(worker.resume(), Err(Error(EINVAL)));

    worker.pause().unwrap();
    assert!(worker.is_paused());
    assert!(worker.is_running());
    assert_eq!(worker.state(), TaskState::Suspended);
    assert_eq!(worker.pause(), Err(Error(EINVAL)));

    // Let the pause land, then check nothing moves.
    std::thread::sleep(Duration::from_millis(20));
    let frozen = ticks.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), frozen);

    worker.resume().unwrap();
    assert!(!worker.is_paused());
    assert!(eventually(|| ticks.load(Ordering::SeqCst) > frozen));

    worker.stop().unwrap();
    assert!(!worker.is_running());
    assert_eq!(worker.state(), TaskState::Deleted);
    assert_eq!(worker.pause(), Err(Error(ESRCH)));
    assert_eq!(worker.resume(), Err(Error(ESRCH)));
    assert_eq!(worker.stop(), Err(Error(ESRCH)));
    worker.delete().unwrap();
}

#[test]
fn notifications_release_a_waiter() {
    boot();
    let (tx, rx) = mpsc::channel();
    let listener = spawn("listener", Priority::Normal, move || {
        for round in 0..3 {
            thread::wait().unwrap();
            tx.send(round).unwrap();
        }
    });

    for round in 0..3 {
        wait_blocked(&listener);
        listener.notify().unwrap();
        assert_eq!(rx.recv_timeout(PROMPT).unwrap(), round);
    }
    assert!(eventually(|| !listener.is_running()));
}

#[test]
fn pending_notifications_collapse() {
    boot();
    let (tx, rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let sleeper = spawn("sleeper", Priority::Normal, move || {
        go_rx.recv().unwrap();
        let first = thread::timed_wait(NoWait);
        let second = thread::timed_wait(Timeout::from_ms(30));
        tx.send((first, second)).unwrap();
    });

    // Both land before the thread looks.
    sleeper.notify().unwrap();
    sleeper.notify().unwrap();
    go_tx.send(()).unwrap();

    let (first, second) = rx.recv_timeout(PROMPT).unwrap();
    assert_eq!(first, Ok(()));
    assert_eq!(second, Err(Error(EAGAIN)));
}

#[test]
fn interrupt_notify_requests_a_yield() {
    boot();
    let (tx, rx) = mpsc::channel();
    let urgent = spawn("urgent", Priority::High, move || {
        tx.send(thread::wait()).unwrap();
    });
    wait_blocked(&urgent);

    let status = urgent.isr_notify();
    assert!(status.yield_requested);
    status.finish().unwrap();
    assert_eq!(rx.recv_timeout(PROMPT).unwrap(), Ok(()));
}

#[test]
fn exit_ends_the_thread() {
    boot();
    let (tx, rx) = mpsc::channel();
    let mut quitter = spawn("quitter", Priority::Low, move || {
        tx.send(thread::current_name()).unwrap();
    });
    assert_eq!(rx.recv_timeout(PROMPT).unwrap().as_deref(), Some("quitter"));
    assert!(eventually(|| !quitter.is_running()));
    assert_eq!(quitter.stop(), Err(Error(ESRCH)));
}

#[test]
fn returning_body_still_ends() {
    boot();
    let config = ThreadConfig::new("careless");
    let careless = Thread::new(&config, || ()).unwrap();
    assert!(eventually(|| !careless.is_running()));
    // Nothing left to delete.
    careless.delete().unwrap();
}

#[test]
fn delete_unwinds_a_blocked_thread() {
    struct Dropped(mpsc::Sender<()>);

    impl Drop for Dropped {
        fn drop(&mut self) {
            let _ = self.0.send(());
        }
    }

    boot();
    let (tx, rx) = mpsc::channel();
    let stuck = spawn("stuck", Priority::Normal, move || {
        let _guard = Dropped(tx);
        let _ = thread::wait();
    });
    wait_blocked(&stuck);

    stuck.delete().unwrap();
    rx.recv_timeout(PROMPT).expect("thread state was never dropped");
}

#[test]
fn names_are_kept() {
    boot();
    let config = ThreadConfig::new("a-rather-long-thread-name")
        .stack_size(StackSize::Minimum)
        .priority(Priority::Low);
    let (tx, rx) = mpsc::channel();
    let named = Thread::new(&config, move || {
        tx.send(thread::current_name()).unwrap();
        thread::exit();
    })
    .unwrap();
    assert_eq!(named.name(), "a-rather-long-thread-name");

    // The kernel keeps a truncated copy.
    let kept = rx.recv_timeout(PROMPT).unwrap().unwrap();
    assert!("a-rather-long-thread-name".starts_with(&kept));
    assert!(kept.len() < osal::kconfig::CONFIG_MAX_TASK_NAME_LEN as usize);
}

#[test]
fn oversized_stack_is_refused() {
    boot();
    let config = ThreadConfig::new("huge").stack_size(StackSize::Words(u32::MAX));
    assert_eq!(
        Thread::new(&config, || thread::exit()).unwrap_err(),
        Error(ENOMEM)
    );
}

#[test]
fn stack_sizes() {
    assert!(StackSize::Minimum.words() < StackSize::Default.words());
    assert!(StackSize::Default.words() < StackSize::Big.words());
    assert_eq!(StackSize::Words(512).words(), 512);
    assert!(StackSize::Minimum.words() >= osal::raw::MINIMAL_STACK_SIZE);
    assert!(Priority::Low.level() > osal::raw::IDLE_PRIORITY);
    assert!(Priority::Low < Priority::Normal && Priority::Normal < Priority::High);
}

#[test]
fn names_end_at_nul() {
    boot();
    let (tx, rx) = mpsc::channel();
    let config = ThreadConfig::new("cut\0here");
    let _cut = Thread::new(&config, move || {
        tx.send(thread::current_name()).unwrap();
        thread::exit();
    })
    .unwrap();
    assert_eq!(rx.recv_timeout(PROMPT).unwrap().as_deref(), Some("cut"));
}
