// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Kernel state and the blocking machinery shared by the services.
//!
//! All kernel state sits behind a single lock, which plays the part of the critical section of a
//! uniprocessor kernel.  Every task has its own condition variable (its "signal"), always used
//! with that one lock.  A task that blocks records what it is blocked on, and whoever releases it
//! sets its wake reason and signals it.  Deletion and suspension are flags on the task, honored by
//! the task itself when it passes through [`checkpoint`].

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::panic;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::heap::Heap;
use crate::sem::{Sem, SemHandle};
use crate::task::TaskHandle;
use crate::timer::{Timer, TimerCommand, TimerHandle};
use crate::{kconfig, IDLE_PRIORITY};

pub(crate) type Guard = MutexGuard<'static, State>;

static KERNEL: Lazy<Mutex<State>> = Lazy::new(|| Mutex::new(State::new()));

thread_local! {
    static CURRENT: Cell<Option<TaskHandle>> = const { Cell::new(None) };
    static ADOPTED: Adopted = const { Adopted(Cell::new(None)) };
}

/// Take the kernel lock.
///
/// A panic in user code never happens with the lock held, so poisoning is ignored.
pub(crate) fn lock() -> Guard {
    KERNEL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The global kernel state.
pub(crate) struct State {
    pub(crate) started: bool,
    next_id: u32,
    pub(crate) tasks: HashMap<TaskHandle, Tcb>,
    pub(crate) sems: HashMap<SemHandle, Sem>,
    pub(crate) timers: HashMap<TimerHandle, Timer>,
    pub(crate) timer_queue: VecDeque<TimerCommand>,
    pub(crate) timer_queue_waiters: Vec<TaskHandle>,
    pub(crate) timer_service: Option<TaskHandle>,
    pub(crate) heap: Heap,
}

impl State {
    fn new() -> Self {
        State {
            started: false,
            next_id: 0,
            tasks: HashMap::new(),
            sems: HashMap::new(),
            timers: HashMap::new(),
            timer_queue: VecDeque::new(),
            timer_queue_waiters: Vec::new(),
            timer_service: None,
            heap: Heap::new(kconfig::CONFIG_TOTAL_HEAP_SIZE as usize),
        }
    }

    /// Object ids are never reused, so a stale handle can't alias a newer object.
    pub(crate) fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// What a blocked task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockedOn {
    Sem(SemHandle),
    Notify,
    Delay,
    TimerQueue,
}

/// Why a blocked task was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// The object was handed to the task (semaphore token, notification, queue space).
    Given,
    /// The object it waited on was deleted.
    ObjectDeleted,
}

/// Result of [`block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Woken(Wake),
    TimedOut,
}

/// Task control block.
pub(crate) struct Tcb {
    pub(crate) name: String,
    pub(crate) priority: u32,
    /// A host thread adopted on its first kernel call, rather than a created task.
    pub(crate) foreign: bool,
    pub(crate) suspended: bool,
    pub(crate) deleted: bool,
    pub(crate) blocked_on: Option<BlockedOn>,
    pub(crate) wake: Option<Wake>,
    pub(crate) notify_value: u32,
    /// Heap bytes charged for this task, returned when it is deleted.
    pub(crate) charged: usize,
    pub(crate) signal: Arc<Condvar>,
}

impl Tcb {
    pub(crate) fn new(name: String, priority: u32, charged: usize) -> Self {
        Tcb {
            name,
            priority,
            foreign: false,
            suspended: false,
            deleted: false,
            blocked_on: None,
            wake: None,
            notify_value: 0,
            charged,
            signal: Arc::new(Condvar::new()),
        }
    }

    fn foreign(name: String) -> Self {
        Tcb {
            foreign: true,
            ..Tcb::new(name, IDLE_PRIORITY, 0)
        }
    }
}

/// Payload used to unwind a task's host thread when the task is deleted.
pub(crate) struct TaskExit;

/// Removes the record of an adopted host thread when that thread ends.
struct Adopted(Cell<Option<TaskHandle>>);

impl Drop for Adopted {
    fn drop(&mut self) {
        if let Some(id) = self.0.get() {
            lock().tasks.remove(&id);
        }
    }
}

/// The kernel task the calling host thread runs, if any.  Never allocates.
pub(crate) fn current_id() -> Option<TaskHandle> {
    CURRENT.with(|c| c.get())
}

pub(crate) fn set_current(id: TaskHandle) {
    CURRENT.with(|c| c.set(Some(id)));
}

/// The task for the calling thread, adopting the thread as an idle priority task if it isn't a
/// kernel task.  Must not be used from interrupt services, as adoption allocates.
pub(crate) fn current(k: &mut State) -> TaskHandle {
    if let Some(id) = current_id() {
        if k.tasks.contains_key(&id) {
            return id;
        }
    }

    let id = TaskHandle(k.next_id());
    let name = thread::current().name().unwrap_or("host").to_string();
    log::trace!("adopting host thread `{}` as {:?}", name, id);
    k.tasks.insert(id, Tcb::foreign(name));
    set_current(id);
    ADOPTED.with(|a| a.0.set(Some(id)));
    id
}

/// Priority of the calling context, used to decide if a wakeup needs a reschedule.
pub(crate) fn caller_priority(k: &State) -> u32 {
    current_id()
        .and_then(|id| k.tasks.get(&id))
        .map_or(IDLE_PRIORITY, |tcb| tcb.priority)
}

/// Enter the kernel from task context, adopting the calling thread if it isn't a task.
pub(crate) fn enter_task() -> (Guard, TaskHandle) {
    let mut k = lock();
    let me = current(&mut k);
    (checkpoint(k, me), me)
}

/// Enter the kernel from any thread context.  Never allocates.
pub(crate) fn enter() -> Guard {
    let k = lock();
    match current_id() {
        Some(me) if k.tasks.contains_key(&me) => checkpoint(k, me),
        _ => k,
    }
}

pub(crate) fn wait(signal: &Condvar, k: Guard) -> Guard {
    signal.wait(k).unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn wait_until(signal: &Condvar, k: Guard, deadline: Option<Instant>) -> Guard {
    match deadline {
        None => wait(signal, k),
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return k;
            }
            signal
                .wait_timeout(k, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0
        }
    }
}

/// Unwind the calling task's host thread.  The lock is released first.
pub(crate) fn exit_current(k: Guard) -> ! {
    drop(k);
    panic::resume_unwind(Box::new(TaskExit))
}

/// Honor a pending deletion or suspension of the calling task.
///
/// Deletion unwinds the task.  Suspension blocks here until the task is resumed.  A task that is
/// already unwinding is let through, so that drops during the unwind can still use the kernel.
pub(crate) fn checkpoint(mut k: Guard, me: TaskHandle) -> Guard {
    if thread::panicking() {
        return k;
    }
    loop {
        let signal = match k.tasks.get(&me) {
            None => exit_current(k),
            Some(tcb) if tcb.deleted => exit_current(k),
            Some(tcb) if tcb.suspended => tcb.signal.clone(),
            Some(_) => return k,
        };
        k = wait(&signal, k);
    }
}

/// Block the calling task until it is woken, or the deadline passes.
///
/// The caller has already put the task on the wait list of whatever it blocks on.  A deletion
/// while blocked unwinds the task, after the deleter has removed it from the wait list.  A task
/// suspended while blocked stays here until it is resumed, and its deadline can't pass before
/// that.
///
/// On a timeout the guard comes back without passing through [`checkpoint`]: the caller takes the
/// task off its wait list first, and then calls `checkpoint`, so nothing can be handed to a task
/// that has already given up.
pub(crate) fn block(
    mut k: Guard,
    me: TaskHandle,
    on: BlockedOn,
    deadline: Option<Instant>,
) -> (Guard, Outcome) {
    let signal = match k.tasks.get_mut(&me) {
        Some(tcb) => {
            tcb.blocked_on = Some(on);
            tcb.wake = None;
            tcb.signal.clone()
        }
        None => exit_current(k),
    };

    loop {
        let (woken, deleted, suspended) = match k.tasks.get_mut(&me) {
            Some(tcb) => (tcb.wake.take(), tcb.deleted, tcb.suspended),
            None => (None, true, false),
        };

        if let Some(wake) = woken {
            clear_blocked(&mut k, me);
            return (checkpoint(k, me), Outcome::Woken(wake));
        }
        if deleted {
            clear_blocked(&mut k, me);
            if thread::panicking() {
                return (k, Outcome::TimedOut);
            }
            exit_current(k);
        }
        if suspended {
            k = wait(&signal, k);
            continue;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            clear_blocked(&mut k, me);
            return (k, Outcome::TimedOut);
        }

        k = wait_until(&signal, k, deadline);
    }
}

fn clear_blocked(k: &mut State, me: TaskHandle) {
    if let Some(tcb) = k.tasks.get_mut(&me) {
        tcb.blocked_on = None;
    }
}

/// Release a blocked task with the given reason.  Returns the task's priority.
pub(crate) fn wake_task(k: &mut State, id: TaskHandle, wake: Wake) -> Option<u32> {
    let tcb = k.tasks.get_mut(&id)?;
    tcb.wake = Some(wake);
    tcb.signal.notify_all();
    Some(tcb.priority)
}

/// Insert into a wait list ordered by priority, highest first, FIFO among equals.
pub(crate) fn enqueue_waiter(waiters: &mut Vec<(TaskHandle, u32)>, id: TaskHandle, priority: u32) {
    let pos = waiters
        .iter()
        .position(|&(_, p)| p < priority)
        .unwrap_or(waiters.len());
    waiters.insert(pos, (id, priority));
}
