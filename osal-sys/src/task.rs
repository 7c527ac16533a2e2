// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Tasks, direct notifications and the scheduler.
//!
//! Each task runs on its own host thread.  The thread is spawned at creation, but holds at a
//! start gate until the scheduler is started, so nothing a task does can happen before that.
//! Deleting a task unwinds its host thread the next time it enters the kernel.

use std::ffi::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crate::heap::{STACK_WORD_SIZE, TCB_SIZE};
use crate::kernel::{self, BlockedOn, State, TaskExit, Tcb, Wake};
use crate::sem::{self, SemHandle};
use crate::tick::{self, Tick};
use crate::{kconfig, timer, EAGAIN, EALREADY, EBUSY, ENOMEM, EPERM, ESRCH, MAX_PRIORITIES};

/// Handle to a kernel task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) u32);

/// The entry point of a task.
///
/// A task must end by calling [`k_task_exit`].  An entry that returns is a usage error: the
/// kernel reports it and deletes the task.
pub type TaskEntry = Box<dyn FnOnce() + Send + 'static>;

/// The scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// The task is the caller.
    Running,
    /// The task can run, or is waiting for the scheduler to start.
    Ready,
    /// The task waits for an object, a notification or a delay.
    Blocked,
    /// The task is suspended.
    Suspended,
    /// The task has been deleted, or never existed.
    Deleted,
}

/// Create a task.
///
/// `stack_words` is charged against the kernel heap together with the control block.  Priorities
/// at or above `MAX_PRIORITIES` are capped to the highest level.  Names end at the first NUL, like
/// the C strings they are on a target, and are truncated to `CONFIG_MAX_TASK_NAME_LEN - 1`
/// characters.  Returns `None` if the kernel heap can't hold the task.
pub fn k_task_create(
    name: &str,
    stack_words: u32,
    priority: u32,
    entry: TaskEntry,
) -> Option<TaskHandle> {
    let name: String = name
        .chars()
        .take_while(|&c| c != '\0')
        .take(kconfig::CONFIG_MAX_TASK_NAME_LEN.saturating_sub(1) as usize)
        .collect();
    let priority = if priority >= MAX_PRIORITIES {
        log::warn!("task `{}`: priority {} capped to {}", name, priority, MAX_PRIORITIES - 1);
        MAX_PRIORITIES - 1
    } else {
        priority
    };

    let id = {
        let mut k = kernel::lock();
        let size = (stack_words as usize)
            .checked_mul(STACK_WORD_SIZE)
            .and_then(|stack| stack.checked_add(TCB_SIZE));
        let Some(charged) = size.and_then(|size| k.heap.alloc(size)) else {
            drop(k);
            log::warn!("kernel heap exhausted creating task `{}`", name);
            return None;
        };
        let id = TaskHandle(k.next_id());
        k.tasks.insert(id, Tcb::new(name.clone(), priority, charged));
        id
    };

    // Spawned without the lock held, as a failed spawn drops the entry.
    let spawned = thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_task(id, entry));
    if let Err(err) = spawned {
        log::error!("unable to start a host thread for task `{}`: {}", name, err);
        reap(&mut kernel::lock(), id);
        return None;
    }

    log::debug!("created task `{}` {:?} at priority {}", name, id, priority);
    Some(id)
}

/// Body of the host thread behind a task.
fn run_task(id: TaskHandle, entry: TaskEntry) {
    kernel::set_current(id);

    if !start_gate(id) {
        // Deleted before it ever ran.
        drop(entry);
        reap(&mut kernel::lock(), id);
        return;
    }

    match panic::catch_unwind(AssertUnwindSafe(entry)) {
        Ok(()) => {
            let name = k_task_name(id).unwrap_or_default();
            log::error!("task `{}` returned from its entry without exiting", name);
        }
        Err(payload) if payload.is::<TaskExit>() => (),
        Err(_) => {
            log::error!("task {:?} panicked, deleting it", id);
        }
    }

    reap(&mut kernel::lock(), id);
}

/// Hold a new task until the scheduler is started.  Returns false if the task is deleted while
/// it waits.
fn start_gate(id: TaskHandle) -> bool {
    let mut k = kernel::lock();
    loop {
        let signal = match k.tasks.get(&id) {
            None => return false,
            Some(tcb) if tcb.deleted => return false,
            Some(tcb) if k.started && !tcb.suspended => return true,
            Some(tcb) => tcb.signal.clone(),
        };
        k = kernel::wait(&signal, k);
    }
}

/// Remove a finished task, returning whatever it still has charged.
fn reap(k: &mut State, id: TaskHandle) {
    if let Some(tcb) = k.tasks.remove(&id) {
        k.heap.free(tcb.charged);
        unlink(k, id, tcb.blocked_on);
        log::debug!("task `{}` {:?} ended", tcb.name, id);
    }
}

/// Take a task off the wait list of whatever it is blocked on.
fn unlink(k: &mut State, id: TaskHandle, on: Option<BlockedOn>) {
    match on {
        Some(BlockedOn::Sem(sem)) => {
            if let Some(obj) = k.sems.get_mut(&sem) {
                obj.waiters.retain(|&(w, _)| w != id);
            }
        }
        Some(BlockedOn::TimerQueue) => k.timer_queue_waiters.retain(|&w| w != id),
        Some(BlockedOn::Notify) | Some(BlockedOn::Delay) | None => (),
    }
}

/// Mark a task deleted.  Its heap charge is returned right away, the rest when its thread ends.
fn mark_deleted(k: &mut State, id: TaskHandle) {
    let Some(tcb) = k.tasks.get_mut(&id) else {
        return;
    };
    tcb.deleted = true;
    let charged = std::mem::take(&mut tcb.charged);
    let on = tcb.blocked_on;
    tcb.signal.notify_all();
    k.heap.free(charged);
    unlink(k, id, on);
}

/// End the calling task.
///
/// Called from a thread that is not a kernel task, the thread's adopted record is dropped and
/// the thread unwinds.
pub fn k_task_exit() -> ! {
    let (mut k, me) = kernel::enter_task();
    mark_deleted(&mut k, me);
    if k.tasks.get(&me).is_some_and(|tcb| tcb.foreign) {
        k.tasks.remove(&me);
    }
    kernel::exit_current(k)
}

/// Delete a task.
///
/// Deleting the calling task doesn't return.  Another task is unwound when it next enters the
/// kernel, or at once if it is blocked.  Host threads that were adopted can't be deleted.
pub fn k_task_delete(task: TaskHandle) -> c_int {
    let mut k = kernel::enter();
    if let Err(errno) = target(&k, task) {
        return -(errno as c_int);
    }
    mark_deleted(&mut k, task);
    log::debug!("deleting task {:?}", task);
    if kernel::current_id() == Some(task) {
        kernel::exit_current(k);
    }
    0
}

/// Check that a task can be the target of delete/suspend/resume.
fn target(k: &State, task: TaskHandle) -> Result<(), u32> {
    match k.tasks.get(&task) {
        None => Err(ESRCH),
        Some(tcb) if tcb.deleted => Err(ESRCH),
        Some(tcb) if tcb.foreign => Err(EPERM),
        Some(_) => Ok(()),
    }
}

/// Suspend a task.  Suspending the caller returns once another task resumes it.  Suspending an
/// already suspended task does nothing.
pub fn k_task_suspend(task: TaskHandle) -> c_int {
    let mut k = kernel::enter();
    if let Err(errno) = target(&k, task) {
        return -(errno as c_int);
    }
    let waiting_on = match k.tasks.get_mut(&task) {
        Some(tcb) if !tcb.suspended => {
            tcb.suspended = true;
            pending_sem(tcb)
        }
        _ => None,
    };
    // A suspended task leaves the wait list, so gives go to the waiters that can run.
    if let Some(sem) = waiting_on {
        sem::suspend_waiter(&mut k, sem, task);
    }
    if kernel::current_id() == Some(task) {
        drop(kernel::checkpoint(k, task));
    }
    0
}

/// Resume a suspended task.  Resuming a task that isn't suspended does nothing.
pub fn k_task_resume(task: TaskHandle) -> c_int {
    let mut k = kernel::enter();
    if let Err(errno) = target(&k, task) {
        return -(errno as c_int);
    }
    let Some(tcb) = k.tasks.get_mut(&task) else {
        return 0;
    };
    if !tcb.suspended {
        return 0;
    }
    tcb.suspended = false;
    tcb.signal.notify_all();
    let priority = tcb.priority;
    if let Some(sem) = pending_sem(tcb) {
        sem::resume_waiter(&mut k, sem, task, priority);
    }
    0
}

/// The semaphore a task is blocked on, unless it has already been handed what it waits for.
fn pending_sem(tcb: &Tcb) -> Option<SemHandle> {
    match tcb.blocked_on {
        Some(BlockedOn::Sem(sem)) if tcb.wake.is_none() => Some(sem),
        _ => None,
    }
}

/// The scheduling state of a task.
pub fn k_task_state(task: TaskHandle) -> TaskState {
    let k = kernel::lock();
    match k.tasks.get(&task) {
        None => TaskState::Deleted,
        Some(tcb) if tcb.deleted => TaskState::Deleted,
        Some(tcb) if tcb.suspended => TaskState::Suspended,
        Some(_) if kernel::current_id() == Some(task) => TaskState::Running,
        Some(tcb) if tcb.blocked_on.is_some() => TaskState::Blocked,
        Some(_) => TaskState::Ready,
    }
}

/// The name of a task, or `None` if it no longer exists.
pub fn k_task_name(task: TaskHandle) -> Option<String> {
    kernel::lock().tasks.get(&task).map(|tcb| tcb.name.clone())
}

/// The priority of a task, or `None` if it no longer exists.
pub fn k_task_priority(task: TaskHandle) -> Option<u32> {
    kernel::lock().tasks.get(&task).map(|tcb| tcb.priority)
}

/// The task the caller runs as.  `None` for a host thread that has never used a kernel service.
pub fn k_current_task() -> Option<TaskHandle> {
    let k = kernel::lock();
    kernel::current_id().filter(|id| k.tasks.contains_key(id))
}

/// The number of created tasks that have not been deleted, the timer service included.
pub fn k_task_count() -> usize {
    kernel::lock()
        .tasks
        .values()
        .filter(|tcb| !tcb.foreign && !tcb.deleted)
        .count()
}

/// Send a notification to a task, releasing it if it waits in [`k_notify_take`].
pub fn k_notify_give(task: TaskHandle) -> c_int {
    let mut k = kernel::enter();
    match notify(&mut k, task) {
        Ok(_) => 0,
        Err(errno) => -(errno as c_int),
    }
}

/// Send a notification from an interrupt.
///
/// `woken` is set when the notification released a task of higher priority than the interrupted
/// one.
pub fn k_notify_give_from_isr(task: TaskHandle, woken: &mut bool) -> c_int {
    let mut k = kernel::lock();
    match notify(&mut k, task) {
        Ok(Some(priority)) => {
            if priority > kernel::caller_priority(&k) {
                *woken = true;
            }
            0
        }
        Ok(None) => 0,
        Err(errno) => -(errno as c_int),
    }
}

fn notify(k: &mut State, task: TaskHandle) -> Result<Option<u32>, u32> {
    let tcb = match k.tasks.get_mut(&task) {
        Some(tcb) if !tcb.deleted => tcb,
        _ => return Err(ESRCH),
    };
    tcb.notify_value = tcb.notify_value.saturating_add(1);
    if tcb.blocked_on == Some(BlockedOn::Notify) {
        Ok(kernel::wake_task(k, task, Wake::Given))
    } else {
        Ok(None)
    }
}

/// Wait up to `ticks` for a notification, and clear the notification value.
///
/// Returns the number of notifications received since the last take, which is positive.  With
/// none pending, a block time of zero fails with `-EBUSY`, and an expired wait with `-EAGAIN`.
pub fn k_notify_take(ticks: Tick) -> c_int {
    let (mut k, me) = kernel::enter_task();
    if let Some(value) = take_notification(&mut k, me) {
        return value;
    }
    if ticks == 0 {
        return -(EBUSY as c_int);
    }

    // A notification that lands as the wait expires still counts.
    let (mut k, _) = kernel::block(k, me, BlockedOn::Notify, tick::deadline(ticks));
    let taken = take_notification(&mut k, me).unwrap_or(-(EAGAIN as c_int));
    drop(kernel::checkpoint(k, me));
    taken
}

fn take_notification(k: &mut State, me: TaskHandle) -> Option<c_int> {
    let tcb = k.tasks.get_mut(&me)?;
    match std::mem::take(&mut tcb.notify_value) {
        0 => None,
        value => Some(value.min(c_int::MAX as u32) as c_int),
    }
}

/// Block the calling task for `ticks`.  A delay of zero just yields.
pub fn k_delay(ticks: Tick) {
    let (k, me) = kernel::enter_task();
    if ticks == 0 {
        drop(k);
        thread::yield_now();
        return;
    }
    // Nothing wakes a delay early.
    let (k, _) = kernel::block(k, me, BlockedOn::Delay, tick::deadline(ticks));
    drop(kernel::checkpoint(k, me));
}

/// True once [`k_start_scheduler`] has been called.
pub fn k_scheduler_started() -> bool {
    kernel::lock().started
}

/// Start the scheduler.
///
/// The timer service task is created, then the tick counter starts from zero and all tasks
/// created so far are released.  A second call fails with `-EALREADY`.  If the timer service can't
/// be created the call fails with `-ENOMEM` and nothing is started, so it can be retried once
/// memory is freed.  Unlike a kernel running on bare hardware, this returns, and the caller
/// carries on as an idle priority thread.
pub fn k_start_scheduler() -> c_int {
    // Only one caller gets to create the timer service.
    static STARTING: Mutex<()> = Mutex::new(());
    let _starting = STARTING.lock().unwrap_or_else(PoisonError::into_inner);

    if kernel::lock().started {
        return -(EALREADY as c_int);
    }
    // Held at its start gate like any other task, until the scheduler starts below.
    if timer::start_service().is_none() {
        log::error!("unable to create the timer service task");
        return -(ENOMEM as c_int);
    }

    let mut k = kernel::lock();
    k.started = true;
    tick::mark_epoch();
    for tcb in k.tasks.values() {
        tcb.signal.notify_all();
    }
    drop(k);
    log::info!("scheduler started at {} Hz", tick::TICK_RATE_HZ);
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gated_until_scheduler_start() {
        let _ = env_logger::builder().is_test(true).try_init();
        // The scheduler is never started in this test binary.
        let (tx, rx) = std::sync::mpsc::channel();
        let task = k_task_create(
            "a rather long task name",
            crate::MINIMAL_STACK_SIZE,
            MAX_PRIORITIES + 3,
            Box::new(move || {
                let _ = tx.send(());
                k_task_exit();
            }),
        )
        .unwrap();

        let name = k_task_name(task).unwrap();
        assert_eq!(name.len(), kconfig::CONFIG_MAX_TASK_NAME_LEN as usize - 1);
        assert!("a rather long task name".starts_with(&name));
        assert_eq!(k_task_priority(task), Some(MAX_PRIORITIES - 1));
        assert_eq!(k_task_state(task), TaskState::Ready);

        assert_eq!(k_task_suspend(task), 0);
        assert_eq!(k_task_state(task), TaskState::Suspended);
        assert_eq!(k_task_resume(task), 0);

        assert!(rx.recv_timeout(std::time::Duration::from_millis(50)).is_err());
        assert_eq!(k_task_delete(task), 0);
        assert_eq!(k_task_state(task), TaskState::Deleted);
        assert_eq!(k_task_delete(task), -(ESRCH as c_int));
        // The entry is dropped without running.
        assert!(rx.recv().is_err());
    }

    #[test]
    fn adopted_threads_are_not_targets() {
        let me = std::thread::spawn(|| {
            assert_eq!(k_notify_take(0), -(EBUSY as c_int));
            let me = k_current_task().unwrap();
            assert_eq!(k_task_state(me), TaskState::Running);
            assert_eq!(k_task_suspend(me), -(EPERM as c_int));
            assert_eq!(k_notify_give(me), 0);
            assert_eq!(k_notify_give(me), 0);
            // Pending notifications are taken together.
            assert_eq!(k_notify_take(0), 2);
            assert_eq!(k_notify_take(0), -(EBUSY as c_int));
            me
        })
        .join()
        .unwrap();

        // The record goes away with the thread.
        assert_eq!(k_task_state(me), TaskState::Deleted);
    }
}
