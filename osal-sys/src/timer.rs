// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Software timers.
//!
//! Timers are owned by the timer service task.  The timer services don't change a timer
//! directly: they post a command to the service's queue, which holds `CONFIG_TIMER_QUEUE_LENGTH`
//! commands, and the service applies commands in order.  Callbacks run on the service task, one
//! at a time, so a slow callback delays every other timer.

use std::ffi::c_int;
use std::panic::{self, AssertUnwindSafe};

use crate::heap::TIMER_SIZE;
use crate::kernel::{self, BlockedOn, Outcome, State, TaskExit, Wake};
use crate::task::{self, TaskHandle};
use crate::tick::{self, Tick};
use crate::{kconfig, EAGAIN, ESRCH};

/// Handle to a kernel software timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub(crate) u32);

/// The function a timer calls when it expires.  It runs on the timer service task.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

const QUEUE_LENGTH: usize = kconfig::CONFIG_TIMER_QUEUE_LENGTH as usize;

const SERVICE_NAME: &str = "Tmr Svc";

pub(crate) struct Timer {
    name: String,
    period: Tick,
    auto_reload: bool,
    active: bool,
    /// Tick of the next expiry, while active.
    expiry: Tick,
    /// A delete is queued.  No further commands are accepted.
    deleting: bool,
    /// Commands for this timer in the queue.
    pending: usize,
    /// Taken by the service while the callback runs.
    callback: Option<TimerCallback>,
    charged: usize,
}

pub(crate) enum TimerCommand {
    /// Arm the timer to expire `offset` ticks after `issued`, or a full period when `None`.
    Start {
        timer: TimerHandle,
        offset: Option<Tick>,
        issued: Tick,
    },
    Stop {
        timer: TimerHandle,
    },
    Delete {
        timer: TimerHandle,
    },
}

impl TimerCommand {
    fn timer(&self) -> TimerHandle {
        match *self {
            TimerCommand::Start { timer, .. } => timer,
            TimerCommand::Stop { timer } => timer,
            TimerCommand::Delete { timer } => timer,
        }
    }
}

/// Create a dormant timer.
///
/// `period` is in ticks and must be non-zero.  An auto reload timer re-arms itself a period after
/// each expiry; otherwise the timer goes dormant after it fires.  Returns `None` for a zero
/// period, or when the kernel heap is exhausted.
pub fn k_timer_create(
    name: &str,
    period: Tick,
    auto_reload: bool,
    callback: TimerCallback,
) -> Option<TimerHandle> {
    if period == 0 {
        log::warn!("timer `{}`: period must be at least one tick", name);
        return None;
    }

    let mut k = kernel::lock();
    let Some(charged) = k.heap.alloc(TIMER_SIZE) else {
        drop(k);
        log::warn!("kernel heap exhausted creating timer `{}`", name);
        return None;
    };
    let id = TimerHandle(k.next_id());
    k.timers.insert(
        id,
        Timer {
            name: name.to_string(),
            period,
            auto_reload,
            active: false,
            expiry: 0,
            deleting: false,
            pending: 0,
            callback: Some(callback),
            charged,
        },
    );
    log::trace!("created timer `{}` {:?}, period {} ticks", name, id, period);
    Some(id)
}

/// Start a timer, to first expire `first` ticks from now.  Starting an active timer re-arms it.
///
/// `block` is how long to wait for room in the command queue.  A full queue fails with
/// `-EAGAIN`.  Before the scheduler starts, and on the timer service task itself, commands never
/// wait.
pub fn k_timer_start(timer: TimerHandle, first: Tick, block: Tick) -> c_int {
    send(
        TimerCommand::Start {
            timer,
            offset: Some(first),
            issued: tick::k_tick_count(),
        },
        block,
    )
}

/// Restart the countdown of a timer from a full period.  Also starts a dormant timer.
pub fn k_timer_reset(timer: TimerHandle, block: Tick) -> c_int {
    send(
        TimerCommand::Start {
            timer,
            offset: None,
            issued: tick::k_tick_count(),
        },
        block,
    )
}

/// Stop a timer.
pub fn k_timer_stop(timer: TimerHandle, block: Tick) -> c_int {
    send(TimerCommand::Stop { timer }, block)
}

/// Delete a timer.
///
/// A dormant timer with no commands queued is deleted at once.  Otherwise a delete command is
/// queued: from then on the timer accepts no further commands and its heap charge is returned,
/// and the service drops the callback when it gets to the command.
pub fn k_timer_delete(timer: TimerHandle, block: Tick) -> c_int {
    let mut k = kernel::enter();
    let idle = k
        .timers
        .get(&timer)
        .is_some_and(|t| !t.deleting && !t.active && t.pending == 0);
    if idle {
        let removed = k.timers.remove(&timer);
        if let Some(t) = &removed {
            k.heap.free(t.charged);
            log::trace!("deleted timer `{}` {:?}", t.name, timer);
        }
        // The callback is dropped without the lock held.
        drop(k);
        drop(removed);
        return 0;
    }
    drop(k);

    send(TimerCommand::Delete { timer }, block)
}

/// True if the timer is armed, or a start command for it is queued.
pub fn k_timer_is_active(timer: TimerHandle) -> bool {
    kernel::lock()
        .timers
        .get(&timer)
        .is_some_and(|t| t.active && !t.deleting)
}

/// The name a timer was created with.
pub fn k_timer_name(timer: TimerHandle) -> Option<String> {
    kernel::lock().timers.get(&timer).map(|t| t.name.clone())
}

/// The period of a timer, in ticks.
pub fn k_timer_period(timer: TimerHandle) -> Option<Tick> {
    kernel::lock().timers.get(&timer).map(|t| t.period)
}

fn send(cmd: TimerCommand, block: Tick) -> c_int {
    let (mut k, me) = kernel::enter_task();
    let block = if !k.started || k.timer_service == Some(me) {
        0
    } else {
        block
    };
    let deadline = tick::deadline(block);

    loop {
        match k.timers.get(&cmd.timer()) {
            Some(t) if !t.deleting => (),
            _ => return -(ESRCH as c_int),
        }

        if k.timer_queue.len() < QUEUE_LENGTH {
            queued(&mut k, &cmd);
            k.timer_queue.push_back(cmd);
            wake_service(&k);
            return 0;
        }

        if block == 0 {
            log::debug!("timer command queue full");
            return -(EAGAIN as c_int);
        }
        k.timer_queue_waiters.push(me);
        let (guard, outcome) = kernel::block(k, me, BlockedOn::TimerQueue, deadline);
        k = guard;
        if outcome == Outcome::TimedOut {
            k.timer_queue_waiters.retain(|&w| w != me);
            drop(kernel::checkpoint(k, me));
            return -(EAGAIN as c_int);
        }
    }
}

/// Effects of a command that are visible as soon as it is queued.
fn queued(k: &mut State, cmd: &TimerCommand) {
    let Some(t) = k.timers.get_mut(&cmd.timer()) else {
        return;
    };
    t.pending += 1;
    match cmd {
        TimerCommand::Start { .. } => t.active = true,
        TimerCommand::Stop { .. } => t.active = false,
        TimerCommand::Delete { .. } => {
            t.deleting = true;
            let charged = std::mem::take(&mut t.charged);
            k.heap.free(charged);
        }
    }
}

fn wake_service(k: &State) {
    if let Some(tcb) = k.timer_service.and_then(|id| k.tasks.get(&id)) {
        tcb.signal.notify_all();
    }
}

/// Create the timer service task.  Called while starting the scheduler, before tasks are
/// released.  Commands queued before then are applied on the service's first pass.
pub(crate) fn start_service() -> Option<TaskHandle> {
    let id = task::k_task_create(
        SERVICE_NAME,
        crate::MINIMAL_STACK_SIZE * 2,
        kconfig::CONFIG_TIMER_TASK_PRIORITY,
        Box::new(service),
    )?;
    kernel::lock().timer_service = Some(id);
    Some(id)
}

/// Body of the timer service task.
fn service() {
    let Some(me) = kernel::current_id() else {
        return;
    };
    let mut dropped: Vec<TimerCallback> = Vec::new();

    loop {
        let mut k = kernel::enter();

        // Commands first, so a timer is never fired with stale settings.
        let drained = !k.timer_queue.is_empty();
        while let Some(cmd) = k.timer_queue.pop_front() {
            apply(&mut k, cmd, &mut dropped);
        }
        if drained {
            for waiter in std::mem::take(&mut k.timer_queue_waiters) {
                kernel::wake_task(&mut k, waiter, Wake::Given);
            }
        }

        let now = tick::k_tick_count();
        if let Some((id, mut callback)) = expire_next(&mut k, now) {
            drop(k);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
                // The service itself being deleted goes on unwinding.
                if payload.is::<TaskExit>() {
                    panic::resume_unwind(payload);
                }
                log::error!("timer {:?}: callback panicked", id);
            }
            let mut k = kernel::lock();
            match k.timers.get_mut(&id) {
                Some(t) => t.callback = Some(callback),
                None => dropped.push(callback),
            }
            drop(k);
            dropped.clear();
            continue;
        }

        // Sleep until the next expiry, or a new command.
        let next = k
            .timers
            .values()
            .filter(|t| t.active)
            .map(|t| t.expiry.wrapping_sub(now))
            .min();
        let signal = match k.tasks.get(&me) {
            Some(tcb) => tcb.signal.clone(),
            None => return,
        };
        if k.timer_queue.is_empty() {
            let deadline = next.and_then(|ticks| tick::deadline(ticks.min(tick::MAX_DELAY - 1)));
            k = kernel::wait_until(&signal, k, deadline);
        }
        drop(k);
        // Callbacks are dropped without the lock held.
        dropped.clear();
    }
}

/// Apply one command.  The callbacks of deleted timers are moved to `dropped`.
fn apply(k: &mut State, cmd: TimerCommand, dropped: &mut Vec<TimerCallback>) {
    match cmd {
        TimerCommand::Start {
            timer,
            offset,
            issued,
        } => {
            if let Some(t) = k.timers.get_mut(&timer) {
                t.pending -= 1;
                if !t.deleting {
                    t.expiry = issued.wrapping_add(offset.unwrap_or(t.period));
                    t.active = true;
                }
            }
        }
        TimerCommand::Stop { timer } => {
            if let Some(t) = k.timers.get_mut(&timer) {
                t.pending -= 1;
                t.active = false;
            }
        }
        TimerCommand::Delete { timer } => {
            if let Some(t) = k.timers.remove(&timer) {
                k.heap.free(t.charged);
                dropped.extend(t.callback);
                log::trace!("deleted timer `{}` {:?}", t.name, timer);
            }
        }
    }
}

/// Find the earliest expired timer, re-arm or retire it, and take its callback.
fn expire_next(k: &mut State, now: Tick) -> Option<(TimerHandle, TimerCallback)> {
    let (&id, _) = k
        .timers
        .iter()
        .filter(|(_, t)| t.active && t.callback.is_some() && tick::tick_reached(now, t.expiry))
        .max_by_key(|(_, t)| now.wrapping_sub(t.expiry))?;

    let t = k.timers.get_mut(&id)?;
    if t.auto_reload {
        // Keep the phase, so a late callback doesn't shift later expiries.
        t.expiry = t.expiry.wrapping_add(t.period);
    } else {
        t.active = false;
    }
    let callback = t.callback.take()?;
    Some((id, callback))
}
