// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Kernel services for the OS abstraction layer.
//!
//! This crate is the "raw" kernel that the `osal` crate wraps.  It provides the primitive
//! operations of a preemptive, priority based real-time kernel: semaphores and mutexes with
//! blocking and interrupt-safe variants, tasks with suspend/resume/delete and direct
//! notifications, a tick counter, and software timers driven by a timer service task.
//!
//! This implementation is a hosted simulation.  Every kernel task is a host thread, and the
//! scheduling itself is left to the host.  The kernel does keep the bookkeeping a real kernel
//! would: priority ordered wait queues, a fixed heap budget for kernel objects, task states, and
//! the bounded command queue of the timer service.  Two limitations follow from running on host
//! threads:
//!
//! - Suspending or deleting another task takes effect at that task's next kernel service call (or
//!   immediately, if it is blocked in one).  A task spinning without calling into the kernel keeps
//!   running.
//! - Priorities order wait queues and decide the "higher priority task woken" result of the
//!   interrupt variants, but the host decides which runnable thread actually runs.
//!
//! All services follow the same conventions: creation returns `None` when the kernel heap cannot
//! hold the object, and other services return a `c_int` status that is `0` on success or a
//! negated errno value on failure.  Interrupt variants never block, and report through a `woken`
//! out parameter whether the operation readied a task of higher priority than the caller.

#![allow(unexpected_cfgs)]
#![deny(missing_docs)]

pub mod kconfig {
    //! Kernel configuration values.
    //!
    //! This module contains an auto-generated set of constants corresponding to the numeric values
    //! of the kernel configuration file used for the build.

    // Generated code doesn't carry doc comments.
    #![allow(missing_docs)]

    include!(concat!(env!("OUT_DIR"), "/kconfig.rs"));
}

mod console;
mod heap;
mod isr;
mod kernel;
mod sem;
mod task;
mod tick;
mod timer;

pub use console::k_str_out;
pub use heap::{k_free_heap_size, SEM_SIZE, STACK_WORD_SIZE, TCB_SIZE, TIMER_SIZE};
pub use isr::{k_isr_yield_count, k_yield_from_isr};
pub use sem::{
    k_mutex_create, k_sem_count_get, k_sem_create_binary, k_sem_create_counting, k_sem_delete,
    k_sem_give, k_sem_give_from_isr, k_sem_take, k_sem_take_from_isr, SemHandle,
};
pub use task::{
    k_current_task, k_delay, k_notify_give, k_notify_give_from_isr, k_notify_take,
    k_scheduler_started, k_start_scheduler, k_task_count, k_task_create, k_task_delete,
    k_task_exit, k_task_name, k_task_priority, k_task_resume, k_task_state, k_task_suspend,
    TaskEntry, TaskHandle, TaskState,
};
pub use tick::{k_tick_count, Tick, MAX_DELAY, TICK_RATE_HZ};
pub use timer::{
    k_timer_create, k_timer_delete, k_timer_is_active, k_timer_name, k_timer_period,
    k_timer_reset, k_timer_start, k_timer_stop, TimerCallback, TimerHandle,
};

// Errno values returned (negated) by the kernel services.

/// Operation not permitted in the current context or phase.
pub const EPERM: u32 = 1;
/// No such kernel object, or the object has been deleted.
pub const ESRCH: u32 = 3;
/// A timed wait expired, or a queue stayed full for the whole wait.
pub const EAGAIN: u32 = 11;
/// The kernel heap cannot hold the requested object.
pub const ENOMEM: u32 = 12;
/// The object is unavailable and the caller asked not to wait.
pub const EBUSY: u32 = 16;
/// Invalid argument.
pub const EINVAL: u32 = 22;
/// The object is already at its maximum count.
pub const ENOSPC: u32 = 28;
/// The operation has already been done.
pub const EALREADY: u32 = 114;

/// Priority of the idle level.  Host threads that are not kernel tasks run at this level.
pub const IDLE_PRIORITY: u32 = 0;

/// Number of priority levels.  Valid task priorities are `0..MAX_PRIORITIES`.
pub const MAX_PRIORITIES: u32 = kconfig::CONFIG_MAX_PRIORITIES;

/// The smallest stack, in words, a task should be created with.
pub const MINIMAL_STACK_SIZE: u32 = kconfig::CONFIG_MINIMAL_STACK_SIZE;

const _: () = assert!(MAX_PRIORITIES > 1, "need at least one level above idle");
