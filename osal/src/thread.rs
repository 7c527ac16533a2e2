// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Thread support.
//!
//! A [`Thread`] owns one kernel task.  The task runs a closure, which carries whatever data the
//! thread needs, and ends by calling [`exit`].  Threads created before the scheduler is started
//! begin to run when it is.
//!
//! The handle tracks two things locally: whether the thread is running (it hasn't been stopped,
//! and hasn't exited), and whether it is paused.  These drive the checks that keep the kernel
//! calls well formed: only a running thread can be paused, and only a paused one resumed.
//!
//! Each thread also has a notification slot.  [`wait`] blocks the calling thread until another
//! thread, or an interrupt, notifies it with [`Thread::notify`].  A notification sent while the
//! thread isn't waiting is kept, and the next `wait` returns at once.  Several of those collapse
//! into one.
//!
//! Stopping and deleting differ.  [`Thread::stop`] ends the task but keeps the handle, so its state
//! can still be queried.  [`Thread::delete`], or dropping the handle, ends the task if it is still
//! running and releases the handle.

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use crate::{
    error::{created, to_result, to_result_void, Error, Result, EINVAL, ESRCH},
    raw::{
        self,
        k_current_task,
        k_notify_give,
        k_notify_give_from_isr,
        k_notify_take,
        k_task_create,
        k_task_delete,
        k_task_exit,
        k_task_name,
        k_task_resume,
        k_task_state,
        k_task_suspend,
        TaskHandle,
    },
    sys::isr::FromIsr,
    time::{Forever, Timeout},
};

pub use crate::raw::TaskState;
pub use crate::sys::start_scheduler;

/// The stack to give a thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StackSize {
    /// Enough for a thread that doesn't call much.
    Minimum,
    /// The usual size.
    #[default]
    Default,
    /// For threads with deep call chains, or large locals.
    Big,
    /// An explicit size, in words.
    Words(u32),
}

impl StackSize {
    /// The size in stack words.
    pub const fn words(self) -> u32 {
        match self {
            StackSize::Minimum => 100,
            StackSize::Default => 150,
            StackSize::Big => 256,
            StackSize::Words(words) => words,
        }
    }
}

/// The scheduling priority of a thread.
///
/// All three levels are above the kernel's idle level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Background work.
    Low,
    /// The usual priority.
    #[default]
    Normal,
    /// Work that should preempt the others.
    High,
}

impl Priority {
    /// The kernel priority level.
    pub const fn level(self) -> u32 {
        match self {
            Priority::Low => raw::IDLE_PRIORITY + 1,
            Priority::Normal => raw::IDLE_PRIORITY + 2,
            Priority::High => raw::IDLE_PRIORITY + 3,
        }
    }
}

const _: () = assert!(
    Priority::High.level() < raw::MAX_PRIORITIES,
    "the kernel needs more priority levels"
);

/// How to create a [`Thread`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadConfig {
    /// The name of the thread, which the kernel may truncate.
    pub name: String,
    /// The size of the stack.
    pub stack_size: StackSize,
    /// The priority the thread runs at.
    pub priority: Priority,
}

impl ThreadConfig {
    /// A configuration with the given name, a default stack and normal priority.
    pub fn new(name: &str) -> ThreadConfig {
        ThreadConfig {
            name: String::from(name),
            stack_size: StackSize::default(),
            priority: Priority::default(),
        }
    }

    /// Set the stack size.
    pub fn stack_size(mut self, stack_size: StackSize) -> ThreadConfig {
        self.stack_size = stack_size;
        self
    }

    /// Set the priority.
    pub fn priority(mut self, priority: Priority) -> ThreadConfig {
        self.priority = priority;
        self
    }
}

/// A kernel thread.
pub struct Thread {
    handle: TaskHandle,
    name: String,
    running: bool,
    paused: bool,
}

impl Thread {
    /// Create a thread running `entry`.
    ///
    /// The thread starts running when the scheduler does, or right away if it already has.  Fails
    /// with `ENOMEM` if the kernel heap can't hold the task and its stack.
    pub fn new<F>(config: &ThreadConfig, entry: F) -> Result<Thread>
        where F: FnOnce() + Send + 'static,
    {
        let handle = created(k_task_create(
            &config.name,
            config.stack_size.words(),
            config.priority.level(),
            Box::new(entry),
        ))?;
        log::debug!("thread `{}` created", config.name);
        Ok(Thread {
            handle,
            name: config.name.clone(),
            running: true,
            paused: false,
        })
    }

    /// The name given at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check the local bookkeeping against the kernel: a thread that called [`exit`] is no longer
    /// running.
    fn refresh(&mut self) {
        if self.running && k_task_state(self.handle) == TaskState::Deleted {
            self.running = false;
            self.paused = false;
        }
    }

    fn check_running(&mut self) -> Result<()> {
        self.refresh();
        if self.running {
            Ok(())
        } else {
            Err(Error(ESRCH))
        }
    }

    /// Stop the thread, deleting its kernel task.
    ///
    /// The handle stays valid, and reports the thread as not running.  Fails with `ESRCH` if the
    /// thread has already ended.
    pub fn stop(&mut self) -> Result<()> {
        self.check_running()?;
        log::debug!("thread `{}` stopped", self.name);
        self.kill()
    }

    /// Delete the kernel task.  The handle only records the thread as ended once the task is
    /// gone, whether deleted here or ended on its own (`ESRCH`).
    fn kill(&mut self) -> Result<()> {
        let result = to_result_void(k_task_delete(self.handle));
        if matches!(result, Ok(()) | Err(Error(ESRCH))) {
            self.running = false;
            self.paused = false;
        }
        result
    }

    /// Pause the thread.  Fails with `EINVAL` if it is already paused.
    pub fn pause(&mut self) -> Result<()> {
        self.check_running()?;
        if self.paused {
            return Err(Error(EINVAL));
        }
        // Set first, as pausing the calling thread only returns once it is resumed.
        self.paused = true;
        let result = to_result_void(k_task_suspend(self.handle));
        if result.is_err() {
            self.paused = false;
        }
        result
    }

    /// Resume a paused thread.  Fails with `EINVAL` if it isn't paused.
    pub fn resume(&mut self) -> Result<()> {
        self.check_running()?;
        if !self.paused {
            return Err(Error(EINVAL));
        }
        to_result_void(k_task_resume(self.handle))?;
        self.paused = false;
        Ok(())
    }

    /// True if the thread has neither been stopped, nor exited.  A paused thread is running.
    pub fn is_running(&self) -> bool {
        self.running && k_task_state(self.handle) != TaskState::Deleted
    }

    /// True if the thread is running, and paused.
    pub fn is_paused(&self) -> bool {
        self.paused && self.is_running()
    }

    /// The kernel's view of the thread.
    pub fn state(&self) -> TaskState {
        k_task_state(self.handle)
    }

    /// Notify the thread, releasing it if it is in [`wait`].
    pub fn notify(&self) -> Result<()> {
        to_result_void(k_notify_give(self.handle))
    }

    /// Notify the thread from interrupt context.
    pub fn isr_notify(&self) -> FromIsr<()> {
        let mut woken = false;
        let code = k_notify_give_from_isr(self.handle, &mut woken);
        FromIsr::from_status(code, woken)
    }

    /// Delete the thread, ending it if it is still running, and release the handle.
    pub fn delete(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        self.refresh();
        if !self.running {
            return Ok(());
        }
        log::debug!("thread `{}` deleted", self.name);
        match self.kill() {
            // It ended on its own in the meantime.
            Err(Error(ESRCH)) => Ok(()),
            result => result,
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("running", &self.running)
            .field("paused", &self.paused)
            .finish()
    }
}

/// Block the calling thread until it is notified.
pub fn wait() -> Result<()> {
    timed_wait(Forever)
}

/// Block the calling thread until it is notified, or `timeout` expires.
///
/// Fails with `EAGAIN` when the timeout expires, or `EBUSY` for a timeout of [`NoWait`] with no
/// notification pending.
///
/// [`NoWait`]: crate::time::NoWait
pub fn timed_wait<T>(timeout: T) -> Result<()>
    where T: Into<Timeout>,
{
    let timeout: Timeout = timeout.into();
    to_result(k_notify_take(timeout.0)).map(|_| ())
}

/// End the calling thread.
///
/// Every thread body must end with this.  A body that returns instead is reported by the kernel
/// as an error.
pub fn exit() -> ! {
    k_task_exit()
}

/// The name of the calling thread.
///
/// `None` from a host thread that isn't a kernel task and hasn't used the kernel yet.
pub fn current_name() -> Option<String> {
    k_current_task().and_then(k_task_name)
}
