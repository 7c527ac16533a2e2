// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Kernel semaphore support
//!
//! This is a thin wrapper around the kernel's semaphores, which come in two kinds:
//!
//! - Binary: a 0/1 signal, which starts empty.  The counts of the configuration are ignored.
//! - Counting: a count between zero and `max_count`, starting at `initial_count`.
//!
//! Note that a `post` to a semaphore already at its maximum is rejected with `ENOSPC`, and the
//! count stays where it is.  In situations where counting is actually desired, check the result.

use core::fmt;
use core::mem;

use crate::{
    error::{created, to_result_void, Error, Result, EINVAL},
    raw::{
        k_sem_count_get,
        k_sem_create_binary,
        k_sem_create_counting,
        k_sem_delete,
        k_sem_give,
        k_sem_give_from_isr,
        k_sem_take,
        k_sem_take_from_isr,
        SemHandle,
    },
    sys::isr::FromIsr,
    time::{Forever, NoWait, Timeout},
};

/// How to create a [`Semaphore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SemaphoreConfig {
    /// The count the semaphore starts with.  At most `max_count`.
    pub initial_count: u32,
    /// The highest count the semaphore can reach.  At least one.
    pub max_count: u32,
    /// Create a binary semaphore, ignoring the counts.
    pub binary: bool,
}

impl SemaphoreConfig {
    /// A binary semaphore.
    pub const fn binary() -> SemaphoreConfig {
        SemaphoreConfig {
            initial_count: 0,
            max_count: 1,
            binary: true,
        }
    }

    /// A counting semaphore.
    pub const fn counting(initial_count: u32, max_count: u32) -> SemaphoreConfig {
        SemaphoreConfig {
            initial_count,
            max_count,
            binary: false,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.binary || (self.max_count >= 1 && self.initial_count <= self.max_count) {
            Ok(())
        } else {
            Err(Error(EINVAL))
        }
    }
}

/// A kernel semaphore usable from safe Rust code.
///
/// Owns the kernel object, which is deleted with [`delete`], or when the `Semaphore` is dropped.
///
/// [`delete`]: Semaphore::delete
pub struct Semaphore {
    /// The kernel semaphore.
    handle: SemHandle,
}

impl Semaphore {
    /// Create a new semaphore.
    ///
    /// Fails with `EINVAL` for a counting configuration with a `max_count` of zero, or an
    /// `initial_count` above `max_count`, and with `ENOMEM` if the kernel heap can't hold it.
    pub fn new(config: &SemaphoreConfig) -> Result<Semaphore> {
        config.validate()?;
        let handle = if config.binary {
            created(k_sem_create_binary())?
        } else {
            created(k_sem_create_counting(config.max_count, config.initial_count))?
        };
        log::trace!("semaphore {:?} created: {:?}", handle, config);
        Ok(Semaphore { handle })
    }

    /// Take the semaphore, waiting as long as it takes.
    pub fn wait(&self) -> Result<()> {
        self.timed_wait(Forever)
    }

    /// Take the semaphore if the count is above zero.  Never blocks: fails with `EBUSY` at zero.
    pub fn try_wait(&self) -> Result<()> {
        self.timed_wait(NoWait)
    }

    /// Take the semaphore, waiting up to `timeout`.
    ///
    /// Fails with `EAGAIN` if the timeout expires first.
    pub fn timed_wait<T>(&self, timeout: T) -> Result<()>
        where T: Into<Timeout>,
    {
        let timeout: Timeout = timeout.into();
        to_result_void(k_sem_take(self.handle, timeout.0))
    }

    /// Take the semaphore from interrupt context.  Never blocks.
    pub fn isr_wait(&self) -> FromIsr<()> {
        let mut woken = false;
        let code = k_sem_take_from_isr(self.handle, &mut woken);
        FromIsr::from_status(code, woken)
    }

    /// Give the semaphore.  Never blocks.
    ///
    /// A waiting thread, the highest priority one, is released.  Fails with `ENOSPC` if the count
    /// is already at its maximum.
    pub fn post(&self) -> Result<()> {
        to_result_void(k_sem_give(self.handle))
    }

    /// Give the semaphore from interrupt context.
    pub fn isr_post(&self) -> FromIsr<()> {
        let mut woken = false;
        let code = k_sem_give_from_isr(self.handle, &mut woken);
        FromIsr::from_status(code, woken)
    }

    /// Get the semaphore's count.
    pub fn count(&self) -> u32 {
        k_sem_count_get(self.handle).unwrap_or(0)
    }

    /// Delete the semaphore, releasing the kernel object.
    pub fn delete(self) -> Result<()> {
        let handle = self.handle;
        mem::forget(self);
        log::trace!("semaphore {:?} deleted", handle);
        to_result_void(k_sem_delete(handle))
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        let _ = k_sem_delete(self.handle);
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sys::Semaphore {:?}", self.handle)
    }
}
