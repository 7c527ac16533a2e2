// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Kernel mutex wrapper.
//!
//! This module implements a thin wrapper around the kernel's mutex.  Unlike [`std::sync::Mutex`],
//! it protects no data: it is a lock with strict ownership, where the unlock must come from the
//! thread that locked it.  Unlocking a mutex held by another thread fails with `EPERM`, and
//! unlocking one that isn't held fails with `ENOSPC`.
//!
//! Attempts to recursively lock will deadlock.
//!
//! [`std::sync::Mutex`]: https://doc.rust-lang.org/std/sync/struct.Mutex.html

use core::fmt;
use core::mem;

use crate::{
    error::{created, to_result_void, Result},
    raw::{
        k_mutex_create,
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

/// A kernel mutex usable from safe Rust code.
///
/// Owns the kernel object, which is deleted with [`delete`], or when the `Mutex` is dropped.
///
/// [`delete`]: Mutex::delete
pub struct Mutex {
    /// The kernel mutex.
    handle: SemHandle,
}

impl Mutex {
    /// Create a new mutex, unlocked.
    ///
    /// Fails with `ENOMEM` if the kernel heap can't hold it.
    pub fn new() -> Result<Mutex> {
        let handle = created(k_mutex_create())?;
        log::trace!("mutex {:?} created", handle);
        Ok(Mutex { handle })
    }

    /// Lock the mutex, waiting as long as it takes.
    pub fn lock(&self) -> Result<()> {
        self.timed_lock(Forever)
    }

    /// Lock the mutex if it is free.  Never blocks: fails with `EBUSY` if the mutex is held.
    pub fn try_lock(&self) -> Result<()> {
        self.timed_lock(NoWait)
    }

    /// Lock the mutex, waiting up to `timeout` for it.
    ///
    /// Fails with `EAGAIN` if the timeout expires first.
    pub fn timed_lock<T>(&self, timeout: T) -> Result<()>
        where T: Into<Timeout>,
    {
        let timeout: Timeout = timeout.into();
        to_result_void(k_sem_take(self.handle, timeout.0))
    }

    /// Lock the mutex from interrupt context.
    ///
    /// Never blocks: a held mutex is reported with `EBUSY`.  An interrupt has no thread identity,
    /// so a mutex locked here can be unlocked from anywhere.
    pub fn isr_lock(&self) -> FromIsr<()> {
        let mut woken = false;
        let code = k_sem_take_from_isr(self.handle, &mut woken);
        FromIsr::from_status(code, woken)
    }

    /// Unlock the mutex.  Never blocks.
    ///
    /// If threads are waiting, the mutex passes directly to the highest priority one.
    pub fn unlock(&self) -> Result<()> {
        to_result_void(k_sem_give(self.handle))
    }

    /// Unlock the mutex from interrupt context.
    pub fn isr_unlock(&self) -> FromIsr<()> {
        let mut woken = false;
        let code = k_sem_give_from_isr(self.handle, &mut woken);
        FromIsr::from_status(code, woken)
    }

    /// Delete the mutex, releasing the kernel object.
    pub fn delete(self) -> Result<()> {
        let handle = self.handle;
        mem::forget(self);
        log::trace!("mutex {:?} deleted", handle);
        to_result_void(k_sem_delete(handle))
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        // Nobody can be waiting, as waiting borrows the mutex.
        let _ = k_sem_delete(self.handle);
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sys::Mutex {:?}", self.handle)
    }
}
