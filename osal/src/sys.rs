// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Low level kernel interfaces.
//!
//! The `osal-sys` crate contains the kernel services as a set of `k_*` calls returning status
//! codes.  This module, `osal::sys`, contains thin wrappers to these calls that follow Rust
//! conventions, but are otherwise as unchanged as possible: the synchronization primitives, the
//! interrupt epilogue, and the scheduler phase.

use portable_atomic::{AtomicU8, Ordering};

use crate::error::{to_result_void, Result};
use crate::raw;

pub mod isr;
pub mod sync;

/// The process-wide scheduler phase.
///
/// The scheduler starts out idle.  [`start_scheduler`] moves it to running, and there is no way
/// back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The scheduler hasn't been started.  Threads and timers can be created, but nothing runs.
    Idle,
    /// The scheduler is running.
    Running,
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

// Mirrors the kernel's own flag, which is read until the start is seen.
static PHASE: AtomicU8 = AtomicU8::new(IDLE);

/// The current scheduler phase.
pub fn phase() -> Phase {
    if PHASE.load(Ordering::Acquire) == RUNNING {
        return Phase::Running;
    }
    // Threads released by the start can look before `start_scheduler` has returned.
    if raw::k_scheduler_started() {
        PHASE.store(RUNNING, Ordering::Release);
        Phase::Running
    } else {
        Phase::Idle
    }
}

/// Start the scheduler.
///
/// Threads created so far begin to run, the tick counter starts from zero, and timers that have
/// been started begin to count down.  This can be done once per process: later calls fail with
/// `EALREADY`.  If the kernel can't create its timer service, the call fails with `ENOMEM`, the
/// phase stays idle, and the start can be retried.
///
/// The hosted kernel returns from this call, and the caller carries on at idle priority.
pub fn start_scheduler() -> Result<()> {
    log::debug!("starting the scheduler");
    to_result_void(raw::k_start_scheduler())?;
    PHASE.store(RUNNING, Ordering::Release);
    Ok(())
}
