// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! OS abstraction layer
//!
//! This crate provides portable synchronization and scheduling primitives on top of a preemptive,
//! priority based real-time kernel:
//!
//! - [`sys::sync::Mutex`] and [`sys::sync::Semaphore`], each with blocking, non-blocking, timed
//!   and interrupt-safe access.
//! - [`thread::Thread`], with pause/resume, stop/delete, and a notification a thread can wait for.
//! - [`timer::TimerTask`], a periodic or one-shot callback run by the kernel's timer service.
//! - [`clock`], milliseconds since the scheduler was started.
//!
//! Each handle type owns one kernel object, which is released when the handle is deleted or
//! dropped.  Operations that can fail return a [`Result`], with the kernel's errno in the
//! [`Error`].
//!
//! Calls made from interrupt context use the `isr_*` variants, which never block.  These return a
//! [`sys::isr::FromIsr`], carrying whether a higher priority task was readied, which must be
//! passed to [`sys::isr::yield_from_isr`] before the interrupt returns.

#![no_std]
#![allow(unexpected_cfgs)]
#![deny(missing_docs)]

extern crate alloc;

pub mod clock;
pub mod error;
pub mod logging;
pub mod sys;
pub mod thread;
pub mod time;
pub mod timer;

pub use error::{Error, Result};

pub use logging::set_logger;

/// Re-export of osal-sys as `osal::raw`.
pub mod raw {
    pub use osal_sys::*;
}

// Kernel configuration values, as generated into the kernel crate.
pub use osal_sys::kconfig;
