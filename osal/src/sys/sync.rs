// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Low-level synchronization primitives.
//!
//! The `osal-sys` crate provides the kernel's semaphores and mutexes as handles passed to `k_*`
//! calls.  This module wraps them as owning types: each [`Mutex`] or [`Semaphore`] owns one kernel
//! object, and deletes it when dropped.
//!
//! Both types are `Send` and `Sync`, as the kernel handles its own locking.  Sharing one between
//! threads is done the usual way, with an `Arc`, or a reference to a value that outlives the
//! threads.  Because deletion takes the value, a primitive can't be deleted while another thread
//! is blocked on it.
//!
//! Every operation comes in four forms: blocking, non-blocking (`try_`), bounded by a timeout
//! (`timed_`), and from interrupt context (`isr_`).  A non-blocking attempt on an unavailable
//! primitive fails with `EBUSY`, and an expired timeout with `EAGAIN`.

pub mod mutex;
pub mod semaphore;

pub use mutex::Mutex;
pub use semaphore::{Semaphore, SemaphoreConfig};
