// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Interrupt context support.
//!
//! Operations done from an interrupt never block.  Instead, each `isr_*` operation reports, along
//! with its result, whether it readied a task of higher priority than the one the interrupt
//! preempted.  When it did, the switch to that task should happen as the interrupt returns, which
//! the handler requests by passing the flag to [`yield_from_isr`]:
//!
//! ```ignore
//! let status = sem.isr_post();
//! yield_from_isr(status.yield_requested);
//! ```
//!
//! Several `isr_*` results may be combined with [`FromIsr::yield_requested`] or'ed together, with
//! a single yield at the end.

use core::ffi::c_int;

use crate::error::{to_result_void, Result};
use crate::raw;

/// The outcome of an operation done from interrupt context.
#[must_use = "the yield request must be passed to `yield_from_isr`"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FromIsr<T> {
    /// The result of the operation.
    pub result: Result<T>,
    /// A task of higher priority than the interrupted one was readied.
    pub yield_requested: bool,
}

impl FromIsr<()> {
    pub(crate) fn from_status(code: c_int, woken: bool) -> FromIsr<()> {
        FromIsr {
            result: to_result_void(code),
            yield_requested: woken,
        }
    }
}

impl<T> FromIsr<T> {
    /// Request the yield, if any, and return the result.
    ///
    /// For a handler that does a single operation, this is the whole epilogue.
    pub fn finish(self) -> Result<T> {
        yield_from_isr(self.yield_requested);
        self.result
    }
}

/// End an interrupt, switching to a readied task if `yield_requested`.
pub fn yield_from_isr(yield_requested: bool) {
    raw::k_yield_from_isr(yield_requested);
}
