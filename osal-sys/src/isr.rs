// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Interrupt epilogue support.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

static YIELD_REQUESTS: AtomicUsize = AtomicUsize::new(0);

/// Request a context switch on the way out of an interrupt.
///
/// `woken` is the flag reported by the `*_from_isr` services.  When it is set, a task of higher
/// priority than the interrupted one was readied, and the switch to it should happen as the
/// interrupt returns rather than at the next tick.  On the hosted kernel this yields the calling
/// host thread.
pub fn k_yield_from_isr(woken: bool) {
    if woken {
        YIELD_REQUESTS.fetch_add(1, Ordering::Relaxed);
        thread::yield_now();
    }
}

/// The number of context switches requested through [`k_yield_from_isr`] since startup.
pub fn k_isr_yield_count() -> usize {
    YIELD_REQUESTS.load(Ordering::Relaxed)
}
