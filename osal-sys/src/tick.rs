// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! The kernel tick.
//!
//! The tick counter starts at zero when the scheduler starts, and counts at `TICK_RATE_HZ` from
//! then on.  Like any hardware counter, it is a `u32` that wraps.

use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;

use crate::kconfig;

/// The kernel's native unit of time.
pub type Tick = u32;

/// Block time meaning "wait forever".
pub const MAX_DELAY: Tick = Tick::MAX;

/// Frequency of the kernel tick.
pub const TICK_RATE_HZ: u32 = kconfig::CONFIG_TICK_RATE_HZ;

const _: () = assert!(TICK_RATE_HZ > 0, "tick rate must be non-zero");

static EPOCH: OnceCell<Instant> = OnceCell::new();

pub(crate) fn mark_epoch() {
    let _ = EPOCH.set(Instant::now());
}

/// Return the number of ticks since the scheduler was started.
///
/// Before the scheduler starts, this is always zero.
pub fn k_tick_count() -> Tick {
    match EPOCH.get() {
        Some(epoch) => {
            let micros = epoch.elapsed().as_micros();
            // Truncation to u32 is the wrap of the counter.
            (micros * u128::from(TICK_RATE_HZ) / 1_000_000) as Tick
        }
        None => 0,
    }
}

/// Host time covered by `ticks`, rounded up so that waits last at least that long.
pub(crate) fn ticks_to_duration(ticks: Tick) -> Duration {
    let hz = u64::from(TICK_RATE_HZ);
    let micros = (u64::from(ticks) * 1_000_000).div_ceil(hz);
    Duration::from_micros(micros)
}

/// Deadline for a block time, `None` meaning forever.
pub(crate) fn deadline(ticks: Tick) -> Option<Instant> {
    if ticks == MAX_DELAY {
        None
    } else {
        Some(Instant::now() + ticks_to_duration(ticks))
    }
}

/// Wrap-safe check that `now` is at or past `target`.  Valid while the two are within half the
/// counter range of each other.
pub(crate) fn tick_reached(now: Tick, target: Tick) -> bool {
    (now.wrapping_sub(target) as i32) >= 0
}
