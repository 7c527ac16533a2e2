// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Time since the scheduler started.
//!
//! The clock counts milliseconds from the moment the scheduler was started, derived from the
//! kernel tick.  The count is a `u32` that wraps, like the tick counter underneath it: elapsed time
//! computations use wrapping arithmetic, and are correct across a wrap as long as the span
//! measured is shorter than the wrap period.

use crate::{
    error::{Error, Result, EPERM},
    raw::{k_delay, k_tick_count, MAX_DELAY},
    sys::{phase, Phase},
    time::{ticks_to_ms, Instant, Tick, TICK_RATE_HZ},
};

fn running() -> Result<()> {
    match phase() {
        Phase::Running => Ok(()),
        Phase::Idle => Err(Error(EPERM)),
    }
}

/// Milliseconds since the scheduler was started.
///
/// Fails with `EPERM` before the scheduler is started.
pub fn now_ms() -> Result<u32> {
    running()?;
    Ok(ticks_to_ms(k_tick_count()))
}

/// The current tick, as an [`Instant`].
pub fn now() -> Result<Instant> {
    running()?;
    Ok(Instant::from_ticks(k_tick_count()))
}

/// Milliseconds since `start`, a value from [`now_ms`].
pub fn elapsed_ms(start: u32) -> Result<u32> {
    Ok(now_ms()?.wrapping_sub(start))
}

/// True once `amount` milliseconds have passed since `start`.
pub fn is_elapsed(start: u32, amount: u32) -> Result<bool> {
    Ok(elapsed_ms(start)? >= amount)
}

/// Suspend the calling thread for at least `ms` milliseconds.
///
/// Precision is limited by the kernel tick: the delay is rounded up to whole ticks.
pub fn delay(ms: u32) {
    let ticks = (u64::from(ms) * u64::from(TICK_RATE_HZ)).div_ceil(1000);
    k_delay(ticks.min(u64::from(MAX_DELAY - 1)) as Tick);
}
