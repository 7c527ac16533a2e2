// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Time types
//!
//! The kernel counts time in ticks, `TICK_RATE_HZ` of them per second, in a `u32` that wraps.
//! Durations and instants are [`fugit`] types over that tick, so conversions to and from other
//! units are checked at compile time where they can be.
//!
//! Calls that can wait take an `impl Into<Timeout>`, which can be a [`Duration`], or one of the
//! markers [`Forever`] and [`NoWait`].
//!
//! Millisecond conversions are exact at a 1000 Hz tick, and truncate otherwise.

use crate::raw::{self, MAX_DELAY};

/// The kernel's unit of time.
pub type Tick = raw::Tick;

/// The tick rate of the kernel, from its configuration.
pub const TICK_RATE_HZ: u32 = raw::TICK_RATE_HZ;

/// A span of time, in ticks.
pub type Duration = fugit::Duration<Tick, 1, TICK_RATE_HZ>;

/// A point in time, in ticks since the scheduler was started.
pub type Instant = fugit::Instant<Tick, 1, TICK_RATE_HZ>;

/// How long a call may wait.
///
/// This is the kernel's block time: a number of ticks, where zero means not to wait at all, and
/// `MAX_DELAY` means to wait as long as it takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeout(pub Tick);

/// Wait as long as it takes.
#[derive(Clone, Copy, Debug)]
pub struct Forever;

/// Don't wait.
#[derive(Clone, Copy, Debug)]
pub struct NoWait;

impl From<Forever> for Timeout {
    fn from(_: Forever) -> Timeout {
        Timeout(MAX_DELAY)
    }
}

impl From<NoWait> for Timeout {
    fn from(_: NoWait) -> Timeout {
        Timeout(0)
    }
}

impl From<Duration> for Timeout {
    // A finite duration never means forever.
    fn from(value: Duration) -> Timeout {
        Timeout(value.ticks().min(MAX_DELAY - 1))
    }
}

impl Timeout {
    /// A timeout of `ms` milliseconds.
    pub fn from_ms(ms: u32) -> Timeout {
        ms_duration(ms).into()
    }

    /// True if this timeout waits without limit.
    pub fn is_forever(&self) -> bool {
        self.0 == MAX_DELAY
    }
}

/// A duration of `ms` milliseconds, truncated to whole ticks.
pub fn ms_duration(ms: u32) -> Duration {
    Duration::from_ticks(ms_to_ticks(ms))
}

/// Convert milliseconds to ticks, truncating.
pub fn ms_to_ticks(ms: u32) -> Tick {
    // Wraps like the tick counter.
    (u64::from(ms) * u64::from(TICK_RATE_HZ) / 1000) as Tick
}

/// Convert ticks to milliseconds, truncating.
pub fn ticks_to_ms(ticks: Tick) -> u32 {
    (u64::from(ticks) * 1000 / u64::from(TICK_RATE_HZ)) as u32
}
