// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Timer tasks
//!
//! A [`TimerTask`] calls a closure periodically, or once, from the kernel's timer service.  The
//! callback runs on the service task, one callback at a time, so it should be short: a typical
//! callback posts a semaphore or notifies a thread that does the actual work.
//!
//! The first expiry after creation can be offset with an initial delay, which is used by the first
//! start only.  Later starts count a full period.  A timer created with `start_later` stays
//! dormant until [`TimerTask::start`] is called.
//!
//! Timer operations are commands to the timer service, which applies them in order.  Commands are
//! queued in a bounded queue.  Before the scheduler starts, the queue is not drained, and a command
//! that finds it full fails with `EAGAIN`.
//!
//! Periods are given in milliseconds, and converted to whole ticks, truncating.  A period shorter
//! than one tick is rejected.

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use crate::{
    error::{created, to_result_void, Error, Result, EINVAL},
    raw::{
        k_timer_create,
        k_timer_delete,
        k_timer_is_active,
        k_timer_reset,
        k_timer_start,
        k_timer_stop,
        TimerHandle,
        MAX_DELAY,
    },
    time::{ms_to_ticks, Duration, Tick},
};

/// How to create a [`TimerTask`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerConfig {
    /// The name of the timer.
    pub name: String,
    /// The period, in milliseconds.
    pub period_ms: u32,
    /// Fire once, rather than every period.
    pub one_shot: bool,
    /// Leave the timer dormant until [`TimerTask::start`].
    pub start_later: bool,
}

impl TimerConfig {
    /// A periodic timer, started at creation.
    pub fn new(name: &str, period_ms: u32) -> TimerConfig {
        TimerConfig {
            name: String::from(name),
            period_ms,
            one_shot: false,
            start_later: false,
        }
    }

    /// Fire once per start.
    pub fn one_shot(mut self, one_shot: bool) -> TimerConfig {
        self.one_shot = one_shot;
        self
    }

    /// Don't start the timer at creation.
    pub fn start_later(mut self, start_later: bool) -> TimerConfig {
        self.start_later = start_later;
        self
    }
}

/// A kernel software timer with its callback.
pub struct TimerTask {
    handle: TimerHandle,
    name: String,
    period: Tick,
    /// Offset of the first expiry, until the first start.
    init_delay: Option<Tick>,
    live: bool,
}

impl TimerTask {
    /// Create a timer calling `callback` at every expiry.
    ///
    /// `init_delay_ms` is the time from the first start to the first expiry.  Unless the
    /// configuration says `start_later`, the timer is started right away.  On any failure the
    /// kernel timer is released again: `EINVAL` for a period shorter than a tick, `ENOMEM` when
    /// the kernel heap is full, and `EAGAIN` when the start can't be queued.
    pub fn new<F>(config: &TimerConfig, init_delay_ms: u32, callback: F) -> Result<TimerTask>
        where F: FnMut() + Send + 'static,
    {
        let period = ms_to_ticks(config.period_ms);
        if period == 0 {
            return Err(Error(EINVAL));
        }

        let handle = created(k_timer_create(
            &config.name,
            period,
            !config.one_shot,
            Box::new(callback),
        ))?;
        let mut timer = TimerTask {
            handle,
            name: config.name.clone(),
            period,
            init_delay: Some(ms_to_ticks(init_delay_ms)),
            live: true,
        };

        if !config.start_later {
            // A failed start queued nothing, so dropping `timer` deletes it at once.
            timer.start()?;
        }
        log::debug!("timer `{}` created, period {} ticks", timer.name, period);
        Ok(timer)
    }

    /// Start the timer.
    ///
    /// The first start expires after the initial delay, later ones after a full period.  Starting
    /// a timer that is already running starts its countdown over.
    pub fn start(&mut self) -> Result<()> {
        let first = self.init_delay.unwrap_or(self.period);
        to_result_void(k_timer_start(self.handle, first, MAX_DELAY))?;
        self.init_delay = None;
        Ok(())
    }

    /// Stop the timer.  It stays dormant until started again.
    pub fn stop(&mut self) -> Result<()> {
        to_result_void(k_timer_stop(self.handle, MAX_DELAY))
    }

    /// Start the countdown over from a full period.  A dormant timer is started.
    pub fn restart(&mut self) -> Result<()> {
        to_result_void(k_timer_reset(self.handle, MAX_DELAY))?;
        self.init_delay = None;
        Ok(())
    }

    /// True if the timer is counting down.
    ///
    /// A one-shot timer that has fired is no longer active.
    pub fn is_active(&self) -> bool {
        k_timer_is_active(self.handle)
    }

    /// The name given at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The period, in whole ticks.
    pub fn period(&self) -> Duration {
        Duration::from_ticks(self.period)
    }

    /// Delete the timer.
    ///
    /// On failure, the timer is handed back inside the error, to retry or to drop.
    pub fn delete(mut self) -> core::result::Result<(), DeleteFailed> {
        match to_result_void(k_timer_delete(self.handle, MAX_DELAY)) {
            Ok(()) => {
                self.live = false;
                log::debug!("timer `{}` deleted", self.name);
                Ok(())
            }
            Err(error) => Err(DeleteFailed { timer: self, error }),
        }
    }
}

impl Drop for TimerTask {
    fn drop(&mut self) {
        if self.live {
            let _ = k_timer_delete(self.handle, MAX_DELAY);
        }
    }
}

impl fmt::Debug for TimerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerTask")
            .field("name", &self.name)
            .field("period", &self.period)
            .finish()
    }
}

/// A failed [`TimerTask::delete`], holding the timer that is still alive.
#[derive(Debug)]
pub struct DeleteFailed {
    /// The timer, which still exists.
    pub timer: TimerTask,
    /// Why the delete failed.
    pub error: Error,
}

impl fmt::Display for DeleteFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deleting timer `{}`: {}", self.timer.name, self.error)
    }
}

impl core::error::Error for DeleteFailed {}
