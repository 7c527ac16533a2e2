// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Rust logging over the kernel console
//!
//! Any use of logging, in this crate, the kernel crate, or the application, goes through the `log`
//! crate.  Messages are formatted into complete lines, which are written to the kernel console in
//! one piece, so lines from different threads don't interleave.
//!
//! - `CONFIG_LOG`: Global enable of logging.  Without it, [`set_logger`] installs nothing.
//! - `CONFIG_LOG_TICK_STAMP`: Prefix each line with the kernel tick count.
//! - `CONFIG_LOG_DEFAULT_LEVEL`: The most verbose level that is logged.

use log::{LevelFilter, Log, SetLoggerError};

use crate::kconfig;

cfg_if::cfg_if! {
    if #[cfg(CONFIG_LOG)] {
        mod impl_console;
        pub use impl_console::set_logger;
    } else {
        /// No logging is configured, provide an empty handler that does nothing.
        pub fn set_logger() -> Result<(), SetLoggerError> {
            Ok(())
        }
    }
}

/// The level filter for a `CONFIG_LOG_DEFAULT_LEVEL` value.
pub fn level_filter(level: u32) -> LevelFilter {
    match level {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[allow(dead_code)]
fn set_logger_internal(logger: &'static dyn Log) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(level_filter(kconfig::CONFIG_LOG_DEFAULT_LEVEL));
    Ok(())
}
