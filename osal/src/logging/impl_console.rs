// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Logging through the kernel console
//!
//! This module implements a log handler (for the [`log`] crate) that writes messages to the
//! kernel console.

extern crate alloc;

use alloc::string::String;
use core::fmt::Write;

use log::{Log, Metadata, Record, SetLoggerError};

use crate::raw::k_str_out;

/// A simple log handler, built around the console.
struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    // The line is formatted first, and written with a single console call.
    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut line = String::new();
        #[cfg(CONFIG_LOG_TICK_STAMP)]
        {
            let _ = write!(line, "[{:>10}] ", crate::raw::k_tick_count());
        }
        let _ = writeln!(line, "{}:{}: {}", record.level(), record.target(), record.args());
        k_str_out(line.as_bytes());
    }

    // Flush is not needed.
    fn flush(&self) {}
}

static CONSOLE_LOGGER: ConsoleLogger = ConsoleLogger;

/// Set the log handler to log messages through the kernel console.
///
/// Fails if a logger has already been installed.
pub fn set_logger() -> Result<(), SetLoggerError> {
    super::set_logger_internal(&CONSOLE_LOGGER)
}
