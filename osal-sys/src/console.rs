// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Kernel console.

use std::io::Write;

/// Write raw bytes to the kernel console.
///
/// On the hosted kernel the console is the process's standard error.  Each call is written while
/// holding the stream lock, so a single call is never interleaved with another.
pub fn k_str_out(bytes: &[u8]) {
    let mut console = std::io::stderr().lock();
    // There is nowhere to report a console failure.
    let _ = console.write_all(bytes);
}
