// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

// Pre-build code for the osal crate.

// Boolean options of the kernel configuration (`CONFIG_LOG` and friends) select code with
// `#[cfg(...)]`, so they are exported here as well as in the kernel crate.

fn main() {
    osal_build::export_bool_kconfig().expect("reading the kernel configuration");
}
