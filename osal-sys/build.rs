// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

// Pre-build code for the kernel crate.

// The kernel's tunables (tick rate, heap budget, queue lengths) come from the Kconfig-style
// configuration file.  Numeric values are captured into a generated `kconfig` module, and the
// boolean options are made available as conditional compilation.

fn main() -> anyhow::Result<()> {
    osal_build::export_bool_kconfig()?;
    osal_build::build_kconfig_mod()?;
    Ok(())
}
