// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

// Pre-build code for the osal crates.

// This module makes the values from the kernel's Kconfig-style `.config` file available to the
// crates that are built against the kernel.  Boolean options become conditional compilation flags,
// and numeric and string options become constants in a generated `kconfig` module.  Each crate that
// wants to see these has to call into here from its own build.rs.

use std::collections::HashSet;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

/// The environment variable that can point at an alternate configuration.
pub const DOTCONFIG_ENV: &str = "OSAL_DOTCONFIG";

/// A single value from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `CONFIG_FOO=y`
    Bool,
    /// A decimal value, which may be negative.
    Int(i64),
    /// A hex value, always unsigned.
    Hex(u64),
    /// A quoted string, kept with its quotes.
    Str(String),
}

/// Locate the configuration file.
///
/// Uses `OSAL_DOTCONFIG` if set, otherwise the default configuration that ships with this crate.
pub fn dotconfig_path() -> PathBuf {
    match env::var_os(DOTCONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => Path::new(env!("CARGO_MANIFEST_DIR")).join("osal.conf"),
    }
}

/// Parse configuration lines.
///
/// Comments, blank lines and `# CONFIG_FOO is not set` lines are skipped.  Anything else that
/// doesn't look like a `CONFIG_` assignment is an error, so typos don't silently vanish.
pub fn parse_dotconfig<R: BufRead>(reader: R) -> Result<Vec<(String, Value)>> {
    let config_y = Regex::new(r"^(CONFIG_[A-Za-z0-9_]+)=y$")?;
    // The assumption is that hex values are unsigned, and decimal are signed.
    let config_hex = Regex::new(r"^(CONFIG_[A-Za-z0-9_]+)=0x([0-9a-fA-F]+)$")?;
    let config_int = Regex::new(r"^(CONFIG_[A-Za-z0-9_]+)=(-?(?:0|[1-9][0-9]*))$")?;
    let config_str = Regex::new(r#"^(CONFIG_[A-Za-z0-9_]+)=(".*")$"#)?;

    let mut entries = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.context("reading configuration")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let entry = if let Some(caps) = config_y.captures(line) {
            (caps[1].to_string(), Value::Bool)
        } else if let Some(caps) = config_hex.captures(line) {
            let value = u64::from_str_radix(&caps[2], 16)
                .with_context(|| format!("line {}: bad hex value", lineno + 1))?;
            (caps[1].to_string(), Value::Hex(value))
        } else if let Some(caps) = config_int.captures(line) {
            let value = caps[2]
                .parse()
                .with_context(|| format!("line {}: bad integer value", lineno + 1))?;
            (caps[1].to_string(), Value::Int(value))
        } else if let Some(caps) = config_str.captures(line) {
            (caps[1].to_string(), Value::Str(caps[2].to_string()))
        } else {
            anyhow::bail!("line {}: unrecognized configuration entry {:?}", lineno + 1, line);
        };
        entries.push(entry);
    }
    Ok(entries)
}

fn load_dotconfig() -> Result<Vec<(String, Value)>> {
    let dotconfig = dotconfig_path();

    // Ensure the build script is rerun when the dotconfig changes.
    println!("cargo:rerun-if-env-changed={}", DOTCONFIG_ENV);
    println!("cargo:rerun-if-changed={}", dotconfig.display());

    let file = File::open(&dotconfig)
        .with_context(|| format!("unable to open {}", dotconfig.display()))?;
    parse_dotconfig(BufReader::new(file))
}

/// Gather the names of the boolean options that are enabled.
pub fn extract_kconfig_bool_options(entries: &[(String, Value)]) -> HashSet<String> {
    entries
        .iter()
        .filter(|(_, value)| *value == Value::Bool)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Export boolean Kconfig entries.  This must happen in any crate that wishes to access the
/// configuration settings.
pub fn export_bool_kconfig() -> Result<()> {
    let entries = load_dotconfig()?;
    let mut enabled: Vec<_> = extract_kconfig_bool_options(&entries).into_iter().collect();
    enabled.sort();
    for name in enabled {
        println!("cargo:rustc-cfg={}", name);
    }
    Ok(())
}

/// Capture numeric and string kconfig values in a `kconfig.rs` file in `OUT_DIR`, to be included
/// as a module.
pub fn build_kconfig_mod() -> Result<()> {
    let entries = load_dotconfig()?;
    let outdir = env::var("OUT_DIR").context("OUT_DIR must be set")?;
    let gen_path = Path::new(&outdir).join("kconfig.rs");

    let mut f = File::create(&gen_path)
        .with_context(|| format!("unable to create {}", gen_path.display()))?;
    write_kconfig_mod(&mut f, &entries)?;
    Ok(())
}

/// Write the constant declarations for the given entries.
///
/// Decimal values that fit are emitted as `u32`, negative ones as `i32`, and anything larger falls
/// back to the 64-bit types.
pub fn write_kconfig_mod<W: Write>(out: &mut W, entries: &[(String, Value)]) -> Result<()> {
    for (name, value) in entries {
        match value {
            Value::Bool => (),
            Value::Int(v) => {
                let ty = if *v >= 0 && *v <= u32::MAX as i64 {
                    "u32"
                } else if *v >= i32::MIN as i64 && *v < 0 {
                    "i32"
                } else {
                    "i64"
                };
                writeln!(out, "#[allow(dead_code)]")?;
                writeln!(out, "pub const {}: {} = {};", name, ty, v)?;
            }
            Value::Hex(v) => {
                writeln!(out, "#[allow(dead_code)]")?;
                writeln!(out, "pub const {}: usize = {:#x};", name, v)?;
            }
            Value::Str(v) => {
                writeln!(out, "#[allow(dead_code)]")?;
                writeln!(out, "pub const {}: &str = {};", name, v)?;
            }
        }
    }
    Ok(())
}
