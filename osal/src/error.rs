// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Kernel errors
//!
//! This module contains an `Error` and `Result` type for use in wrapped kernel calls.  The kernel
//! services return an int result where negative values correspond with errnos.  Convert those to
//! a `Result` type where the `Error` condition maps to errnos.
//!
//! The errnos the kernel produces are re-exported here, so that callers can match on them.

use core::ffi::c_int;
use core::fmt;

pub use crate::raw::{EAGAIN, EALREADY, EBUSY, EINVAL, ENOMEM, ENOSPC, EPERM, ESRCH};

/// A kernel error.
///
/// Represents an error result returned by the kernel, or detected by this layer before calling
/// into it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Error(pub u32);

impl Error {
    /// The symbolic name of the errno, if it is one the kernel produces.
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            EPERM => "EPERM",
            ESRCH => "ESRCH",
            EAGAIN => "EAGAIN",
            ENOMEM => "ENOMEM",
            EBUSY => "EBUSY",
            EINVAL => "EINVAL",
            ENOSPC => "ENOSPC",
            EALREADY => "EALREADY",
            _ => return None,
        };
        Some(name)
    }
}

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "kernel error {} (errno:{})", name, self.0),
            None => write!(f, "kernel error errno:{}", self.0),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Wraps a value with a possible kernel error.
pub type Result<T> = core::result::Result<T, Error>;

/// Map a return result from the kernel into an Result.
///
/// Negative return results being considered errors.
#[inline(always)]
pub fn to_result(code: c_int) -> Result<c_int> {
    if code < 0 {
        Err(Error(code.unsigned_abs()))
    } else {
        Ok(code)
    }
}

/// Map a return result, with a void result.
#[inline(always)]
pub fn to_result_void(code: c_int) -> Result<()> {
    to_result(code).map(|_| ())
}

/// Map an optional handle from a kernel create call.  `None` is always heap exhaustion.
#[inline(always)]
pub(crate) fn created<T>(handle: Option<T>) -> Result<T> {
    handle.ok_or(Error(ENOMEM))
}
