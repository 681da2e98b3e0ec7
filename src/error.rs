//! Kernel error type and logging-propagation macros.
//!
//! Mirrors the teacher's `error.rs`: a flat error enum with a manual
//! `Display` impl, plus `err!`/`log!`/`try_log!` macros that log the
//! call site before returning or propagating. The teacher prints with
//! its own `println!` because it is `no_std`; this crate is
//! host-testable, so the macros below go through the `log` facade
//! instead.

use std::fmt::{self, Display};

/// Errors the process-subsystem core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free slot in the process table.
    OutOfProc,
    /// A collaborator (VM) allocation failed.
    Alloc,
    /// An argument was outside its documented range.
    InvalidArgument,
    /// `pid` named no process in the table.
    NoSuchProcess,
    /// The calling process has no children to wait for.
    NoChildren,
}

impl Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfProc => write!(f, "out of process slots"),
            KernelError::Alloc => write!(f, "allocation failed"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::NoSuchProcess => write!(f, "no such process"),
            KernelError::NoChildren => write!(f, "no children"),
        }
    }
}

impl std::error::Error for KernelError {}

/// Return an error, logging the call site. Use instead of `return Err(...)`.
#[macro_export]
macro_rules! err {
    ($e:expr) => {{
        log::warn!("{} at {}:{}", $e, file!(), line!());
        return Err($e.into());
    }};
}

/// Log (without consuming) an error result, passing it through unchanged.
#[macro_export]
macro_rules! log {
    ($e:expr) => {
        match $e {
            Ok(v) => Ok(v),
            Err(e) => {
                log::debug!("  at {}:{}: {}", file!(), line!(), e);
                Err(e)
            }
        }
    };
}

/// Propagate an error with call-site logging. Use instead of bare `?`
/// when the failure is worth a breadcrumb (allocation paths, mostly).
#[macro_export]
macro_rules! try_log {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => {
                log::debug!("  at {}:{}: {}", file!(), line!(), e);
                return Err(e.into());
            }
        }
    };
}
