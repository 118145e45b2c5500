use std::fmt;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which side of a dual-location buffer failed to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Host,
    Device,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Region::Host => "host",
            Region::Device => "device",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::HostToDevice => "host to device",
            Direction::DeviceToHost => "device to host",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Library {
    #[strum(serialize = "blas")]
    Blas,
    #[strum(serialize = "solver")]
    Solver,
}

/// Every failure the harness can hit while driving an accelerator.
///
/// Correctness failures are not errors, they come back as a
/// [`CheckReport`](crate::tester::CheckReport) with mismatches.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to allocate {bytes} bytes of {region} memory: {reason}")]
    Allocation {
        region: Region,
        bytes: usize,
        reason: String,
    },
    #[error("{direction} copy of {bytes} bytes failed (code {code}): {reason}")]
    Transfer {
        direction: Direction,
        bytes: usize,
        code: i64,
        reason: String,
    },
    #[error("stream synchronization failed (code {code}): {reason}")]
    Synchronization { code: i64, reason: String },
    #[error("failed to {action} stream (code {code}): {reason}")]
    Stream {
        action: &'static str,
        code: i64,
        reason: String,
    },
    #[error("{library} handle failed to {action} (status {code})")]
    Context {
        library: Library,
        action: &'static str,
        code: i64,
    },
    #[error("{routine} returned status {code}")]
    KernelInvocation { routine: String, code: i64 },
}

impl Error {
    pub fn category(&self) -> &'static str {
        match self {
            Error::Allocation { .. } => "allocation",
            Error::Transfer { .. } => "transfer",
            Error::Synchronization { .. } => "synchronization",
            Error::Stream { .. } => "stream",
            Error::Context { .. } => "context",
            Error::KernelInvocation { .. } => "kernel invocation",
        }
    }

    /// Underlying runtime or library status code, when the failure carried one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Error::Allocation { .. } => None,
            Error::Transfer { code, .. }
            | Error::Synchronization { code, .. }
            | Error::Stream { code, .. }
            | Error::Context { code, .. }
            | Error::KernelInvocation { code, .. } => Some(*code),
        }
    }

    /// True when the status came from the BLAS or SOLVER library rather than the runtime.
    pub fn is_library_status(&self) -> bool {
        matches!(self, Error::Context { .. } | Error::KernelInvocation { .. })
    }
}
