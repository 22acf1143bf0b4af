//! Errors returned by fallible public entry points. Everything else
//! (malformed entity handles, double-registration, out-of-order phase
//! calls) is a programmer error and asserts instead of returning `Result`,
//! matching the panics in [`crate::thread_registry`] and
//! [`crate::sparse_set`].

use std::error::Error;
use std::fmt;
use std::io;

/// Failure building an [`crate::executor::Executor`].
pub struct ExecutorBuildError {
    kind: ErrorKind,
}

enum ErrorKind {
    IoError(io::Error),
}

impl ExecutorBuildError {
    pub(crate) fn io(e: io::Error) -> Self {
        ExecutorBuildError {
            kind: ErrorKind::IoError(e),
        }
    }
}

impl fmt::Display for ExecutorBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::IoError(e) => write!(f, "failed to spawn worker thread: {}", e),
        }
    }
}

impl fmt::Debug for ExecutorBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Error for ExecutorBuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            ErrorKind::IoError(e) => Some(e),
        }
    }
}
