//! Error taxonomy shared by every filesystem operation.

use std::io;

use thiserror::Error;

/// Result of filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Errors surfaced by the operation dispatcher.
///
/// Host adapters report these to the kernel by errno value, so every variant
/// maps onto exactly one errno. OS errors that have no named variant are
/// carried verbatim in [`FsError::Os`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The resolved physical path does not exist.
    #[error("no such file or directory")]
    NotFound,
    /// An access check on the underlying backend failed.
    #[error("permission denied")]
    PermissionDenied,
    /// Rename into an occupied destination with overwriting disabled.
    #[error("file exists")]
    AlreadyExists,
    /// The operation is not available on this host.
    #[error("operation not supported")]
    Unsupported,
    /// A read or write referenced an unknown handle id.
    #[error("bad file handle")]
    BadHandle,
    /// A directory removal hit a non-empty directory.
    #[error("directory not empty")]
    NotEmpty,
    /// Any other OS error, by raw errno.
    #[error("os error {0}")]
    Os(i32),
}

#[cfg(unix)]
mod errno {
    pub const ENOENT: i32 = libc::ENOENT;
    pub const EACCES: i32 = libc::EACCES;
    pub const EEXIST: i32 = libc::EEXIST;
    pub const ENOTSUP: i32 = libc::ENOTSUP;
    pub const EBADF: i32 = libc::EBADF;
    pub const ENOTEMPTY: i32 = libc::ENOTEMPTY;
    pub const EIO: i32 = libc::EIO;
}

#[cfg(not(unix))]
mod errno {
    pub const ENOENT: i32 = 2;
    pub const EACCES: i32 = 13;
    pub const EEXIST: i32 = 17;
    pub const ENOTSUP: i32 = 129;
    pub const EBADF: i32 = 9;
    pub const ENOTEMPTY: i32 = 41;
    pub const EIO: i32 = 5;
}

impl FsError {
    /// The errno a host adapter should report for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => errno::ENOENT,
            FsError::PermissionDenied => errno::EACCES,
            FsError::AlreadyExists => errno::EEXIST,
            FsError::Unsupported => errno::ENOTSUP,
            FsError::BadHandle => errno::EBADF,
            FsError::NotEmpty => errno::ENOTEMPTY,
            FsError::Os(code) => *code,
        }
    }

    fn from_errno(code: i32) -> Self {
        match code {
            c if c == errno::ENOENT => FsError::NotFound,
            c if c == errno::EACCES => FsError::PermissionDenied,
            c if c == errno::EEXIST => FsError::AlreadyExists,
            c if c == errno::ENOTSUP => FsError::Unsupported,
            c if c == errno::EBADF => FsError::BadHandle,
            c if c == errno::ENOTEMPTY => FsError::NotEmpty,
            c => FsError::Os(c),
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return FsError::from_errno(code);
        }
        use io::ErrorKind::*;
        match err.kind() {
            NotFound => FsError::NotFound,
            PermissionDenied => FsError::PermissionDenied,
            AlreadyExists => FsError::AlreadyExists,
            Unsupported => FsError::Unsupported,
            _ => FsError::Os(errno::EIO),
        }
    }
}

#[cfg(unix)]
pub(crate) const EINVAL: i32 = libc::EINVAL;
#[cfg(not(unix))]
pub(crate) const EINVAL: i32 = 22;

#[cfg(unix)]
pub(crate) const EIO: i32 = libc::EIO;
#[cfg(not(unix))]
pub(crate) const EIO: i32 = 5;

/// Errors from joining a blocking task; the closure itself never panics in
/// normal operation, so a join failure is reported as an I/O fault.
pub(crate) fn join_fault<E>(_: E) -> FsError {
    FsError::Os(EIO)
}

/// True when a close-time error is the double-close case `release` swallows.
pub fn is_ebadf(err: &io::Error) -> bool {
    err.raw_os_error() == Some(errno::EBADF)
}
