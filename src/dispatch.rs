//! Sum-typed operation dispatch with decorator cross-cutting concerns.
//!
//! Hosts hand every VFS callback to a [`Dispatch`] as an [`Operation`];
//! logging and per-path locking wrap the dispatcher instead of being mixed
//! into the filesystem type.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;

use crate::error::FsResult;
use crate::fs::{FileStat, FsUsage, SieveFs};
use crate::gate::PathLocks;

/// One VFS callback, by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Access { path: String, mode: u32 },
    GetAttr { path: String },
    ReadDir { path: String },
    Open { path: String, flags: i32 },
    Create { path: String, mode: u32 },
    Read { path: String, length: usize, offset: u64, fh: u64 },
    Write { path: String, data: Vec<u8>, offset: u64, fh: u64 },
    Truncate { path: String, length: u64 },
    Unlink { path: String },
    MkDir { path: String, mode: u32 },
    RmDir { path: String },
    Chmod { path: String, mode: u32 },
    Chown { path: String, uid: u32, gid: u32 },
    Utimens { path: String, times: Option<(SystemTime, SystemTime)> },
    ReadLink { path: String },
    StatFs { path: String },
    Symlink { link_location: String, target: String },
    Rename { old: String, new: String },
    Release { path: String, fh: u64 },
    Fsync { path: String, datasync: bool, fh: u64 },
    Flush { path: String, fh: u64 },
    Lock { path: String },
}

impl Operation {
    /// The callback name, as hosts and logs spell it.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Access { .. } => "access",
            Operation::GetAttr { .. } => "getattr",
            Operation::ReadDir { .. } => "readdir",
            Operation::Open { .. } => "open",
            Operation::Create { .. } => "create",
            Operation::Read { .. } => "read",
            Operation::Write { .. } => "write",
            Operation::Truncate { .. } => "truncate",
            Operation::Unlink { .. } => "unlink",
            Operation::MkDir { .. } => "mkdir",
            Operation::RmDir { .. } => "rmdir",
            Operation::Chmod { .. } => "chmod",
            Operation::Chown { .. } => "chown",
            Operation::Utimens { .. } => "utimens",
            Operation::ReadLink { .. } => "readlink",
            Operation::StatFs { .. } => "statfs",
            Operation::Symlink { .. } => "symlink",
            Operation::Rename { .. } => "rename",
            Operation::Release { .. } => "release",
            Operation::Fsync { .. } => "fsync",
            Operation::Flush { .. } => "flush",
            Operation::Lock { .. } => "lock",
        }
    }

    /// The path the operation is scoped to.
    pub fn path(&self) -> &str {
        match self {
            Operation::Access { path, .. }
            | Operation::GetAttr { path }
            | Operation::ReadDir { path }
            | Operation::Open { path, .. }
            | Operation::Create { path, .. }
            | Operation::Read { path, .. }
            | Operation::Write { path, .. }
            | Operation::Truncate { path, .. }
            | Operation::Unlink { path }
            | Operation::MkDir { path, .. }
            | Operation::RmDir { path }
            | Operation::Chmod { path, .. }
            | Operation::Chown { path, .. }
            | Operation::Utimens { path, .. }
            | Operation::ReadLink { path }
            | Operation::StatFs { path }
            | Operation::Release { path, .. }
            | Operation::Fsync { path, .. }
            | Operation::Flush { path, .. }
            | Operation::Lock { path } => path,
            Operation::Symlink { link_location, .. } => link_location,
            Operation::Rename { old, .. } => old,
        }
    }

    /// Whether the concurrency gate must serialise this operation on its
    /// path. Reads and non-path-scoped statistics acquire nothing.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Write { .. }
                | Operation::Rename { .. }
                | Operation::Truncate { .. }
                | Operation::Utimens { .. }
                | Operation::Unlink { .. }
                | Operation::Create { .. }
                | Operation::Chmod { .. }
                | Operation::Chown { .. }
                | Operation::RmDir { .. }
                | Operation::MkDir { .. }
                | Operation::Open { .. }
                | Operation::Release { .. }
        )
    }
}

/// What a callback returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Unit,
    Attr(FileStat),
    Entries(BTreeSet<String>),
    Handle(u64),
    Data(Vec<u8>),
    Written(usize),
    Target(String),
    Usage(FsUsage),
}

impl Reply {
    /// A compact rendering for the operation log; data payloads are
    /// summarised by length.
    fn summary(&self) -> String {
        match self {
            Reply::Unit => "ok".to_string(),
            Reply::Attr(stat) => format!("attr(mode={:o}, size={})", stat.mode, stat.size),
            Reply::Entries(names) => format!("{} entries", names.len()),
            Reply::Handle(fh) => format!("fh={fh}"),
            Reply::Data(data) => format!("{} bytes", data.len()),
            Reply::Written(count) => format!("wrote {count}"),
            Reply::Target(target) => format!("-> {target}"),
            Reply::Usage(usage) => format!("{} blocks", usage.blocks),
        }
    }
}

/// The surface a host drives.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn call(&self, operation: Operation) -> FsResult<Reply>;
}

#[async_trait]
impl Dispatch for SieveFs {
    async fn call(&self, operation: Operation) -> FsResult<Reply> {
        match operation {
            Operation::Access { path, mode } => {
                self.access(&path, mode).await.map(|_| Reply::Unit)
            }
            Operation::GetAttr { path } => self.getattr(&path).await.map(Reply::Attr),
            Operation::ReadDir { path } => self.readdir(&path).await.map(Reply::Entries),
            Operation::Open { path, flags } => {
                self.open(&path, flags).await.map(Reply::Handle)
            }
            Operation::Create { path, mode } => {
                self.create(&path, mode).await.map(Reply::Handle)
            }
            Operation::Read { path, length, offset, fh } => {
                self.read(&path, length, offset, fh).await.map(Reply::Data)
            }
            Operation::Write { path, data, offset, fh } => {
                self.write(&path, &data, offset, fh).await.map(Reply::Written)
            }
            Operation::Truncate { path, length } => {
                self.truncate(&path, length).await.map(|_| Reply::Unit)
            }
            Operation::Unlink { path } => self.unlink(&path).await.map(|_| Reply::Unit),
            Operation::MkDir { path, mode } => {
                self.mkdir(&path, mode).await.map(|_| Reply::Unit)
            }
            Operation::RmDir { path } => self.rmdir(&path).await.map(|_| Reply::Unit),
            Operation::Chmod { path, mode } => {
                self.chmod(&path, mode).await.map(|_| Reply::Unit)
            }
            Operation::Chown { path, uid, gid } => {
                self.chown(&path, uid, gid).await.map(|_| Reply::Unit)
            }
            Operation::Utimens { path, times } => {
                self.utimens(&path, times).await.map(|_| Reply::Unit)
            }
            Operation::ReadLink { path } => self.readlink(&path).await.map(Reply::Target),
            Operation::StatFs { path } => self.statfs(&path).await.map(Reply::Usage),
            Operation::Symlink { link_location, target } => {
                self.symlink(&link_location, &target).await.map(|_| Reply::Unit)
            }
            Operation::Rename { old, new } => {
                self.rename(&old, &new).await.map(|_| Reply::Unit)
            }
            Operation::Release { path: _, fh } => self.release(fh).await.map(|_| Reply::Unit),
            Operation::Fsync { path, datasync, fh } => {
                self.fsync(&path, datasync, fh).await.map(|_| Reply::Unit)
            }
            Operation::Flush { path, fh } => {
                self.flush(&path, fh).await.map(|_| Reply::Unit)
            }
            Operation::Lock { .. } => self.lock().map(|_| Reply::Unit),
        }
    }
}

/// Logs every dispatched operation with its outcome at debug level.
pub struct Logged<D> {
    inner: D,
}

impl<D: Dispatch> Logged<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

#[async_trait]
impl<D: Dispatch> Dispatch for Logged<D> {
    async fn call(&self, operation: Operation) -> FsResult<Reply> {
        let name = operation.name();
        let path = operation.path().to_string();
        let result = self.inner.call(operation).await;
        match &result {
            Ok(reply) => debug!("{}({}) => {}", name, path, reply.summary()),
            Err(err) => debug!("{}({}) => {}", name, path, err),
        }
        result
    }
}

/// Serialises mutating operations per logical path for hosts that deliver
/// concurrent callbacks.
pub struct Gated<D> {
    inner: D,
    locks: Arc<PathLocks>,
}

impl<D: Dispatch> Gated<D> {
    pub fn new(inner: D) -> Self {
        Self { inner, locks: Arc::new(PathLocks::new()) }
    }
}

#[async_trait]
impl<D: Dispatch> Dispatch for Gated<D> {
    async fn call(&self, operation: Operation) -> FsResult<Reply> {
        let lease = if operation.is_mutating() {
            Some(self.locks.lease(operation.path()).await)
        } else {
            None
        };
        let result = self.inner.call(operation).await;
        drop(lease);
        result
    }
}
