//! The symlink adaptor: five selectable policies for materialising links.

use async_trait::async_trait;
use filetime::FileTime;
use tokio::fs;
use tokio::task;

use crate::error::{join_fault, FsError, FsResult};
use crate::mirror::{self, lexists};

use super::{join_logical, lnk_name, parent_logical, SieveFs};

/// How `symlink(link_location, target)` behaves, chosen at mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Create a real OS symlink.
    RealSymlink,
    /// Fail with `ENOTSUP`.
    Error,
    /// Report success without creating anything; a follow-up rename of the
    /// link location is neutralised.
    Skip,
    /// Copy the target's bytes and metadata to the link location.
    Copy,
    /// Fabricate a Windows-style `.lnk` shortcut.
    CreateLnkfile,
}

impl SymlinkPolicy {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "real_symlink" => Some(SymlinkPolicy::RealSymlink),
            "error" => Some(SymlinkPolicy::Error),
            "skip" => Some(SymlinkPolicy::Skip),
            "copy" => Some(SymlinkPolicy::Copy),
            "create_lnkfile" => Some(SymlinkPolicy::CreateLnkfile),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SymlinkPolicy::RealSymlink => "real_symlink",
            SymlinkPolicy::Error => "error",
            SymlinkPolicy::Skip => "skip",
            SymlinkPolicy::Copy => "copy",
            SymlinkPolicy::CreateLnkfile => "create_lnkfile",
        }
    }

    /// Platform default: real symlinks everywhere they are permitted, the
    /// shortcut fabricator on Windows installs that disallow them.
    pub fn auto() -> Self {
        #[cfg(unix)]
        {
            SymlinkPolicy::RealSymlink
        }
        #[cfg(windows)]
        {
            if windows_symlinks_allowed() {
                SymlinkPolicy::RealSymlink
            } else {
                SymlinkPolicy::CreateLnkfile
            }
        }
        #[cfg(not(any(unix, windows)))]
        {
            SymlinkPolicy::Error
        }
    }
}

/// One policy's implementation of `symlink(link_location, target)`.
#[async_trait]
pub trait SymlinkAdaptor: Send + Sync {
    async fn create(&self, fs: &SieveFs, link_location: &str, target: &str) -> FsResult<()>;
}

pub(crate) fn adaptor_for(policy: SymlinkPolicy) -> Box<dyn SymlinkAdaptor> {
    match policy {
        SymlinkPolicy::RealSymlink => Box::new(RealSymlink),
        SymlinkPolicy::Error => Box::new(RefuseSymlink),
        SymlinkPolicy::Skip => Box::new(SkipSymlink),
        SymlinkPolicy::Copy => Box::new(CopySymlink),
        SymlinkPolicy::CreateLnkfile => Box::new(LnkfileSymlink),
    }
}

/// `real_symlink`: a native symlink carrying the target verbatim.
struct RealSymlink;

#[async_trait]
impl SymlinkAdaptor for RealSymlink {
    async fn create(&self, fs: &SieveFs, link_location: &str, target: &str) -> FsResult<()> {
        let destination = fs.resolver().resolve(link_location).await?;
        if let Some(parent) = destination.parent() {
            mirror::make_tree(fs.resolver().root(), fs.resolver().cache(), parent).await?;
        }
        native_symlink(fs, target, &destination).await
    }
}

/// `error`: the host forbids symlink creation outright.
struct RefuseSymlink;

#[async_trait]
impl SymlinkAdaptor for RefuseSymlink {
    async fn create(&self, _fs: &SieveFs, _link: &str, _target: &str) -> FsResult<()> {
        Err(FsError::Unsupported)
    }
}

/// `skip`: succeed without an artifact and neutralise the rename that some
/// applications issue right after.
struct SkipSymlink;

#[async_trait]
impl SymlinkAdaptor for SkipSymlink {
    async fn create(&self, fs: &SieveFs, link_location: &str, _target: &str) -> FsResult<()> {
        fs.note_excluded_source(link_location).await;
        Ok(())
    }
}

/// `copy`: materialise the link as a copy of its target.
struct CopySymlink;

#[async_trait]
impl SymlinkAdaptor for CopySymlink {
    async fn create(&self, fs: &SieveFs, link_location: &str, target: &str) -> FsResult<()> {
        let target_logical = join_logical(&parent_logical(link_location), target);
        let source = fs.resolver().resolve(&target_logical).await?;
        if !lexists(&source).await {
            return Err(FsError::NotFound);
        }
        let destination = fs.resolver().resolve(link_location).await?;
        if let Some(parent) = destination.parent() {
            mirror::make_tree(fs.resolver().root(), fs.resolver().cache(), parent).await?;
        }
        fs::copy(&source, &destination).await?;

        let meta = fs::metadata(&source).await?;
        let atime = FileTime::from_last_access_time(&meta);
        let mtime = FileTime::from_last_modification_time(&meta);
        task::spawn_blocking(move || filetime::set_file_times(&destination, atime, mtime))
            .await
            .map_err(join_fault)??;
        Ok(())
    }
}

/// `create_lnkfile`: fabricate a shortcut and remember to append `.lnk` to a
/// follow-up rename of the link.
struct LnkfileSymlink;

#[async_trait]
impl SymlinkAdaptor for LnkfileSymlink {
    async fn create(&self, fs: &SieveFs, link_location: &str, target: &str) -> FsResult<()> {
        let destination = fs.resolver().resolve(&lnk_name(link_location)).await?;
        if let Some(parent) = destination.parent() {
            mirror::make_tree(fs.resolver().root(), fs.resolver().cache(), parent).await?;
        }
        fs.shortcut().encode(std::path::Path::new(target), &destination)?;
        fs.note_append_lnk(link_location).await;
        Ok(())
    }
}

#[cfg(unix)]
async fn native_symlink(_fs: &SieveFs, target: &str, destination: &std::path::Path) -> FsResult<()> {
    fs::symlink(target, destination).await?;
    Ok(())
}

/// Windows needs to know up front whether the target is a directory; probe
/// it through the mount's own namespace.
#[cfg(windows)]
async fn native_symlink(fs: &SieveFs, target: &str, destination: &std::path::Path) -> FsResult<()> {
    let target_is_dir = match fs.resolver().resolve(target).await {
        Ok(physical) => fs::metadata(&physical).await.map(|m| m.is_dir()).unwrap_or(false),
        Err(_) => false,
    };
    if target_is_dir {
        fs::symlink_dir(target, destination).await?;
    } else {
        fs::symlink_file(target, destination).await?;
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
async fn native_symlink(
    _fs: &SieveFs,
    _target: &str,
    _destination: &std::path::Path,
) -> FsResult<()> {
    Err(FsError::Unsupported)
}

#[cfg(windows)]
fn windows_symlinks_allowed() -> bool {
    let probe = std::env::temp_dir().join(format!("sievefs-symlink-probe-{}", std::process::id()));
    let allowed = std::os::windows::fs::symlink_file("sievefs-probe-target", &probe).is_ok();
    let _ = std::fs::remove_file(&probe);
    allowed
}
