//! Parallel directory-tree creation across the two backends.

use std::path::{Path, PathBuf};

use filetime::FileTime;
use tokio::fs;
use tokio::task;

use crate::error::{join_fault, FsError, FsResult};

/// Ensure `dir` and every ancestor below its backend exist on BOTH backends.
///
/// The chain is walked one component at a time. When the peer backend already
/// holds a component, the newly created side inherits the peer's mode, owner
/// (where available) and timestamps, so the ancestor chains of a placed file
/// stay interchangeable. Existing components are left untouched.
pub async fn make_tree(root: &Path, cache: &Path, dir: &Path) -> FsResult<()> {
    let rel = match dir.strip_prefix(cache) {
        Ok(rel) => rel,
        Err(_) => dir
            .strip_prefix(root)
            .map_err(|_| FsError::Os(crate::error::EINVAL))?,
    };

    let mut root_side = root.to_path_buf();
    let mut cache_side = cache.to_path_buf();
    for component in rel.components() {
        root_side.push(component);
        cache_side.push(component);
        make_level(&root_side, &cache_side).await?;
    }
    Ok(())
}

/// Create one directory level on whichever sides are missing it.
async fn make_level(root_side: &Path, cache_side: &Path) -> FsResult<()> {
    let root_exists = lexists(root_side).await;
    let cache_exists = lexists(cache_side).await;
    match (root_exists, cache_exists) {
        (true, true) => Ok(()),
        (true, false) => {
            create_dir_tolerant(cache_side).await?;
            copy_dir_metadata(root_side, cache_side).await
        }
        (false, true) => {
            create_dir_tolerant(root_side).await?;
            copy_dir_metadata(cache_side, root_side).await
        }
        (false, false) => {
            create_dir_tolerant(root_side).await?;
            create_dir_tolerant(cache_side).await
        }
    }
}

/// `mkdir` with EEXIST treated as success, for racing creators.
async fn create_dir_tolerant(path: &Path) -> FsResult<()> {
    match fs::create_dir(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Copy mode, owner and (atime, mtime) from `from` onto `to`.
pub async fn copy_dir_metadata(from: &Path, to: &Path) -> FsResult<()> {
    let meta = fs::metadata(from).await?;
    fs::set_permissions(to, meta.permissions()).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let (uid, gid) = (meta.uid(), meta.gid());
        let target: PathBuf = to.to_path_buf();
        task::spawn_blocking(move || chown_best_effort(&target, uid, gid))
            .await
            .map_err(join_fault)?;
    }

    let atime = FileTime::from_last_access_time(&meta);
    let mtime = FileTime::from_last_modification_time(&meta);
    let target: PathBuf = to.to_path_buf();
    task::spawn_blocking(move || filetime::set_file_times(&target, atime, mtime))
        .await
        .map_err(join_fault)??;
    Ok(())
}

/// Ownership copies need privilege the mount usually lacks; EPERM is fine.
#[cfg(unix)]
fn chown_best_effort(path: &Path, uid: u32, gid: u32) {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return;
    };
    // SAFETY: c_path is a valid NUL-terminated path.
    unsafe {
        libc::chown(c_path.as_ptr(), uid, gid);
    }
}

pub(crate) async fn lexists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}
