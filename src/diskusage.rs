//! Platform disk-usage statistics behind a narrow seam.

use std::path::Path;

#[cfg(unix)]
use tokio::task;

#[cfg(unix)]
use crate::error::join_fault;
use crate::error::FsResult;

/// Byte totals for the volume holding a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub free: u64,
}

/// Query the volume that holds `path`.
#[cfg(unix)]
pub async fn probe(path: &Path) -> FsResult<DiskUsage> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| crate::error::FsError::Os(crate::error::EINVAL))?;
    let usage = task::spawn_blocking(move || {
        let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: c_path is NUL-terminated and stats is a valid out-pointer.
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let fragment = stats.f_frsize as u64;
        Ok(DiskUsage {
            total: (stats.f_blocks as u64).saturating_mul(fragment),
            free: (stats.f_bavail as u64).saturating_mul(fragment),
        })
    })
    .await
    .map_err(join_fault)??;
    Ok(usage)
}

#[cfg(not(unix))]
pub async fn probe(_path: &Path) -> FsResult<DiskUsage> {
    Err(crate::error::FsError::Unsupported)
}
