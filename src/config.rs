//! Mount configuration, immutable for the lifetime of a mount.

use std::path::{Path, PathBuf};

use base64::Engine as _;

use crate::fs::symlink::SymlinkPolicy;

/// Everything a mount needs to know, fixed at mount time.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Primary backing directory.
    pub root: PathBuf,
    /// Secondary backing directory for excluded paths.
    pub cache_dir: PathBuf,
    /// Glob patterns routing logical names to the cache backend.
    pub patterns: Vec<String>,
    /// Externally visible mount point.
    pub mount_point: PathBuf,
    /// Whether rename may clobber an existing destination.
    pub overwrite_rename_dest: bool,
    /// How `symlink` materialises link-like objects.
    pub symlink_policy: SymlinkPolicy,
    /// Numeric ids reported to the host.
    pub uid: i64,
    pub gid: i64,
    /// Run the host in the foreground.
    pub foreground: bool,
    /// Request single-threaded dispatch from the host.
    pub nothreads: bool,
    /// Whether the host should rewrite symlink targets as relative.
    pub rellinks: bool,
    /// Observability toggles.
    pub debug: bool,
    pub fusedebug: bool,
    pub log_in_file: Option<PathBuf>,
    pub log_in_console: bool,
    pub log_in_syslog: bool,
}

impl MountConfig {
    /// A configuration with platform defaults for everything optional.
    pub fn new(
        root: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        mount_point: impl Into<PathBuf>,
    ) -> Self {
        let (uid, gid) = default_uid_and_gid();
        Self {
            root: root.into(),
            cache_dir: cache_dir.into(),
            patterns: Vec::new(),
            mount_point: mount_point.into(),
            overwrite_rename_dest: default_overwrite_rename_dest(),
            symlink_policy: SymlinkPolicy::auto(),
            uid,
            gid,
            foreground: true,
            nothreads: true,
            rellinks: cfg!(windows),
            debug: false,
            fusedebug: false,
            log_in_file: None,
            log_in_console: false,
            log_in_syslog: false,
        }
    }
}

/// `<user_cache>/PassthroughFS/<base64(root)>`, so distinct roots never share
/// a cache tree.
pub fn default_cache_dir(root: &Path) -> PathBuf {
    let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(root.to_string_lossy().as_bytes());
    base.join("PassthroughFS").join(encoded)
}

/// Current ids on POSIX, `-1` on Windows.
pub fn default_uid_and_gid() -> (i64, i64) {
    #[cfg(unix)]
    // SAFETY: getuid/getgid cannot fail.
    unsafe {
        (libc::getuid() as i64, libc::getgid() as i64)
    }
    #[cfg(not(unix))]
    {
        (-1, -1)
    }
}

/// Renames clobber by default on POSIX but not on Windows.
pub fn default_overwrite_rename_dest() -> bool {
    !cfg!(windows)
}
