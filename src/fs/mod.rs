//! The filesystem operation dispatcher: one async method per VFS callback.

mod rename;
pub mod symlink;

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use filetime::FileTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task;

use crate::classify::Classifier;
use crate::config::MountConfig;
use crate::diskusage;
use crate::error::{join_fault, FsError, FsResult};
use crate::handles::HandleTable;
use crate::mirror::{self, lexists};
use crate::resolve::Resolver;
use crate::shortcut::{LnkCodec, ShortcutCodec};

use symlink::SymlinkAdaptor;

/// Check for read permission.
pub const R_OK: u32 = 4;
/// Check for write permission.
pub const W_OK: u32 = 2;
/// Check for execute permission.
pub const X_OK: u32 = 1;
/// Check for existence only.
pub const F_OK: u32 = 0;

/// File-type mask and the type bits the dispatcher cares about.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;

#[cfg(unix)]
const ELOOP: i32 = libc::ELOOP;
#[cfg(not(unix))]
const ELOOP: i32 = 40;

const MAX_LINK_HOPS: u32 = 16;

/// Metadata reported by `getattr`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStat {
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub birthtime: Option<SystemTime>,
    pub ino: u64,
    pub dev: u64,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }
}

/// Volume statistics reported by `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsUsage {
    pub bsize: u32,
    pub frsize: u32,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub flag: u64,
    pub namemax: u32,
    pub fsid: u64,
}

/// Fixed reporting block size, independent of the backing volume.
const STATFS_BLOCK_SIZE: u64 = 4096;
/// Constant synthetic filesystem id.
const STATFS_FSID: u64 = 123_456_789;

/// The pass-through filesystem over a root and a cache backend.
///
/// All process-wide mutable state (the handle table and the rename side
/// lists) lives on this instance and is reached only through its methods.
pub struct SieveFs {
    config: MountConfig,
    resolver: Resolver,
    handles: HandleTable,
    rename_excluded_sources: Mutex<Vec<String>>,
    rename_append_lnk: Mutex<Vec<String>>,
    shortcut: Box<dyn ShortcutCodec>,
    symlink_adaptor: Box<dyn SymlinkAdaptor>,
}

impl SieveFs {
    /// Build a filesystem instance; fails when a pattern does not compile.
    pub fn new(config: MountConfig) -> FsResult<Self> {
        let classifier = Classifier::new(&config.patterns)?;
        let resolver = Resolver::new(
            config.root.clone(),
            config.cache_dir.clone(),
            classifier,
        );
        let symlink_adaptor = symlink::adaptor_for(config.symlink_policy);
        Ok(Self {
            config,
            resolver,
            handles: HandleTable::new(),
            rename_excluded_sources: Mutex::new(Vec::new()),
            rename_append_lnk: Mutex::new(Vec::new()),
            shortcut: Box::new(LnkCodec),
            symlink_adaptor,
        })
    }

    /// Swap in a different shortcut codec (used by Windows hosts that carry
    /// a full shell-link implementation).
    pub fn with_shortcut_codec(mut self, codec: Box<dyn ShortcutCodec>) -> Self {
        self.shortcut = codec;
        self
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub(crate) fn shortcut(&self) -> &dyn ShortcutCodec {
        self.shortcut.as_ref()
    }

    // ---- operation surface -------------------------------------------------

    /// `access(path, mode)`: existence plus permission-bit check on the
    /// resolved physical path, without following symlinks.
    pub async fn access(&self, path: &str, mode: u32) -> FsResult<()> {
        let resolved = self.resolver.resolve(path).await?;
        let meta = fs::symlink_metadata(&resolved)
            .await
            .map_err(|_| FsError::NotFound)?;
        let bits = raw_mode(&meta);

        let mut granted = true;
        if mode & R_OK != 0 {
            granted &= bits & 0o444 != 0 || meta.is_dir();
        }
        if mode & W_OK != 0 {
            granted &= bits & 0o222 != 0;
        }
        if mode & X_OK != 0 {
            granted &= bits & 0o111 != 0;
        }
        if granted {
            Ok(())
        } else {
            Err(FsError::PermissionDenied)
        }
    }

    /// `getattr(path)`: lstat of the resolved path. Under the lnk policy a
    /// missing literal path falls back to `path + ".lnk"`, reported as a
    /// symlink.
    pub async fn getattr(&self, path: &str) -> FsResult<FileStat> {
        let resolved = self.resolver.resolve(path).await?;
        if !lexists(&resolved).await {
            if self.config.symlink_policy == symlink::SymlinkPolicy::CreateLnkfile {
                let lnk = self.resolver.resolve(&lnk_name(path)).await?;
                if lexists(&lnk).await {
                    let meta = fs::symlink_metadata(&lnk).await?;
                    let mut stat = stat_from_metadata(&meta);
                    stat.mode = (stat.mode & !S_IFMT) | S_IFLNK;
                    return Ok(stat);
                }
            }
            return Err(FsError::NotFound);
        }
        let meta = fs::symlink_metadata(&resolved).await?;
        let mut stat = stat_from_metadata(&meta);
        if cfg!(windows) {
            // The host exposes full permission bits on Windows.
            stat.mode |= 0o777;
        }
        Ok(stat)
    }

    /// `readdir(path)`: `.`, `..` and the union of both backend listings.
    pub async fn readdir(&self, path: &str) -> FsResult<BTreeSet<String>> {
        let mut entries: BTreeSet<String> =
            [".".to_string(), "..".to_string()].into_iter().collect();
        for side in [self.resolver.root_path(path), self.resolver.cache_path(path)] {
            let is_dir = fs::metadata(&side).await.map(|m| m.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let mut dir = fs::read_dir(&side).await?;
            while let Some(entry) = dir.next_entry().await? {
                entries.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        if self.config.symlink_policy == symlink::SymlinkPolicy::CreateLnkfile {
            entries = entries
                .into_iter()
                .map(|name| match name.strip_suffix(".lnk") {
                    Some(stripped) => stripped.to_string(),
                    None => name,
                })
                .collect();
        }
        Ok(entries)
    }

    /// `open(path, flags)`: open the resolved path and register a handle.
    /// Symlinks are followed by re-invoking open on their target; a missing
    /// path with `O_CREAT` delegates to `create`.
    pub async fn open(&self, path: &str, flags: i32) -> FsResult<u64> {
        #[cfg(windows)]
        let flags = windows_open_flags();

        let mut logical = path.to_string();
        let mut hops = 0u32;
        loop {
            let resolved = self.resolver.resolve(&logical).await?;
            if !lexists(&resolved).await {
                if flags & o_creat() != 0 {
                    return self.create(&logical, 0o777).await;
                }
                return Err(FsError::NotFound);
            }
            let meta = fs::symlink_metadata(&resolved).await?;
            if meta.is_symlink() {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return Err(FsError::Os(ELOOP));
                }
                let target = fs::read_link(&resolved).await?;
                logical = join_logical(&parent_logical(&logical), &target.to_string_lossy());
                continue;
            }
            let file = open_options_from_flags(flags).open(&resolved).await?;
            return Ok(self.handles.insert(resolved, file).await);
        }
    }

    /// `create(path, mode)`: new file at the resolved path, parents via the
    /// directory mirror, registered in the handle table.
    pub async fn create(&self, path: &str, mode: u32) -> FsResult<u64> {
        let resolved = self.resolver.resolve(path).await?;
        if let Some(parent) = resolved.parent() {
            mirror::make_tree(self.resolver.root(), self.resolver.cache(), parent).await?;
        }
        let mut options = fs::OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        options.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        let file = options.open(&resolved).await?;
        Ok(self.handles.insert(resolved, file).await)
    }

    /// `read(path, length, offset, fh)`: seek-then-read on the handle's
    /// native descriptor. Short reads at EOF are normal.
    pub async fn read(
        &self,
        path: &str,
        length: usize,
        offset: u64,
        fh: u64,
    ) -> FsResult<Vec<u8>> {
        self.access(path, R_OK).await?;
        let resolved = self.resolver.resolve(path).await?;
        if !lexists(&resolved).await {
            return Err(FsError::NotFound);
        }

        let entry = self.handles.get(fh).await?;
        let mut entry = entry.lock().await;
        entry.file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut data = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            let n = entry.file.read(&mut data[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data.truncate(filled);
        Ok(data)
    }

    /// `write(path, data, offset, fh)`: seek-then-write, then fsync so the
    /// bytes are durable before the callback returns.
    pub async fn write(
        &self,
        path: &str,
        data: &[u8],
        offset: u64,
        fh: u64,
    ) -> FsResult<usize> {
        if !self.handles.contains(fh).await {
            return Err(FsError::BadHandle);
        }
        let resolved = self.resolver.resolve(path).await?;
        if !lexists(&resolved).await {
            return Err(FsError::NotFound);
        }

        let entry = self.handles.get(fh).await?;
        let mut entry = entry.lock().await;
        entry.file.seek(std::io::SeekFrom::Start(offset)).await?;
        entry.file.write_all(data).await?;
        entry.file.sync_all().await?;
        Ok(data.len())
    }

    /// `truncate(path, length)`: grow or shrink the resolved file.
    pub async fn truncate(&self, path: &str, length: u64) -> FsResult<()> {
        let resolved = self.resolver.resolve(path).await?;
        if !lexists(&resolved).await {
            return Err(FsError::NotFound);
        }
        let file = fs::OpenOptions::new().write(true).open(&resolved).await?;
        file.set_len(length).await?;
        Ok(())
    }

    /// `unlink(path)`: close any handle on the resolved path, then delete.
    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let resolved = self.resolver.resolve(path).await?;
        self.handles.drop_for_path(&resolved).await?;
        if !lexists(&resolved).await {
            return Err(FsError::NotFound);
        }
        fs::remove_file(&resolved).await?;
        Ok(())
    }

    /// `mkdir(path, mode)`: read access on the parent (intentionally not
    /// write, which does not translate across platforms), ancestors via the
    /// mirror, then the directory itself on its classified side only. The
    /// peer side picks it up lazily when a child is placed there.
    pub async fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        self.access(&parent_logical(path), R_OK).await?;
        let resolved = self.resolver.resolve(path).await?;
        if lexists(&resolved).await {
            return Err(FsError::AlreadyExists);
        }
        if let Some(parent) = resolved.parent() {
            mirror::make_tree(self.resolver.root(), self.resolver.cache(), parent).await?;
        }
        fs::create_dir(&resolved).await?;
        set_mode(&resolved, mode).await?;
        Ok(())
    }

    /// `rmdir(path)`: clear the read-only flag on both backend copies and
    /// remove them; `ENOENT` when neither side has the directory.
    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let sides = [self.resolver.root_path(path), self.resolver.cache_path(path)];
        if !lexists(&sides[0]).await && !lexists(&sides[1]).await {
            return Err(FsError::NotFound);
        }
        for side in sides {
            if !lexists(&side).await {
                continue;
            }
            let meta = fs::metadata(&side).await?;
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                fs::set_permissions(&side, perms).await?;
            }
            fs::remove_dir(&side).await?;
        }
        Ok(())
    }

    /// `chmod(path, mode)`: forwarded to the resolved path.
    pub async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let resolved = self.resolver.resolve(path).await?;
        if !lexists(&resolved).await {
            return Err(FsError::NotFound);
        }
        set_mode(&resolved, mode).await
    }

    /// `chown(path, uid, gid)`: forwarded to the resolved path; `ENOTSUP`
    /// on Windows.
    pub async fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        if cfg!(windows) {
            return Err(FsError::Unsupported);
        }
        let resolved = self.resolver.resolve(path).await?;
        if !lexists(&resolved).await {
            return Err(FsError::NotFound);
        }
        #[cfg(unix)]
        {
            task::spawn_blocking(move || chown_path(&resolved, uid, gid))
                .await
                .map_err(join_fault)??;
        }
        #[cfg(not(unix))]
        let _ = (resolved, uid, gid);
        Ok(())
    }

    /// `utimens(path, times)`: apply (atime, mtime), defaulting to now.
    pub async fn utimens(
        &self,
        path: &str,
        times: Option<(SystemTime, SystemTime)>,
    ) -> FsResult<()> {
        let resolved = self.resolver.resolve(path).await?;
        if !lexists(&resolved).await {
            return Err(FsError::NotFound);
        }
        let (atime, mtime) = match times {
            Some((a, m)) => (FileTime::from_system_time(a), FileTime::from_system_time(m)),
            None => {
                let now = FileTime::now();
                (now, now)
            }
        };
        task::spawn_blocking(move || filetime::set_file_times(&resolved, atime, mtime))
            .await
            .map_err(join_fault)??;
        Ok(())
    }

    /// `readlink(path)`: native readlink, or the decoded `.lnk` target under
    /// the lnk policy, rewritten relative to the mount root when it points
    /// back into the mount.
    pub async fn readlink(&self, path: &str) -> FsResult<String> {
        let resolved = self.resolver.resolve(path).await?;
        if lexists(&resolved).await {
            let target = fs::read_link(&resolved).await?;
            return Ok(target.to_string_lossy().into_owned());
        }
        if self.config.symlink_policy == symlink::SymlinkPolicy::CreateLnkfile {
            let lnk = self.resolver.resolve(&lnk_name(path)).await?;
            if lexists(&lnk).await {
                let target = self.shortcut.decode(&lnk)?;
                if self.config.rellinks {
                    if let Ok(rel) = target.strip_prefix(&self.config.mount_point) {
                        return Ok(rel.to_string_lossy().into_owned());
                    }
                }
                return Ok(target.to_string_lossy().into_owned());
            }
        }
        Err(FsError::NotFound)
    }

    /// `statfs(path)`: disk usage of the resolved path's volume with a fixed
    /// 4 KiB block size and a constant synthetic fsid.
    pub async fn statfs(&self, path: &str) -> FsResult<FsUsage> {
        let resolved = self.resolver.resolve(path).await?;
        if !lexists(&resolved).await {
            return Err(FsError::NotFound);
        }
        let usage = diskusage::probe(&resolved).await?;
        let blocks = usage.total / STATFS_BLOCK_SIZE;
        Ok(FsUsage {
            bsize: STATFS_BLOCK_SIZE as u32,
            frsize: STATFS_BLOCK_SIZE as u32,
            blocks,
            bfree: usage.free / STATFS_BLOCK_SIZE,
            bavail: usage.free / STATFS_BLOCK_SIZE,
            files: blocks,
            ffree: blocks,
            favail: blocks,
            flag: 0,
            namemax: 255,
            fsid: STATFS_FSID,
        })
    }

    /// `symlink(link_location, target)`: delegated to the configured policy.
    pub async fn symlink(&self, link_location: &str, target: &str) -> FsResult<()> {
        self.symlink_adaptor.create(self, link_location, target).await
    }

    /// `release(fh)`: close and drop the handle; double-close is silent.
    pub async fn release(&self, fh: u64) -> FsResult<()> {
        self.handles.release(fh).await
    }

    /// `fsync`: nothing left to do, `write` already syncs.
    pub async fn fsync(&self, _path: &str, _datasync: bool, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    /// `flush`: a no-op at this layer.
    pub async fn flush(&self, _path: &str, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    /// File locking is not provided.
    pub fn lock(&self) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    // ---- rename side lists -------------------------------------------------

    pub(crate) async fn note_excluded_source(&self, path: &str) {
        self.rename_excluded_sources.lock().await.push(path.to_string());
    }

    pub(crate) async fn note_append_lnk(&self, path: &str) {
        self.rename_append_lnk.lock().await.push(path.to_string());
    }

    pub(crate) async fn consume_excluded_source(&self, path: &str) -> bool {
        let mut sources = self.rename_excluded_sources.lock().await;
        match sources.iter().position(|p| p == path) {
            Some(index) => {
                sources.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) async fn consume_append_lnk(&self, path: &str) -> bool {
        let mut sources = self.rename_append_lnk.lock().await;
        match sources.iter().position(|p| p == path) {
            Some(index) => {
                sources.remove(index);
                true
            }
            None => false,
        }
    }
}

// ---- path and metadata helpers ---------------------------------------------

/// The logical parent of a logical path (`/a/b` → `/a`, `/a` → `/`).
pub(crate) fn parent_logical(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => trimmed[..index].to_string(),
    }
}

/// Join a symlink target onto the logical namespace.
pub(crate) fn join_logical(parent: &str, target: &str) -> String {
    if target.starts_with('/') {
        target.to_string()
    } else if parent == "/" {
        format!("/{target}")
    } else {
        format!("{parent}/{target}")
    }
}

/// The sibling logical name carrying the shortcut suffix.
pub(crate) fn lnk_name(path: &str) -> String {
    format!("{path}.lnk")
}

#[cfg(unix)]
fn raw_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn raw_mode(meta: &std::fs::Metadata) -> u32 {
    let type_bits = if meta.is_dir() { S_IFDIR } else { S_IFREG };
    let perm = if meta.permissions().readonly() { 0o555 } else { 0o777 };
    type_bits | perm
}

#[cfg(unix)]
pub(crate) fn stat_from_metadata(meta: &std::fs::Metadata) -> FileStat {
    use std::os::unix::fs::MetadataExt;
    FileStat {
        mode: meta.mode(),
        nlink: meta.nlink(),
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.size(),
        atime: epoch_time(meta.atime(), meta.atime_nsec()),
        mtime: epoch_time(meta.mtime(), meta.mtime_nsec()),
        ctime: epoch_time(meta.ctime(), meta.ctime_nsec()),
        birthtime: meta.created().ok(),
        ino: meta.ino(),
        dev: meta.dev(),
    }
}

#[cfg(not(unix))]
pub(crate) fn stat_from_metadata(meta: &std::fs::Metadata) -> FileStat {
    let fallback = UNIX_EPOCH;
    FileStat {
        mode: raw_mode(meta),
        nlink: 1,
        uid: 0,
        gid: 0,
        size: meta.len(),
        atime: meta.accessed().unwrap_or(fallback),
        mtime: meta.modified().unwrap_or(fallback),
        ctime: meta.modified().unwrap_or(fallback),
        birthtime: meta.created().ok(),
        ino: 0,
        dev: 0,
    }
}

#[cfg(unix)]
fn epoch_time(secs: i64, nanos: i64) -> SystemTime {
    let duration = Duration::new(secs.unsigned_abs(), nanos.unsigned_abs() as u32);
    if secs >= 0 {
        UNIX_EPOCH + duration
    } else {
        UNIX_EPOCH - duration
    }
}

async fn set_mode(path: &Path, mode: u32) -> FsResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777)).await?;
    }
    #[cfg(not(unix))]
    {
        let meta = fs::metadata(path).await?;
        let mut perms = meta.permissions();
        perms.set_readonly(mode & 0o200 == 0);
        fs::set_permissions(path, perms).await?;
    }
    Ok(())
}

#[cfg(unix)]
fn chown_path(path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    // SAFETY: c_path is a valid NUL-terminated path.
    let ret = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn open_options_from_flags(flags: i32) -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => {
            options.write(true);
        }
        libc::O_RDWR => {
            options.read(true).write(true);
        }
        _ => {
            options.read(true);
        }
    }
    if flags & libc::O_APPEND != 0 {
        options.append(true);
    }
    if flags & libc::O_TRUNC != 0 {
        options.write(true).truncate(true);
    }
    options
}

#[cfg(not(unix))]
fn open_options_from_flags(_flags: i32) -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.read(true).write(true);
    options
}

#[cfg(unix)]
fn o_creat() -> i32 {
    libc::O_CREAT
}

#[cfg(not(unix))]
fn o_creat() -> i32 {
    0x0100
}

/// Hosts on Windows cannot be trusted with the original flags.
#[cfg(windows)]
fn windows_open_flags() -> i32 {
    const O_RDWR: i32 = 0x0002;
    const O_BINARY: i32 = 0x8000;
    O_RDWR | O_BINARY
}
