//! The rename engine: cross-backend recursive moves that keep open handles,
//! seek positions and timestamps intact.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::task;

use crate::error::{join_fault, FsError, FsResult};
use crate::mirror::{self, lexists};

use super::{FileStat, SieveFs, R_OK};

/// Copy buffer for cross-backend streaming.
const COPY_CHUNK: usize = 4096;

/// Saved (atime, mtime) of a moved file, keyed by its new logical name.
struct SavedTimes {
    logical: String,
    atime: FileTime,
    mtime: FileTime,
}

impl SieveFs {
    /// `rename(old, new)`: see the steps inline. `old` and `new` may resolve
    /// to different backends; open descriptors survive the move.
    pub async fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        // The skip symlink policy created no artifact for `old`, so the
        // follow-up rename is neutralised: drop the destination and succeed.
        if self.consume_excluded_source(old).await {
            let _ = self.unlink(new).await;
            return Ok(());
        }

        // The lnk policy stored `old` under a shortcut suffix; both ends of
        // the rename inherit it so the artifact actually moves.
        let (old_owned, new_owned);
        let (old, new) = if self.consume_append_lnk(old).await {
            let _ = self.unlink(new).await;
            old_owned = super::lnk_name(old);
            new_owned = super::lnk_name(new);
            (old_owned.as_str(), new_owned.as_str())
        } else {
            (old, new)
        };

        if self.access(old, R_OK).await.is_err() {
            return Err(FsError::NotFound);
        }
        // Hosts hide delete-on-close temporaries under fuse_hidden names and
        // legitimately rename over them.
        if self.access(new, R_OK).await.is_ok()
            && !self.config.overwrite_rename_dest
            && !old.contains("fuse_hidden")
        {
            return Err(FsError::AlreadyExists);
        }

        // Step 1: quiesce every handle under either end of the move.
        let old_prefix = self.resolver.resolve(old).await?;
        let destination_prefix = self.resolver.resolve(new).await?;
        let moved_handles = self.handles.quiesce_under(&old_prefix).await;
        // Handles on a clobbered destination cannot be reopened meaningfully.
        let _ = self.handles.quiesce_under(&destination_prefix).await;

        // Steps 2 and 3: move the tree, then sweep whatever the copy left.
        let mut saved_times = Vec::new();
        self.copy_tree(old, new, &mut saved_times).await?;
        self.remove_tree(old).await?;

        // Step 4: reopen the quiesced handles at their new physical homes.
        let new_prefix = self.resolver.resolve(new).await?;
        for quiesced in moved_handles {
            let reopened = rebase(&quiesced.path, &old_prefix, &new_prefix);
            let mut file = fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&reopened)
                .await?;
            file.seek(SeekFrom::Start(quiesced.position)).await?;
            self.handles.restore(quiesced.id, reopened, file).await;
        }

        // Step 5: the streamed copies got fresh timestamps; put back the old
        // ones so the move is invisible to time-based consumers.
        for saved in saved_times {
            let physical = self.resolver.resolve(&saved.logical).await?;
            let (atime, mtime) = (saved.atime, saved.mtime);
            task::spawn_blocking(move || filetime::set_file_times(&physical, atime, mtime))
                .await
                .map_err(join_fault)??;
        }
        Ok(())
    }

    /// Walk the old tree in the logical namespace, materialising it at the
    /// new name. Files move with the platform rename primitive when both
    /// ends share a backend, and stream across otherwise.
    async fn copy_tree(
        &self,
        old: &str,
        new: &str,
        saved_times: &mut Vec<SavedTimes>,
    ) -> FsResult<()> {
        let stat = self.getattr(old).await?;
        if stat.is_dir() {
            self.mkdir(new, stat.mode & 0o7777).await?;
            for name in self.readdir(old).await? {
                if name == "." || name == ".." {
                    continue;
                }
                let old_child = join_child(old, &name);
                let new_child = join_child(new, &name);
                Box::pin(self.copy_tree(&old_child, &new_child, saved_times)).await?;
            }
        } else if stat.is_symlink() {
            self.carry_symlink(old, new).await?;
        } else {
            self.move_file(old, new, &stat, saved_times).await?;
        }
        Ok(())
    }

    /// Re-create a symlink at the destination with its target verbatim; the
    /// source link is left for the sweep.
    async fn carry_symlink(&self, old: &str, new: &str) -> FsResult<()> {
        let source = self.resolver.resolve(old).await?;
        let destination = self.resolver.resolve(new).await?;
        if lexists(&destination).await {
            fs::remove_file(&destination).await?;
        }
        if let Some(parent) = destination.parent() {
            mirror::make_tree(self.resolver.root(), self.resolver.cache(), parent).await?;
        }
        let target = fs::read_link(&source).await?;
        make_symlink(&target, &destination).await
    }

    async fn move_file(
        &self,
        old: &str,
        new: &str,
        stat: &FileStat,
        saved_times: &mut Vec<SavedTimes>,
    ) -> FsResult<()> {
        let source = self.resolver.resolve(old).await?;
        let destination = self.resolver.resolve(new).await?;
        if let Some(parent) = destination.parent() {
            mirror::make_tree(self.resolver.root(), self.resolver.cache(), parent).await?;
        }

        if self.resolver.same_backend(&source, &destination) {
            fs::rename(&source, &destination).await?;
            return Ok(());
        }

        saved_times.push(SavedTimes {
            logical: new.to_string(),
            atime: FileTime::from_system_time(stat.atime),
            mtime: FileTime::from_system_time(stat.mtime),
        });

        let mut reader = fs::File::open(&source).await?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(stat.mode & 0o7777);
        let mut writer = options.open(&destination).await?;
        let mut chunk = vec![0u8; COPY_CHUNK];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&chunk[..n]).await?;
        }
        writer.sync_all().await?;
        Ok(())
    }

    /// Remove whatever of the old tree survived the copy: cross-backend
    /// copies and carried symlinks keep their sources, and the fast path may
    /// have emptied directories already.
    async fn remove_tree(&self, old: &str) -> FsResult<()> {
        let stat = match self.getattr(old).await {
            Ok(stat) => stat,
            // The whole subtree moved with the fast path.
            Err(FsError::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        };
        if stat.is_dir() {
            for name in self.readdir(old).await? {
                if name == "." || name == ".." {
                    continue;
                }
                Box::pin(self.remove_tree(&join_child(old, &name))).await?;
            }
            self.rmdir(old).await?;
        } else {
            self.unlink(old).await?;
        }
        Ok(())
    }
}

/// Substitute the resolved-old prefix of a physical path with the
/// resolved-new prefix.
fn rebase(path: &Path, old_prefix: &Path, new_prefix: &Path) -> PathBuf {
    match path.strip_prefix(old_prefix) {
        Ok(rest) if rest.as_os_str().is_empty() => new_prefix.to_path_buf(),
        Ok(rest) => new_prefix.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Append one name to a logical path.
fn join_child(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(unix)]
async fn make_symlink(target: &Path, link: &Path) -> FsResult<()> {
    fs::symlink(target, link).await?;
    Ok(())
}

#[cfg(windows)]
async fn make_symlink(target: &Path, link: &Path) -> FsResult<()> {
    let target_is_dir = fs::metadata(target).await.map(|m| m.is_dir()).unwrap_or(false);
    if target_is_dir {
        fs::symlink_dir(target, link).await?;
    } else {
        fs::symlink_file(target, link).await?;
    }
    Ok(())
}
