//! The open-file-handle table: exposed handle id → native descriptor.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio::sync::Mutex;

use crate::error::{is_ebadf, FsError, FsResult};

/// One open descriptor backing an exposed handle id.
#[derive(Debug)]
pub struct HandleEntry {
    /// Physical path the descriptor was opened on.
    pub path: PathBuf,
    /// The native descriptor.
    pub file: File,
}

/// A handle captured during rename quiescing: enough state to reopen it at
/// the file's new location.
#[derive(Debug)]
pub struct QuiescedHandle {
    pub id: u64,
    pub path: PathBuf,
    pub position: u64,
}

/// Process-wide registry of open handles, owned by the mount instance.
///
/// Ids are allocated as `max(ids) + 1`, restarting from 0 whenever the table
/// drains. Entries sit behind their own lock so concurrent I/O on distinct
/// handles does not serialise on the table.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: Mutex<HashMap<u64, Arc<Mutex<HandleEntry>>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly opened descriptor and return its exposed id.
    pub async fn insert(&self, path: PathBuf, file: File) -> u64 {
        let mut entries = self.entries.lock().await;
        let id = entries.keys().max().map_or(0, |max| max + 1);
        entries.insert(id, Arc::new(Mutex::new(HandleEntry { path, file })));
        id
    }

    /// Re-register a reopened descriptor under its previous id.
    pub async fn restore(&self, id: u64, path: PathBuf, file: File) {
        let mut entries = self.entries.lock().await;
        entries.insert(id, Arc::new(Mutex::new(HandleEntry { path, file })));
    }

    /// Borrow the entry for an id, or [`FsError::BadHandle`].
    pub async fn get(&self, id: u64) -> FsResult<Arc<Mutex<HandleEntry>>> {
        let entries = self.entries.lock().await;
        entries.get(&id).cloned().ok_or(FsError::BadHandle)
    }

    pub async fn contains(&self, id: u64) -> bool {
        self.entries.lock().await.contains_key(&id)
    }

    /// Flush and close the descriptor for `id`, dropping the entry.
    ///
    /// Unknown ids and double-closes (EBADF) are swallowed; other close-time
    /// errors surface.
    pub async fn release(&self, id: u64) -> FsResult<()> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.remove(&id)
        };
        let Some(entry) = entry else {
            return Ok(());
        };
        let entry = entry.lock().await;
        if let Err(err) = entry.file.sync_all().await {
            if !is_ebadf(&err) {
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Close and drop every handle whose physical path equals `path`.
    pub async fn drop_for_path(&self, path: &Path) -> FsResult<()> {
        for id in self.ids_for(|entry_path| entry_path == path).await {
            self.release(id).await?;
        }
        Ok(())
    }

    /// Quiesce every handle at or below `prefix`: record the current seek
    /// position, close the descriptor and remove the entry. Position capture
    /// is best-effort so a retried rename stays safe.
    pub async fn quiesce_under(&self, prefix: &Path) -> Vec<QuiescedHandle> {
        let mut quiesced = Vec::new();
        for id in self.ids_for(|entry_path| entry_path.starts_with(prefix)).await {
            let Ok(entry) = self.get(id).await else {
                continue;
            };
            let position = {
                let mut entry = entry.lock().await;
                entry.file.seek(SeekFrom::Current(0)).await.unwrap_or(0)
            };
            let path = entry.lock().await.path.clone();
            let _ = self.release(id).await;
            quiesced.push(QuiescedHandle { id, path, position });
        }
        quiesced
    }

    async fn ids_for(&self, mut want: impl FnMut(&Path) -> bool) -> Vec<u64> {
        let entries = self.entries.lock().await;
        let mut ids = Vec::new();
        for (id, entry) in entries.iter() {
            let entry = entry.lock().await;
            if want(&entry.path) {
                ids.push(*id);
            }
        }
        ids.sort_unstable();
        ids
    }
}
