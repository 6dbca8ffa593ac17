//! Logical-to-physical path resolution with lazy migration.

use std::path::{Path, PathBuf};

use filetime::FileTime;
use tokio::fs;

use crate::classify::Classifier;
use crate::error::FsResult;
use crate::mirror::{self, lexists};

/// Where a logical name currently sits, before any migration.
#[derive(Debug)]
pub enum Located {
    /// Exists exactly where classification wants it.
    Settled(PathBuf),
    /// Exists on one backend while classification points at the other.
    Misplaced { from: PathBuf, to: PathBuf },
    /// Both backends hold the name (typically a first mount over a
    /// pre-populated root, or mirrored ancestor directories).
    Ambiguous { root: PathBuf, cache: PathBuf },
    /// Neither backend holds the name; creation should land here.
    Absent(PathBuf),
}

/// Maps logical paths onto the two backends.
///
/// `locate` is side-effect-free; `resolve` additionally migrates files whose
/// classification and physical location disagree, so repeated pattern-set
/// changes converge lazily without a scan.
#[derive(Debug)]
pub struct Resolver {
    root: PathBuf,
    cache: PathBuf,
    classifier: Classifier,
}

impl Resolver {
    pub fn new(root: PathBuf, cache: PathBuf, classifier: Classifier) -> Self {
        Self { root, cache, classifier }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    /// The physical location `logical` would have under the root backend.
    pub fn root_path(&self, logical: &str) -> PathBuf {
        self.root.join(logical.trim_start_matches('/'))
    }

    /// The physical location `logical` would have under the cache backend.
    pub fn cache_path(&self, logical: &str) -> PathBuf {
        self.cache.join(logical.trim_start_matches('/'))
    }

    pub fn is_excluded(&self, logical: &str) -> bool {
        self.classifier.is_excluded(logical)
    }

    /// True when both physical paths live under the same backend.
    pub fn same_backend(&self, a: &Path, b: &Path) -> bool {
        a.starts_with(&self.cache) == b.starts_with(&self.cache)
    }

    /// Pure lookup: report where the name is, without touching anything.
    pub async fn locate(&self, logical: &str) -> Located {
        let root_path = self.root_path(logical);
        let cache_path = self.cache_path(logical);
        let excluded = self.classifier.is_excluded(logical);

        match (lexists(&root_path).await, lexists(&cache_path).await) {
            (true, true) => Located::Ambiguous { root: root_path, cache: cache_path },
            (true, false) if excluded => {
                Located::Misplaced { from: root_path, to: cache_path }
            }
            (true, false) => Located::Settled(root_path),
            (false, true) if !excluded => {
                Located::Misplaced { from: cache_path, to: root_path }
            }
            (false, true) => Located::Settled(cache_path),
            (false, false) => {
                Located::Absent(if excluded { cache_path } else { root_path })
            }
        }
    }

    /// Resolve `logical` to the physical path an operation should use,
    /// migrating first when the name is misplaced or duplicated.
    pub async fn resolve(&self, logical: &str) -> FsResult<PathBuf> {
        match self.locate(logical).await {
            Located::Settled(path) | Located::Absent(path) => Ok(path),
            Located::Misplaced { from, to } => self.migrate(from, to).await,
            Located::Ambiguous { root, cache } => {
                self.reconcile(logical, root, cache).await
            }
        }
    }

    /// Move a misplaced entry to its classified side, parents first.
    async fn migrate(&self, from: PathBuf, to: PathBuf) -> FsResult<PathBuf> {
        if let Some(parent) = to.parent() {
            mirror::make_tree(&self.root, &self.cache, parent).await?;
        }
        fs::rename(&from, &to).await?;
        Ok(to)
    }

    /// Both sides hold the name: prefer the strictly fresher copy (ties go
    /// to root) and, for non-directories, converge to a single backend by
    /// dropping the stale copy. Directories legitimately exist on both sides
    /// as mirrored ancestors and are left alone.
    async fn reconcile(
        &self,
        logical: &str,
        root_path: PathBuf,
        cache_path: PathBuf,
    ) -> FsResult<PathBuf> {
        let root_meta = fs::symlink_metadata(&root_path).await?;
        let cache_meta = fs::symlink_metadata(&cache_path).await?;

        let root_mtime = FileTime::from_last_modification_time(&root_meta);
        let cache_mtime = FileTime::from_last_modification_time(&cache_meta);
        let cache_is_fresher = cache_mtime > root_mtime;

        if root_meta.is_dir() && cache_meta.is_dir() {
            return Ok(if cache_is_fresher { cache_path } else { root_path });
        }

        let (fresh, stale) = if cache_is_fresher {
            (cache_path.clone(), root_path.clone())
        } else {
            (root_path.clone(), cache_path.clone())
        };
        let target = if self.classifier.is_excluded(logical) {
            cache_path
        } else {
            root_path
        };

        remove_any(&stale).await?;
        if fresh == target {
            return Ok(fresh);
        }
        fs::rename(&fresh, &target).await?;
        Ok(target)
    }
}

async fn remove_any(path: &Path) -> FsResult<()> {
    let meta = fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await?;
    } else {
        fs::remove_file(path).await?;
    }
    Ok(())
}
