//! Glob-based path classification: decides which backend owns a logical name.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{FsError, FsResult};

/// Matches logical paths against the mount's exclusion patterns.
///
/// The verdict is purely lexical: the classifier never consults the
/// filesystem, and it sees the logical path exactly as the host delivered it
/// (forward slashes, rooted at `/`). Patterns use `*`, `?` and `**` with
/// any-depth semantics. An empty pattern set excludes nothing.
#[derive(Debug)]
pub struct Classifier {
    set: Option<GlobSet>,
}

impl Classifier {
    /// Compile the pattern set once for the lifetime of the mount.
    pub fn new(patterns: &[String]) -> FsResult<Self> {
        if patterns.is_empty() {
            return Ok(Self { set: None });
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            // `*` and `?` stay within one component; only `**` crosses.
            let glob = GlobBuilder::new(pattern.trim_start_matches('/'))
                .literal_separator(true)
                .build()
                .map_err(|_| FsError::Os(crate::error::EINVAL))?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|_| FsError::Os(crate::error::EINVAL))?;
        Ok(Self { set: Some(set) })
    }

    /// True when the logical path belongs under the cache backend.
    pub fn is_excluded(&self, logical: &str) -> bool {
        match &self.set {
            Some(set) => set.is_match(logical.trim_start_matches('/')),
            None => false,
        }
    }
}
