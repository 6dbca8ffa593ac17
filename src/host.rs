//! The mount-host seam.
//!
//! The kernel-facing runtime (libfuse on POSIX, WinFsp on Windows) is an
//! external collaborator: it owns the mount point, the callback threads and
//! the unmount lifecycle, and drives a [`Dispatch`] with [`Operation`]s. An
//! adapter for a concrete runtime implements [`Host`] and registers itself
//! through [`platform_host`].
//!
//! [`Operation`]: crate::dispatch::Operation

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::config::MountConfig;
use crate::dispatch::Dispatch;
use crate::error::{FsError, FsResult};

/// A kernel-facing runtime that exposes a dispatcher at a mount point.
///
/// `serve` blocks until the filesystem is unmounted; a clean unmount returns
/// `Ok(())`. Hosts honour `config.foreground`, `config.nothreads` and
/// `config.fusedebug`, and report `config.uid`/`config.gid` as ownership.
#[async_trait]
pub trait Host: Send + Sync {
    async fn serve(
        &self,
        dispatcher: Arc<dyn Dispatch>,
        config: &MountConfig,
    ) -> FsResult<()>;
}

/// The host adapter linked into this build, if any.
pub fn platform_host() -> Option<Box<dyn Host>> {
    None
}

/// Mount `dispatcher` using the platform host.
pub async fn mount(dispatcher: Arc<dyn Dispatch>, config: &MountConfig) -> FsResult<()> {
    match platform_host() {
        Some(host) => host.serve(dispatcher, config).await,
        None => {
            error!(
                "no mount host adapter is linked into this build; \
                 cannot expose {}",
                config.mount_point.display()
            );
            Err(FsError::Unsupported)
        }
    }
}
