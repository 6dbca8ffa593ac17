//! sievefs - a pass-through filesystem that routes paths between a root and
//! a cache backend by glob-pattern classification, exposing one unified
//! namespace above the split.

pub mod classify;
pub mod config;
pub mod diskusage;
pub mod dispatch;
pub mod error;
pub mod fs;
pub mod gate;
pub mod handles;
pub mod host;
pub mod mirror;
pub mod options;
pub mod resolve;
pub mod shortcut;

pub use config::MountConfig;
pub use dispatch::{Dispatch, Gated, Logged, Operation, Reply};
pub use error::{FsError, FsResult};
pub use fs::SieveFs;
