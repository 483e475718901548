//! VM isolation: Tart VM control and the package caches shared with VMs.

mod cache;
mod clock;
mod error;
mod tart;

pub use cache::{CacheManager, CacheType, format_bytes};
pub use error::IsolationError;
pub use tart::{RunOptions, TartClient, VmInfo, VmState, expand_tilde};
