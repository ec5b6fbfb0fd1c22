//! Mount primitive.
//!
//! Each published volume gets its own fresh tmpfs at the target path: no bind
//! option, no read-only flag, no mount flags passed through.  A per-pod tmpfs
//! keeps pods isolated from each other and lets the node agent relabel the
//! volume for exactly one pod.
//!
//! The syscall wrapper sits behind [`Mounter`] so tests can substitute a
//! recording fake.

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use std::path::Path;

use crate::error::CsiError;

/// Node-local mount operations.
pub trait Mounter: Send + Sync {
    /// Mount a fresh tmpfs at `target`.  `source` is recorded as the device
    /// name only; tmpfs takes no backing device.
    fn mount_tmpfs(&self, source: &Path, target: &Path) -> Result<(), CsiError>;

    /// Forcefully unmount `target`.
    fn unmount(&self, target: &Path) -> Result<(), CsiError>;
}

/// [`Mounter`] backed by the real mount syscalls.
#[derive(Debug, Default)]
pub struct SysMounter;

impl Mounter for SysMounter {
    fn mount_tmpfs(&self, source: &Path, target: &Path) -> Result<(), CsiError> {
        mount(
            Some(source),
            target,
            Some("tmpfs"),
            MsFlags::empty(),
            None::<&str>,
        )
        .map_err(|e| CsiError::MountFailed {
            path: target.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn unmount(&self, target: &Path) -> Result<(), CsiError> {
        umount2(target, MntFlags::MNT_FORCE).map_err(|e| CsiError::UnmountFailed {
            path: target.display().to_string(),
            reason: e.to_string(),
        })
    }
}
