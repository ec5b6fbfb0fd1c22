//! Driver error types.
//!
//! All errors in the `libshare` crate are represented by the [`CsiError`]
//! enum, which derives [`thiserror::Error`] for ergonomic error handling and
//! also implements [`Serialize`]/[`Deserialize`] so errors can travel across
//! the QUIC transport layer.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Unified error type for node-plugin operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum CsiError {
    /// The caller supplied an invalid or incomplete argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A volume with this ID is already published on the node.
    #[error("volume {0} already exists")]
    VolumeAlreadyExists(String),

    /// The requested volume was not found in the registry.
    #[error("volume {0} not found")]
    VolumeNotFound(String),

    /// The share named in the publish request is unknown to the object cache.
    #[error("share {0} not found")]
    ShareNotFound(String),

    /// A mount operation failed.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A filesystem operation (directory creation, file write, removal,
    /// snapshot encode) failed.
    #[error("filesystem error at {path}: {reason}")]
    Filesystem {
        /// Filesystem path involved in the failed operation.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A QUIC / transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The RPC is not offered by this plugin.
    #[error("{0} is not implemented")]
    Unimplemented(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// RPC status codes surfaced to the orchestrator, per the CSI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcCode {
    /// Missing or malformed input; no state was mutated.
    InvalidArgument,
    /// Filesystem, mount, or other node-local failure; the caller retries.
    Internal,
    /// The RPC is not offered by this plugin.
    Unimplemented,
}

impl CsiError {
    /// Create a [`CsiError::InvalidArgument`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn invalid<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidArgument(e.to_string())
    }

    /// Create a [`CsiError::Filesystem`] for `path` from an underlying error.
    pub fn filesystem<E: std::fmt::Display>(path: &Path, e: E) -> Self {
        Self::Filesystem {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Unimplemented`] naming the rejected RPC.
    pub fn unimplemented(rpc: &str) -> Self {
        Self::Unimplemented(rpc.to_owned())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// Map this error onto the RPC status code reported to the caller.
    pub fn code(&self) -> RpcCode {
        match self {
            Self::InvalidArgument(_) | Self::ShareNotFound(_) => RpcCode::InvalidArgument,
            Self::Unimplemented(_) => RpcCode::Unimplemented,
            Self::VolumeAlreadyExists(_)
            | Self::VolumeNotFound(_)
            | Self::MountFailed { .. }
            | Self::UnmountFailed { .. }
            | Self::Filesystem { .. }
            | Self::TransportError(_)
            | Self::Internal(_) => RpcCode::Internal,
        }
    }
}
