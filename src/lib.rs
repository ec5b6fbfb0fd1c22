//! # libshare — shared-resource CSI node plugin
//!
//! `libshare` implements a node-local storage plugin that projects
//! cluster-managed ConfigMaps and Secrets into pods as files on a per-pod
//! tmpfs, gated by an admission decision tied to a named Share object.  The
//! node agent publishes and unpublishes volumes through the plugin, and the
//! plugin continuously keeps the projected filesystem in sync with upstream
//! resource and share changes (Tokio async runtime, `tracing` for
//! observability, `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: volumes, shared resources, shares, requests. |
//! | [`error`] | [`CsiError`] enum covering all failure modes. |
//! | [`config`] | [`DriverConfig`] — paths, identity, file modes. |
//! | [`client`] | Seams to the cluster: authorization, pod lookup, events. |
//! | [`cache`] | [`ObjectCache`] — object lookup + per-volume event callbacks. |
//! | [`registry`] | [`VolumeRegistry`] — volume records + disk snapshot. |
//! | [`projection`] | [`ProjectionEngine`] — file materialization and sync. |
//! | [`mount`] | [`Mounter`] trait — per-pod tmpfs mounts. |
//! | [`identity`] | [`CsiIdentity`] trait — plugin discovery & health. |
//! | [`node`] | [`CsiNode`] trait — publish, unpublish, node info. |
//! | [`driver`] | [`SharedResourceDriver`] — the assembled plugin. |
//! | [`message`] | [`CsiMessage`] protocol envelope for QUIC transport. |
//! | [`transport`] | QUIC client/server built on `quinn`. |

pub mod cache;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod identity;
pub mod message;
pub mod mount;
pub mod node;
pub mod projection;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use cache::ObjectCache;
pub use config::DriverConfig;
pub use driver::SharedResourceDriver;
pub use error::{CsiError, RpcCode};
pub use identity::CsiIdentity;
pub use message::CsiMessage;
pub use mount::{Mounter, SysMounter};
pub use node::CsiNode;
pub use projection::ProjectionEngine;
pub use registry::{VolumeRecord, VolumeRegistry};
pub use types::*;
