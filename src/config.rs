//! Driver configuration.
//!
//! Paths, identity, and file-mode knobs for the node plugin.  Defaults match
//! the conventional DaemonSet layout; every field can be overridden
//! programmatically or through environment variables:
//!
//! - `LIBSHARE_DRIVER_NAME`: plugin name advertised over the identity service.
//! - `LIBSHARE_NODE_ID`: unique identifier of this node.
//! - `LIBSHARE_DATA_ROOT`: staging root for per-volume directories.
//! - `LIBSHARE_VOLUME_MAP_ROOT`: directory holding the registry snapshot.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::CsiError;

/// File name of the registry snapshot inside the volume map root.
pub const VOLUME_MAP_FILE: &str = "volumemap.json";

/// Node plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Plugin name advertised over the identity service.
    pub driver_name: String,
    /// Unique identifier of this node, reported by `NodeGetInfo`.
    pub node_id: String,
    /// Staging root under which per-volume directories are created.
    pub data_root: PathBuf,
    /// Directory holding the registry snapshot file.
    pub volume_map_root: PathBuf,
    /// Volume count advertised by `NodeGetInfo`.  Informational only;
    /// capacity is not enforced.
    pub max_volumes_per_node: u64,
    /// Mode for projected directories and per-volume staging directories.
    pub dir_mode: u32,
    /// Mode for projected files.
    pub file_mode: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            driver_name: "share.csi.rk8s.io".to_owned(),
            node_id: String::new(),
            data_root: PathBuf::from("/csi-data-dir"),
            volume_map_root: PathBuf::from("/csi-volumes-map"),
            max_volumes_per_node: 16,
            dir_mode: 0o777,
            file_mode: 0o644,
        }
    }
}

impl DriverConfig {
    /// Build a configuration from the environment, falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("LIBSHARE_DRIVER_NAME") {
            config.driver_name = name;
        }
        if let Ok(node_id) = std::env::var("LIBSHARE_NODE_ID") {
            config.node_id = node_id;
        }
        if let Ok(root) = std::env::var("LIBSHARE_DATA_ROOT") {
            config.data_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("LIBSHARE_VOLUME_MAP_ROOT") {
            config.volume_map_root = PathBuf::from(root);
        }
        config
    }

    /// The full path of the registry snapshot file.
    pub fn volume_map_path(&self) -> PathBuf {
        self.volume_map_root.join(VOLUME_MAP_FILE)
    }

    /// Reject configurations missing the identity fields the plugin cannot
    /// run without.
    pub fn validate(&self) -> Result<(), CsiError> {
        if self.driver_name.is_empty() {
            return Err(CsiError::invalid("no driver name provided"));
        }
        if self.node_id.is_empty() {
            return Err(CsiError::invalid("no node id provided"));
        }
        Ok(())
    }
}
