//! CSI Node service trait.
//!
//! The Node service runs on each worker node and binds projected volumes to
//! pods:
//!
//! 1. **Publish** — mount a fresh per-pod tmpfs at the target path and
//!    materialize the shared resource into it.
//! 2. **Unpublish** — unmount, tear down bookkeeping, remove the staging
//!    directory.
//!
//! Staging, volume statistics, and expansion are not offered by this plugin;
//! their RPCs answer `Unimplemented` via the default methods.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{NodeCapability, NodeInfo, NodePublishVolumeRequest, VolumeId};

/// Node service — publish / unpublish and node metadata.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Publish a volume: mount a per-pod tmpfs at the request's target path
    /// and project the share's backing resource into it.
    async fn node_publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Unpublish a volume: unmount the target path and remove all node-local
    /// state for the volume.
    ///
    /// Succeeds even when the unmount fails, so the orchestrator can proceed;
    /// a second call for the same volume is a no-op.
    async fn node_unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError>;

    /// Return information about the node on which this service is running.
    async fn node_get_info(&self) -> Result<NodeInfo, CsiError>;

    /// Advertise optional node behaviors.  This plugin advertises none.
    async fn node_get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError> {
        Ok(Vec::new())
    }

    /// Staging is not used by this plugin.
    async fn node_stage_volume(
        &self,
        _volume_id: &VolumeId,
        _staging_target_path: &str,
    ) -> Result<(), CsiError> {
        Err(CsiError::unimplemented("NodeStageVolume"))
    }

    /// Staging is not used by this plugin.
    async fn node_unstage_volume(
        &self,
        _volume_id: &VolumeId,
        _staging_target_path: &str,
    ) -> Result<(), CsiError> {
        Err(CsiError::unimplemented("NodeUnstageVolume"))
    }

    /// Volume statistics are not reported by this plugin.
    async fn node_get_volume_stats(&self, _volume_id: &VolumeId) -> Result<(), CsiError> {
        Err(CsiError::unimplemented("NodeGetVolumeStats"))
    }

    /// Expansion is not supported by this plugin.
    async fn node_expand_volume(
        &self,
        _volume_id: &VolumeId,
        _required_bytes: u64,
    ) -> Result<(), CsiError> {
        Err(CsiError::unimplemented("NodeExpandVolume"))
    }
}
