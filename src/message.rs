//! Protocol messages for the node plugin transport.
//!
//! [`CsiMessage`] is the top-level envelope for all request and response
//! variants exchanged between the node agent and the plugin over QUIC
//! bi-directional streams.

use serde::{Deserialize, Serialize};

use crate::error::CsiError;
use crate::types::{NodeCapability, NodeInfo, NodePublishVolumeRequest, PluginInfo, VolumeId};

/// Top-level message envelope.
///
/// Each QUIC bi-stream carries exactly one request followed by one response.
/// The agent sends a *request* variant and the plugin replies with the
/// corresponding *response* variant (or [`CsiMessage::Error`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CsiMessage {
    // ----- Requests --------------------------------------------------------
    /// Publish a per-pod tmpfs volume (Node).
    NodePublishVolume(NodePublishVolumeRequest),
    /// Unpublish a previously published volume (Node).
    NodeUnpublishVolume {
        volume_id: VolumeId,
        target_path: String,
    },
    /// Stage a volume (Node).  Answered with `Unimplemented`.
    NodeStageVolume {
        volume_id: VolumeId,
        staging_target_path: String,
    },
    /// Unstage a volume (Node).  Answered with `Unimplemented`.
    NodeUnstageVolume {
        volume_id: VolumeId,
        staging_target_path: String,
    },
    /// Query volume statistics (Node).  Answered with `Unimplemented`.
    NodeGetVolumeStats { volume_id: VolumeId },
    /// Expand a volume (Node).  Answered with `Unimplemented`.
    NodeExpandVolume {
        volume_id: VolumeId,
        required_bytes: u64,
    },
    /// Query node info (Node).
    NodeGetInfo,
    /// Query optional node behaviors (Node).
    NodeGetCapabilities,
    /// Query plugin info (Identity).
    GetPluginInfo,
    /// Health probe (Identity).
    Probe,

    // ----- Responses -------------------------------------------------------
    /// Generic success acknowledgement (no payload).
    Ok,
    /// Node information.
    NodeInfoResponse(NodeInfo),
    /// Advertised node behaviors.
    NodeCapabilitiesResponse(Vec<NodeCapability>),
    /// Plugin information.
    PluginInfoResponse(PluginInfo),
    /// Probe result.
    ProbeResult(bool),
    /// An error occurred.
    Error(CsiError),
}

impl std::fmt::Display for CsiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodePublishVolume(req) => write!(f, "NodePublishVolume({})", req.volume_id),
            Self::NodeUnpublishVolume { volume_id, .. } => {
                write!(f, "NodeUnpublishVolume({})", volume_id)
            }
            Self::NodeStageVolume { volume_id, .. } => {
                write!(f, "NodeStageVolume({})", volume_id)
            }
            Self::NodeUnstageVolume { volume_id, .. } => {
                write!(f, "NodeUnstageVolume({})", volume_id)
            }
            Self::NodeGetVolumeStats { volume_id } => {
                write!(f, "NodeGetVolumeStats({})", volume_id)
            }
            Self::NodeExpandVolume { volume_id, .. } => {
                write!(f, "NodeExpandVolume({})", volume_id)
            }
            Self::NodeGetInfo => f.write_str("NodeGetInfo"),
            Self::NodeGetCapabilities => f.write_str("NodeGetCapabilities"),
            Self::GetPluginInfo => f.write_str("GetPluginInfo"),
            Self::Probe => f.write_str("Probe"),
            Self::Ok => f.write_str("Ok"),
            Self::NodeInfoResponse(info) => write!(f, "NodeInfo({})", info.node_id),
            Self::NodeCapabilitiesResponse(caps) => {
                write!(f, "NodeCapabilities(count={})", caps.len())
            }
            Self::PluginInfoResponse(info) => write!(f, "PluginInfo(name={})", info.name),
            Self::ProbeResult(ok) => write!(f, "ProbeResult({})", ok),
            Self::Error(e) => write!(f, "Error({})", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VolumeCapability;

    #[test]
    fn message_serde_roundtrip() {
        let msg = CsiMessage::NodePublishVolume(NodePublishVolumeRequest {
            volume_id: "vol-1".into(),
            target_path: "/pods/u/volumes/vol-1".into(),
            volume_capability: Some(VolumeCapability::default()),
            volume_context: Default::default(),
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        let de: CsiMessage = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(de, CsiMessage::NodePublishVolume(_)));
    }

    #[test]
    fn error_message_roundtrip() {
        let msg = CsiMessage::Error(CsiError::VolumeNotFound("vol-1".into()));
        let json = serde_json::to_string(&msg).expect("serialize");
        let de: CsiMessage = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(de, CsiMessage::Error(CsiError::VolumeNotFound(_))));
    }

    #[test]
    fn display_formatting() {
        assert_eq!(CsiMessage::Ok.to_string(), "Ok");
        assert_eq!(CsiMessage::Probe.to_string(), "Probe");
        assert_eq!(
            CsiMessage::NodeUnpublishVolume {
                volume_id: VolumeId::from("vol-9"),
                target_path: "/t".into(),
            }
            .to_string(),
            "NodeUnpublishVolume(vol-9)"
        );
    }
}
