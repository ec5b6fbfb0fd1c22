//! Core data model: volumes, shared resources, shares, requests, and node
//! metadata.
//!
//! These types form the data model shared by the service traits, transport
//! layer, and the projection engine.  They are all
//! [`Serialize`]/[`Deserialize`] so they can be transmitted over QUIC as JSON
//! and persisted in the registry snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::CsiError;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Opaque, unique identifier for a volume, supplied by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeId(pub String);

impl VolumeId {
    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Access type & capability
// ---------------------------------------------------------------------------

/// How the published volume is exposed to the pod.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessType {
    /// Filesystem mount.  The only supported variant.
    Mount,
    /// Raw block device.  Rejected at publish time.
    Block,
}

/// Capability requested by the orchestrator for a published volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeCapability {
    /// Requested access type.
    pub access_type: AccessType,
}

impl Default for VolumeCapability {
    fn default() -> Self {
        Self {
            access_type: AccessType::Mount,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared resources
// ---------------------------------------------------------------------------

/// The kind of cluster resource a share projects into the pod.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SharedResourceKind {
    /// A text map resource.
    ConfigMap,
    /// An opaque byte map resource.
    Secret,
}

impl SharedResourceKind {
    /// The per-pod subdirectory under the target path that holds this kind's
    /// projected files.
    pub fn subdir(&self) -> &'static str {
        match self {
            Self::ConfigMap => "configmaps",
            Self::Secret => "secrets",
        }
    }
}

impl fmt::Display for SharedResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigMap => f.write_str("ConfigMap"),
            Self::Secret => f.write_str("Secret"),
        }
    }
}

/// Namespaced `"namespace/name"` key identifying a backing resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Build the key for a resource in `namespace` named `name`.
    pub fn new(namespace: &str, name: &str) -> Self {
        Self(format!("{namespace}/{name}"))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A text map resource as served by the upstream cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigMap {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// Resource name.
    pub name: String,
    /// UTF-8 entries.
    #[serde(default)]
    pub data: HashMap<String, String>,
    /// Binary entries.
    #[serde(default)]
    pub binary_data: HashMap<String, Vec<u8>>,
}

impl ConfigMap {
    /// The namespaced cache key for this resource.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.name)
    }
}

/// An opaque byte map resource as served by the upstream cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Secret {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// Resource name.
    pub name: String,
    /// Binary entries.
    #[serde(default)]
    pub data: HashMap<String, Vec<u8>>,
}

impl Secret {
    /// The namespaced cache key for this resource.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.name)
    }
}

/// The backing resource a [`Share`] binds to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackingResource {
    /// Resource kind.
    pub kind: SharedResourceKind,
    /// Resource namespace.
    pub namespace: String,
    /// Resource name.
    pub name: String,
}

impl BackingResource {
    /// The namespaced cache key for the backing resource.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.name)
    }
}

/// A cluster-scoped object binding a backing resource to an authorization
/// policy.  Pods consume shares by name through the publish volume context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    /// Cluster-unique share name.
    pub name: String,
    /// The resource this share projects.
    pub backing_resource: BackingResource,
}

/// The slice of pod metadata the reload path needs to revalidate a persisted
/// volume record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInfo {
    /// Pod namespace.
    pub namespace: String,
    /// Pod name.
    pub name: String,
    /// Pod UID.
    pub uid: String,
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Transient shape handed to the file writer: the data entries of a backing
/// resource, split into text and binary maps.  One of the two may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payload {
    /// UTF-8 entries, written byte-for-byte.
    pub string_data: HashMap<String, String>,
    /// Binary entries, written verbatim.
    pub byte_data: HashMap<String, Vec<u8>>,
}

impl Payload {
    /// Whether the payload carries no entries at all.
    pub fn is_empty(&self) -> bool {
        self.string_data.is_empty() && self.byte_data.is_empty()
    }
}

impl From<&ConfigMap> for Payload {
    fn from(cm: &ConfigMap) -> Self {
        Self {
            string_data: cm.data.clone(),
            byte_data: cm.binary_data.clone(),
        }
    }
}

impl From<&Secret> for Payload {
    fn from(secret: &Secret) -> Self {
        Self {
            string_data: HashMap::new(),
            byte_data: secret.data.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Publish volume context
// ---------------------------------------------------------------------------

/// Volume context key carrying the pod name.
pub const CSI_POD_NAME: &str = "csi.storage.k8s.io/pod.name";
/// Volume context key carrying the pod namespace.
pub const CSI_POD_NAMESPACE: &str = "csi.storage.k8s.io/pod.namespace";
/// Volume context key carrying the pod UID.
pub const CSI_POD_UID: &str = "csi.storage.k8s.io/pod.uid";
/// Volume context key carrying the pod service-account name.
pub const CSI_POD_SA: &str = "csi.storage.k8s.io/serviceAccount.name";
/// Volume context key marking the volume as ephemeral.
pub const CSI_EPHEMERAL: &str = "csi.storage.k8s.io/ephemeral";
/// Volume context key naming the share to consume.
pub const CSI_SHARE: &str = "share";

/// Topology segment key advertised by `NodeGetInfo`.
pub const TOPOLOGY_KEY_NODE: &str = "topology.hostpath.csi/node";

/// Pod identity extracted from the publish volume context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodDetails {
    /// Pod namespace.
    pub namespace: String,
    /// Pod name.
    pub name: String,
    /// Pod UID.
    pub uid: String,
    /// Pod service-account name.
    pub service_account: String,
}

impl PodDetails {
    /// Extract the pod identity from a publish volume context.  All four
    /// values must be present and non-empty.
    pub fn from_context(ctx: &HashMap<String, String>) -> Result<Self, CsiError> {
        let get = |key: &str| ctx.get(key).cloned().unwrap_or_default();
        let details = Self {
            namespace: get(CSI_POD_NAMESPACE),
            name: get(CSI_POD_NAME),
            uid: get(CSI_POD_UID),
            service_account: get(CSI_POD_SA),
        };
        if details.namespace.is_empty()
            || details.name.is_empty()
            || details.uid.is_empty()
            || details.service_account.is_empty()
        {
            return Err(CsiError::InvalidArgument(format!(
                "volume attributes missing required set for pod: namespace: {} name: {} uid: {} sa: {}",
                details.namespace, details.name, details.uid, details.service_account
            )));
        }
        Ok(details)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to publish a per-pod tmpfs volume at a target path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePublishVolumeRequest {
    /// Volume to publish.
    pub volume_id: String,
    /// Target path inside the pod's volume directory.
    pub target_path: String,
    /// Requested capability.  Required.
    pub volume_capability: Option<VolumeCapability>,
    /// Pod identity, ephemeral marker, and share name.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Plugin & node info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name, e.g. `"share.csi.rk8s.io"`.
    pub name: String,
    /// Vendor-provided version string.
    pub vendor_version: String,
}

/// Topology constraint expressed as key-value segments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    /// Topology segments, e.g. `{"topology.hostpath.csi/node": "node-01"}`.
    #[serde(default)]
    pub segments: HashMap<String, String>,
}

/// Information about the node on which the Node service runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier.
    pub node_id: String,
    /// Maximum number of volumes the node can host.
    pub max_volumes_per_node: u64,
    /// Topology of this node.
    pub accessible_topology: Topology,
}

/// Optional behaviors a Node service can advertise.  This plugin advertises
/// none of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeCapability {
    /// Volumes must be staged before publish.
    StageUnstageVolume,
    /// The plugin reports volume usage statistics.
    GetVolumeStats,
    /// The plugin supports online expansion.
    ExpandVolume,
}
