//! Volume registry and its on-disk snapshot.
//!
//! A process-wide mapping from volume ID to [`VolumeRecord`], guarded for
//! concurrent access, with a disk-backed snapshot for crash recovery.
//!
//! Two levels of exclusion: the [`DashMap`] serializes insert/remove/
//! enumeration of registry entries, and each record carries its own
//! `tokio::sync::Mutex` so a share-update event and a publish/unpublish
//! handler never observe a torn record.  A logical operation that touches
//! several fields holds the record lock for the whole operation.
//!
//! The snapshot is a JSON file holding the record map.  Records are cloned
//! under their locks into a stable copy first; only the process-global writer
//! lock is held across encoding and file I/O.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::PodResolver;
use crate::error::CsiError;
use crate::types::{AccessType, ResourceKey, SharedResourceKind, VolumeId};

/// State of one published volume.
///
/// Created on publish, mutated by share events, destroyed on unpublish.
/// The per-record lock lives outside this struct (see [`SharedVolumeRecord`])
/// so the serialized form carries only data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Opaque unique identifier supplied by the orchestrator.
    pub volume_id: VolumeId,
    /// Canonical per-volume staging directory on the node.
    pub volume_path: PathBuf,
    /// The mount point the orchestrator chose for the pod.
    pub target_path: PathBuf,
    /// Always [`AccessType::Mount`]; the only supported variant.
    pub access_type: AccessType,
    /// Kind of the backing resource.
    pub shared_data_kind: SharedResourceKind,
    /// Namespaced key of the backing resource.
    pub shared_data_key: ResourceKey,
    /// Name of the share granting access.
    pub shared_data_id: String,
    /// Namespace of the consuming pod.
    pub pod_namespace: String,
    /// Name of the consuming pod.
    pub pod_name: String,
    /// UID of the consuming pod.
    pub pod_uid: String,
    /// Service account the pod runs as.
    pub pod_service_account: String,
    /// Whether the authorization is currently granted.
    pub allowed: bool,
}

impl VolumeRecord {
    /// The projected directory for the current backing kind,
    /// `target_path/{configmaps|secrets}`.
    pub fn projected_dir(&self) -> PathBuf {
        self.target_path.join(self.shared_data_kind.subdir())
    }
}

/// A volume record behind its per-record lock.
pub type SharedVolumeRecord = Arc<Mutex<VolumeRecord>>;

/// Process-wide registry of published volumes with a disk-backed snapshot.
pub struct VolumeRegistry {
    volumes: DashMap<VolumeId, SharedVolumeRecord>,
    map_path: PathBuf,
    writer_lock: Mutex<()>,
}

impl VolumeRegistry {
    /// Create a registry persisting to `map_path`.
    pub fn new(map_path: impl Into<PathBuf>) -> Self {
        Self {
            volumes: DashMap::new(),
            map_path: map_path.into(),
            writer_lock: Mutex::new(()),
        }
    }

    /// Add a record.  Fails if the volume ID is already present.
    pub fn insert(&self, record: VolumeRecord) -> Result<SharedVolumeRecord, CsiError> {
        let id = record.volume_id.clone();
        let shared = Arc::new(Mutex::new(record));
        match self.volumes.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CsiError::VolumeAlreadyExists(id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&shared));
                Ok(shared)
            }
        }
    }

    /// Look up the record for `volume_id`.
    pub fn get(&self, volume_id: &VolumeId) -> Option<SharedVolumeRecord> {
        self.volumes.get(volume_id).map(|e| Arc::clone(e.value()))
    }

    /// Remove and return the record for `volume_id`.
    pub fn remove(&self, volume_id: &VolumeId) -> Option<SharedVolumeRecord> {
        self.volumes.remove(volume_id).map(|(_, record)| record)
    }

    /// Number of registered volumes.
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Whether the registry holds no volumes.
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Write the current map to the snapshot path.
    ///
    /// Takes a stable copy of every record under its lock, then encodes and
    /// writes the copy while holding only the process-global writer lock.
    pub async fn snapshot(&self) -> Result<(), CsiError> {
        let entries: Vec<(VolumeId, SharedVolumeRecord)> = self
            .volumes
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut stable = BTreeMap::new();
        for (id, record) in entries {
            let copy = record.lock().await.clone();
            stable.insert(id.to_string(), copy);
        }

        let _guard = self.writer_lock.lock().await;
        debug!(path = %self.map_path.display(), volumes = stable.len(), "writing registry snapshot");
        let bytes = serde_json::to_vec_pretty(&stable).map_err(CsiError::internal)?;
        tokio::fs::write(&self.map_path, bytes)
            .await
            .map_err(|e| CsiError::filesystem(&self.map_path, e))?;
        Ok(())
    }

    /// Reload the registry from the snapshot path.
    ///
    /// A missing snapshot is equivalent to an empty registry (and an empty
    /// snapshot is written).  Each decoded entry is checked against the live
    /// pod: entries whose pod is gone or whose UID no longer matches are
    /// dropped.  Returns the surviving records so the caller can re-register
    /// them with the projection engine.
    pub async fn reload(
        &self,
        pods: &dyn PodResolver,
    ) -> Result<Vec<SharedVolumeRecord>, CsiError> {
        let bytes = match tokio::fs::read(&self.map_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.snapshot().await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(CsiError::filesystem(&self.map_path, e)),
        };
        let decoded: BTreeMap<String, VolumeRecord> =
            serde_json::from_slice(&bytes).map_err(CsiError::internal)?;

        let mut survivors = Vec::new();
        for (id, record) in decoded {
            match pods.get_pod(&record.pod_namespace, &record.pod_name).await {
                Some(pod) if pod.uid == record.pod_uid => {
                    let shared = Arc::new(Mutex::new(record));
                    self.volumes
                        .insert(VolumeId::from(id), Arc::clone(&shared));
                    survivors.push(shared);
                }
                Some(pod) => {
                    debug!(
                        volume = %id,
                        expected = %record.pod_uid,
                        found = %pod.uid,
                        "pod UID mismatch at reload, dropping record",
                    );
                }
                None => {
                    debug!(
                        volume = %id,
                        pod = %record.pod_name,
                        namespace = %record.pod_namespace,
                        "pod gone at reload, dropping record",
                    );
                }
            }
        }
        Ok(survivors)
    }

    /// The snapshot file path.
    pub fn map_path(&self) -> &Path {
        &self.map_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::types::PodInfo;
    use std::collections::HashMap;

    fn sample_record(volume_id: &str, pod_uid: &str) -> VolumeRecord {
        VolumeRecord {
            volume_id: VolumeId::from(volume_id),
            volume_path: PathBuf::from(format!("/data/{volume_id}/ns/pod/{pod_uid}/default")),
            target_path: PathBuf::from(format!("/pods/{pod_uid}/volumes/{volume_id}")),
            access_type: AccessType::Mount,
            shared_data_kind: SharedResourceKind::ConfigMap,
            shared_data_key: ResourceKey::new("ns", "cm1"),
            shared_data_id: "my-share".into(),
            pod_namespace: "ns".into(),
            pod_name: "pod".into(),
            pod_uid: pod_uid.into(),
            pod_service_account: "default".into(),
            allowed: true,
        }
    }

    /// Resolver backed by a static map of `(namespace, name) -> uid`.
    struct StaticPods(HashMap<(String, String), String>);

    #[async_trait]
    impl PodResolver for StaticPods {
        async fn get_pod(&self, namespace: &str, name: &str) -> Option<PodInfo> {
            self.0
                .get(&(namespace.to_owned(), name.to_owned()))
                .map(|uid| PodInfo {
                    namespace: namespace.to_owned(),
                    name: name.to_owned(),
                    uid: uid.clone(),
                })
        }
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let registry = VolumeRegistry::new("/unused");
        registry.insert(sample_record("vol-1", "uid-1")).unwrap();
        let err = registry.insert(sample_record("vol-1", "uid-1")).unwrap_err();
        assert!(matches!(err, CsiError::VolumeAlreadyExists(_)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn get_and_remove() {
        let registry = VolumeRegistry::new("/unused");
        registry.insert(sample_record("vol-1", "uid-1")).unwrap();

        let record = registry.get(&VolumeId::from("vol-1")).expect("present");
        assert_eq!(record.lock().await.pod_uid, "uid-1");

        assert!(registry.remove(&VolumeId::from("vol-1")).is_some());
        assert!(registry.get(&VolumeId::from("vol-1")).is_none());
        assert!(registry.remove(&VolumeId::from("vol-1")).is_none());
    }

    #[tokio::test]
    async fn snapshot_then_reload_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let map_path = tmp.path().join("volumemap.json");

        let registry = VolumeRegistry::new(&map_path);
        registry.insert(sample_record("vol-1", "uid-1")).unwrap();
        registry.insert(sample_record("vol-2", "uid-2")).unwrap();
        registry.snapshot().await.unwrap();

        let pods = StaticPods(HashMap::from([
            (("ns".to_owned(), "pod".to_owned()), "uid-1".to_owned()),
        ]));
        let reloaded = VolumeRegistry::new(&map_path);
        let survivors = reloaded.reload(&pods).await.unwrap();

        // vol-2's UID no longer matches the live pod, so only vol-1 survives.
        assert_eq!(survivors.len(), 1);
        assert_eq!(reloaded.len(), 1);
        let record = reloaded.get(&VolumeId::from("vol-1")).expect("survivor");
        let record = record.lock().await;
        assert_eq!(record.shared_data_key, ResourceKey::new("ns", "cm1"));
        assert!(record.allowed);
    }

    #[tokio::test]
    async fn reload_drops_records_for_missing_pods() {
        let tmp = tempfile::tempdir().unwrap();
        let map_path = tmp.path().join("volumemap.json");

        let registry = VolumeRegistry::new(&map_path);
        registry.insert(sample_record("vol-1", "uid-1")).unwrap();
        registry.snapshot().await.unwrap();

        let reloaded = VolumeRegistry::new(&map_path);
        let survivors = reloaded.reload(&StaticPods(HashMap::new())).await.unwrap();
        assert!(survivors.is_empty());
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn reload_without_snapshot_writes_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let map_path = tmp.path().join("volumemap.json");

        let registry = VolumeRegistry::new(&map_path);
        let survivors = registry.reload(&StaticPods(HashMap::new())).await.unwrap();
        assert!(survivors.is_empty());

        // The empty snapshot was written and parses back to an empty map.
        let bytes = tokio::fs::read(&map_path).await.unwrap();
        let decoded: BTreeMap<String, VolumeRecord> = serde_json::from_slice(&bytes).unwrap();
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn snapshot_reflects_field_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let map_path = tmp.path().join("volumemap.json");

        let registry = VolumeRegistry::new(&map_path);
        let record = registry.insert(sample_record("vol-1", "uid-1")).unwrap();
        record.lock().await.allowed = false;
        registry.snapshot().await.unwrap();

        let pods = StaticPods(HashMap::from([
            (("ns".to_owned(), "pod".to_owned()), "uid-1".to_owned()),
        ]));
        let reloaded = VolumeRegistry::new(&map_path);
        let survivors = reloaded.reload(&pods).await.unwrap();
        assert_eq!(survivors.len(), 1);
        assert!(!survivors[0].lock().await.allowed);
    }
}
