//! The shared-resource node driver.
//!
//! [`SharedResourceDriver`] ties the components together: it translates the
//! publish/unpublish RPCs into registry, mount, and projection operations,
//! and it serves the node and identity metadata RPCs.
//!
//! Construction reloads the registry snapshot and re-wires every surviving
//! volume into the projection engine, so a driver restart picks up exactly
//! where the previous process stopped.

use async_trait::async_trait;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cache::ObjectCache;
use crate::client::{AccessReviewer, EventSink, PodResolver};
use crate::config::DriverConfig;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::mount::Mounter;
use crate::node::CsiNode;
use crate::projection::ProjectionEngine;
use crate::registry::{VolumeRecord, VolumeRegistry};
use crate::types::{
    AccessType, NodeInfo, NodePublishVolumeRequest, PluginInfo, PodDetails, Topology, VolumeId,
    CSI_EPHEMERAL, CSI_SHARE, TOPOLOGY_KEY_NODE,
};

/// Node plugin projecting shared cluster resources into per-pod tmpfs
/// volumes.
pub struct SharedResourceDriver {
    config: DriverConfig,
    registry: Arc<VolumeRegistry>,
    cache: Arc<ObjectCache>,
    engine: Arc<ProjectionEngine>,
    reviewer: Arc<dyn AccessReviewer>,
    mounter: Arc<dyn Mounter>,
}

impl SharedResourceDriver {
    /// Build the driver: validate configuration, create the staging and
    /// snapshot roots, reload the persisted registry, and re-register every
    /// surviving volume with the projection engine.
    pub async fn new(
        config: DriverConfig,
        cache: Arc<ObjectCache>,
        reviewer: Arc<dyn AccessReviewer>,
        pods: Arc<dyn PodResolver>,
        mounter: Arc<dyn Mounter>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, CsiError> {
        config.validate()?;
        ensure_dir_0750(&config.data_root).await?;
        ensure_dir_0750(&config.volume_map_root).await?;
        info!(driver = %config.driver_name, node = %config.node_id, "starting shared-resource driver");

        let registry = Arc::new(VolumeRegistry::new(config.volume_map_path()));
        let engine = Arc::new(ProjectionEngine::new(
            Arc::clone(&cache),
            Arc::clone(&registry),
            Arc::clone(&reviewer),
            events,
            &config,
        ));
        let driver = Self {
            config,
            registry,
            cache,
            engine,
            reviewer,
            mounter,
        };

        let survivors = driver.registry.reload(pods.as_ref()).await?;
        for record in &survivors {
            if let Err(e) = driver.engine.map_volume(record).await {
                let volume = record.lock().await.volume_id.clone();
                warn!(%volume, error = %e, "failed to re-register reloaded volume");
            }
        }
        if !survivors.is_empty() {
            info!(volumes = survivors.len(), "restored volumes from snapshot");
        }
        Ok(driver)
    }

    /// The registry backing this driver.
    pub fn registry(&self) -> &Arc<VolumeRegistry> {
        &self.registry
    }

    /// Canonical staging directory for a volume:
    /// `data_root/volumeID/namespace/name/uid/serviceAccount`.
    fn volume_path(&self, volume_id: &str, pod: &PodDetails) -> PathBuf {
        self.config
            .data_root
            .join(volume_id)
            .join(&pod.namespace)
            .join(&pod.name)
            .join(&pod.uid)
            .join(&pod.service_account)
    }

    fn deregister_all_callbacks(&self, token: &VolumeId) {
        self.cache.unregister_config_map_upsert_callback(token);
        self.cache.unregister_config_map_delete_callback(token);
        self.cache.unregister_secret_upsert_callback(token);
        self.cache.unregister_secret_delete_callback(token);
        self.cache.unregister_share_update_callback(token);
        self.cache.unregister_share_delete_callback(token);
    }

    async fn snapshot_registry(&self) {
        if let Err(e) = self.registry.snapshot().await {
            warn!(error = %e, "failed to persist volume map");
        }
    }
}

#[async_trait]
impl CsiNode for SharedResourceDriver {
    #[instrument(skip(self, req), fields(volume_id = %req.volume_id))]
    async fn node_publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        let capability = req
            .volume_capability
            .as_ref()
            .ok_or_else(|| CsiError::invalid("volume capability missing in request"))?;
        if req.volume_id.is_empty() {
            return Err(CsiError::invalid("volume ID missing in request"));
        }
        if req.target_path.is_empty() {
            return Err(CsiError::invalid("target path missing in request"));
        }
        if req.volume_context.is_empty() {
            return Err(CsiError::invalid("volume attributes missing in request"));
        }
        let pod = PodDetails::from_context(&req.volume_context)?;

        let ephemeral = matches!(
            req.volume_context.get(CSI_EPHEMERAL).map(String::as_str),
            None | Some("") | Some("true")
        );
        if !ephemeral {
            return Err(CsiError::invalid("non-ephemeral request made"));
        }
        if capability.access_type != AccessType::Mount {
            return Err(CsiError::invalid("only mount access type is supported"));
        }

        let share_name = req
            .volume_context
            .get(CSI_SHARE)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CsiError::invalid("share name missing from volume context"))?;
        let share = self
            .cache
            .get_share(share_name)
            .ok_or_else(|| CsiError::ShareNotFound(share_name.clone()))?;

        // A denial is not an error: the mount still happens and a later
        // share update may grant access.
        let allowed = self
            .reviewer
            .can_use(&share.name, &pod.namespace, &pod.name, &pod.service_account)
            .await
            .unwrap_or(false);

        let volume_path = self.volume_path(&req.volume_id, &pod);
        tokio::fs::create_dir_all(&volume_path)
            .await
            .map_err(|e| CsiError::filesystem(&volume_path, e))?;
        tokio::fs::set_permissions(&volume_path, Permissions::from_mode(self.config.dir_mode))
            .await
            .map_err(|e| CsiError::filesystem(&volume_path, e))?;

        let target_path = PathBuf::from(&req.target_path);
        ensure_dir_0750(&target_path).await?;

        let record = VolumeRecord {
            volume_id: VolumeId::from(req.volume_id.as_str()),
            volume_path: volume_path.clone(),
            target_path: target_path.clone(),
            access_type: AccessType::Mount,
            shared_data_kind: share.backing_resource.kind,
            shared_data_key: share.backing_resource.key(),
            shared_data_id: share.name.clone(),
            pod_namespace: pod.namespace.clone(),
            pod_name: pod.name.clone(),
            pod_uid: pod.uid.clone(),
            pod_service_account: pod.service_account.clone(),
            allowed,
        };
        let shared = self.registry.insert(record)?;
        self.snapshot_registry().await;

        if let Err(e) = self.mounter.mount_tmpfs(&volume_path, &target_path) {
            // Roll back the partial publish so the orchestrator's retry
            // starts clean.
            self.registry.remove(&VolumeId::from(req.volume_id.as_str()));
            self.snapshot_registry().await;
            if let Err(rm_err) = tokio::fs::remove_dir_all(&volume_path).await {
                if rm_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %volume_path.display(), error = %rm_err, "failed to remove staging directory");
                }
            }
            return Err(CsiError::Internal(format!(
                "failed to mount device {} at {}: {e}",
                volume_path.display(),
                target_path.display(),
            )));
        }

        // Errors here go back to the caller with the mount left in place, so
        // the node agent can retry at its own cadence.
        self.engine.map_volume(&shared).await.map_err(|e| {
            CsiError::Internal(format!(
                "failed to populate mount device {} at {}: {e}",
                volume_path.display(),
                target_path.display(),
            ))
        })?;

        info!(volume = %req.volume_id, target = %req.target_path, allowed, "volume published");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn node_unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError> {
        if volume_id.as_str().is_empty() {
            return Err(CsiError::invalid("volume ID missing in request"));
        }
        if target_path.is_empty() {
            return Err(CsiError::invalid("target path missing in request"));
        }

        // The orchestrator must be able to proceed even when the unmount
        // fails; tear down the rest of the state regardless.
        if let Err(e) = self.mounter.unmount(Path::new(target_path)) {
            warn!(%volume_id, target = target_path, error = %e, "error unmounting target path");
        }

        if let Some(record) = self.registry.remove(volume_id) {
            let volume_path = record.lock().await.volume_path.clone();
            debug!(%volume_id, path = %volume_path.display(), "deleting volume staging directory");
            if let Err(e) = tokio::fs::remove_dir_all(&volume_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %volume_path.display(), error = %e, "failed to remove staging directory");
                }
            }
            prune_empty_ancestors(&volume_path, &self.config.data_root).await;
            self.snapshot_registry().await;
        }
        self.deregister_all_callbacks(volume_id);

        info!(%volume_id, target = target_path, "volume unpublished");
        Ok(())
    }

    async fn node_get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.config.node_id.clone(),
            max_volumes_per_node: self.config.max_volumes_per_node,
            accessible_topology: Topology {
                segments: std::collections::HashMap::from([(
                    TOPOLOGY_KEY_NODE.to_owned(),
                    self.config.node_id.clone(),
                )]),
            },
        })
    }
}

#[async_trait]
impl CsiIdentity for SharedResourceDriver {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: self.config.driver_name.clone(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
        })
    }

    async fn probe(&self) -> Result<bool, CsiError> {
        let healthy = tokio::fs::metadata(&self.config.data_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        Ok(healthy)
    }
}

async fn ensure_dir_0750(root: &Path) -> Result<(), CsiError> {
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| CsiError::filesystem(root, e))?;
    tokio::fs::set_permissions(root, Permissions::from_mode(0o750))
        .await
        .map_err(|e| CsiError::filesystem(root, e))?;
    Ok(())
}

/// Walk the ancestors of `path` up to (but not including) `root`, removing
/// each directory that is empty.  Multiple pods may share the
/// namespace/name prefix directories, so only empty ones go.  The
/// empty-check-then-remove is inherently racy; only unpublish walks this
/// tree, so a lost race just leaves the directory for the next pass.
async fn prune_empty_ancestors(path: &Path, root: &Path) {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        remove_if_empty(d).await;
        dir = d.parent();
    }
}

async fn remove_if_empty(dir: &Path) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "error opening directory during empty check");
            return;
        }
    };
    match entries.next_entry().await {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = tokio::fs::remove_dir(dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %dir.display(), error = %e, "error deleting empty directory");
                }
            }
        }
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "error reading directory during empty check");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LogEventSink;
    use crate::error::RpcCode;
    use crate::types::{
        BackingResource, ConfigMap, PodInfo, Share, SharedResourceKind, VolumeCapability,
        CSI_POD_NAME, CSI_POD_NAMESPACE, CSI_POD_SA, CSI_POD_UID,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Mounter that records calls instead of touching the kernel.
    #[derive(Default)]
    struct FakeMounter {
        mounts: Mutex<Vec<(PathBuf, PathBuf)>>,
        unmounts: Mutex<Vec<PathBuf>>,
        fail_mount: AtomicBool,
    }

    impl Mounter for FakeMounter {
        fn mount_tmpfs(&self, source: &Path, target: &Path) -> Result<(), CsiError> {
            if self.fail_mount.load(Ordering::SeqCst) {
                return Err(CsiError::MountFailed {
                    path: target.display().to_string(),
                    reason: "injected".into(),
                });
            }
            self.mounts
                .lock()
                .unwrap()
                .push((source.to_owned(), target.to_owned()));
            Ok(())
        }

        fn unmount(&self, target: &Path) -> Result<(), CsiError> {
            self.unmounts.lock().unwrap().push(target.to_owned());
            Ok(())
        }
    }

    struct FlipReviewer(AtomicBool);

    #[async_trait]
    impl AccessReviewer for FlipReviewer {
        async fn can_use(&self, _: &str, _: &str, _: &str, _: &str) -> Result<bool, CsiError> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

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

    struct Fixture {
        tmp: tempfile::TempDir,
        cache: Arc<ObjectCache>,
        reviewer: Arc<FlipReviewer>,
        mounter: Arc<FakeMounter>,
        driver: SharedResourceDriver,
    }

    impl Fixture {
        fn config(tmp: &tempfile::TempDir) -> DriverConfig {
            DriverConfig {
                node_id: "test-node".into(),
                data_root: tmp.path().join("data"),
                volume_map_root: tmp.path().join("map"),
                ..Default::default()
            }
        }

        fn target(&self) -> String {
            self.tmp.path().join("target").display().to_string()
        }
    }

    async fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Arc::new(ObjectCache::new());
        seed_cache(&cache).await;
        let reviewer = Arc::new(FlipReviewer(AtomicBool::new(true)));
        let mounter = Arc::new(FakeMounter::default());
        let driver = SharedResourceDriver::new(
            Fixture::config(&tmp),
            Arc::clone(&cache),
            Arc::clone(&reviewer) as Arc<dyn AccessReviewer>,
            Arc::new(StaticPods(HashMap::new())),
            Arc::clone(&mounter) as Arc<dyn Mounter>,
            Arc::new(LogEventSink),
        )
        .await
        .unwrap();
        Fixture {
            tmp,
            cache,
            reviewer,
            mounter,
            driver,
        }
    }

    async fn seed_cache(cache: &ObjectCache) {
        cache
            .upsert_config_map(ConfigMap {
                namespace: "n".into(),
                name: "cm1".into(),
                data: HashMap::from([("k1".into(), "v1".into())]),
                binary_data: HashMap::new(),
            })
            .await;
        cache
            .upsert_share(Share {
                name: "my-share".into(),
                backing_resource: BackingResource {
                    kind: SharedResourceKind::ConfigMap,
                    namespace: "n".into(),
                    name: "cm1".into(),
                },
            })
            .await;
    }

    fn publish_context() -> HashMap<String, String> {
        HashMap::from([
            (CSI_POD_NAMESPACE.to_owned(), "n".to_owned()),
            (CSI_POD_NAME.to_owned(), "p".to_owned()),
            (CSI_POD_UID.to_owned(), "u".to_owned()),
            (CSI_POD_SA.to_owned(), "s".to_owned()),
            (CSI_EPHEMERAL.to_owned(), "true".to_owned()),
            (CSI_SHARE.to_owned(), "my-share".to_owned()),
        ])
    }

    fn publish_request(fx: &Fixture) -> NodePublishVolumeRequest {
        NodePublishVolumeRequest {
            volume_id: "vol-1".into(),
            target_path: fx.target(),
            volume_capability: Some(VolumeCapability::default()),
            volume_context: publish_context(),
        }
    }

    #[tokio::test]
    async fn basic_publish_projects_files() {
        let fx = fixture().await;
        fx.driver
            .node_publish_volume(publish_request(&fx))
            .await
            .unwrap();

        let file = fx.tmp.path().join("target/configmaps/k1");
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "v1");

        let record = fx.driver.registry().get(&VolumeId::from("vol-1")).unwrap();
        let rec = record.lock().await;
        assert!(rec.allowed);
        assert_eq!(rec.shared_data_id, "my-share");
        assert_eq!(
            rec.volume_path,
            fx.tmp.path().join("data/vol-1/n/p/u/s")
        );
        drop(rec);

        // tmpfs mounted from the staging path onto the target, callbacks live.
        let mounts = fx.mounter.mounts.lock().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].1, fx.tmp.path().join("target"));
        assert_eq!(
            fx.cache.registered_callback_count(&VolumeId::from("vol-1")),
            4
        );

        // The publish is already on disk.
        let bytes = std::fs::read(fx.tmp.path().join("map/volumemap.json")).unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("vol-1"));
    }

    #[tokio::test]
    async fn publish_missing_pod_uid_is_invalid() {
        let fx = fixture().await;
        let mut req = publish_request(&fx);
        req.volume_context.remove(CSI_POD_UID);

        let err = fx.driver.node_publish_volume(req).await.unwrap_err();
        assert_eq!(err.code(), RpcCode::InvalidArgument);
        assert!(fx.driver.registry().is_empty());
        assert!(fx.mounter.mounts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_rejects_non_ephemeral() {
        let fx = fixture().await;
        let mut req = publish_request(&fx);
        req.volume_context
            .insert(CSI_EPHEMERAL.to_owned(), "false".to_owned());

        let err = fx.driver.node_publish_volume(req).await.unwrap_err();
        assert_eq!(err.code(), RpcCode::InvalidArgument);
    }

    #[tokio::test]
    async fn publish_rejects_block_access() {
        let fx = fixture().await;
        let mut req = publish_request(&fx);
        req.volume_capability = Some(VolumeCapability {
            access_type: AccessType::Block,
        });

        let err = fx.driver.node_publish_volume(req).await.unwrap_err();
        assert_eq!(err.code(), RpcCode::InvalidArgument);
    }

    #[tokio::test]
    async fn publish_requires_capability_and_ids() {
        let fx = fixture().await;

        let mut req = publish_request(&fx);
        req.volume_capability = None;
        assert!(fx.driver.node_publish_volume(req).await.is_err());

        let mut req = publish_request(&fx);
        req.volume_id = String::new();
        assert!(fx.driver.node_publish_volume(req).await.is_err());

        let mut req = publish_request(&fx);
        req.target_path = String::new();
        assert!(fx.driver.node_publish_volume(req).await.is_err());
    }

    #[tokio::test]
    async fn publish_unknown_share_is_invalid() {
        let fx = fixture().await;
        let mut req = publish_request(&fx);
        req.volume_context
            .insert(CSI_SHARE.to_owned(), "no-such-share".to_owned());

        let err = fx.driver.node_publish_volume(req).await.unwrap_err();
        assert!(matches!(err, CsiError::ShareNotFound(_)));
        assert_eq!(err.code(), RpcCode::InvalidArgument);
    }

    #[tokio::test]
    async fn denied_publish_mounts_but_writes_nothing() {
        let fx = fixture().await;
        fx.reviewer.0.store(false, Ordering::SeqCst);

        fx.driver
            .node_publish_volume(publish_request(&fx))
            .await
            .unwrap();

        assert!(!fx.tmp.path().join("target/configmaps").exists());
        let record = fx.driver.registry().get(&VolumeId::from("vol-1")).unwrap();
        assert!(!record.lock().await.allowed);
        assert_eq!(fx.mounter.mounts.lock().unwrap().len(), 1);
        // Only the share callbacks are wired until permission arrives.
        assert_eq!(
            fx.cache.registered_callback_count(&VolumeId::from("vol-1")),
            2
        );
    }

    #[tokio::test]
    async fn second_publish_fails_cleanly() {
        let fx = fixture().await;
        fx.driver
            .node_publish_volume(publish_request(&fx))
            .await
            .unwrap();
        let err = fx
            .driver
            .node_publish_volume(publish_request(&fx))
            .await
            .unwrap_err();
        assert!(matches!(err, CsiError::VolumeAlreadyExists(_)));
        assert_eq!(fx.driver.registry().len(), 1);
    }

    #[tokio::test]
    async fn mount_failure_rolls_back() {
        let fx = fixture().await;
        fx.mounter.fail_mount.store(true, Ordering::SeqCst);

        let err = fx
            .driver
            .node_publish_volume(publish_request(&fx))
            .await
            .unwrap_err();
        assert_eq!(err.code(), RpcCode::Internal);
        assert!(fx.driver.registry().is_empty());
        assert!(!fx.tmp.path().join("data/vol-1").join("n/p/u/s").exists());
    }

    #[tokio::test]
    async fn unpublish_tears_everything_down() {
        let fx = fixture().await;
        fx.driver
            .node_publish_volume(publish_request(&fx))
            .await
            .unwrap();

        let volume_id = VolumeId::from("vol-1");
        fx.driver
            .node_unpublish_volume(&volume_id, &fx.target())
            .await
            .unwrap();

        assert!(fx.driver.registry().is_empty());
        assert_eq!(fx.cache.registered_callback_count(&volume_id), 0);
        // The staging tree is pruned all the way up to the data root.
        assert!(!fx.tmp.path().join("data/vol-1").exists());
        assert!(fx.tmp.path().join("data").exists());
        let unmounts = fx.mounter.unmounts.lock().unwrap();
        assert_eq!(unmounts.len(), 1);
        assert_eq!(unmounts[0], fx.tmp.path().join("target"));
        drop(unmounts);

        // A second unpublish is a no-op returning success.
        fx.driver
            .node_unpublish_volume(&volume_id, &fx.target())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unpublish_validates_arguments() {
        let fx = fixture().await;
        assert!(fx
            .driver
            .node_unpublish_volume(&VolumeId::from(""), "/t")
            .await
            .is_err());
        assert!(fx
            .driver
            .node_unpublish_volume(&VolumeId::from("vol-1"), "")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn restart_restores_surviving_volumes() {
        let fx = fixture().await;
        fx.driver
            .node_publish_volume(publish_request(&fx))
            .await
            .unwrap();

        // Simulate a crash: wipe the projected files, then build a fresh
        // driver over the same snapshot with the pod still present.
        tokio::fs::remove_dir_all(fx.tmp.path().join("target/configmaps"))
            .await
            .unwrap();
        let cache = Arc::new(ObjectCache::new());
        seed_cache(&cache).await;
        let pods = StaticPods(HashMap::from([(
            ("n".to_owned(), "p".to_owned()),
            "u".to_owned(),
        )]));
        let restarted = SharedResourceDriver::new(
            Fixture::config(&fx.tmp),
            Arc::clone(&cache),
            Arc::new(FlipReviewer(AtomicBool::new(true))) as Arc<dyn AccessReviewer>,
            Arc::new(pods),
            Arc::new(FakeMounter::default()) as Arc<dyn Mounter>,
            Arc::new(LogEventSink),
        )
        .await
        .unwrap();

        assert_eq!(restarted.registry().len(), 1);
        let file = fx.tmp.path().join("target/configmaps/k1");
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "v1");
        assert_eq!(
            cache.registered_callback_count(&VolumeId::from("vol-1")),
            4
        );
    }

    #[tokio::test]
    async fn restart_drops_records_for_missing_pods() {
        let fx = fixture().await;
        fx.driver
            .node_publish_volume(publish_request(&fx))
            .await
            .unwrap();

        let cache = Arc::new(ObjectCache::new());
        seed_cache(&cache).await;
        let restarted = SharedResourceDriver::new(
            Fixture::config(&fx.tmp),
            cache,
            Arc::new(FlipReviewer(AtomicBool::new(true))) as Arc<dyn AccessReviewer>,
            Arc::new(StaticPods(HashMap::new())),
            Arc::new(FakeMounter::default()) as Arc<dyn Mounter>,
            Arc::new(LogEventSink),
        )
        .await
        .unwrap();

        assert!(restarted.registry().is_empty());
        // Cleanup of the stale staging directory is unpublish's job.
        assert!(fx.tmp.path().join("data/vol-1").exists());
    }

    #[tokio::test]
    async fn node_info_and_capabilities() {
        let fx = fixture().await;
        let info = fx.driver.node_get_info().await.unwrap();
        assert_eq!(info.node_id, "test-node");
        assert_eq!(
            info.accessible_topology.segments[TOPOLOGY_KEY_NODE],
            "test-node"
        );

        assert!(fx.driver.node_get_capabilities().await.unwrap().is_empty());

        let err = fx
            .driver
            .node_stage_volume(&VolumeId::from("vol-1"), "/staging")
            .await
            .unwrap_err();
        assert_eq!(err.code(), RpcCode::Unimplemented);
    }

    #[tokio::test]
    async fn identity_reports_plugin_and_health() {
        let fx = fixture().await;
        let info = fx.driver.get_plugin_info().await.unwrap();
        assert_eq!(info.name, "share.csi.rk8s.io");
        assert!(fx.driver.probe().await.unwrap());
    }
}
