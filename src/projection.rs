//! Projection engine.
//!
//! The core reconciler.  Given a volume record it creates the per-pod
//! directory layout, materializes the current backing-resource content to
//! files, registers the callbacks that keep the files in sync, and handles
//! share rebind, revocation, and re-grant.
//!
//! The engine captures the volume record inside the callbacks it registers;
//! deregistration on unpublish or revocation is mandatory so no stale writer
//! outlives its volume.  Share handlers hold the per-record lock for the
//! whole logical operation, which serializes lost-permission and
//! regained-permission sequences per record: the target directory is
//! observably empty between the two.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{
    ObjectCache, ResourceDeleteCallback, ResourceUpsertCallback, ShareDeleteCallback,
    ShareUpdateCallback,
};
use crate::client::{AccessReviewer, EventSink};
use crate::config::DriverConfig;
use crate::error::CsiError;
use crate::registry::{SharedVolumeRecord, VolumeRecord, VolumeRegistry};
use crate::types::{Payload, ResourceKey, Share, SharedResourceKind, VolumeId};

/// Keeps projected files consistent with upstream resource and share state.
pub struct ProjectionEngine {
    cache: Arc<ObjectCache>,
    registry: Arc<VolumeRegistry>,
    reviewer: Arc<dyn AccessReviewer>,
    events: Arc<dyn EventSink>,
    dir_mode: u32,
    file_mode: u32,
}

impl ProjectionEngine {
    /// Create an engine over the given collaborators, taking file and
    /// directory modes from `config`.
    pub fn new(
        cache: Arc<ObjectCache>,
        registry: Arc<VolumeRegistry>,
        reviewer: Arc<dyn AccessReviewer>,
        events: Arc<dyn EventSink>,
        config: &DriverConfig,
    ) -> Self {
        Self {
            cache,
            registry,
            reviewer,
            events,
            dir_mode: config.dir_mode,
            file_mode: config.file_mode,
        }
    }

    /// Wire a volume record into the projection fabric.
    ///
    /// For an allowed record this materializes the current backing content
    /// inline — so filesystem problems surface on the publish path, where the
    /// orchestrator retries at its own cadence — and registers the
    /// backing-resource callbacks.  The share callbacks are registered
    /// unconditionally: a denied record must still react to a later grant.
    pub async fn map_volume(self: &Arc<Self>, record: &SharedVolumeRecord) -> Result<(), CsiError> {
        let rec = record.lock().await;
        let token = rec.volume_id.clone();
        let kind = rec.shared_data_kind;
        let allowed = rec.allowed;
        if allowed {
            self.materialize(&rec).await?;
        }
        drop(rec);

        if allowed {
            self.register_resource_callbacks(record, kind, token.clone());
        }
        self.register_share_callbacks(record, token);
        Ok(())
    }

    // -- file writing -------------------------------------------------------

    /// Ensure the projected directory for the record's current kind exists
    /// and write every data entry of the backing object, if the cache holds
    /// one.  Caller holds the record lock.
    async fn materialize(&self, rec: &VolumeRecord) -> Result<(), CsiError> {
        let dir = rec.projected_dir();
        self.ensure_dir(&dir).await?;
        let payload = match rec.shared_data_kind {
            SharedResourceKind::ConfigMap => self
                .cache
                .get_config_map(&rec.shared_data_key)
                .map(|cm| Payload::from(&cm)),
            SharedResourceKind::Secret => self
                .cache
                .get_secret(&rec.shared_data_key)
                .map(|secret| Payload::from(&secret)),
        };
        if let Some(payload) = payload {
            self.write_payload(&dir, &payload, rec.shared_data_kind, &rec.shared_data_key)
                .await?;
        }
        Ok(())
    }

    /// Create `dir` (idempotent, doubles as both create and update) and
    /// apply the configured directory mode.
    async fn ensure_dir(&self, dir: &Path) -> Result<(), CsiError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CsiError::filesystem(dir, e))?;
        tokio::fs::set_permissions(dir, Permissions::from_mode(self.dir_mode))
            .await
            .map_err(|e| CsiError::filesystem(dir, e))?;
        Ok(())
    }

    /// Write every payload entry into `dir`, one file per entry.
    ///
    /// A failed entry is reported to the event sink and does not stop the
    /// remaining entries; the first error is returned so the publish path can
    /// propagate it.  Tight-loop retry is pointless for host filesystem
    /// problems — the upstream relist rewrites the content at its own
    /// interval.
    async fn write_payload(
        &self,
        dir: &Path,
        payload: &Payload,
        kind: SharedResourceKind,
        key: &ResourceKey,
    ) -> Result<(), CsiError> {
        let mut first_err: Option<CsiError> = None;
        for (entry, value) in &payload.byte_data {
            if let Err(e) = self.write_entry(dir, entry, value).await {
                self.events.filesystem_error(kind, key, &e);
                first_err.get_or_insert(e);
            }
        }
        for (entry, value) in &payload.string_data {
            if let Err(e) = self.write_entry(dir, entry, value.as_bytes()).await {
                self.events.filesystem_error(kind, key, &e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Write one data entry.  Entry keys are used verbatim as filenames; a
    /// key containing a path separator surfaces as the OS error from the
    /// write.
    async fn write_entry(&self, dir: &Path, entry: &str, value: &[u8]) -> Result<(), CsiError> {
        let path = dir.join(entry);
        debug!(path = %path.display(), "create/update projected file");
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| CsiError::filesystem(&path, e))?;
        tokio::fs::set_permissions(&path, Permissions::from_mode(self.file_mode))
            .await
            .map_err(|e| CsiError::filesystem(&path, e))?;
        Ok(())
    }

    // -- event handlers -----------------------------------------------------

    /// Backing-resource upsert: rewrite all entries into the projected
    /// directory.  Non-matching keys are ignored.
    async fn resource_upserted(
        self: Arc<Self>,
        record: SharedVolumeRecord,
        key: ResourceKey,
        payload: Payload,
    ) {
        let rec = record.lock().await;
        if !rec.allowed || rec.shared_data_key != key {
            return;
        }
        let dir = rec.projected_dir();
        let kind = rec.shared_data_kind;
        drop(rec);

        if let Err(e) = self.ensure_dir(&dir).await {
            self.events.filesystem_error(kind, &key, &e);
            return;
        }
        // Per-entry failures were already reported; the relist retries.
        let _ = self.write_payload(&dir, &payload, kind, &key).await;
    }

    /// Backing-resource delete: remove the file named by the event key.
    async fn resource_deleted(self: Arc<Self>, record: SharedVolumeRecord, key: ResourceKey) {
        let rec = record.lock().await;
        if rec.shared_data_key != key {
            return;
        }
        let path = rec.projected_dir().join(key.as_str());
        drop(rec);

        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "remove of projected file failed");
            }
        }
    }

    /// Share update: revoke, rebind, or re-grant the record, in that order
    /// of precedence.
    async fn share_updated(self: Arc<Self>, record: SharedVolumeRecord, share: Share) {
        let mut rec = record.lock().await;
        if rec.shared_data_id != share.name {
            return;
        }
        debug!(volume = %rec.volume_id, share = %share.name, "share update");

        let allowed = self
            .reviewer
            .can_use(
                &share.name,
                &rec.pod_namespace,
                &rec.pod_name,
                &rec.pod_service_account,
            )
            .await
            .unwrap_or(false);
        let lost = rec.allowed && !allowed;
        let gained = allowed && !rec.allowed;
        let new_key = share.backing_resource.key();
        let rebound = share.backing_resource.kind != rec.shared_data_kind
            || new_key != rec.shared_data_key;

        if !lost && !gained && !rebound {
            return;
        }

        let old_dir = rec.projected_dir();
        if lost {
            info!(pod = %rec.pod_name, share = %share.name, "pod no longer has permission for share");
            rec.allowed = false;
            remove_projected_dir(&old_dir).await;
            self.deregister_resource_callbacks(&rec.volume_id);
            drop(rec);
            self.snapshot_registry().await;
            return;
        }

        if rebound {
            remove_projected_dir(&old_dir).await;
            self.deregister_resource_callbacks(&rec.volume_id);
            rec.shared_data_kind = share.backing_resource.kind;
            rec.shared_data_key = new_key;
            rec.shared_data_id = share.name.clone();
        }
        if gained {
            info!(pod = %rec.pod_name, share = %share.name, "pod regained permission for share");
            rec.allowed = true;
        }

        // A still-denied record keeps its new binding but gets no files and
        // no resource callbacks until permission arrives.
        let mut register = false;
        if rec.allowed {
            match self.materialize(&rec).await {
                Ok(()) => register = true,
                Err(e) => {
                    warn!(volume = %rec.volume_id, error = %e, "failed to materialize after share update");
                }
            }
        }
        let kind = rec.shared_data_kind;
        let token = rec.volume_id.clone();
        drop(rec);

        if register {
            self.register_resource_callbacks(&record, kind, token);
        }
        self.snapshot_registry().await;
    }

    /// Share delete: revoke the projected data but keep the volume record,
    /// so a recreated share can re-grant the still-running pod.
    async fn share_deleted(self: Arc<Self>, record: SharedVolumeRecord, share_id: String) {
        let mut rec = record.lock().await;
        if rec.shared_data_id != share_id {
            return;
        }
        info!(volume = %rec.volume_id, share = %share_id, "share deleted, revoking projected data");
        rec.allowed = false;
        let dir = rec.projected_dir();
        remove_projected_dir(&dir).await;
        self.deregister_resource_callbacks(&rec.volume_id);
        drop(rec);
        self.snapshot_registry().await;
    }

    // -- callback wiring ----------------------------------------------------

    fn register_resource_callbacks(
        self: &Arc<Self>,
        record: &SharedVolumeRecord,
        kind: SharedResourceKind,
        token: VolumeId,
    ) {
        let upsert: ResourceUpsertCallback = {
            let engine = Arc::clone(self);
            let record = Arc::clone(record);
            Arc::new(move |key, payload| {
                Box::pin(Arc::clone(&engine).resource_upserted(Arc::clone(&record), key, payload))
            })
        };
        let delete: ResourceDeleteCallback = {
            let engine = Arc::clone(self);
            let record = Arc::clone(record);
            Arc::new(move |key| {
                Box::pin(Arc::clone(&engine).resource_deleted(Arc::clone(&record), key))
            })
        };
        match kind {
            SharedResourceKind::ConfigMap => {
                self.cache
                    .register_config_map_upsert_callback(token.clone(), upsert);
                self.cache.register_config_map_delete_callback(token, delete);
            }
            SharedResourceKind::Secret => {
                self.cache
                    .register_secret_upsert_callback(token.clone(), upsert);
                self.cache.register_secret_delete_callback(token, delete);
            }
        }
    }

    fn register_share_callbacks(self: &Arc<Self>, record: &SharedVolumeRecord, token: VolumeId) {
        let update: ShareUpdateCallback = {
            let engine = Arc::clone(self);
            let record = Arc::clone(record);
            Arc::new(move |share| {
                Box::pin(Arc::clone(&engine).share_updated(Arc::clone(&record), share))
            })
        };
        let delete: ShareDeleteCallback = {
            let engine = Arc::clone(self);
            let record = Arc::clone(record);
            Arc::new(move |share_id| {
                Box::pin(Arc::clone(&engine).share_deleted(Arc::clone(&record), share_id))
            })
        };
        self.cache.register_share_update_callback(token.clone(), update);
        self.cache.register_share_delete_callback(token, delete);
    }

    fn deregister_resource_callbacks(&self, token: &VolumeId) {
        self.cache.unregister_config_map_upsert_callback(token);
        self.cache.unregister_config_map_delete_callback(token);
        self.cache.unregister_secret_upsert_callback(token);
        self.cache.unregister_secret_delete_callback(token);
    }

    /// Persist the registry; in-memory state stays authoritative if the
    /// write fails.
    async fn snapshot_registry(&self) {
        if let Err(e) = self.registry.snapshot().await {
            warn!(error = %e, "failed to persist volume map");
        }
    }
}

async fn remove_projected_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %dir.display(), error = %e, "failed to remove projected directory");
        }
    }
}
