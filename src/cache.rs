//! Object cache facade.
//!
//! An abstraction over the upstream informer layer: lookup-by-key for
//! ConfigMaps, Secrets, and Shares, plus registration of per-volume
//! upsert/delete callbacks keyed by volume ID.  The upstream watcher feeds
//! events in through the `upsert_*`/`delete_*` methods; the facade stores the
//! latest object and fans the event out to every registered callback.
//!
//! Delivery contract:
//! - a registered callback is invoked for every event of its kind; filtering
//!   by resource key is the callback's responsibility,
//! - delivery is at-least-once and ordered per key,
//! - callbacks for a single token are never invoked concurrently (fan-out
//!   awaits each callback in turn),
//! - unregistering an absent token is a no-op.

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use crate::types::{ConfigMap, Payload, ResourceKey, Secret, Share, VolumeId};

/// Future returned by an event callback.
pub type CallbackFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback invoked with the key and current payload of an upserted resource.
pub type ResourceUpsertCallback = Arc<dyn Fn(ResourceKey, Payload) -> CallbackFuture + Send + Sync>;

/// Callback invoked with the key of a deleted resource.
pub type ResourceDeleteCallback = Arc<dyn Fn(ResourceKey) -> CallbackFuture + Send + Sync>;

/// Callback invoked with the new state of an updated share.
pub type ShareUpdateCallback = Arc<dyn Fn(Share) -> CallbackFuture + Send + Sync>;

/// Callback invoked with the name of a deleted share.
pub type ShareDeleteCallback = Arc<dyn Fn(String) -> CallbackFuture + Send + Sync>;

/// Process-wide cache of upstream objects and per-volume event callbacks.
#[derive(Default)]
pub struct ObjectCache {
    config_maps: DashMap<ResourceKey, ConfigMap>,
    secrets: DashMap<ResourceKey, Secret>,
    shares: DashMap<String, Share>,

    config_map_upsert: DashMap<VolumeId, ResourceUpsertCallback>,
    config_map_delete: DashMap<VolumeId, ResourceDeleteCallback>,
    secret_upsert: DashMap<VolumeId, ResourceUpsertCallback>,
    secret_delete: DashMap<VolumeId, ResourceDeleteCallback>,
    share_update: DashMap<VolumeId, ShareUpdateCallback>,
    share_delete: DashMap<VolumeId, ShareDeleteCallback>,
}

impl ObjectCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    // -- lookups ------------------------------------------------------------

    /// Current state of the ConfigMap at `key`, if the cache holds one.
    pub fn get_config_map(&self, key: &ResourceKey) -> Option<ConfigMap> {
        self.config_maps.get(key).map(|e| e.value().clone())
    }

    /// Current state of the Secret at `key`, if the cache holds one.
    pub fn get_secret(&self, key: &ResourceKey) -> Option<Secret> {
        self.secrets.get(key).map(|e| e.value().clone())
    }

    /// Current state of the Share named `name`, if the cache holds one.
    pub fn get_share(&self, name: &str) -> Option<Share> {
        self.shares.get(name).map(|e| e.value().clone())
    }

    // -- upstream event entry points ----------------------------------------

    /// Store the ConfigMap and fan its payload out to every registered
    /// upsert callback.
    pub async fn upsert_config_map(&self, cm: ConfigMap) {
        let key = cm.key();
        let payload = Payload::from(&cm);
        self.config_maps.insert(key.clone(), cm);
        let callbacks = Self::collect(&self.config_map_upsert);
        for (token, callback) in callbacks {
            debug!(%token, %key, "config map upsert fan-out");
            callback(key.clone(), payload.clone()).await;
        }
    }

    /// Drop the ConfigMap at `key` and fan the deletion out.
    pub async fn delete_config_map(&self, key: &ResourceKey) {
        self.config_maps.remove(key);
        let callbacks = Self::collect(&self.config_map_delete);
        for (token, callback) in callbacks {
            debug!(%token, %key, "config map delete fan-out");
            callback(key.clone()).await;
        }
    }

    /// Store the Secret and fan its payload out to every registered upsert
    /// callback.
    pub async fn upsert_secret(&self, secret: Secret) {
        let key = secret.key();
        let payload = Payload::from(&secret);
        self.secrets.insert(key.clone(), secret);
        let callbacks = Self::collect(&self.secret_upsert);
        for (token, callback) in callbacks {
            debug!(%token, %key, "secret upsert fan-out");
            callback(key.clone(), payload.clone()).await;
        }
    }

    /// Drop the Secret at `key` and fan the deletion out.
    pub async fn delete_secret(&self, key: &ResourceKey) {
        self.secrets.remove(key);
        let callbacks = Self::collect(&self.secret_delete);
        for (token, callback) in callbacks {
            debug!(%token, %key, "secret delete fan-out");
            callback(key.clone()).await;
        }
    }

    /// Store the Share and fan the update out to every registered callback.
    pub async fn upsert_share(&self, share: Share) {
        let name = share.name.clone();
        self.shares.insert(name.clone(), share.clone());
        let callbacks = Self::collect(&self.share_update);
        for (token, callback) in callbacks {
            debug!(%token, share = %name, "share update fan-out");
            callback(share.clone()).await;
        }
    }

    /// Drop the Share named `name` and fan the deletion out.
    pub async fn delete_share(&self, name: &str) {
        self.shares.remove(name);
        let callbacks = Self::collect(&self.share_delete);
        for (token, callback) in callbacks {
            debug!(%token, share = %name, "share delete fan-out");
            callback(name.to_owned()).await;
        }
    }

    // -- callback registration ----------------------------------------------

    /// Register the ConfigMap upsert callback for `token`, replacing any
    /// previous registration.
    pub fn register_config_map_upsert_callback(
        &self,
        token: VolumeId,
        callback: ResourceUpsertCallback,
    ) {
        self.config_map_upsert.insert(token, callback);
    }

    /// Register the ConfigMap delete callback for `token`.
    pub fn register_config_map_delete_callback(
        &self,
        token: VolumeId,
        callback: ResourceDeleteCallback,
    ) {
        self.config_map_delete.insert(token, callback);
    }

    /// Register the Secret upsert callback for `token`.
    pub fn register_secret_upsert_callback(
        &self,
        token: VolumeId,
        callback: ResourceUpsertCallback,
    ) {
        self.secret_upsert.insert(token, callback);
    }

    /// Register the Secret delete callback for `token`.
    pub fn register_secret_delete_callback(
        &self,
        token: VolumeId,
        callback: ResourceDeleteCallback,
    ) {
        self.secret_delete.insert(token, callback);
    }

    /// Register the share update callback for `token`.
    pub fn register_share_update_callback(&self, token: VolumeId, callback: ShareUpdateCallback) {
        self.share_update.insert(token, callback);
    }

    /// Register the share delete callback for `token`.
    pub fn register_share_delete_callback(&self, token: VolumeId, callback: ShareDeleteCallback) {
        self.share_delete.insert(token, callback);
    }

    /// Unregister the ConfigMap upsert callback for `token`.
    pub fn unregister_config_map_upsert_callback(&self, token: &VolumeId) {
        self.config_map_upsert.remove(token);
    }

    /// Unregister the ConfigMap delete callback for `token`.
    pub fn unregister_config_map_delete_callback(&self, token: &VolumeId) {
        self.config_map_delete.remove(token);
    }

    /// Unregister the Secret upsert callback for `token`.
    pub fn unregister_secret_upsert_callback(&self, token: &VolumeId) {
        self.secret_upsert.remove(token);
    }

    /// Unregister the Secret delete callback for `token`.
    pub fn unregister_secret_delete_callback(&self, token: &VolumeId) {
        self.secret_delete.remove(token);
    }

    /// Unregister the share update callback for `token`.
    pub fn unregister_share_update_callback(&self, token: &VolumeId) {
        self.share_update.remove(token);
    }

    /// Unregister the share delete callback for `token`.
    pub fn unregister_share_delete_callback(&self, token: &VolumeId) {
        self.share_delete.remove(token);
    }

    /// Number of callbacks currently registered under `token`, across all
    /// six registries.
    pub fn registered_callback_count(&self, token: &VolumeId) -> usize {
        [
            self.config_map_upsert.contains_key(token),
            self.config_map_delete.contains_key(token),
            self.secret_upsert.contains_key(token),
            self.secret_delete.contains_key(token),
            self.share_update.contains_key(token),
            self.share_delete.contains_key(token),
        ]
        .into_iter()
        .filter(|registered| *registered)
        .count()
    }

    // Snapshot the registered callbacks before invoking any of them, so a
    // callback that re-registers or unregisters entries cannot contend with
    // the fan-out iteration.
    fn collect<C: Clone>(callbacks: &DashMap<VolumeId, C>) -> Vec<(VolumeId, C)> {
        callbacks
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
