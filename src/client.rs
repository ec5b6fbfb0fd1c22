//! Seams to the cluster-side collaborators.
//!
//! The informer layer, the subject-access-review endpoint, and the event
//! recorder all live outside this crate; the driver consumes them through the
//! traits below.  Production wiring implements these against the cluster API;
//! tests substitute scripted fakes.

use async_trait::async_trait;
use tracing::error;

use crate::error::CsiError;
use crate::types::{PodInfo, ResourceKey, SharedResourceKind};

/// Authorization oracle: may a pod consume a share?
///
/// The driver treats any `Err` as a denial, so implementations are free to
/// surface transient API failures directly.
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    /// Answer whether the pod identified by `(pod_namespace, pod_name,
    /// service_account)` may consume the share named `share_id`.
    async fn can_use(
        &self,
        share_id: &str,
        pod_namespace: &str,
        pod_name: &str,
        service_account: &str,
    ) -> Result<bool, CsiError>;
}

/// Pod lookup used at startup to revalidate persisted volume records.
#[async_trait]
pub trait PodResolver: Send + Sync {
    /// Return the live pod named `name` in `namespace`, or `None` if it no
    /// longer exists.
    async fn get_pod(&self, namespace: &str, name: &str) -> Option<PodInfo>;
}

/// Destination for observable events raised against subject objects.
///
/// An error log in the pod's stdout may be missed; filesystem failures during
/// asynchronous sync are additionally reported here so the cluster-side event
/// recorder can expose them.
pub trait EventSink: Send + Sync {
    /// Report a filesystem error encountered while projecting the resource
    /// identified by `kind`/`key`.
    fn filesystem_error(&self, kind: SharedResourceKind, key: &ResourceKey, err: &CsiError);
}

/// [`EventSink`] that records events through `tracing` only.  Stands in when
/// no cluster event recorder is wired up.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn filesystem_error(&self, kind: SharedResourceKind, key: &ResourceKey, err: &CsiError) {
        error!(%kind, %key, error = %err, "filesystem error while projecting shared resource");
    }
}
