//! The control-plane capability set.

use async_trait::async_trait;

use fleet_core::{ActivationPolicy, DatabaseInstance, ManagedService, Revision, RevisionId, TrafficTarget};

use crate::error::ControlPlaneResult;

/// Remote operations the fleet needs from the cloud control plane.
///
/// Each method is one logical remote call; implementations do not batch.
/// Revision ids returned by `deploy_service` are never stable across
/// calls, even when the parameters are identical.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Roll out `service` with the given instance floor and its resource
    /// overrides. Returns the id of the revision the rollout created.
    async fn deploy_service(
        &self,
        service: &ManagedService,
        min_instances: u32,
    ) -> ControlPlaneResult<RevisionId>;

    /// Route 100% of traffic to `target`.
    async fn update_traffic(
        &self,
        service: &ManagedService,
        target: &TrafficTarget,
    ) -> ControlPlaneResult<()>;

    /// Set the database activation policy. Returns once the change is applied.
    async fn patch_database_activation(
        &self,
        database: &DatabaseInstance,
        policy: ActivationPolicy,
    ) -> ControlPlaneResult<()>;

    async fn list_revisions(&self, service: &ManagedService) -> ControlPlaneResult<Vec<Revision>>;

    /// Delete a revision. A revision that no longer exists yields
    /// `ControlPlaneError::AlreadyAbsent`.
    async fn delete_revision(
        &self,
        service: &ManagedService,
        revision_id: &str,
    ) -> ControlPlaneResult<()>;
}
