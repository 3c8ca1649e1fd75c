//! RevisionPruner — deletes retired revisions across the fleet.
//!
//! Each service is handled by its own task holding one concurrency
//! permit: list revisions, plan retention, then delete the retired
//! revisions one at a time. A failed listing or deletion is recorded and
//! never stops other deletions or other services.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fleet_control::{CANCELLED, CancelSignal, ControlPlaneClient, ControlPlaneError, RetryPolicy};
use fleet_core::{
    ExecutionReport, ExecutionSettings, FleetError, FleetRegistry, FleetResult, ManagedService,
    OperationKind, OperationResult, Outcome, Targets,
};

use crate::retention::plan_retention;

pub struct RevisionPruner {
    registry: Arc<FleetRegistry>,
    client: Arc<dyn ControlPlaneClient>,
    retry: RetryPolicy,
    concurrency: usize,
}

struct Run {
    client: Arc<dyn ControlPlaneClient>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    keep_latest: usize,
}

impl RevisionPruner {
    pub fn new(
        registry: Arc<FleetRegistry>,
        client: Arc<dyn ControlPlaneClient>,
        settings: &ExecutionSettings,
    ) -> Self {
        Self {
            registry,
            client,
            retry: RetryPolicy::from_settings(settings),
            concurrency: settings.concurrency.max(1),
        }
    }

    /// Delete every revision of `targets` outside the newest
    /// `keep_latest`, except revisions serving traffic or reported latest.
    pub async fn prune_retired(
        &self,
        targets: &Targets,
        keep_latest: usize,
    ) -> FleetResult<ExecutionReport> {
        self.prune_retired_with_cancel(targets, keep_latest, CancelSignal::never())
            .await
    }

    pub async fn prune_retired_with_cancel(
        &self,
        targets: &Targets,
        keep_latest: usize,
        cancel: CancelSignal,
    ) -> FleetResult<ExecutionReport> {
        if keep_latest == 0 {
            return Err(FleetError::InvalidRetention(keep_latest));
        }
        let started_at = Utc::now();
        let services = self.registry.resolve_targets(targets)?;

        info!(
            services = services.len(),
            keep_latest,
            concurrency = self.concurrency,
            "pruning retired revisions"
        );

        let run = Arc::new(Run {
            client: self.client.clone(),
            retry: self.retry.clone(),
            permits: Arc::new(Semaphore::new(self.concurrency)),
            keep_latest,
        });

        let tasks: Vec<(String, JoinHandle<Vec<OperationResult>>)> = services
            .into_iter()
            .map(|service| {
                let name = service.name.clone();
                let handle = tokio::spawn(prune_service(run.clone(), service, cancel.clone()));
                (name, handle)
            })
            .collect();

        let mut results = Vec::new();
        for (name, handle) in tasks {
            match handle.await {
                Ok(done) => results.extend(done),
                Err(e) => {
                    error!(service = %name, error = %e, "prune task aborted");
                    results.push(OperationResult::failed(
                        &name,
                        OperationKind::ListRevisions,
                        format!("task aborted: {e}"),
                    ));
                }
            }
        }

        let report = ExecutionReport::new(format!("prune:keep={keep_latest}"), started_at, results);
        info!(
            succeeded = report.count(Outcome::Success),
            failed = report.count(Outcome::Failed),
            skipped = report.count(Outcome::Skipped),
            "prune run finished"
        );
        Ok(report)
    }
}

/// Resource name of a revision in the report.
fn revision_resource(service: &str, revision_id: &str) -> String {
    format!("{service}/{revision_id}")
}

async fn prune_service(
    run: Arc<Run>,
    service: ManagedService,
    mut cancel: CancelSignal,
) -> Vec<OperationResult> {
    let name = service.name.as_str();

    let Some(_permit) = cancel.acquire(&run.permits).await else {
        return vec![OperationResult::skipped(name, OperationKind::ListRevisions, CANCELLED)];
    };

    let revisions = match run
        .retry
        .run("list_revisions", name, &mut cancel, || run.client.list_revisions(&service))
        .await
    {
        Ok(revisions) => revisions,
        Err(ControlPlaneError::Cancelled) => {
            return vec![OperationResult::skipped(name, OperationKind::ListRevisions, CANCELLED)];
        }
        Err(e) => {
            warn!(service = name, error = %e, "listing revisions failed");
            return vec![OperationResult::failed(
                name,
                OperationKind::ListRevisions,
                e.to_string(),
            )];
        }
    };

    let plan = plan_retention(&revisions, run.keep_latest);
    for (revision, reason) in &plan.retained {
        debug!(service = name, revision = %revision.revision_id, %reason, "retained");
    }
    info!(
        service = name,
        revisions = revisions.len(),
        retained = plan.retained.len(),
        retired = plan.retired.len(),
        "retention planned"
    );

    let mut results = Vec::with_capacity(1 + plan.retired.len());
    results.push(OperationResult::success(
        name,
        OperationKind::ListRevisions,
        format!(
            "{} revisions, {} retained, {} retired",
            revisions.len(),
            plan.retained.len(),
            plan.retired.len()
        ),
    ));

    for revision in &plan.retired {
        let resource = revision_resource(name, &revision.revision_id);
        if cancel.is_cancelled() {
            results.push(OperationResult::skipped(&resource, OperationKind::Delete, CANCELLED));
            continue;
        }

        let deleted = run
            .retry
            .run("delete_revision", &resource, &mut cancel, || {
                run.client.delete_revision(&service, &revision.revision_id)
            })
            .await;

        results.push(match deleted {
            Ok(()) => {
                info!(service = name, revision = %revision.revision_id, "revision deleted");
                OperationResult::success(&resource, OperationKind::Delete, "deleted")
            }
            Err(ControlPlaneError::AlreadyAbsent(_)) => {
                debug!(service = name, revision = %revision.revision_id, "revision already absent");
                OperationResult::success(&resource, OperationKind::Delete, "already absent")
            }
            Err(ControlPlaneError::Cancelled) => {
                debug!(service = name, revision = %revision.revision_id, "delete abandoned, run cancelled");
                OperationResult::skipped(&resource, OperationKind::Delete, CANCELLED)
            }
            Err(e) => {
                warn!(service = name, revision = %revision.revision_id, error = %e, "delete failed");
                OperationResult::failed(&resource, OperationKind::Delete, e.to_string())
            }
        });
    }

    results
}
