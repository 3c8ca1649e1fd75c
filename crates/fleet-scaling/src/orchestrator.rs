//! ScalingOrchestrator — applies a fleet-wide scaling policy.
//!
//! ```text
//! resolve targets (fail fast on unknown names)
//!   ├── independent services ──────────────► deploy ─► traffic
//!   └── database patch ──ok──► dependents ─► deploy ─► traffic
//!                      └─err─► dependents Skipped
//! ```
//!
//! Independent services never wait for the database. Remote calls are
//! bounded by a semaphore; a service holds one permit for its deploy and
//! traffic update. Every targeted service yields exactly two entries
//! (deploy, traffic) and the database one entry when it is patched.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fleet_control::{CANCELLED, CancelSignal, ControlPlaneClient, ControlPlaneError, RetryPolicy};
use fleet_core::{
    DatabaseInstance, ExecutionReport, ExecutionSettings, FleetRegistry, FleetResult,
    ManagedService, OperationKind, OperationResult, Outcome, PlanStep, ScalingPolicy, Targets,
    TrafficTarget,
};

use crate::readiness::ReadinessWaiter;

const DATABASE_FAILED: &str = "database patch failed";
const DEPLOY_FAILED: &str = "deploy failed";

/// Report entry tagged with its position in the final report.
type Slotted = (usize, OperationResult);

/// State shared by every task of one run.
struct Run {
    client: Arc<dyn ControlPlaneClient>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    policy: ScalingPolicy,
}

pub struct ScalingOrchestrator {
    registry: Arc<FleetRegistry>,
    client: Arc<dyn ControlPlaneClient>,
    retry: RetryPolicy,
    concurrency: usize,
    readiness: Option<ReadinessWaiter>,
}

impl ScalingOrchestrator {
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
            readiness: None,
        }
    }

    /// After a warm run, wait for deployed services with a `ready_url`
    /// to answer before returning the report.
    pub fn with_readiness(mut self, waiter: ReadinessWaiter) -> Self {
        self.readiness = Some(waiter);
        self
    }

    /// Apply `policy` to `targets` and report every operation.
    ///
    /// Only target resolution can fail; remote failures are recorded in
    /// the report.
    pub async fn apply_policy(
        &self,
        policy: ScalingPolicy,
        targets: &Targets,
    ) -> FleetResult<ExecutionReport> {
        self.apply_policy_with_cancel(policy, targets, CancelSignal::never())
            .await
    }

    /// Like `apply_policy`, but stops dispatching once `cancel` fires.
    /// Undispatched operations are reported Skipped ("cancelled").
    pub async fn apply_policy_with_cancel(
        &self,
        policy: ScalingPolicy,
        targets: &Targets,
        cancel: CancelSignal,
    ) -> FleetResult<ExecutionReport> {
        let started_at = Utc::now();
        let services = self.registry.resolve_targets(targets)?;
        let steps = self.registry.resolve_deployment_order(&services);

        info!(
            %policy,
            services = services.len(),
            concurrency = self.concurrency,
            "applying scaling policy"
        );

        let run = Arc::new(Run {
            client: self.client.clone(),
            retry: self.retry.clone(),
            permits: Arc::new(Semaphore::new(self.concurrency)),
            policy,
        });

        let mut database = None;
        let mut dependents = Vec::new();
        let mut tasks: Vec<(JoinHandle<Vec<Slotted>>, Vec<Slotted>)> = Vec::new();
        let mut slot = 0;

        for step in steps {
            match step {
                PlanStep::Database(db) => database = Some(db),
                PlanStep::Service(service) => {
                    slot += 1;
                    if service.depends_on_database {
                        dependents.push((slot, service));
                    } else {
                        let placeholder = aborted_service(slot, &service.name);
                        let handle =
                            tokio::spawn(scale_service(run.clone(), slot, service, cancel.clone()));
                        tasks.push((handle, placeholder));
                    }
                }
            }
        }

        if !dependents.is_empty() {
            match database {
                Some(db) => {
                    let mut placeholder = vec![(
                        0,
                        OperationResult::failed(&db.name, OperationKind::DbPatch, "task aborted"),
                    )];
                    for (slot, service) in &dependents {
                        placeholder.extend(aborted_service(*slot, &service.name));
                    }
                    let handle = tokio::spawn(database_then_dependents(
                        run.clone(),
                        db,
                        dependents,
                        cancel.clone(),
                    ));
                    tasks.push((handle, placeholder));
                }
                None => {
                    for (slot, service) in dependents {
                        let placeholder = aborted_service(slot, &service.name);
                        let handle =
                            tokio::spawn(scale_service(run.clone(), slot, service, cancel.clone()));
                        tasks.push((handle, placeholder));
                    }
                }
            }
        }

        let mut entries = join_tasks(tasks).await;
        entries.sort_by_key(|(slot, _)| *slot);

        let mut report = ExecutionReport::new(
            format!("scale:{policy}"),
            started_at,
            entries.into_iter().map(|(_, result)| result).collect(),
        );

        if let (ScalingPolicy::Warm, Some(waiter)) = (policy, &self.readiness) {
            let probed = waiter.wait_all(&services, &report, cancel).await;
            report.extend(probed);
        }
        info!(
            %policy,
            succeeded = report.count(Outcome::Success),
            failed = report.count(Outcome::Failed),
            skipped = report.count(Outcome::Skipped),
            "scaling run finished"
        );
        Ok(report)
    }
}

/// Deploy one service, then point its traffic at the latest revision.
async fn scale_service(
    run: Arc<Run>,
    slot: usize,
    service: ManagedService,
    mut cancel: CancelSignal,
) -> Vec<Slotted> {
    let name = service.name.as_str();

    let Some(_permit) = cancel.acquire(&run.permits).await else {
        debug!(service = name, "not dispatched, run cancelled");
        return skipped_service(slot, name, CANCELLED);
    };

    let min_instances = run.policy.min_instances_for(&service);
    let deployed = run
        .retry
        .run("deploy", name, &mut cancel, || {
            run.client.deploy_service(&service, min_instances)
        })
        .await;

    let revision = match deployed {
        Ok(revision) => revision,
        Err(ControlPlaneError::Cancelled) => {
            debug!(service = name, "deploy abandoned, run cancelled");
            return skipped_service(slot, name, CANCELLED);
        }
        Err(e) => {
            warn!(service = name, error = %e, "deploy failed");
            return vec![
                (slot, OperationResult::failed(name, OperationKind::Deploy, e.to_string())),
                (slot, OperationResult::skipped(name, OperationKind::TrafficUpdate, DEPLOY_FAILED)),
            ];
        }
    };
    info!(service = name, %revision, min_instances, "deployed");

    let deploy = (
        slot,
        OperationResult::success(
            name,
            OperationKind::Deploy,
            format!(
                "{revision} (min_instances={min_instances}, resources {})",
                service.resources
            ),
        ),
    );

    if cancel.is_cancelled() {
        return vec![
            deploy,
            (slot, OperationResult::skipped(name, OperationKind::TrafficUpdate, CANCELLED)),
        ];
    }

    let target = TrafficTarget::Latest;
    let traffic = match run
        .retry
        .run("update_traffic", name, &mut cancel, || {
            run.client.update_traffic(&service, &target)
        })
        .await
    {
        Ok(()) => OperationResult::success(
            name,
            OperationKind::TrafficUpdate,
            format!("100% to latest ({revision})"),
        ),
        Err(ControlPlaneError::Cancelled) => {
            OperationResult::skipped(name, OperationKind::TrafficUpdate, CANCELLED)
        }
        Err(e) => {
            // The previous traffic split keeps serving.
            warn!(service = name, %revision, error = %e, "traffic update failed after deploy");
            OperationResult::failed(name, OperationKind::TrafficUpdate, e.to_string())
        }
    };

    vec![deploy, (slot, traffic)]
}

/// Patch the database, then scale the services that depend on it.
async fn database_then_dependents(
    run: Arc<Run>,
    database: DatabaseInstance,
    dependents: Vec<(usize, ManagedService)>,
    mut cancel: CancelSignal,
) -> Vec<Slotted> {
    let activation = run.policy.activation_policy();
    let mut entries = Vec::with_capacity(1 + dependents.len() * 2);

    let blocked = match cancel.acquire(&run.permits).await {
        None => {
            entries.push((
                0,
                OperationResult::skipped(&database.name, OperationKind::DbPatch, CANCELLED),
            ));
            Some(CANCELLED)
        }
        Some(permit) => {
            let result = run
                .retry
                .run("patch_database", &database.name, &mut cancel, || {
                    run.client.patch_database_activation(&database, activation)
                })
                .await;
            drop(permit);

            match result {
                Err(ControlPlaneError::Cancelled) => {
                    entries.push((
                        0,
                        OperationResult::skipped(&database.name, OperationKind::DbPatch, CANCELLED),
                    ));
                    Some(CANCELLED)
                }
                Ok(()) => {
                    info!(database = %database.name, %activation, "database activation applied");
                    entries.push((
                        0,
                        OperationResult::success(
                            &database.name,
                            OperationKind::DbPatch,
                            format!("activation policy {activation}"),
                        ),
                    ));
                    None
                }
                Err(e) => {
                    error!(
                        database = %database.name,
                        error = %e,
                        dependents = dependents.len(),
                        "database patch failed, skipping dependent services"
                    );
                    entries.push((
                        0,
                        OperationResult::failed(&database.name, OperationKind::DbPatch, e.to_string()),
                    ));
                    Some(DATABASE_FAILED)
                }
            }
        }
    };

    if let Some(reason) = blocked {
        for (slot, service) in &dependents {
            entries.extend(skipped_service(*slot, &service.name, reason));
        }
        return entries;
    }

    let tasks = dependents
        .into_iter()
        .map(|(slot, service)| {
            let placeholder = aborted_service(slot, &service.name);
            let handle = tokio::spawn(scale_service(run.clone(), slot, service, cancel.clone()));
            (handle, placeholder)
        })
        .collect();
    entries.extend(join_tasks(tasks).await);
    entries
}

/// Await every task. A task that panicked contributes its placeholder
/// entries so the report stays complete.
async fn join_tasks(tasks: Vec<(JoinHandle<Vec<Slotted>>, Vec<Slotted>)>) -> Vec<Slotted> {
    let mut entries = Vec::new();
    for (handle, placeholder) in tasks {
        match handle.await {
            Ok(done) => entries.extend(done),
            Err(e) => {
                error!(error = %e, "scaling task aborted");
                entries.extend(placeholder);
            }
        }
    }
    entries
}

fn skipped_service(slot: usize, name: &str, reason: &str) -> Vec<Slotted> {
    vec![
        (slot, OperationResult::skipped(name, OperationKind::Deploy, reason)),
        (slot, OperationResult::skipped(name, OperationKind::TrafficUpdate, reason)),
    ]
}

fn aborted_service(slot: usize, name: &str) -> Vec<Slotted> {
    vec![
        (slot, OperationResult::failed(name, OperationKind::Deploy, "task aborted")),
        (slot, OperationResult::skipped(name, OperationKind::TrafficUpdate, DEPLOY_FAILED)),
    ]
}
