use std::sync::Arc;

use fleet_control::{CancelSignal, ControlPlaneClient};
use fleet_core::ExecutionReport;
use fleet_prune::RevisionPruner;

use super::{Fleet, targets};

pub async fn run(
    fleet: &Fleet,
    client: Arc<dyn ControlPlaneClient>,
    keep: usize,
    services: Vec<String>,
    cancel: CancelSignal,
) -> anyhow::Result<ExecutionReport> {
    let pruner = RevisionPruner::new(fleet.registry.clone(), client, &fleet.settings);
    let report = pruner
        .prune_retired_with_cancel(&targets(services), keep, cancel)
        .await?;
    Ok(report)
}
