use std::sync::Arc;

use tracing::info;

use fleet_control::{CancelSignal, ControlPlaneClient};
use fleet_core::{ExecutionReport, ScalingPolicy};
use fleet_scaling::{HttpProbe, ReadinessWaiter, ScalingOrchestrator};

use super::{Fleet, targets};

pub async fn run(
    fleet: &Fleet,
    client: Arc<dyn ControlPlaneClient>,
    policy: ScalingPolicy,
    services: Vec<String>,
    wait_ready: bool,
    cancel: CancelSignal,
) -> anyhow::Result<ExecutionReport> {
    let mut orchestrator = ScalingOrchestrator::new(fleet.registry.clone(), client, &fleet.settings);

    if wait_ready {
        if policy == ScalingPolicy::Idle {
            info!("--wait-ready has no effect when idling");
        }
        let probe = Arc::new(HttpProbe::new(fleet.settings.call_timeout)?);
        orchestrator = orchestrator.with_readiness(ReadinessWaiter::new(probe, &fleet.settings));
    }

    let report = orchestrator
        .apply_policy_with_cancel(policy, &targets(services), cancel)
        .await?;
    Ok(report)
}
