//! fleet-scaling — warm/idle scaling across the service fleet.

pub mod orchestrator;
pub mod readiness;

pub use orchestrator::ScalingOrchestrator;
pub use readiness::{HttpProbe, ProbeResult, ReadinessProbe, ReadinessWaiter};
