//! Dry run of a scaling policy: the resolved order of steps and what
//! each would apply. No remote calls are made.

use std::fmt::Write;

use serde_json::json;

use fleet_core::{PlanStep, ScalingPolicy};

use super::{Fleet, OutputFormat, targets};

pub fn render(
    fleet: &Fleet,
    policy: ScalingPolicy,
    services: Vec<String>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let resolved = fleet.registry.resolve_targets(&targets(services))?;
    let steps = fleet.registry.resolve_deployment_order(&resolved);

    match format {
        OutputFormat::Json => {
            let steps: Vec<_> = steps
                .iter()
                .map(|step| match step {
                    PlanStep::Database(db) => json!({
                        "kind": "database",
                        "name": db.name,
                        "project": db.project,
                        "activation_policy": policy.activation_policy().as_str(),
                    }),
                    PlanStep::Service(s) => json!({
                        "kind": "service",
                        "name": s.name,
                        "project": s.project,
                        "region": s.region,
                        "image": s.image,
                        "min_instances": policy.min_instances_for(s),
                        "cpu": s.resources.cpu,
                        "memory": s.resources.memory,
                        "after_database": s.depends_on_database,
                    }),
                })
                .collect();
            Ok(serde_json::to_string_pretty(&json!({
                "policy": policy.label(),
                "steps": steps,
            }))?)
        }
        OutputFormat::Text => {
            let mut out = String::new();
            writeln!(out, "Plan: scale {policy} ({} services)", resolved.len())?;
            writeln!(out, "{}", "─".repeat(60))?;
            for (i, step) in steps.iter().enumerate() {
                match step {
                    PlanStep::Database(db) => writeln!(
                        out,
                        "{:>3}. database {:<20} activation {}",
                        i + 1,
                        db.name,
                        policy.activation_policy()
                    )?,
                    PlanStep::Service(s) => writeln!(
                        out,
                        "{:>3}. service  {:<20} min_instances={} resources {}{}",
                        i + 1,
                        s.name,
                        policy.min_instances_for(s),
                        s.resources,
                        if s.depends_on_database { " (after database)" } else { "" }
                    )?,
                }
            }
            Ok(out)
        }
    }
}
