//! FleetRegistry — validated, in-memory description of the managed fleet.
//!
//! Built once from configuration and never mutated during a run. All
//! lookups are pure; nothing here talks to the network.

use std::collections::HashSet;

use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::types::*;

/// One step of a resolved deployment order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Patch the database activation policy.
    Database(DatabaseInstance),
    /// Deploy a service and move its traffic to the new revision.
    Service(ManagedService),
}

#[derive(Debug, Clone)]
pub struct FleetRegistry {
    services: Vec<ManagedService>,
    database: DatabaseInstance,
}

impl FleetRegistry {
    /// Build a registry, rejecting empty or duplicate service names.
    pub fn new(database: DatabaseInstance, services: Vec<ManagedService>) -> FleetResult<Self> {
        if database.name.trim().is_empty() {
            return Err(FleetError::Configuration(
                "database name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for service in &services {
            if service.name.trim().is_empty() {
                return Err(FleetError::Configuration(
                    "service name must not be empty".to_string(),
                ));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(FleetError::Configuration(format!(
                    "duplicate service name: {}",
                    service.name
                )));
            }
        }

        Ok(Self { services, database })
    }

    /// Build a registry from a parsed `fleet.toml`.
    ///
    /// Per-service project/region fall back to `[defaults]`.
    pub fn from_config(config: &FleetConfig) -> FleetResult<Self> {
        let defaults = &config.defaults;

        let database = DatabaseInstance {
            name: config.database.name.clone(),
            project: config
                .database
                .project
                .clone()
                .or_else(|| defaults.project.clone())
                .ok_or_else(|| {
                    FleetError::Configuration(format!(
                        "database {} has no project and [defaults] sets none",
                        config.database.name
                    ))
                })?,
            activation_policy: config
                .database
                .activation_policy
                .unwrap_or(ActivationPolicy::Always),
        };

        let services = config
            .services
            .iter()
            .map(|svc| {
                let project = svc
                    .project
                    .clone()
                    .or_else(|| defaults.project.clone())
                    .ok_or_else(|| {
                        FleetError::Configuration(format!("service {} has no project", svc.name))
                    })?;
                let region = svc
                    .region
                    .clone()
                    .or_else(|| defaults.region.clone())
                    .ok_or_else(|| {
                        FleetError::Configuration(format!("service {} has no region", svc.name))
                    })?;
                if svc.image.trim().is_empty() {
                    return Err(FleetError::Configuration(format!(
                        "service {} has no image",
                        svc.name
                    )));
                }

                Ok(ManagedService {
                    name: svc.name.clone(),
                    image: svc.image.clone(),
                    region,
                    project,
                    min_instances: svc.min_instances.unwrap_or(1),
                    resources: ResourceOverrides {
                        cpu: svc.cpu.clone(),
                        memory: svc.memory.clone(),
                    },
                    depends_on_database: svc.depends_on_database,
                    ready_url: svc.ready_url.clone(),
                })
            })
            .collect::<FleetResult<Vec<_>>>()?;

        Self::new(database, services)
    }

    /// All services in registry order.
    pub fn list_services(&self) -> &[ManagedService] {
        &self.services
    }

    pub fn database(&self) -> &DatabaseInstance {
        &self.database
    }

    pub fn get(&self, name: &str) -> Option<&ManagedService> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Resolve a target selection into services, in registry order.
    ///
    /// Unknown names fail the whole resolution; a name listed twice is a
    /// configuration error.
    pub fn resolve_targets(&self, targets: &Targets) -> FleetResult<Vec<ManagedService>> {
        let names = match targets {
            Targets::All => return Ok(self.services.clone()),
            Targets::Only(names) => names,
        };

        let mut wanted = HashSet::new();
        for name in names {
            if self.get(name).is_none() {
                return Err(FleetError::UnknownService(name.clone()));
            }
            if !wanted.insert(name.as_str()) {
                return Err(FleetError::Configuration(format!(
                    "service {name} listed more than once"
                )));
            }
        }

        Ok(self
            .services
            .iter()
            .filter(|s| wanted.contains(s.name.as_str()))
            .cloned()
            .collect())
    }

    /// Order in which a policy touches `targets`.
    ///
    /// The database step comes first when any target depends on it;
    /// services follow in registry order.
    pub fn resolve_deployment_order(&self, targets: &[ManagedService]) -> Vec<PlanStep> {
        let mut steps = Vec::with_capacity(targets.len() + 1);
        if targets.iter().any(|s| s.depends_on_database) {
            steps.push(PlanStep::Database(self.database.clone()));
        }
        steps.extend(targets.iter().cloned().map(PlanStep::Service));
        steps
    }
}
