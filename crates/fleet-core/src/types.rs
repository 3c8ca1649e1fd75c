//! Domain types shared across the fleet crates.
//!
//! These describe the managed fleet (services plus one database), the
//! fleet-wide scaling policies, and the revisions the control plane
//! reports back.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of a managed service, unique within a registry.
pub type ServiceName = String;

/// Control-plane identifier of a revision (the short name, not the full path).
pub type RevisionId = String;

// ── Services ───────────────────────────────────────────────────────

/// A deployable service under fleet control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagedService {
    pub name: ServiceName,
    /// Container image deployed on every rollout.
    pub image: String,
    pub region: String,
    pub project: String,
    /// Instance floor applied by the `warm` policy.
    pub min_instances: u32,
    /// Explicit resources, passed on every deploy regardless of policy.
    pub resources: ResourceOverrides,
    pub depends_on_database: bool,
    /// Page that answers 2xx once the service is actually serving.
    pub ready_url: Option<String>,
}

/// CPU and memory limits forwarded to the control plane when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceOverrides {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

impl ResourceOverrides {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

impl fmt::Display for ResourceOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.cpu, &self.memory) {
            (None, None) => write!(f, "unchanged"),
            (Some(cpu), None) => write!(f, "cpu={cpu}"),
            (None, Some(mem)) => write!(f, "memory={mem}"),
            (Some(cpu), Some(mem)) => write!(f, "cpu={cpu} memory={mem}"),
        }
    }
}

// ── Database ──────────────────────────────────────────────────────

/// The single relational database backing the fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseInstance {
    pub name: String,
    pub project: String,
    pub activation_policy: ActivationPolicy,
}

/// Availability mode of the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivationPolicy {
    /// Always running.
    Always,
    /// Stopped.
    Never,
}

impl ActivationPolicy {
    /// Wire value used by the database admin API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationPolicy::Always => "ALWAYS",
            ActivationPolicy::Never => "NEVER",
        }
    }
}

impl fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Policy ────────────────────────────────────────────────────────

/// Fleet-wide target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingPolicy {
    /// Keep at least one instance per service and the database running.
    Warm,
    /// Allow scale-to-zero and stop the database.
    Idle,
}

impl ScalingPolicy {
    /// Instance floor this policy applies to `service`.
    pub fn min_instances_for(&self, service: &ManagedService) -> u32 {
        match self {
            ScalingPolicy::Warm => service.min_instances.max(1),
            ScalingPolicy::Idle => 0,
        }
    }

    pub fn activation_policy(&self) -> ActivationPolicy {
        match self {
            ScalingPolicy::Warm => ActivationPolicy::Always,
            ScalingPolicy::Idle => ActivationPolicy::Never,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScalingPolicy::Warm => "warm",
            ScalingPolicy::Idle => "idle",
        }
    }
}

impl fmt::Display for ScalingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ScalingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warm" | "up" => Ok(ScalingPolicy::Warm),
            "idle" | "down" => Ok(ScalingPolicy::Idle),
            other => Err(format!("unknown scaling policy '{other}' (expected warm or idle)")),
        }
    }
}

// ── Targets ───────────────────────────────────────────────────────

/// Which services an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    All,
    Only(Vec<ServiceName>),
}

impl Targets {
    /// Build from an optional list; an empty or missing list means all.
    pub fn from_names(names: Option<Vec<String>>) -> Self {
        match names {
            Some(names) if !names.is_empty() => Targets::Only(names),
            _ => Targets::All,
        }
    }
}

// ── Revisions ─────────────────────────────────────────────────────

/// An immutable deployed version of a service, as reported by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Revision {
    pub service_name: ServiceName,
    pub revision_id: RevisionId,
    pub created_at: DateTime<Utc>,
    /// Share of traffic currently routed here (0-100).
    pub traffic_percent: u8,
    /// Whether the control plane reports this as the latest ready revision.
    pub is_latest: bool,
}

impl Revision {
    pub fn is_serving(&self) -> bool {
        self.traffic_percent > 0
    }
}

/// Where a traffic update points 100% of traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrafficTarget {
    Latest,
    Revision(RevisionId),
}

impl fmt::Display for TrafficTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficTarget::Latest => f.write_str("latest"),
            TrafficTarget::Revision(id) => f.write_str(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(min: u32) -> ManagedService {
        ManagedService {
            name: "api".to_string(),
            image: "gcr.io/p/api:latest".to_string(),
            region: "europe-west8".to_string(),
            project: "p".to_string(),
            min_instances: min,
            resources: ResourceOverrides::default(),
            depends_on_database: false,
            ready_url: None,
        }
    }

    #[test]
    fn warm_keeps_at_least_one_instance() {
        assert_eq!(ScalingPolicy::Warm.min_instances_for(&service(0)), 1);
        assert_eq!(ScalingPolicy::Warm.min_instances_for(&service(1)), 1);
        assert_eq!(ScalingPolicy::Warm.min_instances_for(&service(3)), 3);
    }

    #[test]
    fn idle_scales_to_zero_and_stops_database() {
        assert_eq!(ScalingPolicy::Idle.min_instances_for(&service(3)), 0);
        assert_eq!(ScalingPolicy::Idle.activation_policy(), ActivationPolicy::Never);
        assert_eq!(ScalingPolicy::Warm.activation_policy(), ActivationPolicy::Always);
    }

    #[test]
    fn policy_parses_aliases() {
        assert_eq!("warm".parse::<ScalingPolicy>(), Ok(ScalingPolicy::Warm));
        assert_eq!("DOWN".parse::<ScalingPolicy>(), Ok(ScalingPolicy::Idle));
        assert!("hot".parse::<ScalingPolicy>().is_err());
    }

    #[test]
    fn activation_policy_wire_format() {
        let json = serde_json::to_string(&ActivationPolicy::Never).unwrap();
        assert_eq!(json, "\"NEVER\"");
    }

    #[test]
    fn empty_target_list_means_all() {
        assert_eq!(Targets::from_names(Some(vec![])), Targets::All);
        assert_eq!(Targets::from_names(None), Targets::All);
        assert_eq!(
            Targets::from_names(Some(vec!["a".into()])),
            Targets::Only(vec!["a".into()])
        );
    }
}
