//! In-memory control plane.
//!
//! Behaves like the real control plane closely enough to drive the
//! orchestrator and pruner: every deploy creates a new revision, traffic
//! can follow the latest revision or be pinned, deleting a serving
//! revision is refused, and deleting a missing one reports
//! `AlreadyAbsent`. Faults can be queued per operation and resource, and
//! every call is recorded in order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use fleet_core::{
    ActivationPolicy, DatabaseInstance, ManagedService, Revision, RevisionId, TrafficTarget,
};

use crate::client::ControlPlaneClient;
use crate::error::{ControlPlaneError, ControlPlaneResult};

/// A recorded control-plane call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deploy { service: String, min_instances: u32 },
    Traffic { service: String, target: TrafficTarget },
    DbPatch { database: String, policy: ActivationPolicy },
    List { service: String },
    Delete { service: String, revision: String },
}

impl Call {
    pub fn point(&self) -> FaultPoint {
        match self {
            Call::Deploy { .. } => FaultPoint::Deploy,
            Call::Traffic { .. } => FaultPoint::Traffic,
            Call::DbPatch { .. } => FaultPoint::DbPatch,
            Call::List { .. } => FaultPoint::List,
            Call::Delete { .. } => FaultPoint::Delete,
        }
    }

    /// Service or database the call targets.
    pub fn resource(&self) -> &str {
        match self {
            Call::Deploy { service, .. }
            | Call::Traffic { service, .. }
            | Call::List { service }
            | Call::Delete { service, .. } => service,
            Call::DbPatch { database, .. } => database,
        }
    }
}

/// Operation a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Deploy,
    Traffic,
    DbPatch,
    List,
    Delete,
}

type CallHook = Arc<dyn Fn(&Call) + Send + Sync>;

#[derive(Debug, Clone)]
enum TrafficState {
    Latest,
    Split(HashMap<String, u8>),
}

#[derive(Debug)]
struct ServiceState {
    revisions: Vec<Revision>,
    traffic: TrafficState,
    min_instances: Option<u32>,
}

impl ServiceState {
    fn new() -> Self {
        Self {
            revisions: Vec::new(),
            traffic: TrafficState::Latest,
            min_instances: None,
        }
    }

    fn latest(&self) -> Option<&Revision> {
        self.revisions.iter().max_by_key(|r| r.created_at)
    }

    fn traffic_for(&self, revision_id: &str) -> u8 {
        match &self.traffic {
            TrafficState::Latest => match self.latest() {
                Some(r) if r.revision_id == revision_id => 100,
                _ => 0,
            },
            TrafficState::Split(split) => split.get(revision_id).copied().unwrap_or(0),
        }
    }

    fn snapshot(&self) -> Vec<Revision> {
        let latest = self.latest().map(|r| r.revision_id.clone());
        self.revisions
            .iter()
            .map(|r| Revision {
                traffic_percent: self.traffic_for(&r.revision_id),
                is_latest: latest.as_deref() == Some(r.revision_id.as_str()),
                ..r.clone()
            })
            .collect()
    }
}

#[derive(Default)]
struct Inner {
    services: HashMap<String, ServiceState>,
    databases: HashMap<String, ActivationPolicy>,
    faults: HashMap<(FaultPoint, String), VecDeque<ControlPlaneError>>,
    calls: Vec<Call>,
    clock: i64,
}

#[derive(Default)]
pub struct InMemoryControlPlane {
    inner: Mutex<Inner>,
    latency: Duration,
    hook: Option<CallHook>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Invoke `hook` synchronously at the start of every call.
    pub fn with_hook(mut self, hook: impl Fn(&Call) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Replace a service's revisions. Traffic follows the given
    /// percentages, or the latest revision when none is serving.
    pub fn seed_revisions(&self, service: &str, revisions: Vec<Revision>) {
        let split: HashMap<String, u8> = revisions
            .iter()
            .filter(|r| r.traffic_percent > 0)
            .map(|r| (r.revision_id.clone(), r.traffic_percent))
            .collect();

        let mut inner = self.lock();
        let state = inner
            .services
            .entry(service.to_string())
            .or_insert_with(ServiceState::new);
        state.traffic = if split.is_empty() {
            TrafficState::Latest
        } else {
            TrafficState::Split(split)
        };
        state.revisions = revisions;
    }

    /// Queue one error for the next call to `point` on `resource`.
    pub fn fail(&self, point: FaultPoint, resource: &str, error: ControlPlaneError) {
        self.fail_times(point, resource, error, 1);
    }

    /// Queue the same error for the next `times` calls.
    pub fn fail_times(&self, point: FaultPoint, resource: &str, error: ControlPlaneError, times: usize) {
        let mut inner = self.lock();
        let queue = inner.faults.entry((point, resource.to_string())).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Remove a revision out-of-band, as a concurrent actor would.
    pub fn remove_revision(&self, service: &str, revision_id: &str) {
        if let Some(state) = self.lock().services.get_mut(service) {
            state.revisions.retain(|r| r.revision_id != revision_id);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn revisions(&self, service: &str) -> Vec<Revision> {
        self.lock()
            .services
            .get(service)
            .map(ServiceState::snapshot)
            .unwrap_or_default()
    }

    pub fn min_instances(&self, service: &str) -> Option<u32> {
        self.lock().services.get(service).and_then(|s| s.min_instances)
    }

    pub fn activation_policy(&self, database: &str) -> Option<ActivationPolicy> {
        self.lock().databases.get(database).copied()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, run the hook, wait, then pop any queued fault.
    async fn enter(&self, call: Call) -> ControlPlaneResult<()> {
        let point = call.point();
        let resource = call.resource().to_string();
        self.lock().calls.push(call.clone());

        if let Some(hook) = &self.hook {
            hook(&call);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut inner = self.lock();
        match inner.faults.get_mut(&(point, resource)).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn timestamp(tick: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + tick, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl ControlPlaneClient for InMemoryControlPlane {
    async fn deploy_service(
        &self,
        service: &ManagedService,
        min_instances: u32,
    ) -> ControlPlaneResult<RevisionId> {
        self.enter(Call::Deploy {
            service: service.name.clone(),
            min_instances,
        })
        .await?;

        let mut inner = self.lock();
        inner.clock += 1;
        let tick = inner.clock;
        let state = inner
            .services
            .entry(service.name.clone())
            .or_insert_with(ServiceState::new);
        state.min_instances = Some(min_instances);

        let revision_id = format!("{}-{tick:05}", service.name);
        state.revisions.push(Revision {
            service_name: service.name.clone(),
            revision_id: revision_id.clone(),
            created_at: timestamp(tick),
            traffic_percent: 0,
            is_latest: true,
        });
        Ok(revision_id)
    }

    async fn update_traffic(
        &self,
        service: &ManagedService,
        target: &TrafficTarget,
    ) -> ControlPlaneResult<()> {
        self.enter(Call::Traffic {
            service: service.name.clone(),
            target: target.clone(),
        })
        .await?;

        let mut inner = self.lock();
        let state = inner.services.get_mut(&service.name).ok_or_else(|| {
            ControlPlaneError::Permanent(format!("service {} not found", service.name))
        })?;
        state.traffic = match target {
            TrafficTarget::Latest => TrafficState::Latest,
            TrafficTarget::Revision(id) => {
                if !state.revisions.iter().any(|r| &r.revision_id == id) {
                    return Err(ControlPlaneError::Permanent(format!("revision {id} not found")));
                }
                TrafficState::Split(HashMap::from([(id.clone(), 100)]))
            }
        };
        Ok(())
    }

    async fn patch_database_activation(
        &self,
        database: &DatabaseInstance,
        policy: ActivationPolicy,
    ) -> ControlPlaneResult<()> {
        self.enter(Call::DbPatch {
            database: database.name.clone(),
            policy,
        })
        .await?;

        self.lock().databases.insert(database.name.clone(), policy);
        Ok(())
    }

    async fn list_revisions(&self, service: &ManagedService) -> ControlPlaneResult<Vec<Revision>> {
        self.enter(Call::List {
            service: service.name.clone(),
        })
        .await?;

        self.lock()
            .services
            .get(&service.name)
            .map(ServiceState::snapshot)
            .ok_or_else(|| ControlPlaneError::Permanent(format!("service {} not found", service.name)))
    }

    async fn delete_revision(
        &self,
        service: &ManagedService,
        revision_id: &str,
    ) -> ControlPlaneResult<()> {
        self.enter(Call::Delete {
            service: service.name.clone(),
            revision: revision_id.to_string(),
        })
        .await?;

        let mut inner = self.lock();
        let state = inner.services.get_mut(&service.name).ok_or_else(|| {
            ControlPlaneError::AlreadyAbsent(format!("{}/{revision_id}", service.name))
        })?;
        if !state.revisions.iter().any(|r| r.revision_id == revision_id) {
            return Err(ControlPlaneError::AlreadyAbsent(format!(
                "{}/{revision_id}",
                service.name
            )));
        }
        if state.traffic_for(revision_id) > 0 {
            return Err(ControlPlaneError::Permanent(format!(
                "revision {revision_id} is serving traffic"
            )));
        }
        state.revisions.retain(|r| r.revision_id != revision_id);
        Ok(())
    }
}
