//! Readiness probing after a warm scale-up.
//!
//! Services with a `ready_url` whose deploy succeeded are probed until
//! the endpoint answers 2xx or the readiness timeout elapses. The probe
//! interval starts at one second and doubles up to thirty.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use fleet_control::{CANCELLED, CancelSignal, ControlPlaneResult, HttpsTransport};
use fleet_core::{
    ExecutionReport, ExecutionSettings, ManagedService, OperationKind, OperationResult, Outcome,
};

/// Result of a single readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Ready,
    /// The endpoint answered with a non-2xx status.
    NotReady,
    /// The probe could not be executed (connection error, timeout).
    Failed,
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// Probes over HTTP(S) with a GET request.
pub struct HttpProbe {
    transport: HttpsTransport,
}

impl HttpProbe {
    pub fn new(request_timeout: Duration) -> ControlPlaneResult<Self> {
        Ok(Self {
            transport: HttpsTransport::with_webpki_roots(request_timeout)?,
        })
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeResult {
        match self.transport.send(http::Method::GET, url, None, None).await {
            Ok(resp) if resp.is_success() => ProbeResult::Ready,
            Ok(resp) => {
                debug!(url, status = resp.status, "readiness probe not ready");
                ProbeResult::NotReady
            }
            Err(e) => {
                debug!(url, error = %e, "readiness probe failed");
                ProbeResult::Failed
            }
        }
    }
}

pub struct ReadinessWaiter {
    probe: Arc<dyn ReadinessProbe>,
    timeout: Duration,
    initial_interval: Duration,
    max_interval: Duration,
}

impl ReadinessWaiter {
    pub fn new(probe: Arc<dyn ReadinessProbe>, settings: &ExecutionSettings) -> Self {
        Self {
            probe,
            timeout: settings.ready_timeout,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
        }
    }

    /// Probe every service in `services` that has a `ready_url` and a
    /// successful deploy in `report`. Returns one ReadinessProbe entry
    /// per probed service, in the order given.
    pub async fn wait_all(
        &self,
        services: &[ManagedService],
        report: &ExecutionReport,
        cancel: CancelSignal,
    ) -> Vec<OperationResult> {
        let probed: Vec<(&str, String)> = services
            .iter()
            .filter_map(|s| s.ready_url.clone().map(|url| (s.name.as_str(), url)))
            .filter(|(name, _)| {
                report
                    .find(name, OperationKind::Deploy)
                    .is_some_and(|r| r.outcome == Outcome::Success)
            })
            .collect();

        let handles: Vec<_> = probed
            .iter()
            .map(|(name, url)| {
                let probe = self.probe.clone();
                let name = name.to_string();
                let url = url.clone();
                let schedule = (self.timeout, self.initial_interval, self.max_interval);
                let cancel = cancel.clone();
                tokio::spawn(async move { wait_one(probe, name, url, schedule, cancel).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (handle, (name, _)) in handles.into_iter().zip(&probed) {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => OperationResult::failed(
                    name,
                    OperationKind::ReadinessProbe,
                    format!("probe task aborted: {e}"),
                ),
            });
        }
        results
    }
}

async fn wait_one(
    probe: Arc<dyn ReadinessProbe>,
    name: String,
    url: String,
    (timeout, initial_interval, max_interval): (Duration, Duration, Duration),
    mut cancel: CancelSignal,
) -> OperationResult {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut interval = initial_interval;
    let mut attempts = 0u32;
    let mut last;

    loop {
        if cancel.is_cancelled() {
            return OperationResult::skipped(&name, OperationKind::ReadinessProbe, CANCELLED);
        }

        attempts += 1;
        last = probe.probe(&url).await;
        if last == ProbeResult::Ready {
            info!(service = %name, attempts, "service ready");
            return OperationResult::success(
                &name,
                OperationKind::ReadinessProbe,
                format!(
                    "ready after {attempts} probe(s) in {:.1}s",
                    started.elapsed().as_secs_f64()
                ),
            );
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let wait = interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return OperationResult::skipped(&name, OperationKind::ReadinessProbe, CANCELLED);
            }
            _ = tokio::time::sleep(wait) => {}
        }
        interval = (interval * 2).min(max_interval);
    }

    warn!(service = %name, attempts, last = ?last, "service not ready before timeout");
    OperationResult::failed(
        &name,
        OperationKind::ReadinessProbe,
        format!(
            "not ready after {}s ({attempts} probes, last {last:?})",
            timeout.as_secs()
        ),
    )
}
