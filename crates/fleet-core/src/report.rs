//! Execution reports — one entry per attempted (or skipped) operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The remote verb an entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Deploy,
    TrafficUpdate,
    DbPatch,
    ListRevisions,
    Delete,
    ReadinessProbe,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Deploy => "deploy",
            OperationKind::TrafficUpdate => "traffic",
            OperationKind::DbPatch => "db-patch",
            OperationKind::ListRevisions => "list",
            OperationKind::Delete => "delete",
            OperationKind::ReadinessProbe => "ready",
        }
    }
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Attempted and did not succeed.
    Failed,
    /// Never attempted.
    Skipped,
}

impl Outcome {
    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Success => "✓",
            Outcome::Failed => "✗",
            Outcome::Skipped => "-",
        }
    }
}

/// Result of a single operation against a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub resource_name: String,
    pub operation: OperationKind,
    pub outcome: Outcome,
    /// Error message, skip reason, or what was done.
    pub detail: String,
}

impl OperationResult {
    pub fn success(resource: &str, operation: OperationKind, detail: impl Into<String>) -> Self {
        Self::new(resource, operation, Outcome::Success, detail)
    }

    pub fn failed(resource: &str, operation: OperationKind, detail: impl Into<String>) -> Self {
        Self::new(resource, operation, Outcome::Failed, detail)
    }

    pub fn skipped(resource: &str, operation: OperationKind, detail: impl Into<String>) -> Self {
        Self::new(resource, operation, Outcome::Skipped, detail)
    }

    fn new(
        resource: &str,
        operation: OperationKind,
        outcome: Outcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            resource_name: resource.to_string(),
            operation,
            outcome,
            detail: detail.into(),
        }
    }
}

/// Everything that happened during one run, in a stable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Run label, e.g. `scale:idle` or `prune:keep=2`.
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<OperationResult>,
}

impl ExecutionReport {
    pub fn new(
        label: impl Into<String>,
        started_at: DateTime<Utc>,
        results: Vec<OperationResult>,
    ) -> Self {
        Self {
            label: label.into(),
            started_at,
            finished_at: Utc::now(),
            results,
        }
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn failed_count(&self) -> usize {
        self.count(Outcome::Failed)
    }

    /// True when nothing failed. Skipped entries alone do not fail a run.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Entries for one resource, in report order.
    pub fn results_for<'a>(&'a self, resource: &'a str) -> impl Iterator<Item = &'a OperationResult> {
        self.results.iter().filter(move |r| r.resource_name == resource)
    }

    /// Entry for a resource and operation, if one was recorded.
    pub fn find(&self, resource: &str, operation: OperationKind) -> Option<&OperationResult> {
        self.results
            .iter()
            .find(|r| r.resource_name == resource && r.operation == operation)
    }

    /// Append results from a follow-up phase of the same run.
    pub fn extend(&mut self, results: impl IntoIterator<Item = OperationResult>) {
        self.results.extend(results);
        self.finished_at = Utc::now();
    }
}

/// Render a report as a human-readable table.
pub fn format_report(report: &ExecutionReport) -> String {
    let mut out = String::new();

    let elapsed = report.finished_at - report.started_at;
    out.push_str(&format!(
        "\n{} ({} operations, {:.1}s)\n\n",
        report.label,
        report.results.len(),
        elapsed.num_milliseconds() as f64 / 1000.0
    ));

    let width = report
        .results
        .iter()
        .map(|r| r.resource_name.len())
        .max()
        .unwrap_or(0)
        .max(8);

    for r in &report.results {
        out.push_str(&format!(
            "  {} {:<width$}  {:<9} {}\n",
            r.outcome.symbol(),
            r.resource_name,
            r.operation.label(),
            r.detail,
        ));
    }

    out.push_str(&format!(
        "\n  {} succeeded, {} failed, {} skipped\n",
        report.count(Outcome::Success),
        report.count(Outcome::Failed),
        report.count(Outcome::Skipped),
    ));

    out
}
