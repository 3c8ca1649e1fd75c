//! fleet-core — types, configuration, registry and reports for the
//! service fleet lifecycle manager.
//!
//! # Components
//!
//! - **`types`** — services, database, scaling policies, revisions
//! - **`config`** — `fleet.toml` parsing
//! - **`registry`** — validated, immutable view of the fleet
//! - **`report`** — per-operation outcomes collected for a run

pub mod config;
pub mod error;
pub mod registry;
pub mod report;
pub mod types;

pub use config::{ExecutionSettings, FleetConfig};
pub use error::{FleetError, FleetResult};
pub use registry::{FleetRegistry, PlanStep};
pub use report::{ExecutionReport, OperationKind, OperationResult, Outcome};
pub use types::*;
