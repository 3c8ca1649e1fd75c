//! fleet-prune — deletes retired service revisions under a retention rule.

pub mod pruner;
pub mod retention;

pub use pruner::RevisionPruner;
pub use retention::{RetentionPlan, RetentionReason, plan_retention};
