//! Retention planning.
//!
//! Revisions are ranked newest first by creation time (revision id breaks
//! ties). The first `keep_latest` are retained, plus any revision that
//! serves traffic or is the control plane's latest. Everything else is
//! retired.

use std::fmt;

use fleet_core::Revision;

/// Why a revision survives pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionReason {
    /// Within the newest `keep_latest`.
    Recent,
    /// Currently receives traffic.
    Serving,
    /// Reported as the latest revision.
    Latest,
}

impl fmt::Display for RetentionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionReason::Recent => write!(f, "recent"),
            RetentionReason::Serving => write!(f, "serving traffic"),
            RetentionReason::Latest => write!(f, "latest"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionPlan {
    /// Kept revisions, newest first.
    pub retained: Vec<(Revision, RetentionReason)>,
    /// Revisions to delete, newest first.
    pub retired: Vec<Revision>,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.retained.is_empty() && self.retired.is_empty()
    }
}

pub fn plan_retention(revisions: &[Revision], keep_latest: usize) -> RetentionPlan {
    let mut ranked: Vec<&Revision> = revisions.iter().collect();
    ranked.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.revision_id.cmp(&a.revision_id))
    });

    let mut plan = RetentionPlan::default();
    for (rank, revision) in ranked.into_iter().enumerate() {
        let reason = if rank < keep_latest {
            Some(RetentionReason::Recent)
        } else if revision.is_serving() {
            Some(RetentionReason::Serving)
        } else if revision.is_latest {
            Some(RetentionReason::Latest)
        } else {
            None
        };

        match reason {
            Some(reason) => plan.retained.push((revision.clone(), reason)),
            None => plan.retired.push(revision.clone()),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn revision(id: &str, created: i64, traffic: u8) -> Revision {
        Revision {
            service_name: "geoserver".to_string(),
            revision_id: id.to_string(),
            created_at: Utc.timestamp_opt(created, 0).unwrap(),
            traffic_percent: traffic,
            is_latest: false,
        }
    }

    fn ids(revisions: &[Revision]) -> Vec<&str> {
        revisions.iter().map(|r| r.revision_id.as_str()).collect()
    }

    #[test]
    fn keeps_recent_and_serving() {
        // Rank 1 is newest; rank 3 serves all traffic.
        let revisions = vec![
            revision("rank5", 100, 0),
            revision("rank3", 300, 100),
            revision("rank1", 500, 0),
            revision("rank4", 200, 0),
            revision("rank2", 400, 0),
        ];

        let plan = plan_retention(&revisions, 2);

        assert_eq!(ids(&plan.retired), vec!["rank4", "rank5"]);
        let retained: Vec<_> = plan
            .retained
            .iter()
            .map(|(r, why)| (r.revision_id.as_str(), *why))
            .collect();
        assert_eq!(
            retained,
            vec![
                ("rank1", RetentionReason::Recent),
                ("rank2", RetentionReason::Recent),
                ("rank3", RetentionReason::Serving),
            ]
        );
    }

    #[test]
    fn keeps_everything_when_fewer_than_keep() {
        let revisions = vec![revision("a", 1, 0), revision("b", 2, 100)];
        let plan = plan_retention(&revisions, 5);
        assert_eq!(plan.retained.len(), 2);
        assert!(plan.retired.is_empty());
    }

    #[test]
    fn latest_is_never_retired() {
        let mut latest = revision("new", 10, 0);
        latest.is_latest = true;
        // keep = 0 isolates the traffic and latest rules.
        let revisions = vec![revision("old", 1, 100), revision("mid", 5, 0), latest];

        let plan = plan_retention(&revisions, 0);

        assert_eq!(ids(&plan.retired), vec!["mid"]);
        assert!(
            plan.retained
                .iter()
                .any(|(r, why)| r.revision_id == "new" && *why == RetentionReason::Latest)
        );
    }

    #[test]
    fn equal_timestamps_rank_by_id() {
        let revisions = vec![revision("svc-001", 7, 0), revision("svc-002", 7, 0)];
        let plan = plan_retention(&revisions, 1);
        assert_eq!(plan.retained[0].0.revision_id, "svc-002");
        assert_eq!(ids(&plan.retired), vec!["svc-001"]);
    }

    #[test]
    fn empty_input() {
        assert!(plan_retention(&[], 3).is_empty());
    }
}
