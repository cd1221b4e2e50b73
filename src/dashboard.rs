//! Per-project reduction of the stored report history into dashboard
//! rows: newest commit, completion rate, success rate.

use crate::models::Report;
use serde::Serialize;
use std::collections::HashMap;

/// One project's dashboard line, recomputed from scratch on every
/// aggregation call. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardRow {
    pub project_id: i64,
    pub project_name: String,
    pub project_repo: String,
    /// Newest known commit, empty when no report carries one.
    pub fetchhead: String,
    /// Acceptance time of the newest commit's report.
    pub ctime: i64,
    pub finished: u64,
    pub success: u64,
    pub pending: u64,
    /// floor(100 * success / finished), 0 when nothing finished.
    pub success_rate: u64,
    /// floor(100 * finished / (finished + pending)).
    pub finished_rate: u64,
    /// Every finished run against the newest commit succeeded.
    pub pass: bool,
}

#[derive(Default)]
struct Acc {
    name: String,
    repo: String,
    newest: Option<(String, i64)>,
    finished: u64,
    success: u64,
    pending: u64,
}

/// Reduce an unordered report collection into one row per project.
///
/// The newest fetchhead of a group is the one on the report with the
/// maximum ctime; ties keep the first seen. An empty fetchhead never
/// wins, whatever its ctime: it carries nothing to group against.
/// Reports matching the newest (when one exists) count as finished,
/// everything else as pending. Rows come back sorted by project name.
pub fn aggregate(reports: &[Report]) -> Vec<DashboardRow> {
    let mut groups: HashMap<i64, Acc> = HashMap::new();

    // Establish each group's newest fetchhead.
    for r in reports {
        let acc = groups.entry(r.project_id).or_insert_with(|| Acc {
            name: r.project_name.clone(),
            repo: r.project_repo.clone(),
            ..Acc::default()
        });
        if r.fetchhead.is_empty() {
            continue;
        }
        match &acc.newest {
            Some((_, ctime)) if r.ctime <= *ctime => {}
            _ => acc.newest = Some((r.fetchhead.clone(), r.ctime)),
        }
    }

    // Count membership of the newest commit.
    for r in reports {
        let acc = groups
            .get_mut(&r.project_id)
            .expect("group created in first pass");
        match &acc.newest {
            Some((hash, _)) if r.fetchhead == *hash => {
                acc.finished += 1;
                if r.distcheck != 0 {
                    acc.success += 1;
                }
            }
            _ => acc.pending += 1,
        }
    }

    let mut rows: Vec<DashboardRow> = groups
        .into_iter()
        .map(|(project_id, acc)| {
            // Every group holds at least the report that created it.
            debug_assert!(acc.finished + acc.pending > 0);
            let (fetchhead, ctime) = acc.newest.unwrap_or_default();
            DashboardRow {
                project_id,
                project_name: acc.name,
                project_repo: acc.repo,
                fetchhead,
                ctime,
                success_rate: if acc.finished == 0 {
                    0
                } else {
                    100 * acc.success / acc.finished
                },
                finished_rate: 100 * acc.finished / (acc.finished + acc.pending),
                pass: acc.success == acc.finished,
                finished: acc.finished,
                success: acc.success,
                pending: acc.pending,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.project_name.cmp(&b.project_name));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(project_id: i64, fetchhead: &str, ctime: i64, distcheck: i64) -> Report {
        Report {
            id: 0,
            project_id,
            project_name: format!("proj{project_id}"),
            project_repo: "https://git.example.com".into(),
            user_id: 1,
            start: 1,
            env: 2,
            depend: 3,
            build: 4,
            test: 5,
            install: 6,
            distcheck,
            ctime,
            log: String::new(),
            unamem: "amd64".into(),
            unamen: "box".into(),
            unamer: "1.0".into(),
            unames: "OS".into(),
            unamev: "OS 1.0".into(),
            unamehash: String::new(),
            projunamehash: String::new(),
            fetchhead: fetchhead.into(),
        }
    }

    #[test]
    fn empty_history_yields_no_rows() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn newest_commit_wins_by_ctime() {
        let reports = vec![
            report(1, "c1", 10, 1),
            report(1, "c2", 20, 0),
            report(1, "c1", 5, 1),
        ];
        let rows = aggregate(&reports);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.fetchhead, "c2");
        assert_eq!(row.ctime, 20);
        assert_eq!(row.finished, 1);
        assert_eq!(row.success, 0);
        assert_eq!(row.pending, 2);
        assert_eq!(row.success_rate, 0);
        assert!(!row.pass);
    }

    #[test]
    fn empty_fetchhead_never_newest() {
        let reports = vec![report(1, "c1", 10, 1), report(1, "", 100, 1)];
        let rows = aggregate(&reports);
        assert_eq!(rows[0].fetchhead, "c1");
        assert_eq!(rows[0].finished, 1);
        assert_eq!(rows[0].pending, 1);
    }

    #[test]
    fn all_empty_fetchheads_count_as_pending() {
        let reports = vec![report(1, "", 10, 1), report(1, "", 20, 0)];
        let rows = aggregate(&reports);
        let row = &rows[0];
        assert_eq!(row.fetchhead, "");
        assert_eq!(row.finished, 0);
        assert_eq!(row.pending, 2);
        assert_eq!(row.success_rate, 0);
        assert_eq!(row.finished_rate, 0);
    }

    #[test]
    fn pass_requires_every_finished_success() {
        let reports = vec![
            report(1, "c1", 10, 1),
            report(1, "c1", 11, 1),
            report(1, "c1", 12, 0),
        ];
        let rows = aggregate(&reports);
        assert_eq!(rows[0].finished, 3);
        assert_eq!(rows[0].success, 2);
        assert_eq!(rows[0].success_rate, 66);
        assert!(!rows[0].pass);
    }

    #[test]
    fn rates_are_floored_percentages() {
        let reports = vec![
            report(1, "c9", 30, 1),
            report(1, "old", 1, 1),
            report(1, "old", 2, 0),
        ];
        let rows = aggregate(&reports);
        assert_eq!(rows[0].finished_rate, 33);
        assert_eq!(rows[0].success_rate, 100);
        assert!(rows[0].pass);
    }

    #[test]
    fn groups_are_independent_and_sorted_by_name() {
        let reports = vec![
            report(2, "b1", 10, 0),
            report(1, "a1", 10, 1),
            report(2, "b2", 20, 1),
        ];
        let rows = aggregate(&reports);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].project_name, "proj1");
        assert_eq!(rows[1].project_name, "proj2");
        assert_eq!(rows[1].fetchhead, "b2");
        assert_eq!(rows[1].pending, 1);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let reports = vec![
            report(1, "c1", 10, 1),
            report(1, "c2", 20, 0),
            report(2, "", 5, 0),
        ];
        assert_eq!(aggregate(&reports), aggregate(&reports));
    }

    #[test]
    fn ctime_tie_keeps_first_seen() {
        let reports = vec![report(1, "first", 10, 1), report(1, "second", 10, 1)];
        let rows = aggregate(&reports);
        assert_eq!(rows[0].fetchhead, "first");
    }
}
