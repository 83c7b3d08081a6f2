//! Derived, side-effect-free views over issue lists.
//!
//! Nothing here is cached: every call recomputes from the slice it is given,
//! so results always match the store snapshot they were computed from.

use crate::domain::{Issue, IssueStatus, IssueType, Priority, ProjectId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Issues in `status`, in their original order.
pub fn by_status(issues: &[Issue], status: IssueStatus) -> Vec<&Issue> {
    issues.iter().filter(|i| i.status == status).collect()
}

/// Issues belonging to `project`, in their original order.
pub fn for_project<'a>(issues: &'a [Issue], project: &ProjectId) -> Vec<&'a Issue> {
    issues.iter().filter(|i| &i.project_id == project).collect()
}

/// One Kanban column.
#[derive(Debug, Clone, Serialize)]
pub struct Column<'a> {
    /// Status shown in this column
    pub status: IssueStatus,
    /// Issues in the column, in original order
    pub issues: Vec<&'a Issue>,
}

/// Kanban board: one column per status, in workflow order.
pub fn board(issues: &[Issue]) -> Vec<Column<'_>> {
    IssueStatus::ALL
        .iter()
        .map(|&status| Column {
            status,
            issues: by_status(issues, status),
        })
        .collect()
}

/// Case-insensitive substring match on title or human code.
pub fn search<'a>(issues: &'a [Issue], query: &str) -> Vec<&'a Issue> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return issues.iter().collect();
    }
    issues
        .iter()
        .filter(|i| {
            i.title.to_lowercase().contains(&query) || i.human_code.to_lowercase().contains(&query)
        })
        .collect()
}

/// The `n` most recently created issues, newest first.
pub fn recent(issues: &[Issue], n: usize) -> Vec<&Issue> {
    let mut sorted: Vec<&Issue> = issues.iter().collect();
    // Stable sort keeps insertion order among equal timestamps.
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(n);
    sorted
}

/// Aggregate counts for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Number of issues
    pub total: usize,
    /// Count per status; every status is present
    pub count_by_status: BTreeMap<IssueStatus, usize>,
    /// Count per priority; every priority is present
    pub count_by_priority: BTreeMap<Priority, usize>,
    /// Count per type; every type is present
    pub count_by_type: BTreeMap<IssueType, usize>,
    /// Share of done issues, rounded to the nearest percent. 0 when empty.
    pub percent_done: u32,
}

/// Computes [`Statistics`] over `issues`.
pub fn statistics(issues: &[Issue]) -> Statistics {
    let mut count_by_status: BTreeMap<_, _> = IssueStatus::ALL.iter().map(|&s| (s, 0)).collect();
    let mut count_by_priority: BTreeMap<_, _> = Priority::ALL.iter().map(|&p| (p, 0)).collect();
    let mut count_by_type: BTreeMap<_, _> = IssueType::ALL.iter().map(|&t| (t, 0)).collect();

    for issue in issues {
        *count_by_status.entry(issue.status).or_insert(0) += 1;
        *count_by_priority.entry(issue.priority).or_insert(0) += 1;
        *count_by_type.entry(issue.issue_type).or_insert(0) += 1;
    }

    let total = issues.len();
    let done = count_by_status
        .get(&IssueStatus::Done)
        .copied()
        .unwrap_or(0);

    Statistics {
        total,
        count_by_status,
        count_by_priority,
        count_by_type,
        percent_done: percent(done, total),
    }
}

/// `round(100 * part / total)`, half away from zero, 0 for an empty total.
fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let rounded = (200 * part + total) / (2 * total);
    u32::try_from(rounded).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueId, UserId};
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;

    fn issue(n: i64, status: IssueStatus) -> Issue {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(n);
        Issue {
            id: IssueId::new(format!("iss-{n}")),
            project_id: ProjectId::new(if n % 2 == 0 { "prj-a" } else { "prj-b" }),
            human_code: format!("DMO-{}", 101 + n),
            title: format!("Issue number {n}"),
            description: String::new(),
            status,
            priority: Priority::Medium,
            issue_type: IssueType::Task,
            creator: UserId::new("alice"),
            comments: Vec::new(),
            created_at: at,
            updated_at: at,
            revision: 1,
        }
    }

    fn sample() -> Vec<Issue> {
        vec![
            issue(0, IssueStatus::Backlog),
            issue(1, IssueStatus::InProgress),
            issue(2, IssueStatus::Done),
            issue(3, IssueStatus::Done),
        ]
    }

    #[test]
    fn statistics_over_mixed_statuses() {
        let stats = statistics(&sample());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.count_by_status[&IssueStatus::Backlog], 1);
        assert_eq!(stats.count_by_status[&IssueStatus::InProgress], 1);
        assert_eq!(stats.count_by_status[&IssueStatus::Done], 2);
        assert_eq!(stats.count_by_priority[&Priority::Medium], 4);
        assert_eq!(stats.count_by_priority[&Priority::High], 0);
        assert_eq!(stats.count_by_type[&IssueType::Bug], 0);
        assert_eq!(stats.percent_done, 50);
    }

    #[test]
    fn statistics_of_nothing_is_zero() {
        let stats = statistics(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.percent_done, 0);
        assert_eq!(stats.count_by_status.len(), 3);
    }

    #[rstest]
    #[case(1, 3, 33)]
    #[case(2, 3, 67)]
    #[case(1, 2, 50)]
    #[case(1, 8, 13)]
    #[case(3, 3, 100)]
    #[case(0, 5, 0)]
    fn percent_rounds_to_nearest(#[case] part: usize, #[case] total: usize, #[case] want: u32) {
        assert_eq!(percent(part, total), want);
    }

    #[test]
    fn by_status_keeps_insertion_order() {
        let issues = sample();
        let done: Vec<_> = by_status(&issues, IssueStatus::Done)
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(done, vec!["iss-2", "iss-3"]);
    }

    #[test]
    fn board_has_a_column_per_status() {
        let issues = sample();
        let columns = board(&issues);
        let shape: Vec<_> = columns.iter().map(|c| (c.status, c.issues.len())).collect();
        assert_eq!(
            shape,
            vec![
                (IssueStatus::Backlog, 1),
                (IssueStatus::InProgress, 1),
                (IssueStatus::Done, 2),
            ]
        );
    }

    #[rstest]
    #[case("NUMBER 2", &["iss-2"])]
    #[case("dmo-104", &["iss-3"])]
    #[case("", &["iss-0", "iss-1", "iss-2", "iss-3"])]
    #[case("nothing", &[])]
    fn search_matches_title_or_code(#[case] query: &str, #[case] want: &[&str]) {
        let issues = sample();
        let got: Vec<_> = search(&issues, query)
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn recent_is_newest_first() {
        let issues = sample();
        let got: Vec<_> = recent(&issues, 2).iter().map(|i| i.id.as_str()).collect();
        assert_eq!(got, vec!["iss-3", "iss-2"]);
    }

    #[test]
    fn for_project_filters() {
        let issues = sample();
        assert_eq!(for_project(&issues, &ProjectId::new("prj-a")).len(), 2);
    }
}
