use std::collections::BTreeMap;

use serde::Serialize;

use crate::store::SessionDetail;
use crate::status::StatusCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Progress {
    NotStarted,
    InProgress,
    Completed,
}

impl Progress {
    pub fn from_counts(counts: &StatusCounts) -> Self {
        if counts.total() > 0 && counts.done == counts.total() {
            Progress::Completed
        } else if counts.active > 0 || counts.done > 0 {
            Progress::InProgress
        } else {
            Progress::NotStarted
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Progress::NotStarted => "not-started",
            Progress::InProgress => "in-progress",
            Progress::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_key: String,
    pub type_slug: String,
    pub last_modified: Option<i64>,
    pub counts: StatusCounts,
    pub progress: Progress,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTotals {
    pub sessions: usize,
    pub completed_sessions: usize,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReport {
    pub sessions: Vec<SessionReport>,
    pub by_type: BTreeMap<String, TypeTotals>,
    pub totals: StatusCounts,
}

pub fn build_report(details: &[SessionDetail]) -> SystemReport {
    let mut report = SystemReport::default();
    for detail in details {
        let counts: StatusCounts = detail.status_buttons.values().collect();
        let progress = Progress::from_counts(&counts);
        let totals = report
            .by_type
            .entry(detail.summary.type_slug.clone())
            .or_default();
        totals.sessions += 1;
        if progress == Progress::Completed {
            totals.completed_sessions += 1;
        }
        totals.counts.merge(&counts);
        report.totals.merge(&counts);
        report.sessions.push(SessionReport {
            session_key: detail.summary.session_key.clone(),
            type_slug: detail.summary.type_slug.clone(),
            last_modified: detail.summary.last_modified,
            counts,
            progress,
        });
    }
    report
}

pub fn render_report_line(session: &SessionReport) -> String {
    format!(
        "{} | {} | {} | ready {} / active {} / done {}",
        session.session_key,
        session.type_slug,
        session.progress.as_str(),
        session.counts.ready,
        session.counts.active,
        session.counts.done
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{RowStatus, StatusFlag, TaskStatus};
    use crate::store::SessionSummary;

    fn detail(key: &str, slug: &str, states: &[TaskStatus]) -> SessionDetail {
        SessionDetail {
            summary: SessionSummary {
                session_key: key.to_string(),
                type_slug: slug.to_string(),
                created: 1,
                last_modified: None,
                modified_at: 1,
            },
            status_buttons: states
                .iter()
                .enumerate()
                .map(|(idx, state)| {
                    (
                        format!("status-1.{}", idx + 1),
                        RowStatus::new(*state, StatusFlag::ActiveManual),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn aggregates_per_session_and_per_type() {
        let details = vec![
            detail("AAA", "word", &[TaskStatus::Done, TaskStatus::Done]),
            detail("BBB", "word", &[TaskStatus::Ready, TaskStatus::Active]),
            detail("CCC", "excel", &[]),
        ];
        let report = build_report(&details);
        assert_eq!(report.sessions[0].progress, Progress::Completed);
        assert_eq!(report.sessions[1].progress, Progress::InProgress);
        assert_eq!(report.sessions[2].progress, Progress::NotStarted);
        let word = &report.by_type["word"];
        assert_eq!(word.sessions, 2);
        assert_eq!(word.completed_sessions, 1);
        assert_eq!(word.counts.done, 2);
        assert_eq!(report.totals.total(), 4);
        assert_eq!(
            render_report_line(&report.sessions[1]),
            "BBB | word | in-progress | ready 1 / active 1 / done 0"
        );
    }
}
