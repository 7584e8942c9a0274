//! Month-over-month task statistics for a workspace or project.
//!
//! Tasks are bucketed by creation time into the current UTC calendar month
//! and the one before it. Every diff is `this month - last month`.

use anyhow::{Context, Result};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};

use super::db::BoardDb;
use super::models::Analytics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsScope {
    Workspace(i64),
    Project(i64),
}

/// Half-open `[start, end)` range covering one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl MonthWindow {
    pub fn containing(now: NaiveDateTime) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
            .context("Invalid month start")?
            .and_time(NaiveTime::MIN);
        let end = start
            .checked_add_months(Months::new(1))
            .context("Month end out of range")?;
        Ok(Self { start, end })
    }

    pub fn previous(&self) -> Result<Self> {
        let start = self
            .start
            .checked_sub_months(Months::new(1))
            .context("Month start out of range")?;
        Ok(Self {
            start,
            end: self.start,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMetric {
    All,
    AssignedTo(i64),
    Completed,
    Incomplete,
    /// Not done and due before the given instant.
    Overdue(NaiveDateTime),
}

/// Counts for `scope` as seen by the member `member_id` at `now`.
pub fn compute_analytics(
    db: &BoardDb,
    scope: AnalyticsScope,
    member_id: i64,
    now: NaiveDateTime,
) -> Result<Analytics> {
    let this_month = MonthWindow::containing(now)?;
    let last_month = this_month.previous()?;

    let count = |metric: TaskMetric| -> Result<(i64, i64)> {
        let current = db.count_tasks(scope, &this_month, &metric)?;
        let previous = db.count_tasks(scope, &last_month, &metric)?;
        Ok((current, current - previous))
    };

    let (task_count, task_diff) = count(TaskMetric::All)?;
    let (assigned_task_count, assigned_task_diff) = count(TaskMetric::AssignedTo(member_id))?;
    let (completed_task_count, completed_task_diff) = count(TaskMetric::Completed)?;
    let (incomplete_task_count, incomplete_task_diff) = count(TaskMetric::Incomplete)?;
    let (overdue_task_count, overdue_task_diff) = count(TaskMetric::Overdue(now))?;

    Ok(Analytics {
        task_count,
        task_diff,
        assigned_task_count,
        assigned_task_diff,
        completed_task_count,
        completed_task_diff,
        incomplete_task_count,
        incomplete_task_diff,
        overdue_task_count,
        overdue_task_diff,
    })
}
