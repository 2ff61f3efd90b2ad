//! Plain-text rendering for the `taskday` CLI.

use chrono::{DateTime, FixedOffset, Utc};

use taskday_proto::notification::Notification;
use taskday_proto::task::Task;

use crate::ledger::DayTasks;
use crate::report::{PeriodReport, WeekReport};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
const DATE_FORMAT: &str = "%b %-d";

fn local(at: DateTime<Utc>, offset: FixedOffset, fmt: &str) -> String {
    at.with_timezone(&offset).format(fmt).to_string()
}

fn checkbox(task: &Task) -> &'static str {
    if task.completed { "[x]" } else { "[ ]" }
}

/// One line per task: checkbox, title, a daily marker for recurring tasks,
/// and the id to pass to other commands.
#[must_use]
pub fn format_task_list(tasks: &[&Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        let daily = if task.recurring { " (daily)" } else { "" };
        out.push_str(&format!(
            "{} {}{}  {}\n",
            checkbox(task),
            task.title,
            daily,
            task.id
        ));
    }
    out
}

/// Completed tasks with their local completion time.
#[must_use]
pub fn format_history(tasks: &[&Task], offset: FixedOffset) -> String {
    let mut out = String::new();
    for task in tasks {
        let when = task
            .completed_at
            .map(|at| local(at, offset, TIME_FORMAT))
            .unwrap_or_default();
        out.push_str(&format!("{when}  {}  {}\n", task.title, task.id));
    }
    out
}

/// Tasks created and completed on one day.
#[must_use]
pub fn format_day(day: &DayTasks, offset: FixedOffset) -> String {
    let mut out = String::new();
    out.push_str(&format!("Created ({}):\n", day.created.len()));
    for task in &day.created {
        out.push_str(&format!(
            "  {} {} {}\n",
            local(task.created_at, offset, "%H:%M"),
            checkbox(task),
            task.title
        ));
    }
    out.push_str(&format!("Completed ({}):\n", day.completed.len()));
    for task in &day.completed {
        let when = task
            .completed_at
            .map(|at| local(at, offset, "%H:%M"))
            .unwrap_or_default();
        out.push_str(&format!("  {when} {}\n", task.title));
    }
    out
}

/// Period totals with the normalized score.
#[must_use]
pub fn format_report(report: &PeriodReport, offset: FixedOffset) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}: {} - {}\n",
        capitalize(&report.period.to_string()),
        local(report.start, offset, DATE_FORMAT),
        local(report.end, offset, "%b %-d, %Y")
    ));
    out.push_str(&format!("Completed:   {}\n", report.completed_count));
    out.push_str(&format!("Score:       {}\n", report.score));
    out.push_str(&format!("Performance: {}%\n", report.normalized));
    out
}

/// One line per week of a breakdown.
#[must_use]
pub fn format_breakdown(weeks: &[WeekReport], offset: FixedOffset) -> String {
    let mut out = String::new();
    for week in weeks {
        out.push_str(&format!(
            "Week {} ({} - {}): {} completed, score {}\n",
            week.week_number,
            local(week.start, offset, DATE_FORMAT),
            local(week.end, offset, DATE_FORMAT),
            week.completed_count,
            week.score
        ));
    }
    out
}

/// Notifications, unread ones flagged with `*`.
#[must_use]
pub fn format_notifications(notifications: &[Notification], offset: FixedOffset) -> String {
    let mut out = String::new();
    for n in notifications {
        let flag = if n.read { ' ' } else { '*' };
        out.push_str(&format!(
            "{flag} {} [{}] {}: {}  {}\n",
            local(n.timestamp, offset, TIME_FORMAT),
            n.kind,
            n.title,
            n.message,
            n.id
        ));
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars
        .next()
        .map(|c| c.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}
