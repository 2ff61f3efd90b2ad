//! Score aggregation over completed tasks.
//!
//! A completed task is worth 2 points if it is a recurring habit and 1
//! otherwise. Scores are summed over a closed `[start, end]` window keyed on
//! `completed_at`, and normalized to 0..=100 against a fixed reference cap
//! per period.
//!
//! Windows are computed in the viewer's local time (a fixed UTC offset) and
//! weeks start on Monday. Window functions return `None` when a boundary
//! falls outside the representable date range.

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::Serialize;

use taskday_proto::task::Task;

/// Default number of weeks in a breakdown.
pub const DEFAULT_BREAKDOWN_WEEKS: u32 = 4;

/// Upper bound on the number of weeks in one breakdown.
pub const MAX_BREAKDOWN_WEEKS: u32 = 60;

/// A reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Monday through Sunday.
    Week,
    /// First through last day of the calendar month.
    Month,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Week => f.write_str("week"),
            Self::Month => f.write_str("month"),
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            other => Err(format!("invalid period '{other}': must be week or month")),
        }
    }
}

/// Reference caps used to normalize raw scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCaps {
    /// Score that maps to 100 for a week.
    pub weekly: u64,
    /// Score that maps to 100 for a month.
    pub monthly: u64,
}

impl Default for ReportCaps {
    fn default() -> Self {
        Self {
            weekly: 50,
            monthly: 200,
        }
    }
}

impl ReportCaps {
    /// Returns the cap for `period`.
    #[must_use]
    pub const fn for_period(&self, period: Period) -> u64 {
        match period {
            Period::Week => self.weekly,
            Period::Month => self.monthly,
        }
    }
}

/// Raw totals for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    /// Completed tasks inside the window.
    pub completed_count: u64,
    /// Weighted sum of those tasks.
    pub score: u64,
}

/// Totals for a week or month, with the normalized score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodReport {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub completed_count: u64,
    pub score: u64,
    /// Score scaled against the period cap, 0..=100.
    pub normalized: u32,
}

/// One row of a weekly breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekReport {
    /// 1-based week index.
    pub week_number: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub completed_count: u64,
    pub score: u64,
}

/// Computes scores and report windows for one viewer.
#[derive(Debug, Clone, Copy)]
pub struct ScoreAggregator {
    offset: FixedOffset,
    caps: ReportCaps,
}

impl ScoreAggregator {
    /// Creates an aggregator for a viewer at `offset`.
    #[must_use]
    pub const fn new(offset: FixedOffset, caps: ReportCaps) -> Self {
        Self { offset, caps }
    }

    /// Counts and scores the tasks completed inside `[start, end]`.
    #[must_use]
    pub fn aggregate(tasks: &[Task], start: DateTime<Utc>, end: DateTime<Utc>) -> Score {
        tasks
            .iter()
            .filter(|t| t.completed)
            .filter(|t| t.completed_at.is_some_and(|at| at >= start && at <= end))
            .fold(Score::default(), |acc, t| Score {
                completed_count: acc.completed_count + 1,
                score: acc.score + t.score_weight(),
            })
    }

    /// Scales `score` against `max_for_period`, rounding half up and
    /// clamping to 100. A zero cap yields 0.
    #[must_use]
    pub fn normalize(score: u64, max_for_period: u64) -> u32 {
        if max_for_period == 0 {
            return 0;
        }
        let pct = score
            .saturating_mul(200)
            .saturating_add(max_for_period)
            / max_for_period.saturating_mul(2);
        u32::try_from(pct.min(100)).unwrap_or(100)
    }

    /// Returns the window of `period` that contains the local day `today`.
    #[must_use]
    pub fn period_window(
        &self,
        period: Period,
        today: NaiveDate,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match period {
            Period::Week => self.week_window(today),
            Period::Month => {
                let first = today.with_day(1)?;
                let next_first = first.checked_add_months(Months::new(1))?;
                self.span(first, next_first)
            }
        }
    }

    /// Returns Monday 00:00 through Sunday end-of-day of the week
    /// containing `day`.
    #[must_use]
    pub fn week_window(&self, day: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let monday = day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_monday())))?;
        let next_monday = monday.checked_add_days(Days::new(7))?;
        self.span(monday, next_monday)
    }

    /// Aggregates `tasks` over the `period` containing `today`.
    #[must_use]
    pub fn report(&self, tasks: &[Task], period: Period, today: NaiveDate) -> Option<PeriodReport> {
        let (start, end) = self.period_window(period, today)?;
        let totals = Self::aggregate(tasks, start, end);
        Some(PeriodReport {
            period,
            start,
            end,
            completed_count: totals.completed_count,
            score: totals.score,
            normalized: Self::normalize(totals.score, self.caps.for_period(period)),
        })
    }

    /// Aggregates `week_count` consecutive weeks starting at `month_start`.
    ///
    /// Week `i` starts at `month_start + i` weeks and ends at the Sunday
    /// closing that week. Windows are not clipped to the calendar month, so
    /// when `month_start` is not a Monday each window is shorter than seven
    /// days and the last one may run past the month's end.
    #[must_use]
    pub fn weekly_breakdown(
        &self,
        tasks: &[Task],
        month_start: NaiveDate,
        week_count: u32,
    ) -> Option<Vec<WeekReport>> {
        (0..week_count)
            .map(|i| {
                let day = month_start.checked_add_days(Days::new(u64::from(i) * 7))?;
                let start = self.local_midnight(day)?;
                let (_, end) = self.week_window(day)?;
                let totals = Self::aggregate(tasks, start, end);
                Some(WeekReport {
                    week_number: i + 1,
                    start,
                    end,
                    completed_count: totals.completed_count,
                    score: totals.score,
                })
            })
            .collect()
    }

    /// The closed window from local midnight of `first` up to just before
    /// local midnight of `after`.
    fn span(&self, first: NaiveDate, after: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let end = self.local_midnight(after)?.checked_sub_signed(TimeDelta::nanoseconds(1))?;
        Some((self.local_midnight(first)?, end))
    }

    /// Local midnight of `day` as a UTC instant.
    fn local_midnight(&self, day: NaiveDate) -> Option<DateTime<Utc>> {
        day.and_time(NaiveTime::MIN)
            .checked_sub_signed(TimeDelta::seconds(i64::from(self.offset.local_minus_utc())))
            .map(|local| local.and_utc())
    }
}
