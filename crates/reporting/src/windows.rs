//! Time window resolution — civil-midnight-anchored trailing windows for
//! report runs and calendar-day bounds for rollups.
//!
//! All windows are half-open `[start, end)` instants. Resolution is pure and
//! deterministic for a given `now`; a malformed `now` is a programming error,
//! not a runtime failure.

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use marketpulse_core::types::TimeRange;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowLabel {
    #[serde(rename = "7d")]
    SevenDay,
    #[serde(rename = "30d")]
    ThirtyDay,
    #[serde(rename = "prev30d")]
    PrevThirtyDay,
    #[serde(rename = "day")]
    Day,
}

/// A labeled half-open window. Computed fresh per report run, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub label: WindowLabel,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowSpec {
    pub fn time_range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.time_range().contains(instant)
    }
}

/// The three windows a report run computes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindows {
    pub last_7d: WindowSpec,
    pub last_30d: WindowSpec,
    pub prev_30d: WindowSpec,
}

impl ReportWindows {
    /// Resolve the trailing 7-day and 30-day windows plus the 30 days
    /// immediately preceding the 30-day window (the delta baseline).
    ///
    /// Windows are anchored to civil midnight in `tz` and include the
    /// current partial civil day, so `last_7d ⊆ last_30d` and
    /// `prev_30d.end == last_30d.start` (exclusive shared edge — the
    /// baseline never overlaps the current window).
    pub fn resolve(now: DateTime<Utc>, tz: FixedOffset) -> Self {
        let today = now.with_timezone(&tz).date_naive();
        let end = civil_midnight(today + Days::new(1), tz);
        let start_7d = civil_midnight(today - Days::new(6), tz);
        let start_30d = civil_midnight(today - Days::new(29), tz);
        let start_prev = civil_midnight(today - Days::new(59), tz);

        Self {
            last_7d: WindowSpec {
                label: WindowLabel::SevenDay,
                start: start_7d,
                end,
            },
            last_30d: WindowSpec {
                label: WindowLabel::ThirtyDay,
                start: start_30d,
                end,
            },
            prev_30d: WindowSpec {
                label: WindowLabel::PrevThirtyDay,
                start: start_prev,
                end: start_30d,
            },
        }
    }

    /// The superset range one fetch can cover for every window of the run.
    pub fn lookback(&self) -> TimeRange {
        TimeRange {
            start: self.prev_30d.start,
            end: self.last_30d.end,
        }
    }
}

/// Bounds of one civil day in `tz`, as UTC instants.
pub fn day_bounds(date: NaiveDate, tz: FixedOffset) -> WindowSpec {
    WindowSpec {
        label: WindowLabel::Day,
        start: civil_midnight(date, tz),
        end: civil_midnight(date + Days::new(1), tz),
    }
}

/// The civil date the periodic rollup trigger targets.
pub fn yesterday(now: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    now.with_timezone(&tz).date_naive() - Days::new(1)
}

fn civil_midnight(date: NaiveDate, tz: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(local - Duration::seconds(tz.local_minus_utc() as i64)))
}
