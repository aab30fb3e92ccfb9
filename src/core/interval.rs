use std::{
    fmt::{Debug, Formatter},
    ops::Sub,
};

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Half-open time interval.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[must_use]
pub struct Interval {
    /// Inclusive.
    pub start: DateTime<Local>,

    /// Exclusive.
    pub end: DateTime<Local>,
}

impl Debug for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl Interval {
    pub const fn new(start: DateTime<Local>, end: DateTime<Local>) -> Self {
        Self { start, end }
    }

    pub const fn with_end(mut self, end: DateTime<Local>) -> Self {
        self.end = end;
        self
    }

    #[must_use]
    pub fn duration(self) -> TimeDelta {
        self.end - self.start
    }

    /// Check whether the instant lies strictly inside the interval.
    #[must_use]
    pub fn strictly_contains(self, other: DateTime<Local>) -> bool {
        (self.start < other) && (other < self.end)
    }

    /// Time-of-day of the start, used to order slots within a day.
    #[must_use]
    pub fn start_time(self) -> NaiveTime {
        self.start.time()
    }
}

/// The same local day at the given time of day.
///
/// Falls back to the moment itself when the local time does not exist.
#[must_use]
pub fn same_day_at(moment: DateTime<Local>, time: NaiveTime) -> DateTime<Local> {
    moment.date_naive().and_time(time).and_local_timezone(Local).earliest().unwrap_or(moment)
}

impl Sub<TimeDelta> for Interval {
    type Output = Self;

    /// Shift the entire interval back in time.
    fn sub(self, rhs: TimeDelta) -> Self::Output {
        Self { start: self.start - rhs, end: self.end - rhs }
    }
}
