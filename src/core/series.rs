mod extend;
mod merge;

use std::ops::{Add, Mul};

use chrono::{DateTime, Local};

pub use self::{extend::ExtendForward, merge::MergeAdjacent};
use crate::{core::interval::Interval, quantity::Zero};

/// Chronologically sorted, non-overlapping time series of values attached to intervals.
pub type Series<V> = Vec<(Interval, V)>;

/// Overlap-weighted aggregation over interval series.
///
/// Missing data is never an error: a period that does not overlap any interval yields zero.
pub trait OverPeriod<V> {
    /// Sum the values falling within the period, scaling partially overlapping intervals
    /// linearly by the overlapping fraction of their duration.
    fn over_period(&self, period: Interval) -> V;

    /// For every interval of `self`, apply the operation to its value and the other series'
    /// value over the same interval.
    fn combine<W, R>(&self, other: &[(Interval, W)], op: impl Fn(V, W) -> R) -> Series<R>
    where
        W: Copy + Zero + Add<Output = W> + Mul<f64, Output = W>;

    /// Find the value of the interval starting exactly at the timestamp.
    fn starting_at(&self, start: DateTime<Local>) -> Option<V>;
}

impl<V> OverPeriod<V> for [(Interval, V)]
where
    V: Copy + Zero + Add<Output = V> + Mul<f64, Output = V>,
{
    fn over_period(&self, period: Interval) -> V {
        let mut total = V::ZERO;
        for &(interval, value) in self {
            if interval == period {
                // Exact match, nothing else may contribute:
                total = total + value;
                break;
            }
            let length = interval.duration().as_seconds_f64();
            if period.start <= interval.start && period.end >= interval.end {
                // The interval is fully inside the period:
                total = total + value;
            } else if length <= 0.0 {
                continue;
            } else if period.start >= interval.start && period.end <= interval.end {
                // The period is fully inside the interval:
                total = total + value * (period.duration().as_seconds_f64() / length);
            } else if period.end >= interval.start && period.end <= interval.end {
                // The period overlaps the interval start:
                total = total + value * ((period.end - interval.start).as_seconds_f64() / length);
            } else if period.start >= interval.start && period.start <= interval.end {
                // The period overlaps the interval end:
                total = total + value * ((interval.end - period.start).as_seconds_f64() / length);
            }
        }
        total
    }

    fn combine<W, R>(&self, other: &[(Interval, W)], op: impl Fn(V, W) -> R) -> Series<R>
    where
        W: Copy + Zero + Add<Output = W> + Mul<f64, Output = W>,
    {
        self.iter()
            .map(|&(interval, value)| (interval, op(value, other.over_period(interval))))
            .collect()
    }

    fn starting_at(&self, start: DateTime<Local>) -> Option<V> {
        self.iter().find(|(interval, _)| interval.start == start).map(|(_, value)| *value)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        core::interval::tests::{at, slot},
        quantity::energy::KilowattHours,
    };

    fn series() -> Series<KilowattHours> {
        vec![(slot(0), KilowattHours::from(1.0)), (slot(1), KilowattHours::from(1.0))]
    }

    #[test]
    fn test_exact_match() {
        assert_abs_diff_eq!(series().over_period(slot(1)).0, 1.0);
    }

    #[test]
    fn test_straddling_two_intervals() {
        assert_abs_diff_eq!(series().over_period(Interval::new(at(0), at(60))).0, 2.0);
    }

    #[test]
    fn test_period_inside_interval() {
        assert_abs_diff_eq!(series().over_period(Interval::new(at(5), at(20))).0, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_partial_overlaps() {
        // 15 minutes of the first slot and 15 minutes of the second one:
        assert_abs_diff_eq!(series().over_period(Interval::new(at(15), at(45))).0, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_overlap() {
        assert_abs_diff_eq!(series().over_period(slot(5)).0, 0.0);
    }

    #[test]
    fn test_empty_series() {
        let empty: Series<KilowattHours> = Vec::new();
        assert_abs_diff_eq!(empty.over_period(slot(0)).0, 0.0);
    }

    #[test]
    fn test_combine() {
        let usage = vec![(slot(0), KilowattHours::from(0.4)), (slot(1), KilowattHours::from(2.0))];
        let surplus = usage.combine(&series(), |usage, solar| (solar - usage).max(KilowattHours::ZERO));
        assert_abs_diff_eq!(surplus[0].1.0, 0.6, epsilon = 1e-9);
        assert_abs_diff_eq!(surplus[1].1.0, 0.0);
        assert_eq!(surplus[1].0, slot(1));
    }

    #[test]
    fn test_starting_at() {
        assert!(series().starting_at(at(30)).is_some());
        assert!(series().starting_at(at(15)).is_none());
    }
}
