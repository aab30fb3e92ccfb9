use std::ops::{Add, Mul};

use chrono::{DateTime, Local, TimeDelta};

use crate::{
    core::{
        interval::Interval,
        series::{OverPeriod, Series},
    },
    quantity::Zero,
};

pub trait ExtendForward {
    /// Append slots of the same duration as the last one until the series reaches `to + by`
    /// (or its own end + `by`), repeating the values observed one day earlier.
    fn extend_forward(&mut self, by: TimeDelta, to: Option<DateTime<Local>>);
}

impl<V> ExtendForward for Series<V>
where
    V: Copy + Zero + Add<Output = V> + Mul<f64, Output = V>,
{
    fn extend_forward(&mut self, by: TimeDelta, to: Option<DateTime<Local>>) {
        let Some(&(last, _)) = self.last() else {
            return;
        };
        let end = to.unwrap_or(last.end) + by;
        while let Some(&(last, _)) = self.last()
            && last.end < end
        {
            let duration = last.duration();
            if duration <= TimeDelta::zero() {
                break;
            }
            let next = Interval::new(last.end, last.end + duration);
            let value = self.over_period(next - TimeDelta::days(1));
            self.push((next, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        core::interval::tests::slot,
        quantity::rate::KilowattHourRate,
    };

    #[test]
    fn test_extend_repeats_previous_day() {
        let mut rates: Series<KilowattHourRate> =
            (0..48_u8).map(|index| (slot(i64::from(index)), KilowattHourRate::from(f64::from(index)))).collect();
        rates.extend_forward(TimeDelta::zero(), Some(slot(51).end));
        assert_eq!(rates.len(), 52);
        assert_eq!(rates[48].0, slot(48));
        assert_abs_diff_eq!(rates[48].1.0, 0.0);
        assert_abs_diff_eq!(rates[51].1.0, 3.0);
    }

    #[test]
    fn test_extend_by() {
        let mut rates = vec![(slot(0), KilowattHourRate::from(0.1))];
        rates.extend_forward(TimeDelta::hours(1), None);
        assert_eq!(rates.len(), 3);
        // Nothing was known a day earlier:
        assert_abs_diff_eq!(rates[2].1.0, 0.0);
    }

    #[test]
    fn test_extend_empty() {
        let mut rates: Series<KilowattHourRate> = Vec::new();
        rates.extend_forward(TimeDelta::hours(1), None);
        assert!(rates.is_empty());
    }
}
