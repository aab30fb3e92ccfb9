use std::ops::Add;

use itertools::Itertools;

use crate::core::{interval::Interval, series::Series};

pub trait MergeAdjacent<V> {
    /// Collapse consecutive touching intervals into one, summing their values.
    ///
    /// Only meant for human-readable output: planning always works on full resolution.
    fn merge_adjacent(&self) -> Series<V>;
}

impl<V: Copy + Add<Output = V>> MergeAdjacent<V> for [(Interval, V)] {
    fn merge_adjacent(&self) -> Series<V> {
        self.iter()
            .copied()
            .coalesce(|(lhs_interval, lhs_value), (rhs_interval, rhs_value)| {
                if lhs_interval.end == rhs_interval.start {
                    Ok((lhs_interval.with_end(rhs_interval.end), lhs_value + rhs_value))
                } else {
                    Err(((lhs_interval, lhs_value), (rhs_interval, rhs_value)))
                }
            })
            .collect()
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

    #[test]
    fn test_merge_adjacent() {
        let series = vec![
            (slot(0), KilowattHours::from(1.0)),
            (slot(1), KilowattHours::from(2.0)),
            (slot(3), KilowattHours::from(4.0)),
        ];
        let merged = series.merge_adjacent();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].0, Interval::new(at(0), at(60)));
        assert_abs_diff_eq!(merged[0].1.0, 3.0);
        assert_eq!(merged[1].0, slot(3));
    }
}
