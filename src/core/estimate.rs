use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::quantity::Zero;

/// Which of the three forecast values to look at.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Percentile {
    /// Point estimate.
    Median,

    /// Pessimistic estimate, used while making sure the battery does not run flat.
    Low,

    /// Optimistic estimate, used while topping the battery up without overcharging it.
    High,
}

/// Three-valued forecast.
///
/// For derived series the naming follows the solar forecast: `low` is the value computed
/// from the pessimistic solar estimate, even when that yields a higher usage.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Estimate<V> {
    pub median: V,
    pub low: V,
    pub high: V,
}

impl<V: Copy> Estimate<V> {
    /// Single-valued estimate.
    #[cfg(test)]
    pub const fn flat(value: V) -> Self {
        Self { median: value, low: value, high: value }
    }

    #[must_use]
    pub const fn get(&self, percentile: Percentile) -> V {
        match percentile {
            Percentile::Median => self.median,
            Percentile::Low => self.low,
            Percentile::High => self.high,
        }
    }

    pub fn map<R>(self, f: impl Fn(V) -> R) -> Estimate<R> {
        Estimate { median: f(self.median), low: f(self.low), high: f(self.high) }
    }

    /// Apply the operation pairwise, percentile by percentile.
    pub fn zip_with<W: Copy, R>(self, other: Estimate<W>, f: impl Fn(V, W) -> R) -> Estimate<R> {
        Estimate {
            median: f(self.median, other.median),
            low: f(self.low, other.low),
            high: f(self.high, other.high),
        }
    }
}

impl<V: Zero> Zero for Estimate<V> {
    const ZERO: Self = Self { median: V::ZERO, low: V::ZERO, high: V::ZERO };
}

impl<V: Copy + Add<Output = V>> Add for Estimate<V> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.zip_with(rhs, |lhs, rhs| lhs + rhs)
    }
}

impl<V: Copy + Sub<Output = V>> Sub for Estimate<V> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.zip_with(rhs, |lhs, rhs| lhs - rhs)
    }
}

impl<V: Copy + Mul<f64, Output = V>> Mul<f64> for Estimate<V> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        self.map(|value| value * rhs)
    }
}
