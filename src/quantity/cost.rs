use std::{
    fmt::{Debug, Display, Formatter},
    ops::Div,
};

use crate::quantity::{Quantity, energy::KilowattHours, rate::KilowattHourRate};

pub type Cost = Quantity<0, 0, 1>;

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "£{:.2}", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "£{:.3}", self.0)
    }
}

impl Div<KilowattHours> for Cost {
    type Output = KilowattHourRate;

    /// Average rate paid for the energy, or zero when there is no energy.
    fn div(self, energy: KilowattHours) -> Self::Output {
        if energy.is_zero() { KilowattHourRate::ZERO } else { Quantity(self.0 / energy.0) }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_average_rate() {
        let rate = Cost::from(1.5) / KilowattHours::from(10.0);
        assert_abs_diff_eq!(rate.0, 0.15, epsilon = 1e-9);
    }

    #[test]
    fn test_average_rate_without_energy() {
        assert_eq!(Cost::from(1.5) / KilowattHours::ZERO, KilowattHourRate::ZERO);
    }
}
