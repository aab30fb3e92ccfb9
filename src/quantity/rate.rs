use std::fmt::{Debug, Display, Formatter};

use crate::quantity::Quantity;

/// Pound per kilowatt-hour.
pub type KilowattHourRate = Quantity<-1, -1, 1>;

impl KilowattHourRate {
    /// Express the rate in pence per kilowatt-hour.
    pub fn pence(self) -> f64 {
        self.0 * 100.0
    }
}

impl Display for KilowattHourRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} p/kWh", self.pence())
    }
}

impl Debug for KilowattHourRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}p/kWh", self.pence())
    }
}
