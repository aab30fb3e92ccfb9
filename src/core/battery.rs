mod simulator;

use chrono::NaiveTime;

pub use self::simulator::{BatteryForecast, Simulator};
use crate::quantity::{energy::KilowattHours, power::Kilowatts};

/// The vendor app hides a fixed 5% floor and shows the rest of the capacity as 0 to 100%.
const HIDDEN_RESERVE_PERCENTAGE: f64 = 5.0;

/// Convert the actual state-of-charge percentage to the one shown in the app.
#[must_use]
pub fn to_app_percentage(real: f64) -> f64 {
    (real - HIDDEN_RESERVE_PERCENTAGE) / (1.0 - HIDDEN_RESERVE_PERCENTAGE / 100.0)
}

/// Convert the app percentage to the actual state-of-charge percentage.
#[must_use]
pub fn to_real_percentage(app: f64) -> f64 {
    app * (1.0 - HIDDEN_RESERVE_PERCENTAGE / 100.0) + HIDDEN_RESERVE_PERCENTAGE
}

#[derive(Copy, Clone, Debug, bon::Builder)]
pub struct BatteryParameters {
    pub capacity: KilowattHours,

    /// Currently stored energy.
    pub energy: KilowattHours,

    /// Soft-empty threshold on the app scale.
    pub target_reserve_percentage: f64,

    /// Hard-empty threshold on the app scale.
    pub abs_min_reserve_percentage: f64,

    pub full_percentage: f64,

    /// Added to the full percentage when anything is charging, subtracted otherwise.
    pub full_percentage_hysteresis: f64,

    /// Round trip.
    pub efficiency: f64,

    pub charge_rate_limit: Kilowatts,
    pub discharge_rate_limit: Kilowatts,
    pub grid_charge_rate: Kilowatts,

    /// Time of day by which the battery should be full on the last forecast day.
    pub target_full_time: NaiveTime,
}

impl BatteryParameters {
    #[must_use]
    pub fn target_reserve_energy(&self) -> KilowattHours {
        self.capacity * (to_real_percentage(self.target_reserve_percentage) / 100.0)
    }

    #[must_use]
    pub fn abs_min_reserve_energy(&self) -> KilowattHours {
        self.capacity * (to_real_percentage(self.abs_min_reserve_percentage) / 100.0)
    }
}
