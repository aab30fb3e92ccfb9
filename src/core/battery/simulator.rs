use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    core::{
        battery::{BatteryParameters, to_app_percentage},
        estimate::{Estimate, Percentile},
        interval::{Interval, same_day_at},
        plans::Plans,
        series::{OverPeriod, Series},
    },
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

/// Simulated battery level at the end of a slot.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ForecastSlot {
    pub interval: Interval,
    pub energy: KilowattHours,

    /// Reached the capacity.
    pub is_full: bool,

    /// At or below the target reserve.
    pub is_empty: bool,

    /// At or below the absolute minimum reserve.
    pub is_totally_empty: bool,

    /// Charge level on the app scale, rounded to one decimal.
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatteryForecast {
    pub slots: Vec<ForecastSlot>,

    /// The battery should be full after this moment on the last forecast day.
    pub target_full_time: DateTime<Local>,

    pub is_fully_charged: bool,
    pub last_full_end: Option<DateTime<Local>>,
    pub any_empty: bool,
    pub any_totally_empty: bool,
    pub last_empty_end: Option<DateTime<Local>>,
}

impl BatteryForecast {
    /// Stored energy within the period.
    #[must_use]
    pub fn energy_over(&self, period: Interval) -> KilowattHours {
        self.slots.iter().map(|slot| (slot.interval, slot.energy)).collect::<Series<_>>().over_period(period)
    }

    /// Whether the slot starting at the same time ends up full, unknown slots are not.
    #[must_use]
    pub fn is_full_at(&self, interval: Interval) -> bool {
        self.slots.iter().find(|slot| slot.interval.start == interval.start).is_some_and(|slot| slot.is_full)
    }

    /// End of the first soft-empty slot that starts no earlier than the timestamp.
    #[must_use]
    pub fn first_empty_end(&self, not_before: DateTime<Local>) -> Option<DateTime<Local>> {
        self.slots
            .iter()
            .find(|slot| slot.is_empty && slot.interval.start >= not_before)
            .map(|slot| slot.interval.end)
    }
}

/// Replays the plans against the battery, slot by slot.
#[derive(Copy, Clone)]
pub struct Simulator<'a> {
    pub battery: &'a BatteryParameters,

    /// Only the intervals matter, they are the simulation clock.
    pub clock: &'a [(Interval, KilowattHourRate)],

    pub usage_after_solar: &'a [(Interval, Estimate<KilowattHours>)],
    pub now: DateTime<Local>,
}

impl Simulator<'_> {
    #[must_use]
    pub fn run(&self, plans: &Plans, percentile: Percentile) -> BatteryForecast {
        let capacity = self.battery.capacity;
        let target_reserve_energy = self.battery.target_reserve_energy();
        let abs_min_reserve_energy = self.battery.abs_min_reserve_energy();

        let mut energy = self.battery.energy;
        let mut total_charge = KilowattHours::ZERO;
        let mut slots = Vec::with_capacity(self.clock.len());

        for &(interval, _) in self.clock {
            let charge = plans.solar_charge.over_period(interval).get(percentile)
                + plans.grid_charge.over_period(interval);
            energy = energy + charge - self.usage_after_solar.over_period(interval).get(percentile)
                - plans.discharge_export_solar.over_period(interval)
                - plans.discharge_to_grid.over_period(interval)
                + plans.house_grid.over_period(interval).get(percentile);
            total_charge += charge;

            let is_full = energy >= capacity;
            let is_empty = energy <= target_reserve_energy;
            let is_totally_empty = energy <= abs_min_reserve_energy;
            if is_full {
                energy = capacity;
            }
            if is_totally_empty {
                energy = abs_min_reserve_energy;
            }
            let percentage = if capacity.is_zero() {
                0.0
            } else {
                (to_app_percentage(energy.0 / capacity.0 * 100.0) * 10.0).round() / 10.0
            };
            slots.push(ForecastSlot { interval, energy, is_full, is_empty, is_totally_empty, percentage });
        }

        let last_full_end =
            slots.iter().rev().find(|slot| slot.is_full).map(|slot| slot.interval.end);
        let last_empty_end =
            slots.iter().rev().find(|slot| slot.is_empty).map(|slot| slot.interval.end);

        // Aim a bit higher while charging anyway and a bit lower otherwise,
        // so that small forecast changes do not flip the outcome:
        let hysteresis = if total_charge.is_zero() {
            -self.battery.full_percentage_hysteresis
        } else {
            self.battery.full_percentage_hysteresis
        };
        let full_energy = capacity * ((self.battery.full_percentage.min(99.0) + hysteresis) / 100.0);

        let target_full_time = slots
            .last()
            .map_or(self.now, |slot| same_day_at(slot.interval.start, self.battery.target_full_time));
        let is_fully_charged = slots
            .iter()
            .any(|slot| slot.interval.start >= target_full_time && slot.energy >= full_energy)
            || (self.battery.energy > full_energy && self.now >= target_full_time);

        BatteryForecast {
            any_empty: last_empty_end.is_some(),
            any_totally_empty: slots.iter().any(|slot| slot.is_totally_empty),
            slots,
            target_full_time,
            is_fully_charged,
            last_full_end,
            last_empty_end,
        }
    }
}
