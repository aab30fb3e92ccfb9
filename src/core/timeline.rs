use chrono::{DateTime, Local};

use crate::{
    core::{
        estimate::Estimate,
        interval::Interval,
        series::{OverPeriod, Series},
    },
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

/// Normalized inputs of a planning cycle, immutable once built.
#[derive(Clone, Debug)]
pub struct Timeline {
    /// Export rates with the overrides applied, also the simulation clock.
    pub export_rates: Series<KilowattHourRate>,

    /// Import rates with the overrides applied.
    pub import_rates: Series<KilowattHourRate>,

    /// Export rates before the overrides.
    pub original_export_rates: Series<KilowattHourRate>,

    /// Import rates before the overrides.
    pub original_import_rates: Series<KilowattHourRate>,

    pub usage: Series<KilowattHours>,
    pub solar_surplus: Series<Estimate<KilowattHours>>,
    pub usage_after_solar: Series<Estimate<KilowattHours>>,
    pub solar_usage: Series<Estimate<KilowattHours>>,

    /// Discharge planning looks at least this far ahead.
    pub extend_discharge_to: DateTime<Local>,
}

impl Timeline {
    /// Ceiling for any grid usage.
    #[must_use]
    pub fn max_import_rate(&self) -> KilowattHourRate {
        self.original_import_rates
            .iter()
            .map(|(_, rate)| *rate)
            .max_by(KilowattHourRate::total_cmp)
            .unwrap_or(KilowattHourRate::ZERO)
    }

    /// Price of simply buying the house usage in the slot that ends at the timestamp.
    #[must_use]
    pub fn empty_slot_cost(&self, end: DateTime<Local>) -> Option<KilowattHourRate> {
        self.original_import_rates
            .iter()
            .find(|(interval, _)| interval.end == end)
            .map(|(_, rate)| *rate)
    }

    /// What powering the house costs in the slot: the export rate while there is a solar surplus,
    /// the import rate otherwise.
    #[must_use]
    pub fn house_rate(&self, interval: Interval) -> Option<KilowattHourRate> {
        if self.solar_surplus.over_period(interval).median > KilowattHours::ZERO {
            self.export_rates.starting_at(interval.start)
        } else {
            self.import_rates.starting_at(interval.start)
        }
    }
}
