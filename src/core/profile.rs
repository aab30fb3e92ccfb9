use std::fmt::{Display, Formatter};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    core::{interval::Interval, plans::Plans, series::OverPeriod, timeline::Timeline},
    quantity::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate},
};

/// Energy flowing through the grid connection within a slot, with its price.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ProfileEntry {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub energy: KilowattHours,
    pub cost: Cost,
    pub rate: KilowattHourRate,
}

impl ProfileEntry {
    fn new(interval: Interval, energy: KilowattHours, rate: KilowattHourRate) -> Self {
        Self { start: interval.start, end: interval.end, energy, cost: energy * rate, rate }
    }
}

/// Planned exports: the solar surplus left after charging and diverting, plus the battery discharge.
#[must_use]
pub fn export_profile(timeline: &Timeline, plans: &Plans) -> Vec<ProfileEntry> {
    timeline
        .export_rates
        .iter()
        .map(|(interval, rate)| {
            let interval = *interval;
            let energy = timeline.solar_surplus.over_period(interval).median
                - plans.solar_charge.over_period(interval).median
                + plans.discharge_export_solar.over_period(interval)
                + plans.discharge_to_grid.over_period(interval)
                - plans.diverter_solar.over_period(interval);
            ProfileEntry::new(interval, energy, *rate)
        })
        .filter(|entry| !entry.energy.is_zero())
        .collect()
}

/// Planned imports: grid charging together with the house usage meanwhile, the house running
/// from the grid, and the diverter boost.
#[must_use]
pub fn import_profile(timeline: &Timeline, plans: &Plans) -> Vec<ProfileEntry> {
    timeline
        .import_rates
        .iter()
        .map(|(interval, rate)| {
            let interval = *interval;
            let grid_charge = plans.grid_charge.over_period(interval);
            let usage_while_charging = if grid_charge.is_zero() {
                KilowattHours::ZERO
            } else {
                timeline.usage_after_solar.over_period(interval).median
            };
            let energy = grid_charge
                + plans.house_grid.over_period(interval).median
                + usage_while_charging
                + plans.diverter_grid.over_period(interval);
            ProfileEntry::new(interval, energy, *rate)
        })
        .filter(|entry| !entry.energy.is_zero())
        .collect()
}

/// Totals of a profile.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub energy: KilowattHours,
    pub cost: Cost,

    /// Average rate in pence per kilowatt-hour.
    pub rate: f64,
}

impl Summary {
    fn new(energy: KilowattHours, cost: Cost) -> Self {
        Self { energy, cost, rate: (cost / energy).pence() }
    }

    #[must_use]
    pub fn of(profile: &[ProfileEntry]) -> Self {
        Self::new(
            profile.iter().map(|entry| entry.energy).sum(),
            profile.iter().map(|entry| entry.cost).sum(),
        )
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {} = {:.2}p/kWh", self.energy, self.cost, self.rate)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct GridSummary {
    pub import: Summary,
    pub export: Summary,

    /// Import minus export.
    pub net: Summary,
}

impl GridSummary {
    #[must_use]
    pub fn new(import_profile: &[ProfileEntry], export_profile: &[ProfileEntry]) -> Self {
        let import = Summary::of(import_profile);
        let export = Summary::of(export_profile);
        let net = Summary::new(import.energy - export.energy, import.cost - export.cost);
        Self { import, export, net }
    }
}
