use std::fmt::{Display, Formatter};

use chrono::{DateTime, Local, TimeDelta, Timelike};
use enumset::EnumSet;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    core::{
        interval::Interval,
        plans::{PlanKind, Plans},
        series::MergeAdjacent,
        timeline::Timeline,
    },
    quantity::rate::KilowattHourRate,
};

/// Middle of the current slot, so that a cycle firing slightly early or late still hits the right slot.
#[must_use]
pub fn slot_middle(now: DateTime<Local>) -> DateTime<Local> {
    now + TimeDelta::minutes(15)
}

/// What the battery should be doing right now.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum BatteryMode {
    #[serde(rename = "Discharge")]
    Discharge,

    #[serde(rename = "Discharge to grid")]
    DischargeToGrid,

    #[serde(rename = "Standby")]
    Standby,

    #[serde(rename = "Grid charge")]
    GridCharge,

    #[serde(rename = "House grid powered")]
    HouseGridPowered,

    #[serde(rename = "Solar charge")]
    SolarCharge,
}

impl BatteryMode {
    #[must_use]
    pub fn at(plans: &Plans, now: DateTime<Local>) -> Self {
        let at = slot_middle(now);
        [
            (PlanKind::DischargeExportSolar, Self::Discharge),
            (PlanKind::DischargeToGrid, Self::DischargeToGrid),
            (PlanKind::Standby, Self::Standby),
            (PlanKind::GridCharge, Self::GridCharge),
            (PlanKind::HouseGrid, Self::HouseGridPowered),
        ]
        .into_iter()
        .find(|(kind, _)| plans.is_active(*kind, at))
        .map_or(Self::SolarCharge, |(_, mode)| mode)
    }
}

impl Display for BatteryMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discharge => write!(f, "Discharge"),
            Self::DischargeToGrid => write!(f, "Discharge to grid"),
            Self::Standby => write!(f, "Standby"),
            Self::GridCharge => write!(f, "Grid charge"),
            Self::HouseGridPowered => write!(f, "House grid powered"),
            Self::SolarCharge => write!(f, "Solar charge"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiverterMode {
    /// Heating from the grid.
    Boost,

    /// Heating from the solar surplus.
    On,

    Off,
}

impl DiverterMode {
    #[must_use]
    pub fn at(plans: &Plans, now: DateTime<Local>) -> Self {
        let at = slot_middle(now);
        if plans.is_active(PlanKind::DiverterGrid, at) {
            Self::Boost
        } else if plans.is_active(PlanKind::DiverterSolar, at) {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl Display for DiverterMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boost => write!(f, "boost"),
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// Compact plan overview, for example `G013,H030,S093,D163`.
///
/// Each merged run of a tagged plan contributes its tag and the start time, in tens of minutes.
#[must_use]
pub fn plan_summary(plans: &Plans) -> String {
    EnumSet::<PlanKind>::all()
        .iter()
        .filter_map(|kind| kind.tag().map(|tag| (kind, tag)))
        .flat_map(|(kind, tag)| {
            plans.energy(kind).merge_adjacent().into_iter().map(move |(interval, _)| (interval.start, tag))
        })
        .sorted_by_key(|(start, _)| *start)
        .map(|(start, tag)| format!("{tag}{:02}{}", start.hour(), start.minute() / 10))
        .join(",")
}

/// Max charge cost to carry into the next cycle.
///
/// Resets once a day, when the next day's rates become available, and otherwise accounts for
/// whatever the battery is charging at right now.
#[must_use]
pub fn next_max_charge_cost(
    previous: KilowattHourRate,
    plans: &Plans,
    timeline: &Timeline,
    efficiency: f64,
    now: DateTime<Local>,
) -> KilowattHourRate {
    let mut cost = if now.hour() == 16 && (16..45).contains(&now.minute()) {
        KilowattHourRate::ZERO
    } else {
        previous
    };
    let at = slot_middle(now);
    let current_rate = |rates: &[(Interval, KilowattHourRate)]| {
        rates
            .iter()
            .find(|(interval, _)| interval.strictly_contains(at))
            .map_or(KilowattHourRate::ZERO, |(_, rate)| *rate)
    };
    if plans.is_active(PlanKind::SolarCharge, at) {
        cost = cost.max(current_rate(&timeline.export_rates) / efficiency);
    } else if plans.is_active(PlanKind::GridCharge, at) {
        cost = cost.max(current_rate(&timeline.import_rates) / efficiency);
    } else if plans.is_active(PlanKind::HouseGrid, at) {
        cost = cost.max(current_rate(&timeline.import_rates));
    }
    cost
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        core::{
            estimate::Estimate,
            interval::tests::{at, slot},
            timeline::tests::timeline,
        },
        quantity::energy::KilowattHours,
    };

    #[test]
    fn test_battery_mode_priority() {
        let mut plans = Plans::default();
        assert_eq!(BatteryMode::at(&plans, at(0)), BatteryMode::SolarCharge);

        plans.house_grid.push((slot(0), Estimate::flat(KilowattHours::from(0.5))));
        assert_eq!(BatteryMode::at(&plans, at(0)), BatteryMode::HouseGridPowered);

        plans.standby.push((slot(0), KilowattHours::from(0.5)));
        assert_eq!(BatteryMode::at(&plans, at(0)), BatteryMode::Standby);

        plans.discharge_export_solar.push((slot(0), KilowattHours::from(0.5)));
        assert_eq!(BatteryMode::at(&plans, at(0)), BatteryMode::Discharge);

        // The next slot is not active yet:
        assert_eq!(BatteryMode::at(&plans, at(30)), BatteryMode::SolarCharge);
    }

    #[test]
    fn test_diverter_mode() {
        let mut plans = Plans::default();
        plans.diverter_solar.push((slot(0), KilowattHours::ZERO));
        assert_eq!(DiverterMode::at(&plans, at(0)), DiverterMode::On);
        plans.diverter_grid.push((slot(0), KilowattHours::from(1.8)));
        assert_eq!(DiverterMode::at(&plans, at(0)), DiverterMode::Boost);
        assert_eq!(DiverterMode::at(&plans, at(30)), DiverterMode::Off);
    }

    #[test]
    fn test_plan_summary() {
        let mut plans = Plans::default();
        plans.grid_charge.push((slot(2), KilowattHours::from(1.0)));
        plans.grid_charge.push((slot(3), KilowattHours::from(1.0)));
        plans.discharge_to_grid.push((slot(33), KilowattHours::from(2.0)));
        plans.standby.push((slot(21), KilowattHours::from(0.2)));
        plans.diverter_grid.push((slot(2), KilowattHours::from(1.0)));
        assert_eq!(plan_summary(&plans), "G010,S103,E163");
    }

    #[test]
    fn test_next_max_charge_cost() {
        let timeline = timeline(&[0.09, 0.05], &[0.18, 0.27], 0.5, &[]);
        let mut plans = Plans::default();
        plans.grid_charge.push((slot(0), KilowattHours::from(1.0)));
        plans.house_grid.push((slot(1), Estimate::flat(KilowattHours::from(0.5))));

        let cost = next_max_charge_cost(KilowattHourRate::from(0.1), &plans, &timeline, 0.9, at(0));
        assert_abs_diff_eq!(cost.0, 0.2, epsilon = 1e-9);

        let cost = next_max_charge_cost(KilowattHourRate::from(0.1), &plans, &timeline, 0.9, at(30));
        assert_abs_diff_eq!(cost.0, 0.27, epsilon = 1e-9);

        let cost = next_max_charge_cost(KilowattHourRate::from(0.5), &Plans::default(), &timeline, 0.9, at(16 * 60 + 20));
        assert_abs_diff_eq!(cost.0, 0.0);
    }
}
