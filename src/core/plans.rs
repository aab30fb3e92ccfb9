use std::fmt::{Display, Formatter};

use chrono::{DateTime, Local};
use comfy_table::Color;
use enumset::EnumSet;
use serde::Serialize;

use crate::{
    core::{
        estimate::Estimate,
        interval::Interval,
        series::{OverPeriod, Series},
    },
    quantity::energy::KilowattHours,
};

#[derive(Debug, Serialize, enumset::EnumSetType)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    SolarCharge,
    GridCharge,
    HouseGrid,
    Standby,
    DischargeExportSolar,
    DischargeToGrid,
    DischargeToHouse,
    DiverterSolar,
    DiverterGrid,
}

impl Display for PlanKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SolarCharge => write!(f, "Solar charge"),
            Self::GridCharge => write!(f, "Grid charge"),
            Self::HouseGrid => write!(f, "House grid powered"),
            Self::Standby => write!(f, "Standby"),
            Self::DischargeExportSolar => write!(f, "Discharge"),
            Self::DischargeToGrid => write!(f, "Discharge to grid"),
            Self::DischargeToHouse => write!(f, "Discharge to house"),
            Self::DiverterSolar => write!(f, "Diverter solar"),
            Self::DiverterGrid => write!(f, "Diverter grid"),
        }
    }
}

impl PlanKind {
    /// Plans that move energy in or out of the battery, at most one per slot.
    pub fn exclusive() -> EnumSet<Self> {
        Self::SolarCharge
            | Self::GridCharge
            | Self::HouseGrid
            | Self::DischargeExportSolar
            | Self::DischargeToGrid
    }

    /// Single-letter tag for the compact plan summary.
    #[must_use]
    pub const fn tag(self) -> Option<char> {
        match self {
            Self::DischargeExportSolar => Some('D'),
            Self::DischargeToGrid => Some('E'),
            Self::SolarCharge => Some('C'),
            Self::GridCharge => Some('G'),
            Self::HouseGrid => Some('H'),
            Self::Standby => Some('S'),
            Self::DischargeToHouse => Some('B'),
            Self::DiverterSolar | Self::DiverterGrid => None,
        }
    }

    pub const fn color(self) -> Color {
        match self {
            Self::SolarCharge => Color::Yellow,
            Self::GridCharge => Color::Green,
            Self::HouseGrid => Color::Cyan,
            Self::Standby => Color::DarkYellow,
            Self::DischargeExportSolar | Self::DischargeToGrid => Color::Blue,
            Self::DischargeToHouse => Color::Reset,
            Self::DiverterSolar | Self::DiverterGrid => Color::Magenta,
        }
    }
}

/// The nine allocation plans.
///
/// Three-valued plans follow the forecast percentiles, the rest carry plain energy.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Plans {
    pub solar_charge: Series<Estimate<KilowattHours>>,
    pub grid_charge: Series<KilowattHours>,
    pub house_grid: Series<Estimate<KilowattHours>>,
    pub standby: Series<KilowattHours>,
    pub discharge_export_solar: Series<KilowattHours>,
    pub discharge_to_grid: Series<KilowattHours>,
    pub discharge_to_house: Series<KilowattHours>,
    pub diverter_solar: Series<KilowattHours>,
    pub diverter_grid: Series<KilowattHours>,
}

impl Plans {
    /// Point estimates of the plan.
    #[must_use]
    pub fn energy(&self, kind: PlanKind) -> Series<KilowattHours> {
        fn medians(series: &[(Interval, Estimate<KilowattHours>)]) -> Series<KilowattHours> {
            series.iter().map(|(interval, estimate)| (*interval, estimate.median)).collect()
        }
        match kind {
            PlanKind::SolarCharge => medians(&self.solar_charge),
            PlanKind::GridCharge => self.grid_charge.clone(),
            PlanKind::HouseGrid => medians(&self.house_grid),
            PlanKind::Standby => self.standby.clone(),
            PlanKind::DischargeExportSolar => self.discharge_export_solar.clone(),
            PlanKind::DischargeToGrid => self.discharge_to_grid.clone(),
            PlanKind::DischargeToHouse => self.discharge_to_house.clone(),
            PlanKind::DiverterSolar => self.diverter_solar.clone(),
            PlanKind::DiverterGrid => self.diverter_grid.clone(),
        }
    }

    /// Whether any of the plans has non-zero energy within the period.
    #[must_use]
    pub fn any_over(&self, kinds: EnumSet<PlanKind>, period: Interval) -> bool {
        kinds.iter().any(|kind| !self.energy(kind).over_period(period).is_zero())
    }

    /// Whether the plan has a slot that strictly contains the moment.
    #[must_use]
    pub fn is_active(&self, kind: PlanKind, at: DateTime<Local>) -> bool {
        self.energy(kind).iter().any(|(interval, _)| interval.strictly_contains(at))
    }

    pub fn sort(&mut self) {
        self.solar_charge.sort_by_key(|(interval, _)| interval.start);
        self.grid_charge.sort_by_key(|(interval, _)| interval.start);
        self.house_grid.sort_by_key(|(interval, _)| interval.start);
        self.standby.sort_by_key(|(interval, _)| interval.start);
        self.discharge_export_solar.sort_by_key(|(interval, _)| interval.start);
        self.discharge_to_grid.sort_by_key(|(interval, _)| interval.start);
        self.discharge_to_house.sort_by_key(|(interval, _)| interval.start);
        self.diverter_solar.sort_by_key(|(interval, _)| interval.start);
        self.diverter_grid.sort_by_key(|(interval, _)| interval.start);
    }
}
