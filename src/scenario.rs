use std::{fmt::Debug, fs, path::Path};

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{
    core::{estimate::Estimate, interval::Interval, series::Series},
    prelude::*,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

/// Inputs of a single planning cycle, as collected from the home automation.
#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    pub now: DateTime<Local>,
    pub battery: BatteryStatus,
    pub export_rates: Vec<RatePoint>,
    pub import_rates: Vec<RatePoint>,

    #[serde(default)]
    pub solar_forecast: Vec<ForecastPoint>,

    #[serde(default)]
    pub usage_forecast: Vec<EnergyPoint>,

    /// Energy diverted into the hot water so far.
    #[serde(default)]
    pub diverter_history: Vec<EnergyPoint>,

    /// Gas price, which the diverter competes with.
    pub gas_rate: KilowattHourRate,

    #[serde(default)]
    pub previous_max_charge_cost: KilowattHourRate,

    #[serde(default)]
    pub saving_sessions: SavingSessions,

    #[serde(default)]
    pub tariff_override: Option<TariffOverride>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
pub struct BatteryStatus {
    pub capacity: KilowattHours,

    /// Currently stored energy.
    pub energy: KilowattHours,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub rate: KilowattHourRate,
}

impl RatePoint {
    pub const fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

/// Solar generation forecast for a period, the percentiles default to the median.
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct ForecastPoint {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub median: KilowattHours,

    #[serde(default)]
    pub low: Option<KilowattHours>,

    #[serde(default)]
    pub high: Option<KilowattHours>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
pub struct EnergyPoint {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub energy: KilowattHours,
}

/// Fixed-price export window.
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct PriceWindow {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub price: KilowattHourRate,
}

impl PriceWindow {
    #[must_use]
    pub fn covers(&self, interval: Interval) -> bool {
        self.start <= interval.start && interval.end <= self.end
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SavingSessions {
    /// Offered, but not joined yet.
    #[serde(default)]
    pub available: Vec<PriceWindow>,

    #[serde(default)]
    pub joined: Vec<PriceWindow>,
}

impl SavingSessions {
    /// Sessions to plan for.
    ///
    /// Every offered session is expected to be joined, unless it starts within half an hour:
    /// then joining has probably failed.
    pub fn applicable(&self, now: DateTime<Local>) -> impl Iterator<Item = &PriceWindow> {
        self.available
            .iter()
            .filter(move |session| now <= session.start - TimeDelta::minutes(30) || session.end <= now)
            .chain(&self.joined)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
pub enum TariffKind {
    Export,
    Import,
}

/// Manual price override for one of the tariffs.
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct TariffOverride {
    pub kind: TariffKind,

    #[serde(flatten)]
    pub window: PriceWindow,
}

impl Scenario {
    #[instrument(name = "reading the scenario…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        serde_json::from_slice(&fs::read(path)?)
            .with_context(|| format!("failed to parse `{}`", path.display()))
    }

    #[must_use]
    pub fn export_rates(&self) -> Series<KilowattHourRate> {
        Self::rates(&self.export_rates)
    }

    #[must_use]
    pub fn import_rates(&self) -> Series<KilowattHourRate> {
        Self::rates(&self.import_rates)
    }

    fn rates(points: &[RatePoint]) -> Series<KilowattHourRate> {
        points.iter().map(|point| (point.interval(), point.rate)).collect()
    }

    #[must_use]
    pub fn solar(&self) -> Series<Estimate<KilowattHours>> {
        self.solar_forecast
            .iter()
            .map(|point| {
                let estimate = Estimate {
                    median: point.median,
                    low: point.low.unwrap_or(point.median),
                    high: point.high.unwrap_or(point.median),
                };
                (Interval::new(point.start, point.end), estimate)
            })
            .collect()
    }

    #[must_use]
    pub fn usage(&self) -> Series<KilowattHours> {
        Self::energy(&self.usage_forecast)
    }

    #[must_use]
    pub fn diverter_history(&self) -> Series<KilowattHours> {
        Self::energy(&self.diverter_history)
    }

    fn energy(points: &[EnergyPoint]) -> Series<KilowattHours> {
        points.iter().map(|point| (Interval::new(point.start, point.end), point.energy)).collect()
    }
}
