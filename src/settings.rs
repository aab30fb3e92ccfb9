use std::{fmt::Debug, fs, path::Path};

use chrono::{NaiveTime, TimeDelta};
use serde::Deserialize;
use serde_with::{DefaultOnError, DisplayFromStr, PickFirst, serde_as};

use crate::{
    core::{allocator::Margins, battery::BatteryParameters},
    prelude::*,
    quantity::{Quantity, energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
};

/// Settings file as written by a human: every value is optional, and may be a number or a string.
///
/// Anything unreadable falls back to the default.
#[serde_as]
#[derive(Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    battery_charge_rate_limit: Option<Kilowatts>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    battery_discharge_rate_limit: Option<Kilowatts>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    battery_grid_charge_rate: Option<Kilowatts>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    battery_target_reserve_percentage: Option<f64>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    battery_abs_min_reserve_percentage: Option<f64>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    battery_full_percentage: Option<f64>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    battery_full_percentage_hysteresis: Option<f64>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    battery_efficiency: Option<f64>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    gas_hot_water_efficiency: Option<f64>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    eddi_target_power: Option<KilowattHours>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    eddi_power_limit: Option<Kilowatts>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    grid_export_limit: Option<Kilowatts>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    min_buy_sell_margin: Option<KilowattHourRate>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    min_buy_sell_not_full_margin: Option<KilowattHourRate>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    min_buy_use_margin: Option<KilowattHourRate>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    top_up_cost_tolerance: Option<f64>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    extend_tariff: Option<bool>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    future_time_window_hours: Option<f64>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    target_full_time: Option<NaiveTime>,

    #[serde_as(deserialize_as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    eddi_day_start: Option<NaiveTime>,
}

/// Validated planner configuration.
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    pub battery_charge_rate_limit: Kilowatts,
    pub battery_discharge_rate_limit: Kilowatts,
    pub battery_grid_charge_rate: Kilowatts,

    /// Percentages are on the battery app scale.
    pub battery_target_reserve_percentage: f64,
    pub battery_abs_min_reserve_percentage: f64,
    pub battery_full_percentage: f64,
    pub battery_full_percentage_hysteresis: f64,

    /// Round trip.
    pub battery_efficiency: f64,

    /// Efficiency of the gas boiler that the diverter competes with.
    pub gas_hot_water_efficiency: f64,

    /// Energy to divert per diverter day.
    pub eddi_target_power: KilowattHours,
    pub eddi_power_limit: Kilowatts,

    pub grid_export_limit: Kilowatts,
    pub min_buy_sell_margin: KilowattHourRate,
    pub min_buy_sell_not_full_margin: KilowattHourRate,
    pub min_buy_use_margin: KilowattHourRate,

    /// Multiplier of the max charge cost for the final top-up pass.
    pub top_up_cost_tolerance: f64,

    /// Repeat the previous day's rates when the tariff stops short of the planning window.
    pub extend_tariff: bool,

    pub future_time_window_hours: f64,
    pub target_full_time: NaiveTime,
    pub eddi_day_start: NaiveTime,
}

impl Settings {
    /// Read the settings, falling back to the defaults when the file does not exist.
    #[instrument(name = "reading the settings…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_file() {
            Self::from_toml(&fs::read_to_string(path)?)
                .with_context(|| format!("failed to read `{}`", path.display()))
        } else {
            warn!("the settings file does not exist, using the defaults");
            Self::from_raw(RawSettings::default())
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Self::from_raw(toml::from_str(text)?)
    }

    #[must_use]
    pub const fn margins(&self) -> Margins {
        Margins {
            buy_sell: self.min_buy_sell_margin,
            buy_sell_not_full: self.min_buy_sell_not_full_margin,
            buy_use: self.min_buy_use_margin,
        }
    }

    /// How far ahead the extended tariff reaches.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn future_time_window(&self) -> TimeDelta {
        TimeDelta::minutes((self.future_time_window_hours * 60.0).round() as i64)
    }

    /// Combine the configured battery limits with its live state.
    pub fn battery(&self, capacity: KilowattHours, energy: KilowattHours) -> BatteryParameters {
        BatteryParameters::builder()
            .capacity(capacity)
            .energy(energy)
            .target_reserve_percentage(self.battery_target_reserve_percentage)
            .abs_min_reserve_percentage(self.battery_abs_min_reserve_percentage)
            .full_percentage(self.battery_full_percentage)
            .full_percentage_hysteresis(self.battery_full_percentage_hysteresis)
            .efficiency(self.battery_efficiency)
            .charge_rate_limit(self.battery_charge_rate_limit)
            .discharge_rate_limit(self.battery_discharge_rate_limit)
            .grid_charge_rate(self.battery_grid_charge_rate)
            .target_full_time(self.target_full_time)
            .build()
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self> {
        let settings = Self {
            battery_charge_rate_limit: raw.battery_charge_rate_limit.unwrap_or(Quantity(5.0)),
            battery_discharge_rate_limit: raw.battery_discharge_rate_limit.unwrap_or(Quantity(5.0)),
            battery_grid_charge_rate: raw.battery_grid_charge_rate.unwrap_or(Quantity(3.3)),
            battery_target_reserve_percentage: raw.battery_target_reserve_percentage.unwrap_or(20.0),
            battery_abs_min_reserve_percentage: raw.battery_abs_min_reserve_percentage.unwrap_or(0.0),
            battery_full_percentage: raw.battery_full_percentage.unwrap_or(95.0),
            battery_full_percentage_hysteresis: raw.battery_full_percentage_hysteresis.unwrap_or(3.0),
            battery_efficiency: raw.battery_efficiency.unwrap_or(0.9),
            gas_hot_water_efficiency: raw.gas_hot_water_efficiency.unwrap_or(0.9),
            eddi_target_power: raw.eddi_target_power.unwrap_or(Quantity(10.0)),
            eddi_power_limit: raw.eddi_power_limit.unwrap_or(Quantity(3.6)),
            grid_export_limit: raw.grid_export_limit.unwrap_or(Quantity(5.0)),
            min_buy_sell_margin: raw.min_buy_sell_margin.unwrap_or(Quantity(0.05)),
            min_buy_sell_not_full_margin: raw
                .min_buy_sell_not_full_margin
                .unwrap_or(Quantity(0.10)),
            min_buy_use_margin: raw.min_buy_use_margin.unwrap_or(Quantity(0.01)),
            top_up_cost_tolerance: raw.top_up_cost_tolerance.unwrap_or(1.0),
            extend_tariff: raw.extend_tariff.unwrap_or(false),
            future_time_window_hours: raw.future_time_window_hours.unwrap_or(28.0),
            target_full_time: raw
                .target_full_time
                .unwrap_or_else(|| NaiveTime::from_hms_opt(22, 30, 0).unwrap_or_default()),
            eddi_day_start: raw
                .eddi_day_start
                .unwrap_or_else(|| NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()),
        };

        ensure!(
            (0.0..=100.0).contains(&settings.battery_full_percentage),
            "the full percentage must be within 0..=100",
        );
        ensure!(
            settings.battery_abs_min_reserve_percentage <= settings.battery_target_reserve_percentage,
            "the absolute minimum reserve must not exceed the target reserve",
        );
        ensure!(
            settings.battery_efficiency > 0.0 && settings.battery_efficiency <= 1.0,
            "the battery efficiency must be within (0, 1]",
        );
        ensure!(
            settings.gas_hot_water_efficiency > 0.0 && settings.gas_hot_water_efficiency <= 1.0,
            "the gas hot water efficiency must be within (0, 1]",
        );
        ensure!(settings.future_time_window_hours > 0.0, "the future time window must be positive");
        Ok(settings)
    }
}
