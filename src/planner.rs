use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use serde::Serialize;

use crate::{
    core::{
        allocator::Allocator,
        battery::BatteryForecast,
        discharge,
        diverter::DiverterPlanner,
        estimate::Percentile,
        interval::{Interval, same_day_at},
        mode::{BatteryMode, DiverterMode, next_max_charge_cost, plan_summary},
        plans::{PlanKind, Plans},
        profile::{GridSummary, ProfileEntry, export_profile, import_profile},
        series::{ExtendForward, OverPeriod, Series},
        timeline::Timeline,
    },
    prelude::*,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
    scenario::{PriceWindow, RatePoint, Scenario, TariffKind},
    settings::Settings,
};

/// Outcome of a planning cycle.
#[derive(Debug, Serialize)]
pub struct Schedule {
    pub plans: Plans,
    pub max_charge_cost: KilowattHourRate,

    /// To be passed as the previous max charge cost to the next cycle.
    pub next_max_charge_cost: KilowattHourRate,

    pub forecast: BatteryForecast,
    pub export_profile: Vec<ProfileEntry>,
    pub import_profile: Vec<ProfileEntry>,
    pub export_rates: Vec<RatePoint>,
    pub import_rates: Vec<RatePoint>,
    pub grid_summary: GridSummary,
    pub battery_mode: BatteryMode,
    pub diverter_mode: DiverterMode,

    /// Compact overview of the plans.
    pub summary: String,
}

/// Runs a complete planning cycle.
#[derive(bon::Builder)]
pub struct Planner<'a> {
    settings: &'a Settings,
    scenario: &'a Scenario,
}

impl Planner<'_> {
    /// Normalize the inputs: extend, trim and override the rates, and derive the solar series.
    #[instrument(skip_all)]
    pub fn timeline(&self) -> Result<Timeline> {
        let now = self.scenario.now;
        let mut export_rates = self.scenario.export_rates();
        let mut import_rates = self.scenario.import_rates();

        if self.settings.extend_tariff
            && let Some((last, _)) = export_rates.last()
        {
            let end = same_day_at(last.end + self.settings.future_time_window(), NaiveTime::MIN);
            export_rates.extend_forward(TimeDelta::zero(), Some(end));
            import_rates.extend_forward(TimeDelta::zero(), Some(end));
            debug!(?end, "extended the tariff");
        }

        export_rates.retain(|(interval, _)| interval.end > now);
        import_rates.retain(|(interval, _)| interval.end > now);
        let export_end = last_end(&export_rates).context("no upcoming export rates")?;
        let import_end = last_end(&import_rates).context("no upcoming import rates")?;
        export_rates.retain(|(interval, _)| interval.end <= import_end);
        import_rates.retain(|(interval, _)| interval.end <= export_end);
        ensure!(
            !export_rates.is_empty() && !import_rates.is_empty(),
            "the export and import rates do not overlap",
        );
        info!(n_export = export_rates.len(), n_import = import_rates.len(), "normalized the rates");

        let original_export_rates = export_rates.clone();
        let original_import_rates = import_rates.clone();

        let mut extend_discharge_to = now;
        for session in self.scenario.saving_sessions.applicable(now) {
            if override_rates(&mut export_rates, session) {
                info!(?session.start, ?session.end, %session.price, "applied the saving session");
                extend_discharge_to = extend_discharge_to.max(session.end);
            }
        }
        if let Some(tariff_override) = self.scenario.tariff_override {
            let window = tariff_override.window;
            let rates = match tariff_override.kind {
                TariffKind::Export => &mut export_rates,
                TariffKind::Import => &mut import_rates,
            };
            if override_rates(rates, &window) {
                info!(?tariff_override.kind, %window.price, "overridden the tariff");
                if tariff_override.kind == TariffKind::Export {
                    extend_discharge_to = extend_discharge_to.max(window.end);
                }
            }
        }

        let first_start = export_rates.first().map_or(now, |(interval, _)| interval.start);
        let export_end = last_end(&export_rates).unwrap_or(now);
        let mut usage = self.scenario.usage();
        usage.extend_forward(TimeDelta::zero(), Some(export_end));
        usage.retain(|(interval, _)| interval.start >= first_start && interval.end <= export_end);

        let solar = self.scenario.solar();
        let solar_surplus = usage.combine(&solar, |usage, solar| {
            solar.map(|solar| (solar - usage).max(KilowattHours::ZERO))
        });
        let usage_after_solar = usage.combine(&solar, |usage, solar| {
            solar.map(|solar| (usage - solar).max(KilowattHours::ZERO))
        });
        let solar_usage = solar_surplus.combine(&solar, |surplus, solar| solar - surplus);

        Ok(Timeline {
            export_rates,
            import_rates,
            original_export_rates,
            original_import_rates,
            usage,
            solar_surplus,
            usage_after_solar,
            solar_usage,
            extend_discharge_to,
        })
    }

    #[instrument(skip_all, fields(now = ?self.scenario.now))]
    pub fn plan(&self) -> Result<Schedule> {
        let now = self.scenario.now;
        let timeline = self.timeline()?;
        let battery =
            self.settings.battery(self.scenario.battery.capacity, self.scenario.battery.energy);
        let allocator = Allocator::builder()
            .timeline(&timeline)
            .battery(&battery)
            .margins(self.settings.margins())
            .grid_export_limit(self.settings.grid_export_limit)
            .now(now)
            .build();

        let state = allocator.charge_plan(
            self.scenario.previous_max_charge_cost,
            discharge::horizon(now, timeline.extend_discharge_to),
            self.settings.top_up_cost_tolerance,
        );
        let max_charge_cost = state.max_charge_cost;
        let mut plans = state.plans;

        plans.standby = Self::standby(&timeline, &plans);
        plans.discharge_to_house = Self::discharge_to_house(&timeline, &plans);

        let post_battery_surplus: Series<KilowattHours> = timeline
            .solar_surplus
            .combine(&plans.solar_charge, |surplus, charge| surplus.median - charge.median);
        let diverter_history = self.scenario.diverter_history();
        DiverterPlanner::builder()
            .export_rates(&timeline.export_rates)
            .import_rates(&timeline.import_rates)
            .surplus(&post_battery_surplus)
            .history(&diverter_history)
            .target_rate(self.scenario.gas_rate / self.settings.gas_hot_water_efficiency)
            .daily_target(self.settings.eddi_target_power)
            .power_limit(self.settings.eddi_power_limit)
            .day_start(self.settings.eddi_day_start)
            .now(now)
            .build()
            .plan(&mut plans);

        let export_profile = export_profile(&timeline, &plans);
        let import_profile = import_profile(&timeline, &plans);
        let grid_summary = GridSummary::new(&import_profile, &export_profile);
        info!(summary = %grid_summary.export, "export");
        info!(summary = %grid_summary.import, "import");
        info!(summary = %grid_summary.net, %max_charge_cost, "net");

        let next_max_charge_cost = next_max_charge_cost(
            self.scenario.previous_max_charge_cost,
            &plans,
            &timeline,
            battery.efficiency,
            now,
        );
        Ok(Schedule {
            forecast: allocator.simulate(&plans, Percentile::Median),
            max_charge_cost,
            next_max_charge_cost,
            export_profile,
            import_profile,
            export_rates: rate_points(&timeline.export_rates),
            import_rates: rate_points(&timeline.import_rates),
            grid_summary,
            battery_mode: BatteryMode::at(&plans, now),
            diverter_mode: DiverterMode::at(&plans, now),
            summary: plan_summary(&plans),
            plans,
        })
    }

    /// Slots with a solar surplus, during which the battery neither charges nor discharges.
    fn standby(timeline: &Timeline, plans: &Plans) -> Series<KilowattHours> {
        timeline
            .export_rates
            .iter()
            .filter_map(|(interval, _)| {
                let surplus = timeline.solar_surplus.over_period(*interval).median;
                (surplus > KilowattHours::ZERO && !plans.any_over(PlanKind::exclusive(), *interval))
                    .then_some((*interval, surplus))
            })
            .collect()
    }

    /// Slots during which the battery simply powers the house, for information.
    fn discharge_to_house(timeline: &Timeline, plans: &Plans) -> Series<KilowattHours> {
        let planned = PlanKind::exclusive() | PlanKind::Standby;
        timeline
            .export_rates
            .iter()
            .map(|(interval, _)| (*interval, timeline.usage.over_period(*interval)))
            .filter(|(interval, usage)| !usage.is_zero() && !plans.any_over(planned, *interval))
            .collect()
    }
}

fn last_end(rates: &[(Interval, KilowattHourRate)]) -> Option<DateTime<Local>> {
    rates.iter().map(|(interval, _)| interval.end).max()
}

/// Replace the price of every slot fully inside the window, returns whether any slot was affected.
fn override_rates(rates: &mut Series<KilowattHourRate>, window: &PriceWindow) -> bool {
    let mut is_overridden = false;
    for (interval, rate) in rates.iter_mut().filter(|(interval, _)| window.covers(*interval)) {
        trace!(?interval.start, from = %rate, to = %window.price, "overriding");
        *rate = window.price;
        is_overridden = true;
    }
    is_overridden
}

fn rate_points(rates: &[(Interval, KilowattHourRate)]) -> Vec<RatePoint> {
    rates
        .iter()
        .map(|(interval, rate)| RatePoint { start: interval.start, end: interval.end, rate: *rate })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        core::{
            allocator::tests::assert_exclusive,
            interval::tests::{at, slot},
        },
        scenario::{BatteryStatus, EnergyPoint, ForecastPoint, PriceWindow, SavingSessions, TariffOverride},
    };

    fn rate_points(prices: impl IntoIterator<Item = f64>) -> Vec<RatePoint> {
        prices
            .into_iter()
            .zip(0..)
            .map(|(price, index)| RatePoint {
                start: slot(index).start,
                end: slot(index).end,
                rate: KilowattHourRate::from(price),
            })
            .collect()
    }

    /// A sunny day: cheap night imports, a solar surplus around noon, and an expensive evening.
    fn scenario() -> Scenario {
        let import = (0..48).map(|index| match index {
            0..8 => 0.08,
            32..38 => 0.40,
            _ => 0.25,
        });
        let export = (0..48).map(|index| if (32..38).contains(&index) { 0.20 } else { 0.05 });
        let solar_forecast = (16..32)
            .map(|index| ForecastPoint {
                start: slot(index).start,
                end: slot(index).end,
                median: KilowattHours::from(1.5),
                low: Some(KilowattHours::from(0.8)),
                high: Some(KilowattHours::from(2.0)),
            })
            .collect();
        let usage_forecast = (0..48)
            .map(|index| EnergyPoint {
                start: slot(index).start,
                end: slot(index).end,
                energy: KilowattHours::from(0.4),
            })
            .collect();
        Scenario {
            now: at(0),
            battery: BatteryStatus { capacity: KilowattHours::from(10.0), energy: KilowattHours::from(4.0) },
            export_rates: rate_points(export),
            import_rates: rate_points(import),
            solar_forecast,
            usage_forecast,
            diverter_history: Vec::new(),
            gas_rate: KilowattHourRate::from(0.06),
            previous_max_charge_cost: KilowattHourRate::ZERO,
            saving_sessions: SavingSessions::default(),
            tariff_override: None,
        }
    }

    #[test]
    fn test_timeline_trims_the_rates() -> Result {
        let settings = Settings::from_toml("")?;
        let mut scenario = scenario();
        scenario.now = at(45);
        scenario.import_rates.truncate(40);

        let timeline = Planner::builder().settings(&settings).scenario(&scenario).build().timeline()?;
        // The slot in progress is kept:
        assert_eq!(timeline.export_rates.first().map(|(interval, _)| *interval), Some(slot(1)));
        assert_eq!(timeline.export_rates.len(), 39);
        assert_eq!(timeline.import_rates.len(), 39);
        assert_eq!(timeline.usage.len(), 39);
        assert_eq!(timeline.extend_discharge_to, at(45));
        Ok(())
    }

    #[test]
    fn test_timeline_applies_the_overrides() -> Result {
        let settings = Settings::from_toml("")?;
        let mut scenario = scenario();
        scenario.saving_sessions.joined.push(PriceWindow {
            start: at(17 * 60),
            end: at(18 * 60),
            price: KilowattHourRate::from(3.0),
        });
        scenario.tariff_override = Some(TariffOverride {
            kind: TariffKind::Import,
            window: PriceWindow { start: at(0), end: at(60), price: KilowattHourRate::from(0.01) },
        });

        let timeline = Planner::builder().settings(&settings).scenario(&scenario).build().timeline()?;
        assert_eq!(timeline.export_rates.starting_at(slot(34).start), Some(KilowattHourRate::from(3.0)));
        assert_eq!(timeline.original_export_rates.starting_at(slot(34).start), Some(KilowattHourRate::from(0.20)));
        assert_eq!(timeline.import_rates.starting_at(slot(1).start), Some(KilowattHourRate::from(0.01)));
        assert_eq!(timeline.import_rates.starting_at(slot(2).start), Some(KilowattHourRate::from(0.08)));
        assert_eq!(timeline.extend_discharge_to, at(18 * 60));
        Ok(())
    }

    #[test]
    fn test_timeline_extends_the_tariff() -> Result {
        let settings = Settings::from_toml("extend_tariff = true")?;
        let scenario = scenario();
        let timeline = Planner::builder().settings(&settings).scenario(&scenario).build().timeline()?;
        // 24:00 plus 28 hours is 04:00 on the day after tomorrow, floored to its midnight:
        assert_eq!(timeline.export_rates.len(), 96);
        assert_eq!(timeline.import_rates.starting_at(slot(48).start), Some(KilowattHourRate::from(0.08)));
        assert_eq!(timeline.usage.len(), 96);
        Ok(())
    }

    #[test]
    fn test_timeline_without_rates() -> Result {
        let settings = Settings::from_toml("")?;
        let mut scenario = scenario();
        scenario.now = at(48 * 30);
        assert!(Planner::builder().settings(&settings).scenario(&scenario).build().timeline().is_err());
        Ok(())
    }

    #[test]
    fn test_plan() -> Result {
        let settings = Settings::from_toml("")?;
        let scenario = scenario();
        let schedule = Planner::builder().settings(&settings).scenario(&scenario).build().plan()?;

        assert_exclusive(&schedule.plans);
        assert!(schedule.max_charge_cost >= KilowattHourRate::ZERO);
        assert!(schedule.next_max_charge_cost >= scenario.previous_max_charge_cost);
        assert!(!schedule.summary.is_empty());
        assert_eq!(schedule.export_rates.len(), 48);
        assert_eq!(schedule.forecast.slots.len(), 48);

        // Standby and discharge-to-house never overlap the battery plans:
        for (interval, _) in schedule.plans.standby.iter().chain(&schedule.plans.discharge_to_house) {
            assert!(!schedule.plans.any_over(PlanKind::exclusive(), *interval));
        }
        // Nothing is diverted when gas is cheaper than anything but the daytime export:
        assert!(schedule.plans.diverter_grid.is_empty());

        let net = schedule.grid_summary.net;
        assert_abs_diff_eq!(
            net.energy.0,
            schedule.grid_summary.import.energy.0 - schedule.grid_summary.export.energy.0,
            epsilon = 1e-9,
        );
        Ok(())
    }

    #[test]
    fn test_plan_charges_for_the_evening() -> Result {
        let settings = Settings::from_toml("")?;
        let mut scenario = scenario();
        scenario.solar_forecast.clear();
        scenario.battery.energy = KilowattHours::from(2.0);

        let schedule = Planner::builder().settings(&settings).scenario(&scenario).build().plan()?;
        assert_exclusive(&schedule.plans);
        // The battery is below the reserve right away, and the night is the cheapest:
        assert_eq!(schedule.plans.grid_charge.first().map(|(interval, _)| *interval), Some(slot(0)));
        assert_eq!(schedule.battery_mode, BatteryMode::GridCharge);
        assert!(schedule.summary.starts_with("G000"));
        Ok(())
    }
}
