use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use itertools::Itertools;

use crate::{
    core::{
        interval::{Interval, same_day_at},
        plans::Plans,
        series::{OverPeriod, Series},
    },
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
};

/// Hot-water diverter planner.
///
/// Diverts energy whenever it is cheaper than heating the water with gas.
#[derive(bon::Builder)]
pub struct DiverterPlanner<'a> {
    export_rates: &'a [(Interval, KilowattHourRate)],
    import_rates: &'a [(Interval, KilowattHourRate)],

    /// Solar surplus left after charging the battery.
    surplus: &'a [(Interval, KilowattHours)],

    /// Energy diverted so far.
    history: &'a [(Interval, KilowattHours)],

    /// Gas-equivalent price.
    target_rate: KilowattHourRate,

    /// Energy to divert per day.
    daily_target: KilowattHours,

    power_limit: Kilowatts,
    day_start: NaiveTime,
    now: DateTime<Local>,
}

#[derive(Copy, Clone, Debug)]
enum Source {
    Solar,
    Grid,
}

impl DiverterPlanner<'_> {
    /// Start of the current diverter day, always in the past.
    #[must_use]
    pub fn current_day_start(&self) -> DateTime<Local> {
        let start = same_day_at(self.now, self.day_start);
        if start >= self.now { start - TimeDelta::days(1) } else { start }
    }

    /// Outstanding energy per diverter day until the end of the timeline.
    fn requirements(&self) -> Series<KilowattHours> {
        let Some((last, _)) = self.export_rates.last() else {
            return Vec::new();
        };
        let day_start = self.current_day_start();
        let delivered = self.history.over_period(Interval::new(day_start, self.now));
        debug!(%delivered, "already diverted today");

        let mut requirements = Vec::new();
        let mut start = day_start;
        let mut target = self.daily_target - delivered;
        while start < last.end {
            let end = start + TimeDelta::days(1);
            requirements.push((Interval::new(start, end), target));
            start = end;
            target = self.daily_target;
        }
        requirements
    }

    #[instrument(skip_all, fields(target_rate = %self.target_rate))]
    pub fn plan(&self, plans: &mut Plans) {
        let mut requirements = self.requirements();

        // The grid draw is committed anyway in these slots, so the diverter may take the full power:
        let grid_pool = plans
            .house_grid
            .iter()
            .map(|(interval, _)| *interval)
            .chain(plans.grid_charge.iter().map(|(interval, _)| *interval))
            .map(|interval| (interval, self.import_rates.over_period(interval), Source::Grid));
        let surplus: Series<KilowattHours> =
            self.surplus.iter().copied().filter(|(_, energy)| !energy.is_zero()).collect();
        let solar_pool = surplus
            .iter()
            .map(|(interval, _)| (*interval, self.export_rates.over_period(*interval), Source::Solar));

        let mut solar_plan = Vec::new();
        let mut grid_plan = Vec::new();
        for (interval, rate, source) in
            grid_pool.chain(solar_pool).sorted_by(|(_, lhs, _), (_, rhs, _)| lhs.total_cmp(rhs))
        {
            if rate > self.target_rate {
                break;
            }
            let Some(index) = requirements.iter().position(|(day, _)| {
                day.start <= interval.start && interval.end <= day.end
            }) else {
                continue;
            };
            let max_energy = self.power_limit * interval.duration();
            let taken = match source {
                Source::Solar => {
                    let taken = surplus.over_period(interval).min(max_energy).max(KilowattHours::ZERO);
                    solar_plan.push((interval, taken));
                    taken
                }
                Source::Grid => {
                    grid_plan.push((interval, max_energy));
                    max_energy
                }
            };
            let remaining = requirements[index].1 - taken;
            if remaining <= KilowattHours::ZERO {
                requirements.remove(index);
            } else {
                requirements[index].1 = remaining;
            }
        }

        // Catch the surplus that the battery cannot take, should it get full early:
        for (interval, _) in &plans.solar_charge {
            let is_planned = solar_plan.iter().chain(&grid_plan).any(|(planned, _)| planned.start == interval.start);
            if !is_planned
                && self.export_rates.starting_at(interval.start).is_some_and(|rate| rate <= self.target_rate)
            {
                solar_plan.push((*interval, KilowattHours::ZERO));
            }
        }

        solar_plan.sort_by_key(|(interval, _)| interval.start);
        grid_plan.sort_by_key(|(interval, _)| interval.start);
        debug!(n_solar = solar_plan.len(), n_grid = grid_plan.len(), "planned");
        plans.diverter_solar = solar_plan;
        plans.diverter_grid = grid_plan;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::core::{
        estimate::Estimate,
        interval::tests::{at, slot},
    };

    fn rates(prices: &[f64]) -> Series<KilowattHourRate> {
        prices
            .iter()
            .enumerate()
            .map(|(index, price)| (slot(index as i64), KilowattHourRate::from(*price)))
            .collect()
    }

    #[test]
    fn test_day_start() {
        let export = rates(&[0.1]);
        let planner = DiverterPlanner::builder()
            .export_rates(&export)
            .import_rates(&export)
            .surplus(&[])
            .history(&[])
            .target_rate(KilowattHourRate::from(0.1))
            .daily_target(KilowattHours::from(5.0))
            .power_limit(Kilowatts::from(3.0))
            .day_start(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
            .now(at(8 * 60))
            .build();
        assert_eq!(planner.current_day_start(), at(9 * 60) - TimeDelta::days(1));
    }

    #[test]
    fn test_cheapest_first_until_target() {
        // Starting at 10:00, so that the day has started:
        let now = at(10 * 60);
        let export: Series<KilowattHourRate> = (20..24)
            .map(|index| (slot(index), KilowattHourRate::from(0.02 + 0.01 * (index - 20) as f64)))
            .collect();
        let import: Series<KilowattHourRate> =
            (20..24).map(|index| (slot(index), KilowattHourRate::from(0.30))).collect();
        let surplus: Series<KilowattHours> =
            (20..24).map(|index| (slot(index), KilowattHours::from(1.0))).collect();
        let history = vec![(Interval::new(at(9 * 60), at(10 * 60)), KilowattHours::from(0.5))];

        let planner = DiverterPlanner::builder()
            .export_rates(&export)
            .import_rates(&import)
            .surplus(&surplus)
            .history(&history)
            .target_rate(KilowattHourRate::from(0.05))
            .daily_target(KilowattHours::from(2.5))
            .power_limit(Kilowatts::from(3.0))
            .day_start(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
            .now(now)
            .build();
        let mut plans = Plans::default();
        planner.plan(&mut plans);

        // 2 kWh outstanding, the two cheapest slots cover it:
        let planned: Vec<_> = plans.diverter_solar.iter().map(|(interval, _)| *interval).collect();
        assert_eq!(planned, vec![slot(20), slot(21)]);
        assert_abs_diff_eq!(plans.diverter_solar[0].1.0, 1.0, epsilon = 1e-9);
        assert!(plans.diverter_grid.is_empty());
    }

    #[test]
    fn test_grid_slots_take_full_power() {
        let now = at(10 * 60);
        let export = rates(&[0.0; 24]);
        let import: Series<KilowattHourRate> = (0..24_i64)
            .map(|index| (slot(index), KilowattHourRate::from(if index == 22 { 0.04 } else { 0.30 })))
            .collect();
        let planner = DiverterPlanner::builder()
            .export_rates(&export)
            .import_rates(&import)
            .surplus(&[])
            .history(&[])
            .target_rate(KilowattHourRate::from(0.05))
            .daily_target(KilowattHours::from(5.0))
            .power_limit(Kilowatts::from(3.0))
            .day_start(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
            .now(now)
            .build();
        let mut plans = Plans::default();
        plans.grid_charge.push((slot(22), KilowattHours::from(1.5)));
        plans.house_grid.push((slot(23), Estimate::flat(KilowattHours::from(0.5))));
        planner.plan(&mut plans);

        assert_eq!(plans.diverter_grid.len(), 1);
        assert_eq!(plans.diverter_grid[0].0, slot(22));
        assert_abs_diff_eq!(plans.diverter_grid[0].1.0, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_solar_charge_slots_are_marked() {
        let now = at(10 * 60);
        let export = rates(&[0.04; 24]);
        let planner = DiverterPlanner::builder()
            .export_rates(&export)
            .import_rates(&export)
            .surplus(&[])
            .history(&[])
            .target_rate(KilowattHourRate::from(0.05))
            .daily_target(KilowattHours::from(5.0))
            .power_limit(Kilowatts::from(3.0))
            .day_start(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
            .now(now)
            .build();
        let mut plans = Plans::default();
        plans.solar_charge.push((slot(22), Estimate::flat(KilowattHours::from(1.0))));
        planner.plan(&mut plans);
        assert_eq!(plans.diverter_solar, vec![(slot(22), KilowattHours::ZERO)]);
    }
}
