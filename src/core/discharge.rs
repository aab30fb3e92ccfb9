use std::fmt::{Display, Formatter};

use chrono::{DateTime, Local, NaiveTime, TimeDelta, Timelike};
use itertools::Itertools;

use crate::{
    core::{
        allocator::Allocator,
        interval::{Interval, same_day_at},
        series::OverPeriod,
        state::AllocationState,
    },
    prelude::*,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

/// Way of turning a slot into a discharge slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DischargeTest {
    /// Discharge into the grid on top of the house usage, up to the grid export limit.
    ExportToGrid,

    /// Power the house from the battery, so that the solar that covered it gets exported.
    ExportSolar,
}

impl Display for DischargeTest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExportToGrid => write!(f, "export to grid"),
            Self::ExportSolar => write!(f, "export solar"),
        }
    }
}

/// End of the discharge planning window: the next midnight, or the one after that late in the evening.
#[must_use]
pub fn horizon(now: DateTime<Local>, extend_to: DateTime<Local>) -> DateTime<Local> {
    let mut end = same_day_at(now, NaiveTime::MIN) + TimeDelta::days(1);
    if now.hour() > 20 {
        end += TimeDelta::days(1);
    }
    end.max(extend_to)
}

impl Allocator<'_> {
    /// Swap the most expensive export slots to discharging, one by one, for as long as the battery
    /// can still be recharged at a sufficient margin.
    #[instrument(skip_all, fields(test = %test))]
    pub fn add_discharge_slots(
        &self,
        mut state: AllocationState,
        test: DischargeTest,
        horizon: DateTime<Local>,
    ) -> AllocationState {
        // Popped from the back: most expensive first, then the earliest day, then the latest time of day.
        let mut potential: Vec<(Interval, KilowattHourRate)> = state
            .export_queue
            .iter()
            .filter(|(interval, _)| interval.start < horizon)
            .sorted_by(|(lhs_interval, lhs_rate), (rhs_interval, rhs_rate)| {
                lhs_rate
                    .total_cmp(rhs_rate)
                    .then_with(|| rhs_interval.start.date_naive().cmp(&lhs_interval.start.date_naive()))
                    .then_with(|| lhs_interval.start_time().cmp(&rhs_interval.start_time()))
            })
            .collect();
        Self::drop_allocated(&mut potential, &state);

        while let Some((interval, rate)) = potential.pop() {
            // Cannot pay off even without extra charging:
            if rate - state.max_charge_cost <= self.margins.buy_sell {
                continue;
            }
            let Some(mut trial) = self.try_discharge(&state, test, interval) else {
                continue;
            };
            trial.withdraw(interval.start);
            let (trial, outcome) = self.allocate(trial, None);

            let worst_cost = self
                .max_house_rate_for_empty(&trial)
                .map_or(trial.max_charge_cost, |rate| rate.max(trial.max_charge_cost));
            let margin = rate - worst_cost;
            let required_margin = if outcome.is_fully_charged {
                self.margins.buy_sell
            } else {
                self.margins.buy_sell_not_full
            };
            if margin > required_margin {
                info!(?interval.start, %rate, %margin, "accepted");
                state.adopt(trial);
                Self::drop_allocated(&mut potential, &state);
            } else {
                debug!(?interval.start, %rate, %margin, %required_margin, "rejected");
            }
        }
        state
    }

    /// Clone the state with the discharge applied, if the slot has anything to discharge.
    fn try_discharge(
        &self,
        state: &AllocationState,
        test: DischargeTest,
        interval: Interval,
    ) -> Option<AllocationState> {
        match test {
            DischargeTest::ExportToGrid => {
                let max_export = self.grid_export_limit * interval.duration();
                let max_discharge = self.battery.discharge_rate_limit * interval.duration();
                let surplus = self.timeline.solar_surplus.over_period(interval).median;
                let usage = self.timeline.usage_after_solar.over_period(interval).median;
                let discharge = (max_discharge - usage).min((max_export - surplus).max(KilowattHours::ZERO));
                (discharge > KilowattHours::ZERO).then(|| {
                    let mut trial = state.clone();
                    trial.plans.discharge_to_grid.push((interval, discharge));
                    trial
                })
            }
            DischargeTest::ExportSolar => {
                let solar_usage = self.timeline.solar_usage.over_period(interval).median;
                (solar_usage > KilowattHours::ZERO).then(|| {
                    let mut trial = state.clone();
                    trial.plans.discharge_export_solar.push((interval, solar_usage));
                    trial
                })
            }
        }
    }

    /// Most expensive way of powering the house during the slots where the battery is empty.
    #[must_use]
    pub fn max_house_rate_for_empty(&self, state: &AllocationState) -> Option<KilowattHourRate> {
        state
            .forecast
            .slots
            .iter()
            .filter(|slot| slot.is_empty)
            .filter_map(|slot| self.timeline.house_rate(slot.interval))
            .max_by(KilowattHourRate::total_cmp)
    }

    /// Slots that charge or run the house from the grid cannot discharge.
    fn drop_allocated(potential: &mut Vec<(Interval, KilowattHourRate)>, state: &AllocationState) {
        potential.retain(|(interval, _)| {
            state.plans.solar_charge.over_period(*interval).median.is_zero()
                && state.plans.house_grid.over_period(*interval).median.is_zero()
                && state.plans.grid_charge.over_period(*interval).is_zero()
        });
    }
}
