use chrono::{DateTime, Local};

use crate::{
    core::{
        allocator::Allocator,
        discharge::DischargeTest,
        series::OverPeriod,
        state::AllocationState,
    },
    prelude::*,
    quantity::rate::KilowattHourRate,
};

impl Allocator<'_> {
    /// Complete battery plan of a cycle.
    ///
    /// Charges just enough to stay above the reserve and be full by the target time,
    /// swaps profitable slots to discharging, and finally tops the battery up without raising the
    /// max charge cost.
    #[instrument(skip_all)]
    pub fn charge_plan(
        &self,
        previous_max_charge_cost: KilowattHourRate,
        discharge_horizon: DateTime<Local>,
        top_up_cost_tolerance: f64,
    ) -> AllocationState {
        let (state, outcome) = self.allocate(self.initial_state(previous_max_charge_cost), None);
        debug!(?outcome, max_charge_cost = %state.max_charge_cost, "initial pass");

        let state = self.add_discharge_slots(state, DischargeTest::ExportToGrid, discharge_horizon);
        let state = self.add_discharge_slots(state, DischargeTest::ExportSolar, discharge_horizon);

        let top_up = state.max_charge_cost * top_up_cost_tolerance;
        info!(threshold = %top_up, "topping up");
        let (mut state, outcome) = self.allocate(state, Some(top_up));
        info!(?outcome, max_charge_cost = %state.max_charge_cost, "planned the battery");

        // Charging from the grid already powers the house:
        let grid_charge = state.plans.grid_charge.clone();
        state.plans.house_grid.retain(|(interval, usage)| {
            grid_charge.over_period(*interval).is_zero() && !usage.median.is_zero()
        });
        state.plans.sort();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        allocator::tests::{allocator, assert_exclusive},
        battery::tests::battery,
        interval::tests::{at, slot},
        timeline::tests::timeline,
    };

    #[test]
    fn test_plans_are_exclusive() {
        let mut export = vec![0.05; 48];
        export[36] = 0.60;
        export[37] = 0.55;
        let mut import = vec![0.30; 48];
        import[2] = 0.08;
        import[3] = 0.09;
        let mut solar = vec![0.0; 48];
        for energy in &mut solar[18..30] {
            *energy = 1.5;
        }
        let timeline = timeline(&export, &import, 0.4, &solar);
        let battery = battery(5.0);
        let allocator = allocator(&timeline, &battery);

        let state = allocator.charge_plan(KilowattHourRate::ZERO, at(24 * 60), 1.0);
        assert_exclusive(&state.plans);
        assert!(state.plans.house_grid.iter().all(|(_, usage)| !usage.median.is_zero()));
        assert!(
            state.plans.grid_charge.windows(2).all(|pair| pair[0].0.start < pair[1].0.start),
            "plans are sorted",
        );
        assert!(!state.plans.solar_charge.is_empty());
        assert!(state.plans.solar_charge.iter().all(|(interval, _)| {
            interval.start >= slot(18).start && interval.end <= slot(30).start
        }));
    }

    #[test]
    fn test_max_charge_cost_is_carried_over() {
        let timeline = timeline(&[0.0; 4], &[0.30; 4], 0.0, &[]);
        let battery = battery(5.0);
        let allocator = allocator(&timeline, &battery);
        let state = allocator.charge_plan(KilowattHourRate::from(0.2), at(24 * 60), 1.0);
        assert!(state.max_charge_cost >= KilowattHourRate::from(0.2));
    }

    #[test]
    fn test_solar_and_grid_never_share_a_slot() {
        // The first slot has a small surplus and the cheapest import as well:
        let timeline = timeline(&[0.01, 0.30, 0.30, 0.30], &[0.02, 0.40, 0.40, 0.40], 0.5, &[0.7]);
        let battery = battery(3.0);
        let allocator = allocator(&timeline, &battery);

        let state = allocator.charge_plan(KilowattHourRate::ZERO, at(24 * 60), 1.0);

        assert_exclusive(&state.plans);
        assert!(state.plans.solar_charge.iter().any(|(interval, _)| *interval == slot(0)));
        assert!(state.plans.grid_charge.iter().all(|(interval, _)| *interval != slot(0)));
        assert!(state.plans.house_grid.iter().all(|(interval, _)| *interval != slot(0)));
    }
}
