use chrono::{DateTime, Local};

use crate::{
    core::{
        battery::{BatteryForecast, BatteryParameters, Simulator},
        estimate::Percentile,
        interval::Interval,
        plans::Plans,
        queue::{Candidates, Cutoff},
        selector::{Choice, RateKind, choose_cheapest},
        series::OverPeriod,
        state::AllocationState,
        timeline::Timeline,
    },
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
};

/// Minimum price differentials required before committing to an allocation.
#[derive(Copy, Clone, Debug)]
pub struct Margins {
    /// Discharge over the charge cost while the battery still ends up fully charged.
    pub buy_sell: KilowattHourRate,

    /// Discharge over the charge cost when the battery no longer ends up fully charged.
    pub buy_sell_not_full: KilowattHourRate,

    /// Grid charge under the price of letting the battery run empty.
    pub buy_use: KilowattHourRate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Outcome {
    pub is_fully_charged: bool,
    pub is_empty: bool,
}

/// Greedy slot allocator.
#[derive(bon::Builder)]
pub struct Allocator<'a> {
    pub(super) timeline: &'a Timeline,
    pub(super) battery: &'a BatteryParameters,
    pub(super) margins: Margins,
    pub(super) grid_export_limit: Kilowatts,
    pub(super) now: DateTime<Local>,
}

/// Per-pass working copies of the rate queues.
struct Pass {
    solar: Candidates,
    grid: Candidates,
    house: Candidates,
}

impl Pass {
    fn cheapest_rate(&self) -> Option<KilowattHourRate> {
        [self.solar.cheapest_rate(), self.grid.cheapest_rate(), self.house.cheapest_rate()]
            .into_iter()
            .flatten()
            .min_by(KilowattHourRate::total_cmp)
    }

    /// Charging from solar forgoes the export, so the slot cannot draw from the grid as well.
    fn claim_for_solar(&mut self, state: &mut AllocationState, start: DateTime<Local>) {
        state.import_queue.remove_starting_at(start);
        state.house_queue.remove_starting_at(start);
        self.grid.spend_starting_at(start);
        self.house.spend_starting_at(start);
    }

    /// Drawing from the grid rules out charging from solar in the same slot.
    fn claim_for_grid(&mut self, state: &mut AllocationState, start: DateTime<Local>) {
        state.export_queue.remove_starting_at(start);
        self.solar.spend_starting_at(start);
    }
}

impl Allocator<'_> {
    #[must_use]
    pub fn simulate(&self, plans: &Plans, percentile: Percentile) -> BatteryForecast {
        Simulator {
            battery: self.battery,
            clock: &self.timeline.export_rates,
            usage_after_solar: &self.timeline.usage_after_solar,
            now: self.now,
        }
        .run(plans, percentile)
    }

    /// Fresh state for the planning cycle, carrying over the previous max charge cost.
    pub fn initial_state(&self, max_charge_cost: KilowattHourRate) -> AllocationState {
        AllocationState::new(
            &self.timeline.export_rates,
            &self.timeline.import_rates,
            max_charge_cost,
            self.simulate(&Plans::default(), Percentile::Low),
        )
    }

    /// Run a single allocation pass.
    ///
    /// Without a top-up cost, keeps adding the cheapest eligible slots until the battery
    /// no longer runs empty and is fully charged by the target time. With a top-up cost, keeps
    /// adding slots up to that cost for as long as there are any.
    #[instrument(skip_all, fields(top_up = ?top_up))]
    pub fn allocate(
        &self,
        mut state: AllocationState,
        top_up: Option<KilowattHourRate>,
    ) -> (AllocationState, Outcome) {
        // Zero cost means no top-up:
        let top_up = top_up.filter(|cost| !cost.is_zero());
        let max_allowed_cost = top_up.unwrap_or(KilowattHourRate::INFINITY);
        let max_import_rate = self.timeline.max_import_rate();

        // Pessimistic while making sure the battery does not run flat, optimistic while topping up:
        let mut percentile = if top_up.is_some() { Percentile::High } else { Percentile::Low };

        let mut pass = Pass {
            solar: Candidates::new(state.export_queue.iter().filter(|(interval, _)| {
                !self.timeline.solar_surplus.over_period(*interval).get(percentile).is_zero()
            })),
            grid: Candidates::new(state.import_queue.iter()),
            house: Candidates::new(state.house_queue.iter()),
        };

        self.absorb_cheap_house_slots(&mut pass, &mut state);
        state.forecast = self.simulate(&state.plans, percentile);
        let mut allow_empty_before =
            state.forecast.slots.first().map_or(self.now, |slot| slot.interval.start);

        while state.forecast.any_empty || top_up.is_some() || !state.forecast.is_fully_charged {
            self.absorb_cheap_house_slots(&mut pass, &mut state);

            let mut cutoff = None;
            let mut first_empty = None;
            if state.forecast.any_empty {
                percentile = Percentile::Low;
                first_empty = state.forecast.first_empty_end(allow_empty_before);
                // The charge must be in before the shortfall:
                cutoff = first_empty.map(Cutoff::EndingBy);
            } else {
                percentile = Percentile::High;
                if top_up.is_none() {
                    // Only chasing the full battery, later slots would not help:
                    cutoff = Some(Cutoff::StartingBy(state.forecast.target_full_time));
                }
            }

            let Some(choice) = choose_cheapest(
                [
                    (RateKind::SolarCharge, &pass.solar),
                    (RateKind::GridCharge, &pass.grid),
                    (RateKind::GridHouse, &pass.house),
                ],
                cutoff,
            ) else {
                if let Some(first_empty) = first_empty {
                    debug!(?first_empty, "nothing fits before the battery runs empty, allowing it");
                    allow_empty_before = first_empty;
                    pass.grid.reconsider_deferred();
                    continue;
                }
                break;
            };

            let Choice { kind, interval, rate } = choice;
            let charge_cost = kind.charge_cost(rate, self.battery.efficiency);
            let headroom = self.battery.capacity - state.forecast.energy_over(interval);
            let empty_slot_cost = first_empty.and_then(|end| self.timeline.empty_slot_cost(end));
            let is_fully_charged = state.forecast.is_fully_charged;

            let mut will_charge =
                charge_cost <= max_allowed_cost && !state.forecast.is_full_at(interval);
            if let Some(last_full_end) = state.forecast.last_full_end {
                // Charging before the battery is full anyway only displaces cheaper energy later on:
                will_charge &= interval.end >= last_full_end;
            }
            if let Some(last_empty_end) = state.forecast.last_empty_end {
                will_charge &= interval.end <= last_empty_end || top_up.is_some() || !is_fully_charged;
            }
            if let Some(empty_slot_cost) = empty_slot_cost
                && will_charge
                && !state.forecast.any_totally_empty
            {
                // Rather let the battery run flat than pay the same price to keep it going,
                // unless nothing cheaper is left:
                will_charge = rate < empty_slot_cost || Some(rate) == pass.cheapest_rate();
            }
            if kind.draws_from_grid() {
                will_charge &= rate < max_import_rate;
            }

            match kind {
                RateKind::SolarCharge => {
                    let max_charge = (self.battery.charge_rate_limit * interval.duration()).min(headroom);
                    let surplus = self.timeline.solar_surplus.over_period(interval);
                    will_charge &= surplus.get(percentile) > KilowattHours::ZERO;
                    if will_charge {
                        state.plans.solar_charge.push((interval, surplus.map(|energy| energy.min(max_charge))));
                        state.export_queue.remove(interval);
                        pass.claim_for_solar(&mut state, interval.start);
                    }
                    pass.solar.spend(interval);
                }

                RateKind::GridCharge => {
                    let mut is_slot_used = true;
                    if let Some(empty_slot_cost) = empty_slot_cost
                        && top_up.is_none()
                        && is_fully_charged
                    {
                        // Only resolving the shortfall: a slot that is not cheap enough now
                        // may still be worth it for a later empty slot.
                        let is_cheap_enough = charge_cost <= empty_slot_cost - self.margins.buy_use;
                        is_slot_used = !will_charge || is_cheap_enough;
                        will_charge &= is_cheap_enough;
                    }
                    let charge_taken = (self.battery.grid_charge_rate * interval.duration()).min(headroom);
                    if will_charge && charge_taken > KilowattHours::ZERO {
                        state.plans.grid_charge.push((interval, charge_taken));
                        state.import_queue.remove(interval);
                        pass.claim_for_grid(&mut state, interval.start);
                    }
                    if is_slot_used {
                        pass.grid.spend(interval);
                    } else {
                        pass.grid.defer(interval);
                    }
                }

                RateKind::GridHouse => {
                    if will_charge {
                        let usage = self.timeline.usage_after_solar.over_period(interval);
                        state.plans.house_grid.push((interval, usage));
                        state.house_queue.remove(interval);
                        pass.claim_for_grid(&mut state, interval.start);
                    }
                    pass.house.spend(interval);
                }
            }

            if will_charge {
                debug!(%kind, ?interval.start, %rate, %charge_cost, "allocated");
                state.update_charge_cost(charge_cost);
                self.absorb_cheap_house_slots(&mut pass, &mut state);
                state.forecast = self.simulate(&state.plans, percentile);
            }
        }

        let outcome = Outcome {
            is_fully_charged: state.forecast.is_fully_charged,
            is_empty: state.forecast.any_empty,
        };
        (state, outcome)
    }

    /// Do not discharge the battery for slots where the grid is cheaper than what the battery energy cost.
    fn absorb_cheap_house_slots(&self, pass: &mut Pass, state: &mut AllocationState) {
        let cheap: Vec<Interval> = pass
            .house
            .available()
            .filter(|(_, rate)| *rate < state.max_charge_cost)
            .map(|(interval, _)| interval)
            .collect();
        for interval in cheap {
            pass.house.spend(interval);
            state.house_queue.remove(interval);
            pass.claim_for_grid(state, interval.start);
            state
                .plans
                .house_grid
                .push((interval, self.timeline.usage_after_solar.over_period(interval)));
        }
    }
}
