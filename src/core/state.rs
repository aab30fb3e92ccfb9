use chrono::{DateTime, Local};

use crate::{
    core::{battery::BatteryForecast, interval::Interval, plans::Plans, queue::RateQueue},
    quantity::rate::KilowattHourRate,
};

/// Unit of speculative computation.
///
/// Cloning yields a fully independent trial state. A trial either gets dropped
/// or replaces the authoritative state as a whole.
#[derive(Clone, Debug)]
pub struct AllocationState {
    pub plans: Plans,

    /// Export slots that may still charge from solar (or get discharged).
    pub export_queue: RateQueue,

    /// Import slots that may still charge from the grid.
    pub import_queue: RateQueue,

    /// Import slots during which the house may still run from the grid.
    pub house_queue: RateQueue,

    /// Highest price paid for a kilowatt-hour that ended up in the battery.
    pub max_charge_cost: KilowattHourRate,

    /// Latest simulation of the plans.
    pub forecast: BatteryForecast,
}

impl AllocationState {
    pub fn new(
        export_rates: &[(Interval, KilowattHourRate)],
        import_rates: &[(Interval, KilowattHourRate)],
        max_charge_cost: KilowattHourRate,
        forecast: BatteryForecast,
    ) -> Self {
        let import_queue = RateQueue::by_price_then_time(import_rates);
        Self {
            plans: Plans::default(),
            export_queue: RateQueue::by_price(export_rates),
            house_queue: import_queue.clone(),
            import_queue,
            max_charge_cost,
            forecast,
        }
    }

    /// Ratchet the max charge cost, it never goes down within a cycle.
    pub fn update_charge_cost(&mut self, cost: KilowattHourRate) {
        self.max_charge_cost = self.max_charge_cost.max(cost);
    }

    /// Reserve the slot for discharging: nothing may charge or run the house from the grid then.
    pub fn withdraw(&mut self, start: DateTime<Local>) {
        self.export_queue.remove_starting_at(start);
        self.import_queue.remove_starting_at(start);
        self.house_queue.remove_starting_at(start);
        self.plans.grid_charge.retain(|(interval, _)| interval.start != start);
        self.plans.house_grid.retain(|(interval, _)| interval.start != start);
    }

    /// Replace the contents with the accepted trial.
    pub fn adopt(&mut self, trial: Self) {
        *self = trial;
    }
}
