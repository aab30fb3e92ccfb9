use std::fmt::{Display, Formatter};

use crate::{
    core::{
        interval::Interval,
        queue::{Candidates, Cutoff},
    },
    quantity::rate::KilowattHourRate,
};

/// Where the energy for a slot comes from.
#[derive(Debug, enumset::EnumSetType)]
pub enum RateKind {
    /// Charge the battery from the solar surplus, forgoing the export.
    SolarCharge,

    /// Charge the battery from the grid.
    GridCharge,

    /// Do not discharge, power the house from the grid instead.
    GridHouse,
}

impl Display for RateKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SolarCharge => write!(f, "Solar charge"),
            Self::GridCharge => write!(f, "Grid charge"),
            Self::GridHouse => write!(f, "Grid house"),
        }
    }
}

impl RateKind {
    /// Cost of one kilowatt-hour that ends up in the battery (or is not taken out of it).
    ///
    /// Running the house from the grid bypasses the battery, so no efficiency losses apply.
    #[must_use]
    pub fn charge_cost(self, rate: KilowattHourRate, efficiency: f64) -> KilowattHourRate {
        match self {
            Self::SolarCharge | Self::GridCharge => rate / efficiency,
            Self::GridHouse => rate,
        }
    }

    /// Whether the slot is subject to the global import rate ceiling.
    #[must_use]
    pub const fn draws_from_grid(self) -> bool {
        matches!(self, Self::GridCharge | Self::GridHouse)
    }
}

/// Slot picked by the selector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Choice {
    pub kind: RateKind,
    pub interval: Interval,
    pub rate: KilowattHourRate,
}

/// Pick the cheapest head across the queues.
///
/// Only the slots admitted by the cutoff are eligible. On equal prices,
/// the queue that comes later wins.
pub fn choose_cheapest<'a>(
    queues: impl IntoIterator<Item = (RateKind, &'a Candidates)>,
    cutoff: Option<Cutoff>,
) -> Option<Choice> {
    queues
        .into_iter()
        .filter_map(|(kind, candidates)| {
            candidates.head(cutoff).map(|(interval, rate)| Choice { kind, interval, rate })
        })
        .reduce(|best, next| if best.rate < next.rate { best } else { next })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::core::interval::tests::{at, slot};

    fn candidates(rates: &[(i64, f64)]) -> Candidates {
        Candidates::new(rates.iter().map(|(index, rate)| (slot(*index), KilowattHourRate::from(*rate))))
    }

    #[test]
    fn test_cheapest_wins() {
        let solar = candidates(&[(0, 0.05)]);
        let grid = candidates(&[(1, 0.10)]);
        let house = candidates(&[(2, 0.20)]);
        let choice = choose_cheapest(
            [(RateKind::SolarCharge, &solar), (RateKind::GridCharge, &grid), (RateKind::GridHouse, &house)],
            None,
        )
        .unwrap();
        assert_eq!(choice.kind, RateKind::SolarCharge);
        assert_eq!(choice.interval, slot(0));
    }

    #[test]
    fn test_later_queue_wins_ties() {
        let grid = candidates(&[(1, 0.10)]);
        let house = candidates(&[(1, 0.10)]);
        let choice =
            choose_cheapest([(RateKind::GridCharge, &grid), (RateKind::GridHouse, &house)], None)
                .unwrap();
        assert_eq!(choice.kind, RateKind::GridHouse);
    }

    #[test]
    fn test_cutoff() {
        let solar = candidates(&[(4, 0.01)]);
        let grid = candidates(&[(1, 0.10)]);
        let cutoff = Some(Cutoff::StartingBy(at(60)));
        let choice =
            choose_cheapest([(RateKind::SolarCharge, &solar), (RateKind::GridCharge, &grid)], cutoff).unwrap();
        assert_eq!(choice.kind, RateKind::GridCharge);
        assert!(choose_cheapest([(RateKind::SolarCharge, &solar)], cutoff).is_none());
    }

    #[test]
    fn test_slot_starting_when_the_battery_runs_empty_is_too_late() {
        // Runs empty within slot 2, slot 3 starts exactly at its end:
        let grid = candidates(&[(3, 0.05), (2, 0.20)]);
        let choice =
            choose_cheapest([(RateKind::GridCharge, &grid)], Some(Cutoff::EndingBy(slot(2).end))).unwrap();
        assert_eq!(choice.interval, slot(2));
        assert_abs_diff_eq!(choice.rate.0, 0.20);
    }

    #[test]
    fn test_charge_cost() {
        let rate = KilowattHourRate::from(0.18);
        assert_abs_diff_eq!(RateKind::GridCharge.charge_cost(rate, 0.9).0, 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(RateKind::GridHouse.charge_cost(rate, 0.9).0, 0.18);
    }
}
