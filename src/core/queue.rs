use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{core::interval::Interval, quantity::rate::KilowattHourRate};

/// Rates that are still available for allocation, cheapest first.
///
/// Slots are consumed destructively as they get allocated, the order is preserved.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[must_use]
pub struct RateQueue(Vec<(Interval, KilowattHourRate)>);

impl RateQueue {
    /// Order by price only, keeping the chronological order of equal prices.
    pub fn by_price(rates: &[(Interval, KilowattHourRate)]) -> Self {
        let mut rates = rates.to_vec();
        rates.sort_by(|(_, lhs), (_, rhs)| lhs.total_cmp(rhs));
        Self(rates)
    }

    /// Order by price, then by start time.
    pub fn by_price_then_time(rates: &[(Interval, KilowattHourRate)]) -> Self {
        let mut rates = rates.to_vec();
        rates.sort_by(|(lhs_interval, lhs_rate), (rhs_interval, rhs_rate)| {
            lhs_rate.total_cmp(rhs_rate).then_with(|| lhs_interval.start.cmp(&rhs_interval.start))
        });
        Self(rates)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Interval, KilowattHourRate)> + '_ {
        self.0.iter().copied()
    }

    /// Consume the slot.
    pub fn remove(&mut self, interval: Interval) {
        if let Some(index) = self.0.iter().position(|(queued, _)| *queued == interval) {
            self.0.remove(index);
        }
    }

    /// Consume every slot that starts at the timestamp.
    pub fn remove_starting_at(&mut self, start: DateTime<Local>) {
        self.0.retain(|(queued, _)| queued.start != start);
    }
}

#[cfg(test)]
impl RateQueue {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, interval: Interval) -> bool {
        self.0.iter().any(|(queued, _)| *queued == interval)
    }
}

/// Latest moment a candidate slot may still be useful.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cutoff {
    /// The slot must be over by then: charging after a shortfall does not resolve it.
    EndingBy(DateTime<Local>),

    /// The slot must have started by then.
    StartingBy(DateTime<Local>),
}

impl Cutoff {
    #[must_use]
    pub fn admits(self, interval: Interval) -> bool {
        match self {
            Self::EndingBy(end) => interval.end <= end,
            Self::StartingBy(start) => interval.start <= start,
        }
    }
}

/// Per-pass status of a candidate slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    /// May still be picked.
    Available,

    /// Not cheap enough for the current shortfall, worth another look once the empty-slot cutoff moves.
    Deferred,

    /// Looked at and done with for the rest of the pass.
    Spent,
}

/// Working copy of a [`RateQueue`] for a single allocator pass.
///
/// Unlike the queue itself, candidates are never removed: a slot that has been looked at
/// is marked, so that the pass never offers it twice while the cutoff stays put.
#[derive(Clone, Debug)]
pub struct Candidates(Vec<(Interval, KilowattHourRate, Status)>);

impl Candidates {
    pub fn new(rates: impl IntoIterator<Item = (Interval, KilowattHourRate)>) -> Self {
        Self(rates.into_iter().map(|(interval, rate)| (interval, rate, Status::Available)).collect())
    }

    /// Cheapest available candidate within the cutoff.
    #[must_use]
    pub fn head(&self, cutoff: Option<Cutoff>) -> Option<(Interval, KilowattHourRate)> {
        self.available().find(|(interval, _)| cutoff.is_none_or(|cutoff| cutoff.admits(*interval)))
    }

    /// Cheapest available price regardless of the time.
    #[must_use]
    pub fn cheapest_rate(&self) -> Option<KilowattHourRate> {
        self.available().map(|(_, rate)| rate).min_by(KilowattHourRate::total_cmp)
    }

    pub fn available(&self) -> impl Iterator<Item = (Interval, KilowattHourRate)> + '_ {
        self.0
            .iter()
            .filter(|(_, _, status)| *status == Status::Available)
            .map(|(interval, rate, _)| (*interval, *rate))
    }

    pub fn spend(&mut self, interval: Interval) {
        self.mark(interval, Status::Spent);
    }

    /// Give up every candidate that starts at the timestamp.
    pub fn spend_starting_at(&mut self, start: DateTime<Local>) {
        for (interval, _, status) in &mut self.0 {
            if interval.start == start {
                *status = Status::Spent;
            }
        }
    }

    pub fn defer(&mut self, interval: Interval) {
        self.mark(interval, Status::Deferred);
    }

    /// Make the deferred candidates available again.
    pub fn reconsider_deferred(&mut self) {
        for (_, _, status) in &mut self.0 {
            if *status == Status::Deferred {
                *status = Status::Available;
            }
        }
    }

    fn mark(&mut self, interval: Interval, status: Status) {
        if let Some((_, _, current)) =
            self.0.iter_mut().find(|(candidate, _, current)| *candidate == interval && *current != Status::Spent)
        {
            *current = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interval::tests::{at, slot};

    fn rates() -> Vec<(Interval, KilowattHourRate)> {
        vec![
            (slot(0), KilowattHourRate::from(0.30)),
            (slot(1), KilowattHourRate::from(0.10)),
            (slot(2), KilowattHourRate::from(0.10)),
            (slot(3), KilowattHourRate::from(0.05)),
        ]
    }

    #[test]
    fn test_by_price_keeps_time_order_for_ties() {
        let queue = RateQueue::by_price_then_time(&rates());
        let order: Vec<_> = queue.iter().map(|(interval, _)| interval).collect();
        assert_eq!(order, vec![slot(3), slot(1), slot(2), slot(0)]);
    }

    #[test]
    fn test_remove_starting_at() {
        let mut queue = RateQueue::by_price(&rates());
        queue.remove_starting_at(at(30));
        assert_eq!(queue.len(), 3);
        assert!(!queue.contains(slot(1)));
    }

    #[test]
    fn test_head_respects_cutoff() {
        let candidates = Candidates::new(RateQueue::by_price(&rates()).iter());
        assert_eq!(candidates.head(None).map(|(interval, _)| interval), Some(slot(3)));
        assert_eq!(
            candidates.head(Some(Cutoff::StartingBy(at(60)))).map(|(interval, _)| interval),
            Some(slot(1)),
        );
        assert_eq!(
            candidates.head(Some(Cutoff::EndingBy(at(60)))).map(|(interval, _)| interval),
            Some(slot(1)),
        );
        assert_eq!(candidates.head(Some(Cutoff::StartingBy(at(-30)))), None);
    }

    #[test]
    fn test_slot_after_the_shortfall_is_not_a_candidate() {
        // The shortfall is in slot 2, the cheapest slot 3 starts right when it ends:
        let candidates = Candidates::new(RateQueue::by_price(&rates()).iter());
        let cutoff = Cutoff::EndingBy(slot(2).end);
        assert!(!cutoff.admits(slot(3)));
        assert!(cutoff.admits(slot(2)));
        assert_eq!(candidates.head(Some(cutoff)).map(|(interval, _)| interval), Some(slot(1)));
        assert_eq!(
            candidates.head(Some(Cutoff::StartingBy(slot(2).end))).map(|(interval, _)| interval),
            Some(slot(3)),
        );
    }

    #[test]
    fn test_spend_starting_at() {
        let mut candidates = Candidates::new(rates());
        candidates.spend_starting_at(slot(3).start);
        assert_eq!(candidates.cheapest_rate(), Some(KilowattHourRate::from(0.10)));
    }

    #[test]
    fn test_deferred_candidates_come_back() {
        let mut candidates = Candidates::new(RateQueue::by_price(&rates()).iter());
        candidates.defer(slot(3));
        candidates.spend(slot(1));
        assert_eq!(candidates.head(None).map(|(interval, _)| interval), Some(slot(2)));
        candidates.reconsider_deferred();
        assert_eq!(candidates.head(None).map(|(interval, _)| interval), Some(slot(3)));
    }

    #[test]
    fn test_spent_stays_spent() {
        let mut candidates = Candidates::new(rates());
        candidates.spend(slot(0));
        candidates.defer(slot(0));
        candidates.reconsider_deferred();
        assert!(candidates.available().all(|(interval, _)| interval != slot(0)));
    }
}
