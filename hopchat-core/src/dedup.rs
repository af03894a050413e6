//! Dedup ledger: message IDs already processed at this node, bounded by count and age.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

/// Default number of remembered message IDs.
pub const DEFAULT_DEDUP_CAPACITY: usize = 4096;

/// Default age (in ticks) after which an ID is forgotten.
pub const DEFAULT_DEDUP_MAX_AGE_TICKS: u64 = 720;

/// Insertion-ordered set of message IDs. Oldest entries are evicted first, either when the
/// capacity is reached or when they outlive `max_age_ticks`.
pub struct DedupLedger {
    seen: HashSet<Uuid>,
    order: VecDeque<(Uuid, u64)>,
    capacity: usize,
    max_age_ticks: u64,
}

impl DedupLedger {
    pub fn new(capacity: usize, max_age_ticks: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            max_age_ticks,
        }
    }

    /// Record `id` as seen at tick `now`. Returns true the first time, false for a duplicate.
    pub fn check_and_insert(&mut self, id: Uuid, now: u64) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        while self.order.len() >= self.capacity {
            self.evict_oldest();
        }
        self.seen.insert(id);
        self.order.push_back((id, now));
        true
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    /// Forget every ID older than the age bound. Returns how many were evicted.
    pub fn prune(&mut self, now: u64) -> usize {
        let mut evicted = 0;
        while let Some(&(_, at)) = self.order.front() {
            if now.saturating_sub(at) <= self.max_age_ticks {
                break;
            }
            self.evict_oldest();
            evicted += 1;
        }
        evicted
    }

    fn evict_oldest(&mut self) {
        if let Some((id, _)) = self.order.pop_front() {
            self.seen.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_MAX_AGE_TICKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_is_duplicate() {
        let mut ledger = DedupLedger::default();
        let id = Uuid::new_v4();
        assert!(ledger.check_and_insert(id, 0));
        assert!(!ledger.check_and_insert(id, 1));
        assert!(ledger.contains(&id));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut ledger = DedupLedger::new(2, 100);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            ledger.check_and_insert(*id, 0);
        }
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.contains(&ids[0]));
        assert!(ledger.contains(&ids[1]));
        assert!(ledger.contains(&ids[2]));
    }

    #[test]
    fn prune_drops_aged_entries_only() {
        let mut ledger = DedupLedger::new(16, 5);
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        ledger.check_and_insert(old, 0);
        ledger.check_and_insert(fresh, 4);
        assert_eq!(ledger.prune(5), 0);
        assert_eq!(ledger.prune(6), 1);
        assert!(!ledger.contains(&old));
        assert!(ledger.contains(&fresh));
        assert!(ledger.check_and_insert(old, 6));
    }

    #[test]
    fn zero_capacity_still_remembers_latest() {
        let mut ledger = DedupLedger::new(0, 10);
        let id = Uuid::new_v4();
        assert!(ledger.check_and_insert(id, 0));
        assert!(!ledger.check_and_insert(id, 0));
    }
}
