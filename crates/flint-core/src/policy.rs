//! Victim-selection policies.
//!
//! Four strategies behind one enum-dispatched selector; no trait objects, so
//! the policy state stays a flat vector and selection allocates nothing.
//!
//! Recency is keyed on writes that land in the home block, initialised at
//! pair creation; log appends do not refresh it.

use flint_config::GcPolicyId;
use flint_types::Pbn;

/// One reclaim candidate, as seen at selection time.
///
/// `live_pages` counts live pages across the whole pair (home plus log), so
/// utilisation is relative to twice the block size.
#[derive(Debug, Clone, Copy)]
pub struct VictimCandidate {
    pub home: Pbn,
    pub created_seq: u64,
    pub live_pages: u32,
}

#[derive(Debug, Clone)]
pub struct VictimPolicy {
    kind: GcPolicyId,
    last_home_write: Vec<u64>,
}

impl VictimPolicy {
    #[must_use]
    pub fn new(kind: GcPolicyId, num_data_blocks: u32) -> Self {
        Self {
            kind,
            last_home_write: vec![0; num_data_blocks as usize],
        }
    }

    #[must_use]
    pub fn kind(&self) -> GcPolicyId {
        self.kind
    }

    /// A write landed on a canonical page of `home`.
    pub fn on_home_write(&mut self, home: Pbn, seq: u64) {
        self.last_home_write[home.0 as usize] = seq;
    }

    /// `home` acquired a log block.
    pub fn on_log_allocated(&mut self, home: Pbn, seq: u64) {
        self.last_home_write[home.0 as usize] = seq;
    }

    /// Choose a victim among `candidates`, which must be supplied in pair
    /// creation order. Ties resolve to the earliest candidate.
    #[must_use]
    pub fn select_victim<I>(&self, candidates: I, now: u64, pair_capacity: u32) -> Option<Pbn>
    where
        I: IntoIterator<Item = VictimCandidate>,
    {
        let mut iter = candidates.into_iter();
        let first = iter.next()?;
        match self.kind {
            GcPolicyId::RoundRobin => {
                let mut best = first;
                for candidate in iter {
                    if candidate.created_seq < best.created_seq {
                        best = candidate;
                    }
                }
                Some(best.home)
            }
            GcPolicyId::Lru => {
                let mut best = first;
                for candidate in iter {
                    if self.recency(candidate.home) < self.recency(best.home) {
                        best = candidate;
                    }
                }
                Some(best.home)
            }
            GcPolicyId::Greedy => {
                let mut best = first;
                for candidate in iter {
                    if candidate.live_pages < best.live_pages {
                        best = candidate;
                    }
                }
                Some(best.home)
            }
            GcPolicyId::CostBenefit => {
                let mut best = first;
                let mut best_score = self.cost_benefit(&first, now, pair_capacity);
                for candidate in iter {
                    let score = self.cost_benefit(&candidate, now, pair_capacity);
                    if score > best_score {
                        best = candidate;
                        best_score = score;
                    }
                }
                Some(best.home)
            }
        }
    }

    fn recency(&self, home: Pbn) -> u64 {
        self.last_home_write[home.0 as usize]
    }

    /// `age * (1 - u) / (1 + u)` with `u` the pair utilisation.
    fn cost_benefit(&self, candidate: &VictimCandidate, now: u64, pair_capacity: u32) -> f64 {
        let age = now.saturating_sub(self.recency(candidate.home)) as f64;
        let utilisation = f64::from(candidate.live_pages) / f64::from(pair_capacity.max(1));
        age * (1.0 - utilisation) / (1.0 + utilisation)
    }
}
