/// Ranking and primary-result selection
///
/// Candidates are ordered by score descending with a stable sort, so ties keep
/// upstream arrival order. The primary result is drawn among the top-K with
/// descending integer weights (k, k-1, ..., 1): rank 1 is the most likely
/// pick but not the only one, which keeps the headline result from going stale.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::scoring::ScoredCandidate;

/// Source of the primary pick. Swap in `TopPicker` for deterministic behavior.
pub trait PrimaryPicker: Send + Sync {
    /// Index in `0..len` of the ranked slot to surface as primary. `len` is at least 1.
    fn pick(&self, len: usize) -> usize;
}

/// Weighted-random pick using the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandomPicker;

/// Weighted-random pick from a seeded RNG; reproducible across runs.
pub struct SeededPicker {
    rng: Mutex<StdRng>,
}

/// Always rank 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopPicker;

/// Sum of slot weights for `len` slots.
pub fn total_weight(len: usize) -> u64 {
    let n = len as u64;
    n * (n + 1) / 2
}

/// Walk the weighted slots with a draw in `0..total_weight(len)`.
pub fn weighted_index(len: usize, draw: u64) -> usize {
    let mut remaining = draw;
    for i in 0..len {
        let weight = (len - i) as u64;
        if remaining < weight {
            return i;
        }
        remaining -= weight;
    }
    len.saturating_sub(1)
}

impl PrimaryPicker for WeightedRandomPicker {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let draw = rand::thread_rng().gen_range(0..total_weight(len));
        weighted_index(len, draw)
    }
}

impl SeededPicker {
    pub fn new(seed: u64) -> Self {
        SeededPicker {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl PrimaryPicker for SeededPicker {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let draw = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..total_weight(len)),
            Err(poisoned) => poisoned.into_inner().gen_range(0..total_weight(len)),
        };
        weighted_index(len, draw)
    }
}

impl PrimaryPicker for TopPicker {
    fn pick(&self, _len: usize) -> usize {
        0
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    /// Descending by score, length min(k, available)
    pub top: Vec<ScoredCandidate>,
    pub primary: ScoredCandidate,
    /// 0-based position of `primary` within `top`
    pub primary_rank: usize,
}

/// Stable descending sort by score.
pub fn rank(mut scored: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Rank, keep the top `k`, and pick the primary. `None` when there is nothing
/// to select, including `k == 0` (config validation rejects that value).
pub fn select(scored: Vec<ScoredCandidate>, k: usize, picker: &dyn PrimaryPicker) -> Option<Selection> {
    let mut top = rank(scored);
    top.truncate(k);
    if top.is_empty() {
        return None;
    }

    let primary_rank = picker.pick(top.len()).min(top.len() - 1);
    let primary = top[primary_rank].clone();

    tracing::debug!(
        top = top.len(),
        primary_rank = primary_rank + 1,
        primary_score = primary.score,
        "Primary result selected"
    );

    Some(Selection {
        top,
        primary,
        primary_rank,
    })
}
