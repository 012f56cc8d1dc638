/// Relevance filtering and scoring of aggregated candidates
///
/// Filtering drops accessory-looking listings (title contains an exclude term).
/// If that would leave nothing, scoring runs on the unfiltered set instead and
/// the exclude terms become per-occurrence penalties.
///
/// Score is an additive sum of independent terms:
///   rating * w  +  log10(popularity + 1) * w  +  commission * w
///   - price band penalty per violated bound
///   - price floor penalty for suspiciously cheap listings
///   - exclude penalty per occurrence
///   + must-have / nice-to-have / archetype title bonuses
///   + optional near-tie jitter in [0, jitter)
///
/// One policy type serves every archetype; only the weight table differs.

use rand::Rng;
use serde::Serialize;

use crate::catalog::Candidate;
use crate::config::{ScoringConfig, ScoringWeights};
use crate::planner::{archetype, QueryPlan};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A candidate with its relevance score. Score is unbounded and may be negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

/// Output of `filter_and_score`, in upstream order.
#[derive(Debug, Clone)]
pub struct Scored {
    pub candidates: Vec<ScoredCandidate>,
    /// True when every candidate was an accessory and the unfiltered set was scored
    pub fell_back: bool,
}

/// Named scoring strategy: a weight table plus the absolute price floor and jitter bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub weights: ScoringWeights,
    pub price_floor: f64,
    pub jitter: f64,
}

// ---------------------------------------------------------------------------
// Pure scoring terms
// ---------------------------------------------------------------------------

/// Diminishing returns on raw volume: 0 → 0, 9 → 1, 99 → 2.
pub fn popularity_term(popularity: u64) -> f64 {
    (popularity as f64 + 1.0).log10()
}

/// Number of bounds of `plan.price` the price violates (0 or 1).
pub fn price_band_violations(price: f64, plan: &QueryPlan) -> u32 {
    match plan.price {
        Some(band) => u32::from(price < band.min) + u32::from(price > band.max),
        None => 0,
    }
}

/// Total occurrences of exclude terms in an already lowercased title.
pub fn exclude_occurrences(title_lower: &str, exclude: &[String]) -> usize {
    exclude
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| title_lower.matches(t.as_str()).count())
        .sum()
}

pub fn is_accessory(title: &str, exclude: &[String]) -> bool {
    let lower = title.to_lowercase();
    exclude.iter().any(|t| !t.is_empty() && lower.contains(t.as_str()))
}

fn term_hits(title_lower: &str, terms: &[String]) -> usize {
    terms
        .iter()
        .filter(|t| title_lower.contains(&t.to_lowercase()))
        .count()
}

// ---------------------------------------------------------------------------
// ScoringPolicy
// ---------------------------------------------------------------------------

impl ScoringPolicy {
    pub fn new(weights: ScoringWeights, price_floor: f64, jitter: f64) -> Self {
        // jitter only breaks near-ties; it never outweighs a title-term bonus
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, weights.max_jitter())
        } else {
            0.0
        };
        ScoringPolicy {
            weights,
            price_floor,
            jitter,
        }
    }

    /// Policy for an archetype: its configured weight table, or the default table.
    pub fn for_archetype(scoring: &ScoringConfig, price_floor: f64, archetype: &str) -> Self {
        ScoringPolicy::new(scoring.weights_for(archetype), price_floor, scoring.jitter)
    }

    pub fn without_jitter(self) -> Self {
        ScoringPolicy { jitter: 0.0, ..self }
    }

    /// Deterministic relevance score (no jitter).
    pub fn score(&self, candidate: &Candidate, plan: &QueryPlan) -> f64 {
        let w = &self.weights;
        let title = candidate.title.to_lowercase();
        let mut score = 0.0;

        if let Some(rating) = candidate.rating {
            score += rating * w.rating;
        }
        if let Some(popularity) = candidate.popularity {
            score += popularity_term(popularity) * w.popularity;
        }
        if let Some(rate) = candidate.commission_rate {
            score += rate * w.commission;
        }

        score -= f64::from(price_band_violations(candidate.price, plan)) * w.price_band_penalty;
        if candidate.price < self.price_floor {
            score -= w.price_floor_penalty;
        }

        score -= exclude_occurrences(&title, &plan.exclude) as f64 * w.exclude_penalty;

        score += term_hits(&title, &plan.must_have) as f64 * w.must_have_bonus;
        score += term_hits(&title, &plan.nice_to_have) as f64 * w.nice_to_have_bonus;

        if plan.product_archetype != archetype::GENERIC
            && title.contains(&archetype::label(&plan.product_archetype))
        {
            score += w.archetype_bonus;
        }

        score
    }

    fn jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.jitter > 0.0 {
            rng.gen_range(0.0..self.jitter)
        } else {
            0.0
        }
    }
}

/// Drop accessory listings, then score what remains.
///
/// Never returns an empty set for a non-empty input: if every candidate is an
/// accessory, the unfiltered set is scored. With jitter disabled the output is
/// fully deterministic; `rng` is only drawn from when jitter > 0.
pub fn filter_and_score<R: Rng + ?Sized>(
    candidates: Vec<Candidate>,
    plan: &QueryPlan,
    policy: &ScoringPolicy,
    rng: &mut R,
) -> Scored {
    let total = candidates.len();
    let (kept, removed): (Vec<Candidate>, Vec<Candidate>) = candidates
        .into_iter()
        .partition(|c| !is_accessory(&c.title, &plan.exclude));

    let fell_back = kept.is_empty() && !removed.is_empty();
    let pool = if fell_back {
        tracing::info!(
            count = total,
            "Every candidate matched an exclude term, scoring unfiltered set"
        );
        removed
    } else {
        tracing::debug!(kept = kept.len(), removed = removed.len(), "Accessory filter applied");
        kept
    };

    let candidates = pool
        .into_iter()
        .map(|candidate| {
            let score = policy.score(&candidate, plan) + policy.jitter(rng);
            ScoredCandidate { candidate, score }
        })
        .collect();

    Scored { candidates, fell_back }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{PriceBand, QueryPlanner};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidate(title: &str, price: f64) -> Candidate {
        Candidate {
            id: Some(title.to_string()),
            title: title.to_string(),
            price,
            currency: "USD".to_string(),
            image_url: String::new(),
            detail_url: None,
            rating: Some(4.5),
            popularity: Some(100),
            commission_rate: Some(0.07),
        }
    }

    fn policy() -> ScoringPolicy {
        ScoringPolicy::new(ScoringWeights::default(), 3.0, 0.0)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_popularity_term_diminishing() {
        assert_eq!(popularity_term(0), 0.0);
        assert!((popularity_term(9) - 1.0).abs() < 1e-12);
        assert!((popularity_term(99) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_accessory_removed() {
        let plan = QueryPlanner::default().plan("airpods");
        let scored = filter_and_score(
            vec![
                candidate("Wireless Earbuds Case", 5.0),
                candidate("TWS Earbuds", 20.0),
            ],
            &plan,
            &policy(),
            &mut rng(),
        );
        assert!(!scored.fell_back);
        assert_eq!(scored.candidates.len(), 1);
        assert_eq!(scored.candidates[0].candidate.title, "TWS Earbuds");
    }

    #[test]
    fn test_all_accessories_falls_back_to_unfiltered() {
        let plan = QueryPlanner::default().plan("airpods");
        let scored = filter_and_score(
            vec![
                candidate("Wireless Earbuds Case", 5.0),
                candidate("Silicone Cover", 4.0),
            ],
            &plan,
            &policy(),
            &mut rng(),
        );
        assert!(scored.fell_back);
        assert_eq!(scored.candidates.len(), 2);
        // exclude terms are penalized in the fallback path
        let no_accessory_terms = policy().score(&candidate("Wireless Earbuds", 5.0), &plan);
        assert!(scored.candidates[0].score < no_accessory_terms);
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        let plan = QueryPlanner::default().plan("airpods");
        let scored = filter_and_score(Vec::new(), &plan, &policy(), &mut rng());
        assert!(scored.candidates.is_empty());
        assert!(!scored.fell_back);
    }

    #[test]
    fn test_higher_rating_never_scores_lower() {
        let plan = QueryPlanner::default().plan("airpods");
        let mut low = candidate("TWS Earbuds", 20.0);
        let mut high = low.clone();
        for (lo, hi) in [(0.0, 0.1), (3.0, 4.0), (4.9, 5.0)] {
            low.rating = Some(lo);
            high.rating = Some(hi);
            assert!(policy().score(&high, &plan) >= policy().score(&low, &plan));
        }
    }

    #[test]
    fn test_price_below_band_scores_lower() {
        let plan = QueryPlanner::default().plan("airpods");
        let band = plan.price.unwrap();
        let inside = candidate("TWS Earbuds", band.min + 5.0);
        let below = candidate("TWS Earbuds", band.min - 1.0);
        assert!(policy().score(&below, &plan) < policy().score(&inside, &plan));
    }

    #[test]
    fn test_price_above_band_penalized_once() {
        let mut plan = QueryPlanner::default().plan("skillet");
        plan.price = Some(PriceBand { min: 10.0, max: 20.0 });
        let inside = candidate("Skillet", 15.0);
        let above = candidate("Skillet", 25.0);
        let diff = policy().score(&inside, &plan) - policy().score(&above, &plan);
        assert!((diff - ScoringWeights::default().price_band_penalty).abs() < 1e-9);
    }

    #[test]
    fn test_price_floor_penalty() {
        let plan = QueryPlanner::default().plan("skillet");
        let normal = candidate("Skillet", 10.0);
        let cheap = candidate("Skillet", 1.0);
        let diff = policy().score(&normal, &plan) - policy().score(&cheap, &plan);
        assert!((diff - ScoringWeights::default().price_floor_penalty).abs() < 1e-9);
    }

    #[test]
    fn test_exclude_penalty_per_occurrence() {
        let plan = QueryPlanner::default().plan("skillet");
        let plain = candidate("Pan", 10.0);
        let two_terms = candidate("Pan Silicone Case", 10.0);
        let repeated = candidate("Pan Case Case Case", 10.0);
        let w = ScoringWeights::default();

        let diff = policy().score(&plain, &plan) - policy().score(&two_terms, &plan);
        assert!((diff - 2.0 * w.exclude_penalty).abs() < 1e-9);

        let diff = policy().score(&plain, &plan) - policy().score(&repeated, &plan);
        assert!((diff - 3.0 * w.exclude_penalty).abs() < 1e-9);
    }

    #[test]
    fn test_nice_to_have_bonus_per_term() {
        let plan = QueryPlanner::default().plan("airpods");
        let base = candidate("TWS Earbuds", 20.0);
        let extras = candidate("TWS Earbuds Bluetooth ANC", 20.0);
        let diff = policy().score(&extras, &plan) - policy().score(&base, &plan);
        assert!((diff - 2.0 * ScoringWeights::default().nice_to_have_bonus).abs() < 1e-9);
    }

    #[test]
    fn test_must_have_beats_case_listing() {
        let plan = QueryPlanner::default().plan("airpods");
        let good = candidate("TWS Earbuds ANC Wireless", 25.0);
        let case = candidate("Silicone Case for Earbuds", 25.0);
        assert!(policy().score(&good, &plan) > policy().score(&case, &plan));
    }

    #[test]
    fn test_archetype_bonus() {
        let plan = QueryPlanner::default().plan("airpods");
        let labelled = candidate("Wireless Earbuds", 20.0);
        let unlabelled = candidate("Wireless Buds Earbuds", 20.0);
        let diff = policy().score(&labelled, &plan) - policy().score(&unlabelled, &plan);
        assert!((diff - ScoringWeights::default().archetype_bonus).abs() < 1e-9);
    }

    #[test]
    fn test_missing_signals_contribute_nothing() {
        let plan = QueryPlanner::default().plan("skillet");
        let mut bare = candidate("Pan", 10.0);
        bare.rating = None;
        bare.popularity = None;
        bare.commission_rate = None;
        assert_eq!(policy().score(&bare, &plan), 0.0);
    }

    #[test]
    fn test_jitter_is_bounded_and_seeded() {
        let plan = QueryPlanner::default().plan("airpods");
        let jittery = ScoringPolicy::new(ScoringWeights::default(), 3.0, 0.25);
        let items = vec![candidate("TWS Earbuds", 20.0)];
        let base = jittery.score(&items[0], &plan);

        let a = filter_and_score(items.clone(), &plan, &jittery, &mut rng());
        let b = filter_and_score(items, &plan, &jittery, &mut rng());
        assert_eq!(a.candidates[0].score, b.candidates[0].score);
        let delta = a.candidates[0].score - base;
        assert!((0.0..0.25).contains(&delta));
    }

    #[test]
    fn test_jitter_capped_below_bonus_gap() {
        let p = ScoringPolicy::new(ScoringWeights::default(), 3.0, 5.0);
        assert_eq!(p.jitter, ScoringWeights::default().max_jitter());
        assert_eq!(ScoringPolicy::new(ScoringWeights::default(), 3.0, -1.0).jitter, 0.0);
        assert_eq!(ScoringPolicy::new(ScoringWeights::default(), 3.0, f64::NAN).jitter, 0.0);

        // a title-term bonus still wins against the largest allowed jitter
        let plan = QueryPlanner::default().plan("airpods");
        let items = vec![candidate("TWS Earbuds", 20.0), candidate("TWS Earbuds ANC", 20.0)];
        let mut rng = rng();
        for _ in 0..50 {
            let scored = filter_and_score(items.clone(), &plan, &p, &mut rng);
            assert!(scored.candidates[1].score > scored.candidates[0].score);
        }
    }

    #[test]
    fn test_for_archetype_uses_weight_table() {
        let mut scoring = ScoringConfig::default();
        scoring.archetypes.insert(
            "wireless_earbuds".to_string(),
            ScoringWeights {
                must_have_bonus: 20.0,
                ..ScoringWeights::default()
            },
        );
        let p = ScoringPolicy::for_archetype(&scoring, 3.0, "wireless_earbuds");
        assert_eq!(p.weights.must_have_bonus, 20.0);
        assert_eq!(p.jitter, scoring.jitter);
        assert_eq!(p.without_jitter().jitter, 0.0);
    }
}
