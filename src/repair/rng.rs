//! Seeded random source threaded through selection, alignment and synthesis.

use rand::prelude::*;

/// Random number generator wrapper for every tie-break in a trial.
pub struct RepairRng {
    rng: StdRng,
}

impl RepairRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniformly pick one element.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Draw `amount` distinct elements (fewer if `items` is shorter).
    pub fn sample<T: Clone>(&mut self, items: &[T], amount: usize) -> Vec<T> {
        items
            .choose_multiple(&mut self.rng, amount)
            .cloned()
            .collect()
    }

    /// Uniform float in `[low, high]`.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// Roulette-wheel pick proportional to weight.
    ///
    /// Walks the entries in order and returns the first whose running total
    /// exceeds a uniform draw over the total; falls back to the last entry
    /// when the total is zero.
    pub fn roulette<K: Clone>(&mut self, weights: &[(K, f64)]) -> Option<K> {
        let total: f64 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
        let pick = self.uniform(0.0, total);
        let mut current = 0.0;
        for (key, weight) in weights {
            current += weight.max(0.0);
            if current > pick {
                return Some(key.clone());
            }
        }
        weights.last().map(|(key, _)| key.clone())
    }
}
