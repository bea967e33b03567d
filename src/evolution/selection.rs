//! Tournament, Pareto-front, and generational parent selection.

use std::collections::{BTreeMap, BTreeSet};

use super::fitness::{Fitness, FitnessEvaluator};
use crate::oracle::Oracle;
use crate::repair::{RepairError, RepairRng};
use crate::schema::VariantId;

/// Tolerance for treating two perpendicular distances as tied.
const DISTANCE_EPSILON: f64 = 1e-9;

/// The all-ones direction followed by each unit axis.
const REFERENCE_DIRECTIONS: [[f64; 4]; 5] = [
    [1.0, 1.0, 1.0, 1.0],
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Indices of the points no other point dominates.
pub fn pareto_front(points: &[Fitness]) -> Vec<usize> {
    (0..points.len())
        .filter(|&i| !points.iter().any(|other| other.dominates(&points[i])))
        .collect()
}

/// Distance from `point` to the line spanned by `direction`.
pub fn perpendicular_distance(point: &[f64; 4], direction: &[f64; 4]) -> f64 {
    let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
    let unit: Vec<f64> = direction.iter().map(|d| d / norm).collect();
    let projection: f64 = point.iter().zip(&unit).map(|(p, u)| p * u).sum();
    point
        .iter()
        .zip(&unit)
        .map(|(p, u)| (p - projection * u).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Front members closest to any reference direction, deduplicated, in
/// front order.
pub fn direction_pool(points: &[Fitness], front: &[usize]) -> Vec<usize> {
    let mut pool = BTreeSet::new();
    for direction in &REFERENCE_DIRECTIONS {
        let distances: Vec<(usize, f64)> = front
            .iter()
            .map(|&i| (i, perpendicular_distance(&points[i].objectives(), direction)))
            .collect();
        let closest = distances
            .iter()
            .map(|&(_, d)| d)
            .fold(f64::INFINITY, f64::min);
        pool.extend(
            distances
                .iter()
                .filter(|&&(_, d)| d - closest <= DISTANCE_EPSILON)
                .map(|&(i, _)| i),
        );
    }
    front.iter().copied().filter(|i| pool.contains(i)).collect()
}

/// Fitness-driven choices against a shared oracle and fitness cache.
pub struct Selection<'a, O: ?Sized> {
    oracle: &'a mut O,
    evaluator: &'a mut FitnessEvaluator,
}

impl<'a, O: Oracle + ?Sized> Selection<'a, O> {
    pub fn new(oracle: &'a mut O, evaluator: &'a mut FitnessEvaluator) -> Self {
        Self { oracle, evaluator }
    }

    fn fitness(&mut self, buggy: &str, candidate: &str) -> Result<Fitness, RepairError> {
        self.evaluator.evaluate(&mut *self.oracle, buggy, candidate)
    }

    /// Best sample against `reference`: highest test score, then highest
    /// trace score, then first seen.
    pub fn tournament(
        &mut self,
        reference: &str,
        samples: &[(VariantId, String)],
    ) -> Result<Option<VariantId>, RepairError> {
        let mut scored = Vec::with_capacity(samples.len());
        for (id, source) in samples {
            scored.push((id, self.fitness(reference, source)?));
        }
        let best_test = scored
            .iter()
            .map(|(_, f)| f.test_score())
            .fold(f64::NEG_INFINITY, f64::max);
        scored.retain(|(_, f)| f.test_score() == best_test);
        let best_trace = scored
            .iter()
            .map(|(_, f)| f.trace_score())
            .fold(f64::NEG_INFINITY, f64::max);
        Ok(scored
            .into_iter()
            .find(|(_, f)| f.trace_score() == best_trace)
            .map(|(id, _)| id.clone()))
    }

    /// A reference for `query` drawn from the Pareto front of the samples.
    ///
    /// Samples with the same text as `query` are skipped. `None` when no
    /// sample remains.
    pub fn nsga(
        &mut self,
        rng: &mut RepairRng,
        query: &str,
        samples: &[(VariantId, String)],
    ) -> Result<Option<VariantId>, RepairError> {
        let mut ids = Vec::new();
        let mut points = Vec::new();
        for (id, source) in samples {
            if source == query {
                continue;
            }
            points.push(self.fitness(query, source)?);
            ids.push(id);
        }
        let front = pareto_front(&points);
        let pool: Vec<&VariantId> = direction_pool(&points, &front)
            .into_iter()
            .map(|i| ids[i])
            .collect();
        Ok(rng.choose(&pool).map(|&id| id.clone()))
    }

    /// Pair every individual still in need of repair with a reference.
    ///
    /// An individual needs a parent when its lineage has no solution yet and
    /// it is not a known-correct program, or when its lineage is solved but
    /// it is not one of the solutions. Everything else forms the reference
    /// pool, padded with randomly drawn individuals up to `size`.
    pub fn parents(
        &mut self,
        rng: &mut RepairRng,
        population: &BTreeMap<VariantId, String>,
        corrects: &BTreeSet<VariantId>,
        solutions: &BTreeMap<String, BTreeMap<VariantId, String>>,
        size: usize,
    ) -> Vec<(VariantId, VariantId)> {
        let mut wrongs = Vec::new();
        let mut samples = Vec::new();
        for id in population.keys() {
            let needs_parent = match solutions.get(&id.origin) {
                None => !corrects.contains(id),
                Some(solved) => !solved.contains_key(id),
            };
            if needs_parent {
                wrongs.push(id.clone());
            } else {
                samples.push(id.clone());
            }
        }

        if wrongs.len() > size {
            wrongs = rng.sample(&wrongs, size);
        }
        if samples.len() > size {
            samples = rng.sample(&samples, size);
        } else if samples.len() < size {
            let missing = (size - samples.len()).min(wrongs.len());
            samples.extend(rng.sample(&wrongs, missing));
        }
        let samples: Vec<(VariantId, String)> = samples
            .into_iter()
            .filter_map(|id| population.get(&id).map(|source| (id, source.clone())))
            .collect();

        let mut pairs = Vec::with_capacity(wrongs.len());
        for wrong in wrongs {
            let Some(source) = population.get(&wrong) else {
                continue;
            };
            match self.nsga(rng, source, &samples) {
                Ok(Some(reference)) => pairs.push((wrong, reference)),
                Ok(None) => log::warn!("No reference candidates for {wrong}, skipping"),
                Err(e) => log::warn!("Selection for {wrong} failed: {e}"),
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::scripted::ScriptedOracle;
    use crate::schema::TestStatus;

    fn fit(values: [f64; 4]) -> Fitness {
        Fitness {
            fp_test: values[0],
            pp_test: values[1],
            fp_trace: values[2],
            pp_trace: values[3],
        }
    }

    #[test]
    fn test_pareto_front() {
        let points = [
            fit([1.0, 0.0, 0.5, 0.5]),
            fit([0.5, 0.0, 0.5, 0.5]),
            fit([0.0, 1.0, 0.0, 0.0]),
            fit([1.0, 0.0, 0.5, 0.5]),
        ];
        assert_eq!(pareto_front(&points), vec![0, 2, 3]);
        assert!(pareto_front(&[]).is_empty());
    }

    #[test]
    fn test_perpendicular_distance() {
        let d = perpendicular_distance(&[1.0, 1.0, 0.0, 0.0], &[1.0, 0.0, 0.0, 0.0]);
        assert!((d - 1.0).abs() < 1e-12);
        let d = perpendicular_distance(&[0.5, 0.5, 0.5, 0.5], &[1.0, 1.0, 1.0, 1.0]);
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn test_direction_pool_keeps_axis_leaders() {
        let points = [
            fit([1.0, 0.0, 0.0, 0.0]),
            fit([0.0, 1.0, 0.0, 0.0]),
            fit([0.6, 0.6, 0.6, 0.6]),
        ];
        let front = pareto_front(&points);
        assert_eq!(front, vec![0, 1, 2]);
        assert_eq!(direction_pool(&points, &front), vec![0, 1, 2]);
    }

    /// Each program passes the tests whose ids appear as digits in its text.
    fn digit_oracle(tests: Vec<u32>) -> ScriptedOracle {
        ScriptedOracle::new(tests, |source, id| {
            if source.contains(&id.to_string()) {
                TestStatus::Success
            } else {
                TestStatus::Failure
            }
        })
    }

    fn variant(origin: &str) -> VariantId {
        VariantId::new(origin, 0)
    }

    #[test]
    fn test_tournament_order() {
        let mut oracle = digit_oracle(vec![1, 2]);
        let mut evaluator = FitnessEvaluator::new(64);
        let mut selection = Selection::new(&mut oracle, &mut evaluator);
        let samples = vec![
            (variant("a"), "x = 0\n".to_string()),
            (variant("b"), "x = 12\n".to_string()),
            (variant("c"), "x = 21\n".to_string()),
        ];
        let winner = selection.tournament("x = 0\n", &samples).unwrap();
        assert_eq!(winner, Some(variant("b")));
        assert_eq!(selection.tournament("x = 0\n", &[]).unwrap(), None);
    }

    #[test]
    fn test_nsga_skips_identical_text() {
        let mut oracle = digit_oracle(vec![1, 2]);
        let mut evaluator = FitnessEvaluator::new(64);
        let mut selection = Selection::new(&mut oracle, &mut evaluator);
        let mut rng = RepairRng::new(2);
        let samples = vec![
            (variant("self"), "x = 0\n".to_string()),
            (variant("fix"), "x = 12\n".to_string()),
        ];
        for _ in 0..5 {
            assert_eq!(
                selection.nsga(&mut rng, "x = 0\n", &samples).unwrap(),
                Some(variant("fix"))
            );
        }
        assert_eq!(selection.nsga(&mut rng, "x = 0\n", &samples[..1]).unwrap(), None);
    }

    #[test]
    fn test_parents_for_unsolved_population() {
        let mut oracle = digit_oracle(vec![1, 2, 3]);
        let mut evaluator = FitnessEvaluator::new(64);
        let mut selection = Selection::new(&mut oracle, &mut evaluator);
        let mut rng = RepairRng::new(17);
        let population: BTreeMap<VariantId, String> = ["p1", "p2", "p3", "p4", "p5"]
            .iter()
            .enumerate()
            .map(|(i, origin)| (variant(origin), format!("x = {}\n", i % 4)))
            .collect();

        let pairs = selection.parents(&mut rng, &population, &BTreeSet::new(), &BTreeMap::new(), 5);
        assert_eq!(pairs.len(), 5);
        let wrongs: BTreeSet<&VariantId> = pairs.iter().map(|(w, _)| w).collect();
        assert_eq!(wrongs.len(), 5);
        for (wrong, reference) in &pairs {
            assert!(population.contains_key(reference));
            assert_ne!(population[wrong], population[reference]);
        }
    }

    #[test]
    fn test_solved_lineages_become_references() {
        let mut oracle = digit_oracle(vec![1]);
        let mut evaluator = FitnessEvaluator::new(64);
        let mut selection = Selection::new(&mut oracle, &mut evaluator);
        let mut rng = RepairRng::new(1);
        let population = BTreeMap::from([
            (VariantId::new("p1", 0), "x = 0\n".to_string()),
            (VariantId::new("p1", 1), "x = 1\n".to_string()),
            (VariantId::new("p2", 0), "y = 0\n".to_string()),
            (VariantId::new("c1", 0), "z = 1\n".to_string()),
        ]);
        let corrects = BTreeSet::from([VariantId::new("c1", 0)]);
        let solutions = BTreeMap::from([(
            "p1".to_string(),
            BTreeMap::from([(VariantId::new("p1", 1), "x = 1\n".to_string())]),
        )]);

        let pairs = selection.parents(&mut rng, &population, &corrects, &solutions, 2);
        let wrongs: BTreeSet<VariantId> = pairs.iter().map(|(w, _)| w.clone()).collect();
        assert_eq!(
            wrongs,
            BTreeSet::from([VariantId::new("p1", 0), VariantId::new("p2", 0)])
        );
        for (_, reference) in &pairs {
            assert!(
                *reference == VariantId::new("p1", 1) || *reference == VariantId::new("c1", 0)
            );
        }
    }
}
