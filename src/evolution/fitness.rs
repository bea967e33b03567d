//! Multi-objective fitness between a buggy program and a candidate.

use serde::{Deserialize, Serialize};

use crate::oracle::{BoundedCache, Oracle};
use crate::repair::{RepairError, StatementAligner};
use crate::schema::TraceReport;
use crate::syntax::{SyntaxTree, parse};

/// The four maximized objectives, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fitness {
    /// Share of the buggy program's failing tests the candidate passes.
    pub fp_test: f64,
    /// Share of the buggy program's passing tests the candidate still passes.
    pub pp_test: f64,
    /// Mean trace similarity over the fixed tests.
    pub fp_trace: f64,
    /// Mean trace similarity over the preserved tests.
    pub pp_trace: f64,
}

impl Fitness {
    pub fn objectives(&self) -> [f64; 4] {
        [self.fp_test, self.pp_test, self.fp_trace, self.pp_trace]
    }

    pub fn test_score(&self) -> f64 {
        self.fp_test + self.pp_test
    }

    pub fn trace_score(&self) -> f64 {
        self.fp_trace + self.pp_trace
    }

    /// At least as good everywhere and strictly better somewhere.
    pub fn dominates(&self, other: &Fitness) -> bool {
        let (a, b) = (self.objectives(), other.objectives());
        a.iter().zip(&b).all(|(x, y)| x >= y) && a.iter().zip(&b).any(|(x, y)| x > y)
    }
}

fn divide(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

/// Score `candidate` against `buggy` from their trace reports.
pub fn score(
    buggy_tree: &SyntaxTree,
    buggy: &TraceReport,
    candidate_tree: &SyntaxTree,
    candidate: &TraceReport,
) -> Fitness {
    let (buggy_pass, buggy_fail) = (buggy.passed(), buggy.failed());
    let candidate_pass = candidate.passed();
    let fixed: Vec<_> = buggy_fail.intersection(&candidate_pass).copied().collect();
    let preserved: Vec<_> = buggy_pass.intersection(&candidate_pass).copied().collect();

    let aligner = StatementAligner::new(buggy_tree, candidate_tree);
    let similarity = |ids: &[u32]| -> f64 {
        ids.iter()
            .map(|&id| aligner.trace_similarity(buggy.locations(id), candidate.locations(id)))
            .sum()
    };

    Fitness {
        fp_test: divide(fixed.len() as f64, buggy_fail.len()),
        pp_test: divide(preserved.len() as f64, buggy_pass.len()),
        fp_trace: divide(similarity(&fixed), fixed.len()),
        pp_trace: divide(similarity(&preserved), preserved.len()),
    }
}

/// Memoizes fitness by the pair of program texts.
pub struct FitnessEvaluator {
    cache: BoundedCache<(String, String), Fitness>,
}

impl FitnessEvaluator {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new(capacity),
        }
    }

    /// Fitness of `candidate` relative to `buggy`, tracing both as needed.
    pub fn evaluate<O: Oracle + ?Sized>(
        &mut self,
        oracle: &mut O,
        buggy: &str,
        candidate: &str,
    ) -> Result<Fitness, RepairError> {
        let key = (buggy.to_string(), candidate.to_string());
        if let Some(fitness) = self.cache.get(&key) {
            return Ok(fitness);
        }
        let buggy_tree = parse(buggy)?;
        let candidate_tree = parse(candidate)?;
        let buggy_report = oracle.trace(buggy)?;
        let candidate_report = oracle.trace(candidate)?;
        let fitness = score(&buggy_tree, &buggy_report, &candidate_tree, &candidate_report);
        self.cache.insert(key, fitness);
        Ok(fitness)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::scripted::ScriptedOracle;
    use crate::schema::{TestStatus, TestTrace};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    const PROGRAM: &str = "a, b = map(int, input().split())\nc = a + b\nprint(c)\n";

    fn passing_first(source: &str, id: u32) -> TestStatus {
        if source.contains('+') || id == 1 {
            TestStatus::Success
        } else {
            TestStatus::Failure
        }
    }

    #[test]
    fn test_identical_programs() {
        let mut oracle = ScriptedOracle::new(vec![1, 2], passing_first);
        let mut evaluator = FitnessEvaluator::new(16);
        let fitness = evaluator.evaluate(&mut oracle, PROGRAM, PROGRAM).unwrap();
        // Nothing fails, so the fixed-test objectives have empty denominators.
        assert_eq!(fitness, Fitness { fp_test: 0.0, pp_test: 1.0, fp_trace: 0.0, pp_trace: 1.0 });

        let buggy = "a, b = map(int, input().split())\nc = a - b\nprint(c)\n";
        let fitness = evaluator.evaluate(&mut oracle, buggy, buggy).unwrap();
        assert_eq!(fitness, Fitness { fp_test: 0.0, pp_test: 1.0, fp_trace: 0.0, pp_trace: 1.0 });
    }

    #[test]
    fn test_fix_scores_failing_tests() {
        let mut oracle = ScriptedOracle::new(vec![1, 2], passing_first);
        let mut evaluator = FitnessEvaluator::new(16);
        let buggy = "a, b = map(int, input().split())\nc = a - b\nprint(c)\n";
        let fitness = evaluator.evaluate(&mut oracle, buggy, PROGRAM).unwrap();
        assert_eq!(fitness.fp_test, 1.0);
        assert_eq!(fitness.pp_test, 1.0);
        assert_eq!(fitness.fp_trace, 1.0);
        assert!(Fitness { fp_test: 1.0, ..fitness }.dominates(&Fitness::default()));
        assert!(!fitness.dominates(&fitness));
    }

    #[test]
    fn test_cache_avoids_retracing() {
        let mut oracle = ScriptedOracle::new(vec![1], passing_first);
        let mut evaluator = FitnessEvaluator::new(16);
        evaluator.evaluate(&mut oracle, PROGRAM, PROGRAM).unwrap();
        let calls = oracle.calls();
        evaluator.evaluate(&mut oracle, PROGRAM, PROGRAM).unwrap();
        assert_eq!(oracle.calls(), calls);
        assert_eq!(evaluator.len(), 1);
        evaluator.clear();
        assert!(evaluator.is_empty());
    }

    fn report(entries: &[(bool, Vec<u32>)]) -> TraceReport {
        TraceReport {
            tests: entries
                .iter()
                .enumerate()
                .map(|(i, (pass, locations))| {
                    let status = if *pass { TestStatus::Success } else { TestStatus::Failure };
                    (
                        i as u32,
                        TestTrace {
                            status: Some(status),
                            locations: locations.clone(),
                            ..Default::default()
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    proptest! {
        #[test]
        fn fitness_components_are_bounded(
            buggy in prop::collection::vec((any::<bool>(), prop::collection::vec(1u32..5, 0..8)), 0..6),
            candidate in prop::collection::vec((any::<bool>(), prop::collection::vec(1u32..5, 0..8)), 0..6),
        ) {
            let tree = parse("a = 1\nb = 2\nif a:\n    c = 3\n").unwrap();
            let fitness = score(&tree, &report(&buggy), &tree, &report(&candidate));
            for value in fitness.objectives() {
                prop_assert!((0.0..=1.0).contains(&value));
            }
            if buggy.iter().all(|(pass, _)| *pass) {
                prop_assert_eq!(fitness.fp_test, 0.0);
                prop_assert_eq!(fitness.fp_trace, 0.0);
            }
        }
    }
}
