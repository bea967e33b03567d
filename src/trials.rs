//! Independent repair trials with derived seeds.

use rayon::prelude::*;

use crate::evolution::RepairEngine;
use crate::oracle::Oracle;
use crate::schema::{Problem, RepairConfig, RepairResult};

/// Result of one trial.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub trial: usize,
    pub seed: u64,
    pub result: RepairResult,
}

/// Run `config.trials` isolated engines.
///
/// Trial `i` is seeded with the base seed plus `i`; `make_oracle` builds a
/// fresh oracle per trial so no cache is shared. Outcomes are returned in
/// trial order.
pub fn run_trials<O, F>(config: &RepairConfig, problem: &Problem, make_oracle: F) -> Vec<TrialOutcome>
where
    O: Oracle,
    F: Fn(usize) -> O + Sync + Send,
{
    let base = config.random_seed.unwrap_or_else(rand::random);
    let run_one = |trial: usize| {
        let seed = base.wrapping_add(trial as u64);
        let config = RepairConfig {
            random_seed: Some(seed),
            ..config.clone()
        };
        log::info!("Trial {trial} starting with seed {seed}");
        let mut engine = RepairEngine::new(config, problem, make_oracle(trial));
        let result = engine.run();
        log::info!(
            "Trial {trial} done: {}/{} lineages repaired",
            result.stats.solved_lineages,
            result.stats.total_lineages
        );
        TrialOutcome { trial, seed, result }
    };

    if config.parallel_trials {
        (0..config.trials).into_par_iter().map(run_one).collect()
    } else {
        (0..config.trials).map(run_one).collect()
    }
}

/// Mean repair rate across trials.
pub fn mean_repair_rate(outcomes: &[TrialOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    outcomes.iter().map(|o| o.result.stats.repair_rate).sum::<f64>() / outcomes.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::scripted::ScriptedOracle;
    use crate::schema::TestStatus;
    use std::collections::BTreeMap;

    fn problem() -> Problem {
        Problem {
            wrongs: BTreeMap::from([("w1".to_string(), "print(1)\n".to_string())]),
            corrects: BTreeMap::from([("c1".to_string(), "print(2)\n".to_string())]),
            ..Default::default()
        }
    }

    fn oracle(_: usize) -> ScriptedOracle {
        ScriptedOracle::new(vec![1], |source, _| {
            if source.contains('2') {
                TestStatus::Success
            } else {
                TestStatus::Failure
            }
        })
    }

    #[test]
    fn test_trials_use_derived_seeds() {
        let config = RepairConfig {
            generations: 2,
            trials: 3,
            include_corrects: true,
            random_seed: Some(40),
            ..Default::default()
        };
        let outcomes = run_trials(&config, &problem(), oracle);
        let seeds: Vec<u64> = outcomes.iter().map(|o| o.seed).collect();
        assert_eq!(seeds, vec![40, 41, 42]);
        assert!(outcomes.iter().all(|o| o.result.stats.generations == 2));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let config = RepairConfig {
            generations: 2,
            trials: 2,
            include_corrects: true,
            random_seed: Some(7),
            ..Default::default()
        };
        let sequential = run_trials(&config, &problem(), oracle);
        let parallel = run_trials(
            &RepairConfig {
                parallel_trials: true,
                ..config
            },
            &problem(),
            oracle,
        );
        for (a, b) in sequential.iter().zip(&parallel) {
            assert_eq!(a.trial, b.trial);
            assert_eq!(a.result.solutions, b.result.solutions);
        }
        assert_eq!(mean_repair_rate(&sequential), mean_repair_rate(&parallel));
        assert_eq!(mean_repair_rate(&[]), 0.0);
    }
}
