//! Generational repair loop over a population of program variants.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::oracle::{CachedOracle, Oracle};
use crate::repair::{FixHistory, RepairError, RepairRng, vary};
use crate::schema::{
    AttemptRecord, Problem, RepairConfig, RepairPhase, RepairProgress, RepairResult, RepairStats,
    StopReason, VariantId,
};
use crate::syntax::normalize;

use super::fitness::FitnessEvaluator;
use super::selection::Selection;

/// Repair engine that evolves buggy programs toward passing variants.
pub struct RepairEngine<O: Oracle> {
    config: RepairConfig,
    rng: RepairRng,
    oracle: CachedOracle<O>,
    evaluator: FitnessEvaluator,
    history: FixHistory,
    /// Variant id -> normalized source.
    population: BTreeMap<VariantId, String>,
    /// Lineage -> normalized generation-0 source.
    originals: BTreeMap<String, String>,
    corrects: BTreeSet<VariantId>,
    solutions: BTreeMap<String, BTreeMap<VariantId, String>>,
    attempts: Vec<AttemptRecord>,
    generation: usize,
    phase: RepairPhase,
    cancelled: Arc<AtomicBool>,
}

impl<O: Oracle> RepairEngine<O> {
    /// Create an engine for `problem`.
    ///
    /// Programs that do not parse are left out of the population, as are
    /// correct programs whose id collides with a buggy program's.
    pub fn new(config: RepairConfig, problem: &Problem, oracle: O) -> Self {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let mut population = BTreeMap::new();
        let mut originals = BTreeMap::new();
        let mut corrects = BTreeSet::new();

        for (origin, source) in &problem.wrongs {
            match normalize(source) {
                Ok(text) => {
                    population.insert(VariantId::new(origin.as_str(), 0), text.clone());
                    originals.insert(origin.clone(), text);
                }
                Err(e) => log::warn!("Skipping buggy program {origin}: {e}"),
            }
        }
        if config.include_corrects {
            for (origin, source) in &problem.corrects {
                if problem.wrongs.contains_key(origin) {
                    log::warn!("Skipping correct program {origin}: id is taken by a buggy program");
                    continue;
                }
                match normalize(source) {
                    Ok(text) => {
                        let id = VariantId::new(origin.as_str(), 0);
                        population.insert(id.clone(), text);
                        corrects.insert(id);
                    }
                    Err(e) => log::warn!("Skipping correct program {origin}: {e}"),
                }
            }
        }

        Self {
            rng: RepairRng::new(seed),
            oracle: CachedOracle::new(oracle, config.cache_capacity),
            evaluator: FitnessEvaluator::new(config.cache_capacity),
            history: FixHistory::new(),
            population,
            originals,
            corrects,
            solutions: BTreeMap::new(),
            attempts: Vec::new(),
            generation: 0,
            phase: RepairPhase::Idle,
            cancelled: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn population(&self) -> &BTreeMap<VariantId, String> {
        &self.population
    }

    pub fn solutions(&self) -> &BTreeMap<String, BTreeMap<VariantId, String>> {
        &self.solutions
    }

    /// Target size for parent selection.
    fn population_size(&self) -> usize {
        self.config.population_cap.unwrap_or(self.originals.len())
    }

    /// Get current progress.
    pub fn progress(&self) -> RepairProgress {
        RepairProgress {
            generation: self.generation,
            total_generations: self.config.generations,
            solved_lineages: self.solutions.len(),
            total_lineages: self.originals.len(),
            population_size: self.population.len(),
            attempts: self.attempts.len(),
            phase: self.phase.clone(),
        }
    }

    fn should_stop(&self) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }
        if self.generation >= self.config.generations {
            return Some(StopReason::MaxGenerations);
        }
        None
    }

    /// Run a single generation: select pairs, vary each, then admit winners.
    fn step_generation(&mut self) {
        self.generation += 1;
        let size = self.population_size();
        let pairs = Selection::new(&mut self.oracle, &mut self.evaluator).parents(
            &mut self.rng,
            &self.population,
            &self.corrects,
            &self.solutions,
            size,
        );
        log::debug!("Generation {}: {} pairs", self.generation, pairs.len());

        for (wrong_id, refer_id) in pairs {
            if self.cancelled.load(Ordering::Relaxed) {
                break;
            }
            match self.attempt(&wrong_id, &refer_id) {
                Ok(record) => self.attempts.push(record),
                Err(e) => log::warn!("Skipping {wrong_id} <- {refer_id}: {e}"),
            }
        }
    }

    /// Repair `wrong_id` against `refer_id` and fold the patch back in.
    fn attempt(
        &mut self,
        wrong_id: &VariantId,
        refer_id: &VariantId,
    ) -> Result<AttemptRecord, RepairError> {
        let missing = |id: &VariantId| RepairError::Synthesis(format!("unknown variant {id}"));
        let wrong_code = self.population.get(wrong_id).cloned().ok_or_else(|| missing(wrong_id))?;
        let refer_code = self.population.get(refer_id).cloned().ok_or_else(|| missing(refer_id))?;
        let original = self
            .originals
            .get(&wrong_id.origin)
            .cloned()
            .ok_or_else(|| missing(&wrong_id.original()))?;
        let patch_id = VariantId::new(wrong_id.origin.as_str(), self.generation);

        let variation = vary(
            &mut self.oracle,
            &mut self.rng,
            &mut self.history,
            &self.config,
            &wrong_code,
            &refer_code,
        )?;
        let patch = variation.patch.source.clone();
        let patch_report = self.oracle.trace(&patch)?;

        let solution = patch_report.all_pass();
        if solution {
            log::info!("Solution for {} at generation {}", wrong_id.origin, self.generation);
            self.solutions
                .entry(wrong_id.origin.clone())
                .or_default()
                .insert(patch_id.clone(), patch.clone());
        }

        let mut contenders = vec![
            (wrong_id.clone(), wrong_code.clone()),
            (patch_id.clone(), patch.clone()),
        ];
        if let Some(solved) = self.solutions.get(&wrong_id.origin) {
            for (id, source) in solved {
                if !contenders.iter().any(|(seen, _)| seen == id) {
                    contenders.push((id.clone(), source.clone()));
                }
            }
        }
        let winner = Selection::new(&mut self.oracle, &mut self.evaluator)
            .tournament(&original, &contenders)?;
        let admitted =
            winner.as_ref() == Some(&patch_id) && !self.population.values().any(|v| *v == patch);
        if admitted {
            log::debug!("Admitted {patch_id}");
            self.population.insert(patch_id.clone(), patch.clone());
        }

        Ok(AttemptRecord {
            generation: self.generation,
            wrong_id: wrong_id.clone(),
            wrong_code,
            refer_id: refer_id.clone(),
            refer_code,
            patch_id,
            patch,
            crossover: variation.patch.crossover,
            mutation: variation.patch.mutation,
            variable_map: variation.variable_map,
            suspiciousness: variation.suspiciousness,
            wrong_statuses: variation.buggy.statuses(),
            refer_statuses: variation.reference.statuses(),
            patch_statuses: patch_report.statuses(),
            solution,
            admitted,
        })
    }

    fn clear_caches(&mut self) {
        self.oracle.clear();
        self.evaluator.clear();
    }

    /// Run repair with progress callback.
    pub fn run_with_callback<F>(&mut self, callback: F) -> RepairResult
    where
        F: Fn(&RepairProgress),
    {
        let start_time = std::time::Instant::now();
        self.clear_caches();
        self.phase = RepairPhase::Running;
        callback(&self.progress());

        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }
            self.step_generation();
            log::info!(
                "Generation {}/{}: {}/{} lineages solved, population {}",
                self.generation,
                self.config.generations,
                self.solutions.len(),
                self.originals.len(),
                self.population.len()
            );
            callback(&self.progress());
        };

        self.phase = RepairPhase::Done;
        self.clear_caches();
        callback(&self.progress());

        let total = self.originals.len();
        let solved = self.solutions.len();
        RepairResult {
            solutions: self.solutions.clone(),
            attempts: self.attempts.clone(),
            population: self.population.clone(),
            stats: RepairStats {
                generations: self.generation,
                attempts: self.attempts.len(),
                solved_lineages: solved,
                total_lineages: total,
                repair_rate: if total == 0 { 0.0 } else { solved as f64 / total as f64 },
                elapsed_seconds: start_time.elapsed().as_secs_f64(),
                stop_reason,
            },
        }
    }

    /// Run repair (blocking).
    pub fn run(&mut self) -> RepairResult {
        self.run_with_callback(|_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::scripted::ScriptedOracle;
    use crate::schema::{Observation, TestStatus, TestTrace, Value};
    use crate::syntax::{parse, variable_names};
    use std::sync::Mutex;

    const BUGGY: &str = "a, b = map(int, input().split())\nc = a - b\nprint(c)\n";
    const REFERENCE: &str = "x, y = map(int, input().split())\nz = x + y\nprint(z)\n";

    /// Input "2 3": summing programs print 5 and pass.
    fn arithmetic_oracle() -> ScriptedOracle {
        ScriptedOracle::with_traces(vec![1], |source, _| {
            let names = variable_names(&parse(source).unwrap());
            let sum = source.contains('+');
            let mut trace = TestTrace {
                status: Some(if sum { TestStatus::Success } else { TestStatus::Failure }),
                locations: vec![1, 2, 3],
                ..Default::default()
            };
            let values = [(2, 1), (3, 1), (if sum { 5 } else { -1 }, 2)];
            for (name, (value, line)) in names.into_iter().zip(values) {
                trace
                    .variables
                    .insert(name, vec![Observation::new(Value::Int(value), line)]);
            }
            trace
        })
    }

    fn problem() -> Problem {
        Problem {
            title: "sum".to_string(),
            wrongs: BTreeMap::from([("w1".to_string(), BUGGY.to_string())]),
            corrects: BTreeMap::from([("c1".to_string(), REFERENCE.to_string())]),
            testcases: Vec::new(),
        }
    }

    fn config(generations: usize) -> RepairConfig {
        RepairConfig {
            generations,
            include_corrects: true,
            random_seed: Some(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_engine_creation() {
        let engine = RepairEngine::new(config(3), &problem(), arithmetic_oracle());
        assert_eq!(engine.population().len(), 2);
        assert_eq!(engine.population_size(), 1);
        assert_eq!(engine.progress().phase, RepairPhase::Idle);
    }

    #[test]
    fn test_repair_finds_solution() {
        // Each generation's mutation at the faulty line is a replace or a
        // delete; twenty generations leave the fix all but certain.
        let mut engine = RepairEngine::new(config(20), &problem(), arithmetic_oracle());
        let result = engine.run();

        assert_eq!(result.stats.generations, 20);
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        let solved = &result.solutions["w1"];
        assert!(!solved.is_empty());
        for patch in solved.values() {
            assert!(patch.contains('+'));
        }
        assert_eq!(result.stats.repair_rate, 1.0);

        let first = result.attempts.iter().find(|a| a.solution).unwrap();
        assert_eq!(first.wrong_id, VariantId::new("w1", 0));
        assert_eq!(first.refer_id, VariantId::new("c1", 0));
        assert!(first.admitted);
        assert_eq!(first.variable_map["z"], "c");
        assert!(result.population.contains_key(&first.patch_id));
        assert!(result.attempts.iter().all(|a| a.wrong_statuses.len() == 1));
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let first = RepairEngine::new(config(2), &problem(), arithmetic_oracle()).run();
        let second = RepairEngine::new(config(2), &problem(), arithmetic_oracle()).run();
        assert_eq!(first.solutions, second.solutions);
        assert_eq!(first.population, second.population);
        assert_eq!(first.attempts.len(), second.attempts.len());
    }

    #[test]
    fn test_no_reference_means_no_attempts() {
        let config = RepairConfig {
            include_corrects: false,
            ..config(2)
        };
        let mut engine = RepairEngine::new(config, &problem(), arithmetic_oracle());
        let result = engine.run();
        assert!(result.attempts.is_empty());
        assert!(result.solutions.is_empty());
        assert_eq!(result.stats.generations, 2);
    }

    #[test]
    fn test_progress_callback() {
        let phases = Mutex::new(Vec::new());
        let mut engine = RepairEngine::new(config(2), &problem(), arithmetic_oracle());
        engine.run_with_callback(|progress| {
            phases.lock().unwrap().push((progress.generation, progress.phase.clone()));
        });
        let phases = phases.into_inner().unwrap();
        assert_eq!(phases.first(), Some(&(0, RepairPhase::Running)));
        assert_eq!(phases.last(), Some(&(2, RepairPhase::Done)));
        assert_eq!(phases.len(), 4);
    }

    #[test]
    fn test_unparsable_program_is_skipped() {
        let mut problem = problem();
        problem.wrongs.insert("w2".to_string(), "if x\n".to_string());
        let engine = RepairEngine::new(config(1), &problem, arithmetic_oracle());
        assert_eq!(engine.progress().total_lineages, 1);
    }

    #[test]
    fn test_correct_program_cannot_shadow_buggy_lineage() {
        let mut problem = problem();
        problem.corrects.insert("w1".to_string(), REFERENCE.to_string());
        let engine = RepairEngine::new(config(1), &problem, arithmetic_oracle());
        let buggy = normalize(BUGGY).unwrap();
        assert_eq!(engine.population()[&VariantId::new("w1", 0)], buggy);
        assert!(!engine.corrects.contains(&VariantId::new("w1", 0)));
        assert!(engine.corrects.contains(&VariantId::new("c1", 0)));
        assert_eq!(engine.population().len(), 2);
    }

    #[test]
    fn test_cancellation() {
        let mut engine = RepairEngine::new(config(100), &problem(), arithmetic_oracle());
        let cancel = engine.cancel_handle();

        // Cancel immediately
        cancel.store(true, Ordering::Relaxed);

        let result = engine.run();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.generations, 0);
    }
}
