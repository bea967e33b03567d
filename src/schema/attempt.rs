//! Attempt log records, progress reports, and run results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::execution::{Location, TestId, TestStatus};
use super::program::VariantId;

/// One (lineage, generation) repair attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub generation: usize,
    pub wrong_id: VariantId,
    pub wrong_code: String,
    pub refer_id: VariantId,
    pub refer_code: String,
    pub patch_id: VariantId,
    pub patch: String,
    /// Crossover edit applied, if any.
    pub crossover: Option<String>,
    /// Mutation edit applied, if any.
    pub mutation: Option<String>,
    /// Reference variable name -> buggy variable name.
    pub variable_map: BTreeMap<String, String>,
    pub suspiciousness: BTreeMap<Location, f64>,
    pub wrong_statuses: BTreeMap<TestId, TestStatus>,
    pub refer_statuses: BTreeMap<TestId, TestStatus>,
    pub patch_statuses: BTreeMap<TestId, TestStatus>,
    /// The patch passes every test case.
    pub solution: bool,
    /// The patch was admitted into the population.
    pub admitted: bool,
}

/// Current phase of a repair run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RepairPhase {
    #[default]
    Idle,
    Running,
    Done,
}

/// Progress snapshot reported after each generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairProgress {
    pub generation: usize,
    pub total_generations: usize,
    pub solved_lineages: usize,
    pub total_lineages: usize,
    pub population_size: usize,
    pub attempts: usize,
    pub phase: RepairPhase,
}

/// Reason a run stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the configured generation bound.
    MaxGenerations,
    /// User cancelled.
    Cancelled,
}

/// Statistics from a repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairStats {
    pub generations: usize,
    pub attempts: usize,
    pub solved_lineages: usize,
    pub total_lineages: usize,
    /// Fraction of buggy lineages with at least one solution.
    pub repair_rate: f64,
    pub elapsed_seconds: f64,
    pub stop_reason: StopReason,
}

/// Final result of one trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairResult {
    /// Per lineage: solution variant id -> patch text.
    pub solutions: BTreeMap<String, BTreeMap<VariantId, String>>,
    pub attempts: Vec<AttemptRecord>,
    pub population: BTreeMap<VariantId, String>,
    pub stats: RepairStats,
}
