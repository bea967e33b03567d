//! Evolutionary search module for repairing a population of buggy programs.
//!
//! # Overview
//!
//! - **Fitness** (`fitness`): four test- and trace-based objectives between a
//!   buggy program and a candidate, memoized per text pair
//! - **Selection** (`selection`): tournament, Pareto-front reference pool,
//!   and generational parent pairing
//! - **Search** (`search`): the generational loop that varies each pair and
//!   admits winning patches
//! - **Archive** (`archive`): JSON export of solutions and attempt logs
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use trace_repair::evolution::RepairEngine;
//! use trace_repair::oracle::ProcessOracle;
//! use trace_repair::schema::{Problem, RepairConfig};
//!
//! let problem: Problem = serde_json::from_str(&std::fs::read_to_string("problem.json")?)?;
//! let oracle = ProcessOracle::new(
//!     "python3",
//!     vec!["tracer.py".to_string()],
//!     problem.sorted_tests(),
//!     Duration::from_secs(1),
//! );
//!
//! let mut engine = RepairEngine::new(RepairConfig::default(), &problem, oracle);
//! let result = engine.run_with_callback(|progress| {
//!     println!(
//!         "Generation {}: {}/{} solved",
//!         progress.generation, progress.solved_lineages, progress.total_lineages
//!     );
//! });
//! println!("Repair rate: {:.2}", result.stats.repair_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod archive;
mod fitness;
mod search;
mod selection;

pub use archive::{SolutionArchive, SolutionExport, TrialMetadata};
pub use fitness::{Fitness, FitnessEvaluator, score};
pub use search::RepairEngine;
pub use selection::{Selection, direction_pool, pareto_front, perpendicular_distance};
