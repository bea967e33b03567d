//! Trace Repair - Trace-guided evolutionary repair of small programs.
//!
//! This crate repairs buggy programs by aligning their execution traces
//! with those of reference programs, then evolving patches generation by
//! generation until variants pass every test case.
//!
//! # Architecture
//!
//! - `schema`: Configuration, program, execution and attempt-log types
//! - `syntax`: Statement-level syntax trees, normalization and renaming
//! - `oracle`: Running and tracing programs against the test suite
//! - `repair`: Variable alignment, fault localization, statement alignment
//!   and patch synthesis for one (buggy, reference) pair
//! - `evolution`: Fitness, selection and the generational repair loop
//! - `trials`: Independent repeated runs with derived seeds
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use trace_repair::{ProcessOracle, Problem, RepairConfig, run_trials};
//!
//! let problem: Problem = serde_json::from_str(&std::fs::read_to_string("problem.json")?)?;
//! let tests = problem.sorted_tests();
//! let config = RepairConfig::default();
//!
//! let outcomes = run_trials(&config, &problem, |_| {
//!     ProcessOracle::new("python3", vec!["tracer.py".into()], tests.clone(), Duration::from_secs(1))
//! });
//! for outcome in &outcomes {
//!     println!("Trial {}: {:?}", outcome.trial, outcome.result.solutions.keys());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod evolution;
pub mod oracle;
pub mod repair;
pub mod schema;
pub mod syntax;
pub mod trials;

// Re-export commonly used types
pub use evolution::{RepairEngine, SolutionArchive};
pub use oracle::{CachedOracle, Oracle, ProcessOracle};
pub use schema::{Problem, RepairConfig, RepairResult};
pub use trials::{TrialOutcome, run_trials};
