//! Schema module - Configuration, program, and execution data types.

mod attempt;
mod config;
mod execution;
mod program;

pub use attempt::*;
pub use config::*;
pub use execution::*;
pub use program::*;
