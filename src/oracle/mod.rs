//! Oracle module - Running and tracing subject programs against the test suite.
//!
//! The engine only sees the [`Oracle`] trait. Test outcomes (including
//! timeouts) are data inside [`TraceReport`]; [`OracleError`] is reserved for
//! infrastructure failures such as a tracer that cannot be spawned.

mod cache;
mod process;
#[cfg(test)]
pub(crate) mod scripted;

pub use cache::BoundedCache;
pub use process::ProcessOracle;

use crate::schema::{RunOutcome, TestId, TraceReport};

/// Infrastructure failures while talking to an oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Failed to spawn tracer `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Tracer I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed tracer reply: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Tracer exited with status {status}: {stderr}")]
    Exited { status: String, stderr: String },
}

/// Executes subject programs.
///
/// Implementations must be deterministic for identical source and input.
pub trait Oracle {
    /// Run `source` on one input.
    fn run(&mut self, source: &str, input: &str) -> Result<RunOutcome, OracleError>;

    /// Run `source` on every test case, recording statuses, variable
    /// observations and executed locations.
    fn trace(&mut self, source: &str) -> Result<TraceReport, OracleError>;

    /// Ids of the test suite, in order.
    fn test_ids(&self) -> Vec<TestId>;

    /// Drop memoized results. No-op for uncached oracles.
    fn clear(&mut self) {}
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn run(&mut self, source: &str, input: &str) -> Result<RunOutcome, OracleError> {
        (**self).run(source, input)
    }

    fn trace(&mut self, source: &str) -> Result<TraceReport, OracleError> {
        (**self).trace(source)
    }

    fn test_ids(&self) -> Vec<TestId> {
        (**self).test_ids()
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/// Memoizes an oracle in bounded tables keyed by the exact source text (plus
/// the input for `run`).
#[derive(Debug)]
pub struct CachedOracle<O> {
    inner: O,
    runs: BoundedCache<(String, String), RunOutcome>,
    traces: BoundedCache<String, TraceReport>,
}

impl<O: Oracle> CachedOracle<O> {
    pub fn new(inner: O, capacity: usize) -> Self {
        Self {
            inner,
            runs: BoundedCache::new(capacity),
            traces: BoundedCache::new(capacity),
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// (hits, misses) of the trace table.
    pub fn trace_stats(&self) -> (u64, u64) {
        self.traces.stats()
    }
}

impl<O: Oracle> Oracle for CachedOracle<O> {
    fn run(&mut self, source: &str, input: &str) -> Result<RunOutcome, OracleError> {
        let key = (source.to_string(), input.to_string());
        if let Some(outcome) = self.runs.get(&key) {
            return Ok(outcome);
        }
        let outcome = self.inner.run(source, input)?;
        self.runs.insert(key, outcome.clone());
        Ok(outcome)
    }

    fn trace(&mut self, source: &str) -> Result<TraceReport, OracleError> {
        if let Some(report) = self.traces.get(source) {
            return Ok(report);
        }
        let report = self.inner.trace(source)?;
        self.traces.insert(source.to_string(), report.clone());
        Ok(report)
    }

    fn test_ids(&self) -> Vec<TestId> {
        self.inner.test_ids()
    }

    fn clear(&mut self) {
        log::debug!(
            "Clearing oracle caches ({} traces, {} runs)",
            self.traces.len(),
            self.runs.len()
        );
        self.runs.clear();
        self.traces.clear();
        self.inner.clear();
    }
}
