//! In-memory oracle driven by closures, for tests.

use super::{Oracle, OracleError};
use crate::schema::{RunOutcome, TestId, TestStatus, TestTrace, TraceReport};
use crate::syntax::parse;

type Script = Box<dyn Fn(&str, TestId) -> TestTrace + Send + Sync>;

pub(crate) struct ScriptedOracle {
    tests: Vec<TestId>,
    script: Script,
    calls: usize,
}

/// Statement lines of `source` in preorder, as straight-line execution would
/// visit them.
pub(crate) fn straight_line(source: &str) -> Vec<u32> {
    parse(source)
        .map(|tree| {
            tree.statements()
                .into_iter()
                .filter_map(|id| tree.node(id).location)
                .collect()
        })
        .unwrap_or_default()
}

impl ScriptedOracle {
    /// Statuses from `status`; every test executes each statement once.
    pub(crate) fn new(
        tests: Vec<TestId>,
        status: impl Fn(&str, TestId) -> TestStatus + Send + Sync + 'static,
    ) -> Self {
        Self::with_traces(tests, move |source, id| TestTrace {
            status: Some(status(source, id)),
            locations: straight_line(source),
            ..Default::default()
        })
    }

    pub(crate) fn with_traces(
        tests: Vec<TestId>,
        trace: impl Fn(&str, TestId) -> TestTrace + Send + Sync + 'static,
    ) -> Self {
        Self {
            tests,
            script: Box::new(trace),
            calls: 0,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls
    }
}

impl Oracle for ScriptedOracle {
    fn run(&mut self, source: &str, _input: &str) -> Result<RunOutcome, OracleError> {
        self.calls += 1;
        let status = self
            .tests
            .first()
            .map(|&id| (self.script)(source, id).status())
            .unwrap_or(TestStatus::Error);
        Ok(RunOutcome {
            status,
            stdout: String::new(),
        })
    }

    fn trace(&mut self, source: &str) -> Result<TraceReport, OracleError> {
        self.calls += 1;
        Ok(TraceReport {
            tests: self
                .tests
                .iter()
                .map(|&id| (id, (self.script)(source, id)))
                .collect(),
        })
    }

    fn test_ids(&self) -> Vec<TestId> {
        self.tests.clone()
    }
}
