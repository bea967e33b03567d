//! Oracle backed by an external tracer process speaking JSON over stdio.
//!
//! Request (stdin): `{"mode": "trace", "source": ..., "tests": [...], "timeout_secs": ...}`
//! or `{"mode": "run", "source": ..., "input": ..., "timeout_secs": ...}`.
//! Reply (stdout): a [`TraceReport`] or a [`RunOutcome`] as JSON.
//!
//! The tracer enforces `timeout_secs` on each test on its own and reports a
//! test that overruns it as `"timeout"`, leaving the other tests' results
//! intact. The wall-clock deadline here only backstops a tracer that hangs
//! as a whole.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{Oracle, OracleError};
use crate::schema::{RunOutcome, TestCase, TestId, TestStatus, TestTrace, TraceReport};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum Request<'a> {
    Run {
        source: &'a str,
        input: &'a str,
        timeout_secs: f64,
    },
    Trace {
        source: &'a str,
        tests: &'a [TestCase],
        timeout_secs: f64,
    },
}

/// Spawns the tracer command once per call. The per-test timeout is passed
/// to the tracer; a wall-clock backstop kills a tracer that outlives the
/// whole request.
#[derive(Debug, Clone)]
pub struct ProcessOracle {
    program: String,
    args: Vec<String>,
    tests: Vec<TestCase>,
    timeout: Duration,
}

impl ProcessOracle {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        tests: Vec<TestCase>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            tests,
            timeout,
        }
    }

    /// Build from a whitespace-separated command line such as
    /// `python3 tracer.py`. Returns `None` for a blank line.
    pub fn from_command_line(line: &str, tests: Vec<TestCase>, timeout: Duration) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self::new(program, words.collect(), tests, timeout))
    }

    /// Backstop for one call: the per-test timeout for each test in the
    /// request, plus one more for tracer start-up.
    fn deadline(&self, tests: usize) -> Duration {
        let slots = u32::try_from(tests.max(1)).unwrap_or(u32::MAX).saturating_add(1);
        self.timeout.saturating_mul(slots)
    }

    /// Send one request; `None` means the deadline expired.
    fn exchange(&self, request: &Request<'_>, budget: Duration) -> Result<Option<Vec<u8>>, OracleError> {
        let payload = serde_json::to_vec(request)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| OracleError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        // A tracer may exit before reading its request; that is reported
        // through its exit status, not as a write failure.
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(&payload)
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            kill(&mut child);
            return Err(e.into());
        }
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= budget {
                kill(&mut child);
                log::debug!("Tracer exceeded {:.2}s budget", budget.as_secs_f64());
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        if !status.success() {
            return Err(OracleError::Exited {
                status: status
                    .code()
                    .map_or_else(|| "signal".to_string(), |code| code.to_string()),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(Some(stdout))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill tracer: {e}");
    }
    let _ = child.wait();
}

impl Oracle for ProcessOracle {
    fn run(&mut self, source: &str, input: &str) -> Result<RunOutcome, OracleError> {
        let request = Request::Run {
            source,
            input,
            timeout_secs: self.timeout.as_secs_f64(),
        };
        match self.exchange(&request, self.deadline(1))? {
            Some(reply) => Ok(serde_json::from_slice(&reply)?),
            None => Ok(RunOutcome {
                status: TestStatus::Timeout,
                stdout: String::new(),
            }),
        }
    }

    fn trace(&mut self, source: &str) -> Result<TraceReport, OracleError> {
        let request = Request::Trace {
            source,
            tests: &self.tests,
            timeout_secs: self.timeout.as_secs_f64(),
        };
        let Some(reply) = self.exchange(&request, self.deadline(self.tests.len()))? else {
            log::warn!("Tracer hung past the backstop; marking every test as timed out");
            return Ok(TraceReport::uniform(self.test_ids(), TestStatus::Timeout));
        };
        let mut report: TraceReport = serde_json::from_slice(&reply)?;
        report.decode_reprs();
        for id in self.test_ids() {
            report.tests.entry(id).or_insert_with(|| TestTrace {
                status: Some(TestStatus::Error),
                ..Default::default()
            });
        }
        Ok(report)
    }

    fn test_ids(&self) -> Vec<TestId> {
        self.tests.iter().map(|t| t.no).collect()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::schema::Value;

    fn suite() -> Vec<TestCase> {
        vec![TestCase::new(1, "2 3", "5"), TestCase::new(2, "1 1", "2")]
    }

    #[test]
    fn test_trace_reply_fills_missing_tests() {
        let reply = r#"{"tests": {"1": {"status": "success", "locations": [1]}}}"#;
        let mut oracle = ProcessOracle::new(
            "sh",
            vec!["-c".into(), format!("cat > /dev/null; echo '{reply}'")],
            suite(),
            Duration::from_secs(5),
        );
        let report = oracle.trace("print(5)\n").unwrap();
        assert_eq!(report.status(1), TestStatus::Success);
        assert_eq!(report.status(2), TestStatus::Error);
    }

    #[test]
    fn test_per_test_timeout_keeps_other_results() {
        // Test 1 hangs inside the tracer; test 2 still passes. The tracer
        // only answers when it was told the per-test timeout.
        let reply = r#"{"tests": {"1": {"status": "timeout"}, "2": {"status": "success",
            "variables": {"p": [{"value": {"repr": "(1, 1)"}, "location": 1}]}, "locations": [1]}}}"#;
        let script = format!("grep -q '\"timeout_secs\":2.0' && echo '{reply}'");
        let mut oracle = ProcessOracle::new(
            "sh",
            vec!["-c".into(), script],
            suite(),
            Duration::from_secs(2),
        );
        let report = oracle.trace("x = input()\nwhile x == '2 3': pass\n").unwrap();
        assert_eq!(report.status(1), TestStatus::Timeout);
        assert_eq!(report.status(2), TestStatus::Success);
        assert_eq!(
            report.tests[&2].values("p"),
            vec![&Value::Tuple {
                tuple: vec![Value::Int(1), Value::Int(1)]
            }]
        );
    }

    #[test]
    fn test_backstop_does_not_overflow() {
        let oracle = ProcessOracle::new("sh", Vec::new(), suite(), Duration::MAX);
        assert_eq!(oracle.deadline(usize::MAX), Duration::MAX);
        let oracle = ProcessOracle::new("sh", Vec::new(), suite(), Duration::from_secs(2));
        assert_eq!(oracle.deadline(2), Duration::from_secs(6));
    }

    #[test]
    fn test_deadline_reports_timeout() {
        let mut oracle = ProcessOracle::new(
            "sh",
            vec!["-c".into(), "sleep 5".into()],
            suite(),
            Duration::from_millis(50),
        );
        let report = oracle.trace("while True: pass\n").unwrap();
        assert_eq!(report.tests.len(), 2);
        assert!(report.tests.values().all(|t| t.status() == TestStatus::Timeout));
        let outcome = oracle.run("while True: pass\n", "").unwrap();
        assert_eq!(outcome.status, TestStatus::Timeout);
    }

    #[test]
    fn test_spawn_failure_is_an_error() {
        let mut oracle = ProcessOracle::new(
            "/nonexistent/tracer",
            Vec::new(),
            suite(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            oracle.trace("x = 1\n"),
            Err(OracleError::Spawn { .. })
        ));
        assert!(ProcessOracle::from_command_line("   ", suite(), Duration::from_secs(1)).is_none());
    }
}
