//! Program variants, test cases, and the persisted problem layout.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::execution::TestId;

/// Identifies a program variant: lineage (origin) id plus generation index.
///
/// Rendered as `"<origin>_<generation>"`; generation 0 is the original program.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariantId {
    pub origin: String,
    pub generation: usize,
}

impl VariantId {
    pub fn new(origin: impl Into<String>, generation: usize) -> Self {
        Self {
            origin: origin.into(),
            generation,
        }
    }

    /// The generation-0 variant of the same lineage.
    pub fn original(&self) -> VariantId {
        VariantId::new(self.origin.clone(), 0)
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.origin, self.generation)
    }
}

/// Error parsing a variant id string.
#[derive(Debug, thiserror::Error)]
#[error("Invalid variant id `{0}`, expected `<origin>_<generation>`")]
pub struct VariantIdError(String);

impl FromStr for VariantId {
    type Err = VariantIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (origin, generation) = s
            .rsplit_once('_')
            .ok_or_else(|| VariantIdError(s.to_string()))?;
        let generation = generation
            .parse()
            .map_err(|_| VariantIdError(s.to_string()))?;
        Ok(VariantId::new(origin, generation))
    }
}

impl Serialize for VariantId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VariantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One test case of the hidden suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Ordinal id.
    pub no: TestId,
    pub input: String,
    /// Expected standard output.
    pub output: String,
    /// Open (visible) or hidden; only reporting looks at this.
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

impl TestCase {
    pub fn new(no: TestId, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            no,
            input: input.into(),
            output: output.into(),
            open: true,
        }
    }
}

/// A repair problem as stored on disk: buggy programs keyed by lineage id,
/// optional known-correct programs, and the ordered test suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub title: String,
    pub wrongs: BTreeMap<String, String>,
    #[serde(default)]
    pub corrects: BTreeMap<String, String>,
    pub testcases: Vec<TestCase>,
}

impl Problem {
    /// Test cases ordered by ordinal.
    pub fn sorted_tests(&self) -> Vec<TestCase> {
        let mut tests = self.testcases.clone();
        tests.sort_by_key(|t| t.no);
        tests
    }
}
