//! Execution data produced by the oracle: test statuses, observed variable
//! values, and per-test execution traces.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A statement location (1-based starting line of the statement).
pub type Location = u32;

/// Ordinal id of a test case.
pub type TestId = u32;

/// Outcome of running one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Failure,
    Error,
    Timeout,
}

impl TestStatus {
    /// Whether the test passed.
    pub fn is_pass(self) -> bool {
        self == TestStatus::Success
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestStatus::Success => "success",
            TestStatus::Failure => "failure",
            TestStatus::Error => "error",
            TestStatus::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// A runtime value observed for a variable.
///
/// Scalars and lists map onto plain JSON; the remaining containers use a
/// single-key object (`{"tuple": [...]}`) so a tracer can emit them without
/// losing their type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple { tuple: Vec<Value> },
    Set { set: Vec<Value> },
    Dict { dict: Vec<(Value, Value)> },
    Repr { repr: String },
}

impl Value {
    /// Runtime type name, as the subject language reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple { .. } => "tuple",
            Value::Set { .. } => "set",
            Value::Dict { .. } => "dict",
            Value::Repr { .. } => "object",
        }
    }

    fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple { tuple: items } => Some(items),
            _ => None,
        }
    }

    /// Equality that treats lists and tuples with equal elements as the same.
    pub fn equivalent(&self, other: &Value) -> bool {
        match (self.as_sequence(), other.as_sequence()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Parse a literal rendering such as `[1, 'a', (2, 3)]` or `{'k': None}`.
    ///
    /// Anything that is not a literal is kept verbatim as [`Value::Repr`].
    pub fn from_repr(text: &str) -> Value {
        let mut parser = ReprParser {
            chars: text.trim().chars().collect(),
            pos: 0,
        };
        match parser.value() {
            Some(value) if parser.at_end() => value,
            _ => Value::Repr {
                repr: text.trim().to_string(),
            },
        }
    }

    /// Replace every [`Value::Repr`] rendering that parses as a literal,
    /// descending into containers.
    pub fn decode_reprs(&mut self) {
        match self {
            Value::Repr { repr } => *self = Value::from_repr(repr),
            Value::List(items) | Value::Tuple { tuple: items } | Value::Set { set: items } => {
                items.iter_mut().for_each(Value::decode_reprs)
            }
            Value::Dict { dict } => {
                for (k, v) in dict {
                    k.decode_reprs();
                    v.decode_reprs();
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::List(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
            Value::Tuple { tuple } => {
                f.write_str("(")?;
                join(f, tuple)?;
                if tuple.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Set { set } if set.is_empty() => f.write_str("set()"),
            Value::Set { set } => {
                f.write_str("{")?;
                join(f, set)?;
                f.write_str("}")
            }
            Value::Dict { dict } => {
                f.write_str("{")?;
                for (i, (k, v)) in dict.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Repr { repr } => f.write_str(repr),
        }
    }
}

struct ReprParser {
    chars: Vec<char>,
    pos: usize,
}

impl ReprParser {
    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            '[' => {
                self.pos += 1;
                let (items, _) = self.items(']')?;
                Some(Value::List(items))
            }
            '(' => {
                self.pos += 1;
                let (items, trailing_comma) = self.items(')')?;
                if items.len() == 1 && !trailing_comma {
                    items.into_iter().next()
                } else {
                    Some(Value::Tuple { tuple: items })
                }
            }
            '{' => {
                self.pos += 1;
                self.braced()
            }
            '\'' | '"' => self.string().map(Value::Str),
            c if c == '-' || c == '+' || c.is_ascii_digit() || c == '.' => self.number(),
            c if c.is_alphabetic() || c == '_' => {
                let word = self.word();
                match word.as_str() {
                    "None" => Some(Value::None),
                    "True" => Some(Value::Bool(true)),
                    "False" => Some(Value::Bool(false)),
                    "inf" => Some(Value::Float(f64::INFINITY)),
                    "nan" => Some(Value::Float(f64::NAN)),
                    "set" if self.eat('(') && self.eat(')') => Some(Value::Set { set: Vec::new() }),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn items(&mut self, close: char) -> Option<(Vec<Value>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.eat(close) {
                return Some((items, trailing_comma));
            }
            items.push(self.value()?);
            trailing_comma = self.eat(',');
            if !trailing_comma {
                return self.eat(close).then_some((items, false));
            }
        }
    }

    fn braced(&mut self) -> Option<Value> {
        if self.eat('}') {
            return Some(Value::Dict { dict: Vec::new() });
        }
        let first = self.value()?;
        if self.eat(':') {
            let mut dict = vec![(first, self.value()?)];
            while self.eat(',') {
                if self.eat('}') {
                    return Some(Value::Dict { dict });
                }
                let key = self.value()?;
                if !self.eat(':') {
                    return None;
                }
                dict.push((key, self.value()?));
            }
            self.eat('}').then_some(Value::Dict { dict })
        } else {
            let mut set = vec![first];
            while self.eat(',') {
                if self.eat('}') {
                    return Some(Value::Set { set });
                }
                set.push(self.value()?);
            }
            self.eat('}').then_some(Value::Set { set })
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        if self.chars[self.pos..].starts_with(&['i', 'n', 'f']) {
            self.pos += 3;
            let negative = self.chars[start] == '-';
            return Some(Value::Float(if negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            }));
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '_'))
            || (matches!(self.peek(), Some('-') | Some('+'))
                && matches!(self.chars.get(self.pos - 1), Some('e') | Some('E')))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        if let Ok(v) = text.parse::<i64>() {
            return Some(Value::Int(v));
        }
        text.parse::<f64>().ok().map(Value::Float)
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.peek()?;
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => {
                    let escaped = self.peek()?;
                    self.pos += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
        None
    }
}

/// One `(value, location)` observation of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: Value,
    pub location: Location,
}

impl Observation {
    pub fn new(value: Value, location: Location) -> Self {
        Self { value, location }
    }
}

/// Everything the oracle records for one test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestTrace {
    pub status: Option<TestStatus>,
    /// Per-variable ordered observations.
    #[serde(default)]
    pub variables: BTreeMap<String, Vec<Observation>>,
    /// Executed statement locations in order (repeats under loops).
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
}

impl TestTrace {
    /// Status of the test; a missing status counts as an error.
    pub fn status(&self) -> TestStatus {
        self.status.unwrap_or(TestStatus::Error)
    }

    /// Ordered values of a variable.
    pub fn values(&self, var: &str) -> Vec<&Value> {
        self.variables
            .get(var)
            .map(|obs| obs.iter().map(|o| &o.value).collect())
            .unwrap_or_default()
    }
}

/// Trace of a program over the whole test suite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceReport {
    pub tests: BTreeMap<TestId, TestTrace>,
}

impl TraceReport {
    /// Decode every observed value the tracer sent as a literal rendering.
    pub fn decode_reprs(&mut self) {
        self.tests
            .values_mut()
            .flat_map(|t| t.variables.values_mut())
            .flatten()
            .for_each(|o| o.value.decode_reprs());
    }

    /// Report where every listed test ends with the same status and no trace.
    pub fn uniform(ids: impl IntoIterator<Item = TestId>, status: TestStatus) -> Self {
        Self {
            tests: ids
                .into_iter()
                .map(|id| {
                    (
                        id,
                        TestTrace {
                            status: Some(status),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn status(&self, id: TestId) -> TestStatus {
        self.tests
            .get(&id)
            .map(TestTrace::status)
            .unwrap_or(TestStatus::Error)
    }

    pub fn statuses(&self) -> BTreeMap<TestId, TestStatus> {
        self.tests.iter().map(|(&id, t)| (id, t.status())).collect()
    }

    /// Ids of passing tests.
    pub fn passed(&self) -> BTreeSet<TestId> {
        self.tests
            .iter()
            .filter(|(_, t)| t.status().is_pass())
            .map(|(&id, _)| id)
            .collect()
    }

    /// Ids of tests ending in failure, error, or timeout.
    pub fn failed(&self) -> BTreeSet<TestId> {
        self.tests
            .iter()
            .filter(|(_, t)| !t.status().is_pass())
            .map(|(&id, _)| id)
            .collect()
    }

    /// True when the suite is non-empty and every test passes.
    pub fn all_pass(&self) -> bool {
        !self.tests.is_empty() && self.tests.values().all(|t| t.status().is_pass())
    }

    pub fn locations(&self, id: TestId) -> &[Location] {
        self.tests
            .get(&id)
            .map(|t| t.locations.as_slice())
            .unwrap_or(&[])
    }

    /// Copy of the report keeping only the given tests.
    pub fn restricted_to(&self, ids: &BTreeSet<TestId>) -> TraceReport {
        TraceReport {
            tests: self
                .tests
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(&id, t)| (id, t.clone()))
                .collect(),
        }
    }
}

/// Result of a single `run` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: TestStatus,
    #[serde(default)]
    pub stdout: String,
}
