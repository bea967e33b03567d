//! Maps a reference program's variable names onto a buggy program's.

use std::collections::{BTreeMap, BTreeSet};

use super::align::lcs_pairs;
use super::rng::RepairRng;
use crate::schema::{TestId, TraceReport, Value};
use crate::syntax::{SyntaxTree, definitions, variable_names};

/// Reference variable name -> buggy variable name. Injective once built.
pub type VariableMap = BTreeMap<String, String>;

/// Names a program binds, followed by any further names its traces observe.
fn program_names(tree: &SyntaxTree, report: &TraceReport, tests: &BTreeSet<TestId>) -> Vec<String> {
    let mut names = variable_names(tree);
    for name in definitions(tree) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    for id in tests {
        if let Some(trace) = report.tests.get(id) {
            for name in trace.variables.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
    }
    names
}

fn sequences_equal(a: &[&Value], b: &[&Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
}

/// Runs the four alignment passes over the failing tests of a pairing.
pub struct VariableAligner<'a> {
    reference: &'a TraceReport,
    buggy: &'a TraceReport,
    tests: &'a BTreeSet<TestId>,
    reference_names: Vec<String>,
    buggy_names: Vec<String>,
    map: VariableMap,
    used: BTreeSet<String>,
}

impl<'a> VariableAligner<'a> {
    pub fn new(
        reference_tree: &SyntaxTree,
        reference: &'a TraceReport,
        buggy_tree: &SyntaxTree,
        buggy: &'a TraceReport,
        tests: &'a BTreeSet<TestId>,
    ) -> Self {
        Self {
            reference_names: program_names(reference_tree, reference, tests),
            buggy_names: program_names(buggy_tree, buggy, tests),
            reference,
            buggy,
            tests,
            map: VariableMap::new(),
            used: BTreeSet::new(),
        }
    }

    fn can_map(&self, reference: &str, buggy: &str) -> bool {
        !self.map.contains_key(reference) && !self.used.contains(buggy)
    }

    fn assign(&mut self, reference: &str, buggy: &str) {
        self.map.insert(reference.to_string(), buggy.to_string());
        self.used.insert(buggy.to_string());
    }

    fn values<'r>(report: &'r TraceReport, id: TestId, var: &str) -> Option<Vec<&'r Value>> {
        let trace = report.tests.get(&id)?;
        trace.variables.contains_key(var).then(|| trace.values(var))
    }

    /// Equal value histories in every failing test where both are observed.
    fn equivalence_pass(&mut self, rng: &mut RepairRng) {
        for r in self.reference_names.clone() {
            let mut votes: Vec<(String, usize)> = Vec::new();
            for b in &self.buggy_names {
                if !self.can_map(&r, b) {
                    continue;
                }
                let mut equal = 0;
                let mut diverged = false;
                for &id in self.tests {
                    let (Some(rv), Some(bv)) = (
                        Self::values(self.reference, id, &r),
                        Self::values(self.buggy, id, b),
                    ) else {
                        continue;
                    };
                    if sequences_equal(&rv, &bv) {
                        equal += 1;
                    } else {
                        diverged = true;
                        break;
                    }
                }
                if !diverged && equal > 0 {
                    votes.push((b.clone(), equal));
                }
            }
            let best = votes.iter().map(|(_, v)| *v).max().unwrap_or(0);
            let leaders: Vec<String> = votes
                .into_iter()
                .filter(|(_, v)| *v == best)
                .map(|(b, _)| b)
                .collect();
            if let Some(b) = rng.choose(&leaders).cloned() {
                self.assign(&r, &b);
            }
        }
    }

    /// Longest common subsequence of value histories, summed over tests.
    fn subsequence_pass(&mut self, rng: &mut RepairRng) {
        for r in self.reference_names.clone() {
            if self.map.contains_key(&r) {
                continue;
            }
            let mut scores: Vec<(String, usize)> = Vec::new();
            for b in &self.buggy_names {
                if !self.can_map(&r, b) {
                    continue;
                }
                let score: usize = self
                    .tests
                    .iter()
                    .filter_map(|&id| {
                        let rv = Self::values(self.reference, id, &r)?;
                        let bv = Self::values(self.buggy, id, b)?;
                        Some(lcs_pairs(&rv, &bv, |x, y| x.equivalent(y)).len())
                    })
                    .sum();
                scores.push((b.clone(), score));
            }
            let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
            if best == 0 {
                continue;
            }
            let leaders: Vec<String> = scores
                .into_iter()
                .filter(|(_, s)| *s == best)
                .map(|(b, _)| b)
                .collect();
            if let Some(b) = rng.choose(&leaders).cloned() {
                self.assign(&r, &b);
            }
        }
    }

    fn first_type(&self, report: &TraceReport, var: &str) -> Option<&'static str> {
        self.tests.iter().find_map(|&id| {
            Self::values(report, id, var)?
                .first()
                .map(|value| value.type_name())
        })
    }

    /// Same runtime type of the first observed value.
    fn type_pass(&mut self) {
        for r in self.reference_names.clone() {
            if self.map.contains_key(&r) {
                continue;
            }
            let Some(r_type) = self.first_type(self.reference, &r) else {
                continue;
            };
            let found = self
                .buggy_names
                .iter()
                .find(|b| self.can_map(&r, b) && self.first_type(self.buggy, b) == Some(r_type))
                .cloned();
            if let Some(b) = found {
                self.assign(&r, &b);
            }
        }
    }

    /// Identity for shared and buggy-only names, then a permutation over the
    /// remaining names so every reference name is mapped injectively.
    fn residual_pass(&mut self) {
        for r in self.reference_names.clone() {
            if self.buggy_names.contains(&r) && self.can_map(&r, &r) {
                self.assign(&r, &r);
            }
        }
        for b in self.buggy_names.clone() {
            if !self.reference_names.contains(&b) && self.can_map(&b, &b) {
                self.assign(&b, &b);
            }
        }

        let mut universe: Vec<String> = self.reference_names.clone();
        for name in self.buggy_names.iter().chain(self.map.values()) {
            if !universe.contains(name) {
                universe.push(name.clone());
            }
        }
        let unmapped: Vec<String> = self
            .reference_names
            .iter()
            .filter(|r| !self.map.contains_key(*r))
            .cloned()
            .collect();
        let mut free: Vec<String> = universe
            .into_iter()
            .filter(|name| !self.used.contains(name))
            .collect();
        for r in unmapped {
            let target = match free.iter().position(|name| *name == r) {
                Some(index) => free.remove(index),
                None if !free.is_empty() => free.remove(0),
                None => continue,
            };
            self.assign(&r, &target);
        }
    }

    /// Run all passes and return the finished map.
    pub fn align(mut self, rng: &mut RepairRng) -> VariableMap {
        if !self.tests.is_empty() {
            self.equivalence_pass(rng);
            self.subsequence_pass(rng);
            self.type_pass();
        }
        self.residual_pass();
        log::debug!("Variable map: {:?}", self.map);
        self.map
    }
}

/// Whether no two reference names share a buggy name.
pub fn is_injective(map: &VariableMap) -> bool {
    let targets: BTreeSet<&String> = map.values().collect();
    targets.len() == map.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Observation, TestStatus, TestTrace};
    use crate::syntax::parse;
    use proptest::prelude::*;

    fn report(vars: &[(&str, &[i64])]) -> TraceReport {
        let mut trace = TestTrace {
            status: Some(TestStatus::Failure),
            ..Default::default()
        };
        for (name, values) in vars {
            trace.variables.insert(
                name.to_string(),
                values
                    .iter()
                    .map(|&v| Observation::new(Value::Int(v), 1))
                    .collect(),
            );
        }
        TraceReport {
            tests: BTreeMap::from([(1, trace)]),
        }
    }

    fn align(
        reference_src: &str,
        reference_vars: &[(&str, &[i64])],
        buggy_src: &str,
        buggy_vars: &[(&str, &[i64])],
    ) -> VariableMap {
        let reference_tree = parse(reference_src).unwrap();
        let buggy_tree = parse(buggy_src).unwrap();
        let reference = report(reference_vars);
        let buggy = report(buggy_vars);
        let tests = BTreeSet::from([1]);
        let mut rng = RepairRng::new(11);
        VariableAligner::new(&reference_tree, &reference, &buggy_tree, &buggy, &tests).align(&mut rng)
    }

    #[test]
    fn test_equivalent_histories_map() {
        let map = align(
            "total = 0\ni = 1\n",
            &[("total", &[0, 1, 3]), ("i", &[1, 2])],
            "s = 0\nk = 1\n",
            &[("s", &[0, 1, 3]), ("k", &[1, 2])],
        );
        assert_eq!(map["total"], "s");
        assert_eq!(map["i"], "k");
    }

    #[test]
    fn test_subsequence_fallback() {
        let map = align(
            "acc = 0\n",
            &[("acc", &[0, 1, 3, 6])],
            "out = 0\nflag = 0\n",
            &[("out", &[0, 1, 3, 5]), ("flag", &[9])],
        );
        assert_eq!(map["acc"], "out");
        assert_eq!(map["flag"], "flag");
    }

    #[test]
    fn test_residual_keeps_bijection() {
        // `b` is taken by reference `a`; reference `b` must land elsewhere.
        let map = align("a = 1\nb = 2\n", &[("a", &[5])], "b = 5\n", &[("b", &[5])]);
        assert_eq!(map["a"], "b");
        assert_ne!(map["b"], "b");
        assert!(is_injective(&map));
    }

    #[test]
    fn test_no_failing_tests() {
        let reference_tree = parse("x = 1\n").unwrap();
        let buggy_tree = parse("y = 1\n").unwrap();
        let empty = TraceReport::default();
        let tests = BTreeSet::new();
        let mut rng = RepairRng::new(0);
        let map = VariableAligner::new(&reference_tree, &empty, &buggy_tree, &empty, &tests)
            .align(&mut rng);
        assert_eq!(map["x"], "x");
        assert_eq!(map["y"], "y");
    }

    proptest! {
        #[test]
        fn variable_map_is_injective(
            reference in prop::collection::vec(prop::collection::vec(0i64..4, 1..4), 1..5),
            buggy in prop::collection::vec(prop::collection::vec(0i64..4, 1..4), 1..5),
            seed in 0u64..1000,
        ) {
            let names = ["a", "b", "c", "d", "e"];
            let reference_src: String = (0..reference.len()).map(|i| format!("{} = 0\n", names[i])).collect();
            let buggy_src: String = (0..buggy.len()).map(|i| format!("{} = 0\n", names[4 - i])).collect();
            let reference_vars: Vec<(&str, &[i64])> = reference.iter().enumerate().map(|(i, v)| (names[i], v.as_slice())).collect();
            let buggy_vars: Vec<(&str, &[i64])> = buggy.iter().enumerate().map(|(i, v)| (names[4 - i], v.as_slice())).collect();
            let reference_tree = parse(&reference_src).unwrap();
            let buggy_tree = parse(&buggy_src).unwrap();
            let reference_report = report(&reference_vars);
            let buggy_report = report(&buggy_vars);
            let tests = BTreeSet::from([1]);
            let mut rng = RepairRng::new(seed);
            let map = VariableAligner::new(&reference_tree, &reference_report, &buggy_tree, &buggy_report, &tests)
                .align(&mut rng);
            prop_assert!(is_injective(&map));
            for name in &names[..reference.len()] {
                prop_assert!(map.contains_key(*name));
            }
        }
    }
}
