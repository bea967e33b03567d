//! Fault localization: per-location suspiciousness scores.

use std::collections::{BTreeMap, BTreeSet};

use super::variables::VariableMap;
use crate::schema::{DivergenceWeights, Location, Observation, TraceReport, Value};

/// Location -> suspiciousness. Divergence maps are sparse: unflagged
/// locations are absent.
pub type Suspiciousness = BTreeMap<Location, f64>;

fn round1(score: f64) -> f64 {
    (score * 10.0).round() / 10.0
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator != 0.0).then(|| numerator / denominator)
}

/// Per-location counts of passing, failing and executing tests.
#[derive(Debug, Default)]
struct Spectrum {
    passed: BTreeMap<Location, usize>,
    failed: BTreeMap<Location, usize>,
    total_pass: usize,
    total_fail: usize,
}

impl Spectrum {
    fn new(report: &TraceReport) -> Self {
        let mut spectrum = Spectrum::default();
        for trace in report.tests.values() {
            let pass = trace.status().is_pass();
            if pass {
                spectrum.total_pass += 1;
            } else {
                spectrum.total_fail += 1;
            }
            let lines: BTreeSet<Location> = trace.locations.iter().copied().collect();
            for line in lines {
                let counts = if pass {
                    &mut spectrum.passed
                } else {
                    &mut spectrum.failed
                };
                *counts.entry(line).or_insert(0) += 1;
                if pass {
                    spectrum.failed.entry(line).or_insert(0);
                } else {
                    spectrum.passed.entry(line).or_insert(0);
                }
            }
        }
        spectrum
    }

    fn lines(&self) -> impl Iterator<Item = (Location, f64, f64)> + '_ {
        self.passed
            .iter()
            .map(|(&line, &pass)| (line, pass as f64, self.failed.get(&line).copied().unwrap_or(0) as f64))
    }
}

/// Tarantula over the buggy program's full test report.
pub fn tarantula(report: &TraceReport) -> Suspiciousness {
    let spectrum = Spectrum::new(report);
    let total_pass = spectrum.total_pass as f64;
    let total_fail = spectrum.total_fail as f64;
    spectrum
        .lines()
        .map(|(line, pass, fail)| {
            let score = match (ratio(fail, total_fail), ratio(pass, total_pass)) {
                (Some(f), Some(p)) => ratio(f, f + p).map(round1).unwrap_or(0.0),
                _ if fail > 0.0 && pass == 0.0 => 1.0,
                _ => 0.0,
            };
            (line, score)
        })
        .collect()
}

/// Jaccard over the buggy program's full test report.
pub fn jaccard(report: &TraceReport) -> Suspiciousness {
    let spectrum = Spectrum::new(report);
    let total_fail = spectrum.total_fail as f64;
    spectrum
        .lines()
        .map(|(line, pass, fail)| {
            let executed = pass + fail;
            let score = match ratio(fail, executed + (total_fail - fail)) {
                Some(score) => round1(score),
                None if fail > 0.0 && executed == 0.0 => 1.0,
                None => 0.0,
            };
            (line, score)
        })
        .collect()
}

/// Values of each variable grouped by the location that produced them.
fn values_by_location(
    variables: &BTreeMap<String, Vec<Observation>>,
) -> BTreeMap<Location, BTreeMap<&str, Vec<&Value>>> {
    let mut grouped: BTreeMap<Location, BTreeMap<&str, Vec<&Value>>> = BTreeMap::new();
    for (name, observations) in variables {
        for observation in observations {
            grouped
                .entry(observation.location)
                .or_default()
                .entry(name.as_str())
                .or_default()
                .push(&observation.value);
        }
    }
    grouped
}

fn same_values(a: &[&Value], b: &[&Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
}

/// Scores buggy locations by how their variable values diverge from the
/// reference run under the variable map.
///
/// Every execution step is scored, so a loop body is compared again on each
/// iteration. An unmatched value counts as a fault only when the buggy run
/// fails the test and the reference run passes it.
///
/// Returns an empty map when no test in `buggy` fails. Raw scores of every
/// executed location, zeros included, are rescaled into `[floor, ceiling]`;
/// when every raw score is equal they all land on the floor. Locations whose
/// raw score is zero are then dropped.
pub fn divergence(
    buggy: &TraceReport,
    reference: &TraceReport,
    map: &VariableMap,
    weights: &DivergenceWeights,
) -> Suspiciousness {
    if buggy.failed().is_empty() {
        return Suspiciousness::new();
    }
    let peers: BTreeMap<&str, &str> = map
        .iter()
        .map(|(refer, bug)| (bug.as_str(), refer.as_str()))
        .collect();

    let mut raw = Suspiciousness::new();
    for (&id, trace) in &buggy.tests {
        let buggy_failed = !trace.status().is_pass();
        let reference_trace = reference.tests.get(&id);
        let reference_passed = reference.status(id).is_pass();
        let buggy_values = values_by_location(&trace.variables);
        let mut reference_values = reference_trace
            .map(|t| values_by_location(&t.variables))
            .unwrap_or_default();

        for &line in &trace.locations {
            raw.entry(line).or_insert(0.0);
            let Some(observed) = buggy_values.get(&line) else {
                continue;
            };
            for (&var, values) in observed {
                let Some(&peer) = peers.get(var) else {
                    if buggy_failed {
                        *raw.entry(line).or_insert(0.0) += weights.fault;
                    }
                    continue;
                };
                if !reference_trace.is_some_and(|t| t.variables.contains_key(peer)) {
                    continue;
                }
                let matched = reference_values.values_mut().find_map(|by_var| {
                    by_var
                        .get(peer)
                        .is_some_and(|other| same_values(values, other))
                        .then(|| by_var.remove(peer))
                });
                if matched.is_some() {
                    if !buggy_failed && reference_passed {
                        *raw.entry(line).or_insert(0.0) += weights.corroboration;
                    }
                } else if buggy_failed && reference_passed {
                    *raw.entry(line).or_insert(0.0) += weights.fault;
                }
            }
        }
    }
    let flagged: BTreeSet<Location> = raw
        .iter()
        .filter(|&(_, &score)| score > 0.0)
        .map(|(&line, _)| line)
        .collect();
    let mut scores = rescale(raw, weights.floor, weights.ceiling);
    scores.retain(|line, _| flagged.contains(line));
    scores
}

/// Min-max scaling of every score into `[floor, ceiling]`. A zero span maps
/// everything to `floor`.
fn rescale(scores: Suspiciousness, floor: f64, ceiling: f64) -> Suspiciousness {
    let min = scores.values().copied().fold(f64::INFINITY, f64::min);
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    scores
        .into_iter()
        .map(|(line, score)| {
            let scaled = if span > 0.0 {
                floor + (score - min) / span * (ceiling - floor)
            } else {
                floor
            };
            (line, scaled)
        })
        .collect()
}

/// Locations by descending score; equal scores keep location order.
pub fn ranked(scores: &Suspiciousness) -> Vec<Location> {
    let mut lines: Vec<(Location, f64)> = scores.iter().map(|(&l, &s)| (l, s)).collect();
    lines.sort_by(|a, b| b.1.total_cmp(&a.1));
    lines.into_iter().map(|(line, _)| line).collect()
}

/// Locations scoring strictly above `threshold`.
pub fn above(scores: &Suspiciousness, threshold: f64) -> Vec<Location> {
    scores
        .iter()
        .filter(|&(_, &score)| score > threshold)
        .map(|(&line, _)| line)
        .collect()
}
