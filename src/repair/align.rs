//! Statement alignment along execution traces.
//!
//! Both programs' executed locations are reduced to the statements they
//! start, the statement-kind sequences are aligned with a longest common
//! subsequence, and the alignment yields replace, insert and delete
//! candidates for the buggy program.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::rng::RepairRng;
use crate::schema::{Location, TestId, TraceReport};
use crate::syntax::{NodeId, SyntaxTree};

/// Index pairs `(i, j)` of a longest common subsequence of `a` and `b`,
/// in descending order of `i`.
pub fn lcs_pairs<T>(a: &[T], b: &[T], eq: impl Fn(&T, &T) -> bool) -> Vec<(usize, usize)> {
    let (m, n) = (a.len(), b.len());
    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if eq(&a[i - 1], &b[j - 1]) {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(table[m][n]);
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if eq(&a[i - 1], &b[j - 1]) {
            pairs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] > table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    pairs
}

/// Where an inserted statement goes relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InsertPosition {
    /// Immediately after the anchor, in the same block.
    Sibling,
    /// As the first statement of the anchor's body.
    Child,
}

impl fmt::Display for InsertPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertPosition::Sibling => f.write_str("sibling"),
            InsertPosition::Child => f.write_str("child"),
        }
    }
}

/// Merged edit candidates keyed by buggy statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditCandidates {
    /// Buggy node -> reference node with the same statement kind.
    pub replace: BTreeMap<NodeId, NodeId>,
    /// Anchor buggy node -> (reference node to insert, position).
    pub insert: BTreeMap<NodeId, (NodeId, InsertPosition)>,
    /// Buggy nodes that may be deleted.
    pub delete: BTreeSet<NodeId>,
}

impl EditCandidates {
    pub fn is_empty(&self) -> bool {
        self.replace.is_empty() && self.insert.is_empty() && self.delete.is_empty()
    }

    /// Total number of candidate edits.
    pub fn len(&self) -> usize {
        self.replace.len() + self.insert.len() + self.delete.len()
    }
}

/// Majority vote per key across several maps; ties broken at random.
pub fn merge_by_vote<K, V>(rng: &mut RepairRng, maps: &[BTreeMap<K, V>]) -> BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Ord + Clone,
{
    let mut votes: BTreeMap<K, BTreeMap<V, usize>> = BTreeMap::new();
    for map in maps {
        for (key, value) in map {
            *votes
                .entry(key.clone())
                .or_default()
                .entry(value.clone())
                .or_insert(0) += 1;
        }
    }

    let mut merged = BTreeMap::new();
    for (key, counts) in votes {
        let best = counts.values().copied().max().unwrap_or(0);
        let leaders: Vec<V> = counts
            .into_iter()
            .filter(|&(_, count)| count == best)
            .map(|(value, _)| value)
            .collect();
        if let Some(value) = rng.choose(&leaders) {
            merged.insert(key, value.clone());
        }
    }
    merged
}

/// Aligns a buggy program's statements with a reference program's.
pub struct StatementAligner<'a> {
    buggy: &'a SyntaxTree,
    reference: &'a SyntaxTree,
}

impl<'a> StatementAligner<'a> {
    pub fn new(buggy: &'a SyntaxTree, reference: &'a SyntaxTree) -> Self {
        Self { buggy, reference }
    }

    /// Distinct statements reached by a trace, in first-execution order.
    fn trace_nodes(tree: &SyntaxTree, locations: &[Location]) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        locations
            .iter()
            .filter_map(|&location| tree.node_at(location))
            .filter(|&id| seen.insert(id))
            .collect()
    }

    /// Same-kind statements matched by an LCS over the reversed traces.
    fn replace_map(&self, buggy: &[NodeId], reference: &[NodeId]) -> BTreeMap<NodeId, NodeId> {
        let buggy_rev: Vec<NodeId> = buggy.iter().rev().copied().collect();
        let reference_rev: Vec<NodeId> = reference.iter().rev().copied().collect();
        lcs_pairs(&buggy_rev, &reference_rev, |&a, &b| {
            self.buggy.kind(a) == self.reference.kind(b)
        })
        .into_iter()
        .map(|(i, j)| (buggy_rev[i], reference_rev[j]))
        .collect()
    }

    /// Reference statements left unmatched, anchored after (or inside) the
    /// buggy counterpart of the nearest earlier matched reference statement.
    fn insert_map(
        &self,
        rng: &mut RepairRng,
        replace: &BTreeMap<NodeId, NodeId>,
        reference: &[NodeId],
    ) -> BTreeMap<NodeId, (NodeId, InsertPosition)> {
        let counterpart: BTreeMap<NodeId, NodeId> =
            replace.iter().map(|(&bug, &refer)| (refer, bug)).collect();
        let mut candidates: BTreeMap<NodeId, Vec<(NodeId, InsertPosition)>> = BTreeMap::new();

        for (i, &node) in reference.iter().enumerate() {
            if counterpart.contains_key(&node) {
                continue;
            }
            let anchor = reference[..i]
                .iter()
                .rev()
                .find_map(|before| counterpart.get(before).map(|&bug| (*before, bug)));
            if let Some((before, bug)) = anchor {
                let position = if self.reference.is_descendant(before, node) {
                    InsertPosition::Child
                } else {
                    InsertPosition::Sibling
                };
                candidates.entry(bug).or_default().push((node, position));
            }
        }

        candidates
            .into_iter()
            .filter_map(|(bug, options)| rng.choose(&options).map(|&choice| (bug, choice)))
            .collect()
    }

    /// Every reached buggy statement except function definitions.
    fn delete_set(&self, buggy: &[NodeId]) -> BTreeSet<NodeId> {
        buggy
            .iter()
            .copied()
            .filter(|&id| !self.buggy.kind(id).is_function())
            .collect()
    }

    /// Candidates from one pair of traces.
    pub fn align_trace(
        &self,
        rng: &mut RepairRng,
        buggy_trace: &[Location],
        reference_trace: &[Location],
    ) -> EditCandidates {
        let buggy = Self::trace_nodes(self.buggy, buggy_trace);
        let reference = Self::trace_nodes(self.reference, reference_trace);
        let replace = self.replace_map(&buggy, &reference);
        let insert = self.insert_map(rng, &replace, &reference);
        EditCandidates {
            delete: self.delete_set(&buggy),
            replace,
            insert,
        }
    }

    /// Candidates for the given tests, merged by majority vote.
    pub fn align(
        &self,
        rng: &mut RepairRng,
        buggy: &TraceReport,
        reference: &TraceReport,
        tests: &BTreeSet<TestId>,
    ) -> EditCandidates {
        let mut replaces = Vec::new();
        let mut inserts = Vec::new();
        let mut deletes = Vec::new();
        for &id in tests {
            let candidates = self.align_trace(rng, buggy.locations(id), reference.locations(id));
            replaces.push(candidates.replace);
            inserts.push(candidates.insert);
            deletes.push(
                candidates
                    .delete
                    .into_iter()
                    .map(|node| (node, ()))
                    .collect::<BTreeMap<_, _>>(),
            );
        }
        EditCandidates {
            replace: merge_by_vote(rng, &replaces),
            insert: merge_by_vote(rng, &inserts),
            delete: merge_by_vote(rng, &deletes).into_keys().collect(),
        }
    }

    /// Matched statements over the longer raw trace length; 0 for two empty
    /// traces.
    pub fn trace_similarity(&self, buggy_trace: &[Location], reference_trace: &[Location]) -> f64 {
        let longest = buggy_trace.len().max(reference_trace.len());
        if longest == 0 {
            return 0.0;
        }
        let buggy = Self::trace_nodes(self.buggy, buggy_trace);
        let reference = Self::trace_nodes(self.reference, reference_trace);
        self.replace_map(&buggy, &reference).len() as f64 / longest as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    #[test]
    fn test_lcs_pairs() {
        let a = ['a', 'b', 'c', 'd'];
        let b = ['b', 'x', 'd'];
        assert_eq!(lcs_pairs(&a, &b, |x, y| x == y), vec![(3, 2), (1, 0)]);
        assert!(lcs_pairs::<char>(&[], &b, |x, y| x == y).is_empty());
    }

    #[test]
    fn test_replace_and_delete() {
        let buggy = parse("a = 1\nb = 2\nprint(a - b)\n").unwrap();
        let reference = parse("a = 1\nb = 2\nprint(a + b)\n").unwrap();
        let aligner = StatementAligner::new(&buggy, &reference);
        let mut rng = RepairRng::new(0);
        let candidates = aligner.align_trace(&mut rng, &[1, 2, 3], &[1, 2, 3]);
        assert_eq!(candidates.replace.len(), 3);
        assert_eq!(candidates.replace[&buggy.node_at(3).unwrap()], reference.node_at(3).unwrap());
        assert!(candidates.insert.is_empty());
        assert_eq!(candidates.delete.len(), 3);
    }

    #[test]
    fn test_insert_positions() {
        let buggy = parse("n = 3\nfor i in range(n):\n    print(i)\n").unwrap();
        let reference =
            parse("n = 3\nfor i in range(n):\n    i += 1\n    print(i)\ntotal = 0\n").unwrap();
        let aligner = StatementAligner::new(&buggy, &reference);
        let mut rng = RepairRng::new(0);
        let candidates = aligner.align_trace(&mut rng, &[1, 2, 3], &[1, 2, 3, 4, 5]);
        // `i += 1` has no counterpart and follows the loop header it lives in.
        let looped = buggy.node_at(2).unwrap();
        assert_eq!(
            candidates.insert.get(&looped),
            Some(&(reference.node_at(3).unwrap(), InsertPosition::Child))
        );
        // `total = 0` follows the matched print statement.
        let printed = buggy.node_at(3).unwrap();
        assert_eq!(
            candidates.insert.get(&printed),
            Some(&(reference.node_at(5).unwrap(), InsertPosition::Sibling))
        );
    }

    #[test]
    fn test_merge_by_vote_majority() {
        let mut rng = RepairRng::new(5);
        let maps = vec![
            BTreeMap::from([(1, 'a'), (2, 'x')]),
            BTreeMap::from([(1, 'a')]),
            BTreeMap::from([(1, 'b')]),
        ];
        let merged = merge_by_vote(&mut rng, &maps);
        assert_eq!(merged[&1], 'a');
        assert_eq!(merged[&2], 'x');
    }

    #[test]
    fn test_trace_similarity() {
        let program = parse("a = 1\nb = 2\n").unwrap();
        let aligner = StatementAligner::new(&program, &program);
        assert_eq!(aligner.trace_similarity(&[1, 2], &[1, 2]), 1.0);
        assert_eq!(aligner.trace_similarity(&[], &[]), 0.0);
        assert_eq!(aligner.trace_similarity(&[1, 2], &[]), 0.0);
    }
}
