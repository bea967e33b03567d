//! Patch synthesis: one crossover edit plus one suspiciousness-weighted
//! mutation edit applied to a copy of the buggy tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::RepairError;
use super::align::{EditCandidates, InsertPosition};
use super::localize::Suspiciousness;
use super::rng::RepairRng;
use crate::schema::Location;
use crate::syntax::{Block, Node, NodeId, StmtKind, SyntaxTree, normalize};

/// Operation committed on one buggy node. Operands are reference nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// Replace the whole node by the reference subtree.
    Cut(NodeId),
    /// Take the reference header, keep the buggy blocks.
    Replace(NodeId),
    /// Insert a collapsed copy of the reference node.
    Insert(NodeId, InsertPosition),
    /// Remove the node, splicing its blocks into the parent.
    Delete,
}

/// At most one edit per buggy node.
pub type EditMap = BTreeMap<NodeId, Edit>;

/// Previously produced (parent, child) text pairs.
#[derive(Debug, Clone, Default)]
pub struct FixHistory {
    seen: BTreeSet<(String, String)>,
}

impl FixHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, parent: &str, child: &str) -> bool {
        self.seen.contains(&(parent.to_string(), child.to_string()))
    }

    /// Returns false if the pair was already present.
    pub fn record(&mut self, parent: &str, child: &str) -> bool {
        self.seen.insert((parent.to_string(), child.to_string()))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// A synthesized child program with the edits that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Normalized source of the child.
    pub source: String,
    pub crossover: Option<String>,
    pub mutation: Option<String>,
}

impl Patch {
    /// Whether no edit was applied.
    pub fn is_unchanged(&self) -> bool {
        self.crossover.is_none() && self.mutation.is_none()
    }
}

struct Described<'a> {
    buggy: &'a SyntaxTree,
    reference: &'a SyntaxTree,
    node: NodeId,
    edit: Edit,
}

impl fmt::Display for Described<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self
            .buggy
            .node(self.node)
            .location
            .map_or_else(|| "?".to_string(), |l| l.to_string());
        match self.edit {
            Edit::Cut(target) => write!(f, "cut line {line} <- `{}`", self.header(target)),
            Edit::Replace(target) => {
                write!(f, "replace line {line} <- `{}`", self.header(target))
            }
            Edit::Insert(target, position) => {
                write!(f, "insert {position} of line {line} <- `{}`", self.header(target))
            }
            Edit::Delete => write!(f, "delete line {line}"),
        }
    }
}

impl Described<'_> {
    fn header(&self, id: NodeId) -> &str {
        &self.reference.node(id).header
    }
}

/// Copy of a reference node whose blocks are reduced to a placeholder.
fn collapsed(tree: &mut SyntaxTree, source: &Node) -> NodeId {
    let mut node = Node::new(source.kind, source.header.clone());
    node.decorators = source.decorators.clone();
    if source.kind.is_compound() {
        let filler = if source.kind.is_loop() {
            Node::new(StmtKind::Break, "break")
        } else {
            Node::new(StmtKind::Pass, "pass")
        };
        node.body = vec![tree.add(filler)];
        if source.kind == StmtKind::Match {
            let mut case = Node::new(StmtKind::MatchCase, "case _");
            case.body = std::mem::take(&mut node.body);
            node.handlers = vec![tree.add(case)];
        }
        if source.kind == StmtKind::Try {
            let pass = tree.add(Node::new(StmtKind::Pass, "pass"));
            let mut handler = Node::new(StmtKind::ExceptHandler, "except");
            handler.body = vec![pass];
            node.handlers = vec![tree.add(handler)];
        }
    }
    tree.add(node)
}

/// Applies alignment candidates to a buggy tree.
pub struct PatchSynthesizer<'a> {
    buggy: &'a SyntaxTree,
    reference: &'a SyntaxTree,
    parent: String,
}

impl<'a> PatchSynthesizer<'a> {
    /// `reference` should already be renamed into the buggy program's
    /// variable names.
    pub fn new(buggy: &'a SyntaxTree, reference: &'a SyntaxTree) -> Self {
        Self {
            parent: buggy.to_source(),
            buggy,
            reference,
        }
    }

    fn crossover(&self, rng: &mut RepairRng, candidates: &EditCandidates) -> Option<(NodeId, Edit)> {
        let pairs: Vec<(NodeId, NodeId)> = candidates.replace.iter().map(|(&b, &r)| (b, r)).collect();
        rng.choose(&pairs).map(|&(node, target)| (node, Edit::Cut(target)))
    }

    fn options(candidates: &EditCandidates, node: NodeId) -> Vec<Edit> {
        let mut options = Vec::with_capacity(3);
        if let Some(&target) = candidates.replace.get(&node) {
            options.push(Edit::Replace(target));
        }
        if let Some(&(target, position)) = candidates.insert.get(&node) {
            options.push(Edit::Insert(target, position));
        }
        if candidates.delete.contains(&node) {
            options.push(Edit::Delete);
        }
        options
    }

    /// Draws locations by suspiciousness until one has candidates.
    fn mutation(
        &self,
        rng: &mut RepairRng,
        candidates: &EditCandidates,
        scores: &Suspiciousness,
    ) -> Option<(NodeId, Edit)> {
        let mut pool: Vec<(Location, f64)> = scores.iter().map(|(&l, &s)| (l, s)).collect();
        while let Some(line) = rng.roulette(&pool) {
            if let Some(node) = self.buggy.node_at(line) {
                let options = Self::options(candidates, node);
                if let Some(&edit) = rng.choose(&options) {
                    return Some((node, edit));
                }
            }
            pool.retain(|&(l, _)| l != line);
        }
        None
    }

    /// Apply `edits` in preorder to a copy of the buggy tree and normalize.
    pub fn apply(&self, edits: &EditMap) -> Result<String, RepairError> {
        let mut tree = self.buggy.clone();
        let order: Vec<NodeId> = self
            .buggy
            .walk(self.buggy.root())
            .into_iter()
            .filter(|id| edits.contains_key(id))
            .collect();

        for node in order {
            // An earlier cut may have replaced an ancestor.
            if !tree.is_attached(node) {
                continue;
            }
            match edits[&node] {
                Edit::Cut(target) => {
                    let copy = tree.graft(self.reference, target);
                    tree.replace(node, copy);
                }
                Edit::Replace(target) => {
                    let source = self.reference.node(target);
                    let patched = tree.node_mut(node);
                    patched.kind = source.kind;
                    patched.header = source.header.clone();
                    patched.decorators = source.decorators.clone();
                }
                Edit::Insert(target, position) => {
                    let copy = collapsed(&mut tree, self.reference.node(target));
                    if position == InsertPosition::Child && tree.kind(node).is_compound() {
                        // A match subject holds no statements; its first case does.
                        let owner = match tree.node(node).handlers.first() {
                            Some(&case) if tree.kind(node) == StmtKind::Match => case,
                            _ => node,
                        };
                        tree.insert(owner, Block::Body, 0, copy);
                    } else if let Some((parent, block, index)) = tree.position(node) {
                        tree.insert(parent, block, index + 1, copy);
                    }
                }
                Edit::Delete => {
                    let children = tree.children(node);
                    tree.splice(node, children);
                }
            }
        }

        normalize(&tree.to_source())
            .map_err(|e| RepairError::Synthesis(format!("patched program does not reparse: {e}")))
    }

    fn describe(&self, node: NodeId, edit: Edit) -> String {
        Described {
            buggy: self.buggy,
            reference: self.reference,
            node,
            edit,
        }
        .to_string()
    }

    /// Produce a child not already in `history`, or the buggy program itself
    /// once every candidate edit is exhausted.
    pub fn synthesize(
        &self,
        rng: &mut RepairRng,
        mut candidates: EditCandidates,
        mut scores: Suspiciousness,
        history: &mut FixHistory,
    ) -> Result<Patch, RepairError> {
        loop {
            let cut = self.crossover(rng, &candidates);
            let mutation = self.mutation(rng, &candidates, &scores);

            let mut edits = EditMap::new();
            if let Some((node, edit)) = cut {
                edits.insert(node, edit);
            }
            if let Some((node, edit)) = mutation {
                edits.insert(node, edit);
            }
            if edits.is_empty() {
                return Ok(Patch {
                    source: self.parent.clone(),
                    crossover: None,
                    mutation: None,
                });
            }

            let child = self.apply(&edits)?;
            if !history.record(&self.parent, &child) {
                log::debug!("Fix already produced, dropping {} edit(s)", edits.len());
                for (node, edit) in [cut, mutation].into_iter().flatten() {
                    match edit {
                        Edit::Cut(_) | Edit::Replace(_) => {
                            candidates.replace.remove(&node);
                        }
                        Edit::Insert(..) => {
                            candidates.insert.remove(&node);
                        }
                        Edit::Delete => {
                            candidates.delete.remove(&node);
                        }
                    }
                    if let Some(line) = self.buggy.node(node).location {
                        scores.remove(&line);
                    }
                }
                continue;
            }

            let committed = |choice: Option<(NodeId, Edit)>| {
                choice
                    .filter(|(node, edit)| edits.get(node) == Some(edit))
                    .map(|(node, edit)| self.describe(node, edit))
            };
            return Ok(Patch {
                source: child,
                crossover: committed(cut),
                mutation: committed(mutation),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn trees(buggy: &str, reference: &str) -> (SyntaxTree, SyntaxTree) {
        (parse(buggy).unwrap(), parse(reference).unwrap())
    }

    #[test]
    fn test_cut_takes_whole_subtree() {
        let (buggy, reference) = trees(
            "for i in range(3):\n    print(i)\n",
            "for i in range(4):\n    total = i\n    print(total)\n",
        );
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let edits = EditMap::from([(buggy.node_at(1).unwrap(), Edit::Cut(reference.node_at(1).unwrap()))]);
        assert_eq!(
            synth.apply(&edits).unwrap(),
            "for i in range(4):\n    total = i\n    print(total)\n"
        );
    }

    #[test]
    fn test_replace_keeps_body() {
        let (buggy, reference) = trees("while i < n:\n    i += 2\n", "while i <= n:\n    i += 1\n");
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let edits = EditMap::from([(buggy.node_at(1).unwrap(), Edit::Replace(reference.node_at(1).unwrap()))]);
        assert_eq!(synth.apply(&edits).unwrap(), "while i <= n:\n    i += 2\n");
    }

    #[test]
    fn test_insert_collapses_blocks() {
        let (buggy, reference) = trees(
            "n = 3\nprint(n)\n",
            "n = 3\nfor i in range(n):\n    print(i)\n    n -= 1\n",
        );
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let loop_node = reference.node_at(2).unwrap();
        let anchor = buggy.node_at(1).unwrap();
        let sibling = EditMap::from([(anchor, Edit::Insert(loop_node, InsertPosition::Sibling))]);
        assert_eq!(
            synth.apply(&sibling).unwrap(),
            "n = 3\nfor i in range(n):\n    break\nprint(n)\n"
        );
        // A simple anchor cannot hold children; the insert lands after it.
        let child = EditMap::from([(anchor, Edit::Insert(loop_node, InsertPosition::Child))]);
        assert_eq!(synth.apply(&child).unwrap(), synth.apply(&sibling).unwrap());
    }

    #[test]
    fn test_insert_child_and_try_placeholder() {
        let (buggy, reference) = trees(
            "if x:\n    y = 1\n",
            "try:\n    y = int(x)\nexcept ValueError:\n    y = 0\n",
        );
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let edits = EditMap::from([(
            buggy.node_at(1).unwrap(),
            Edit::Insert(reference.node_at(1).unwrap(), InsertPosition::Child),
        )]);
        assert_eq!(
            synth.apply(&edits).unwrap(),
            "if x:\n    try:\n        pass\n    except:\n        pass\n    y = 1\n"
        );
    }

    #[test]
    fn test_edits_inside_match_cases() {
        let (buggy, reference) = trees(
            "match x:\n    case 1:\n        y = 1\n",
            "z = 0\nmatch x:\n    case 2:\n        y = 2\n",
        );
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let matched = buggy.node_at(1).unwrap();
        let child = EditMap::from([(matched, Edit::Insert(reference.node_at(1).unwrap(), InsertPosition::Child))]);
        assert_eq!(
            synth.apply(&child).unwrap(),
            "match x:\n    case 1:\n        z = 0\n        y = 1\n"
        );
        let sibling = EditMap::from([(
            buggy.node_at(3).unwrap(),
            Edit::Insert(reference.node_at(2).unwrap(), InsertPosition::Sibling),
        )]);
        assert_eq!(
            synth.apply(&sibling).unwrap(),
            "match x:\n    case 1:\n        y = 1\n        match x:\n            case _:\n                pass\n"
        );
        let delete = EditMap::from([(matched, Edit::Delete)]);
        assert_eq!(synth.apply(&delete).unwrap(), "y = 1\n");
    }

    #[test]
    fn test_delete_splices_blocks() {
        let (buggy, reference) = trees("if x:\n    a = 1\n    b = 2\nc = 3\n", "c = 3\n");
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let edits = EditMap::from([(buggy.node_at(1).unwrap(), Edit::Delete)]);
        assert_eq!(synth.apply(&edits).unwrap(), "a = 1\nb = 2\nc = 3\n");
    }

    #[test]
    fn test_mutation_wins_on_shared_node() {
        let (buggy, reference) = trees("x = 1\n", "x = 2\n");
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let node = buggy.node_at(1).unwrap();
        let candidates = EditCandidates {
            replace: BTreeMap::from([(node, reference.node_at(1).unwrap())]),
            insert: BTreeMap::new(),
            delete: BTreeSet::from([node]),
        };
        let scores = Suspiciousness::from([(1, 1.0)]);
        let mut history = FixHistory::new();
        let mut rng = RepairRng::new(4);
        let patch = synth.synthesize(&mut rng, candidates, scores, &mut history).unwrap();
        assert!(patch.mutation.is_some());
        assert!(patch.crossover.is_none());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_no_candidates_returns_buggy() {
        let (buggy, reference) = trees("x = 1\n", "y = 2\n");
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let mut rng = RepairRng::new(0);
        let mut history = FixHistory::new();
        let patch = synth
            .synthesize(&mut rng, EditCandidates::default(), Suspiciousness::new(), &mut history)
            .unwrap();
        assert_eq!(patch.source, "x = 1\n");
        assert!(patch.is_unchanged());
        assert!(history.is_empty());
    }

    #[test]
    fn test_history_matches_exact_text_pairs() {
        let mut history = FixHistory::new();
        assert!(history.record("x = 1\n", "x = 2\n"));
        assert!(!history.record("x = 1\n", "x = 2\n"));
        assert!(history.contains("x = 1\n", "x = 2\n"));
        assert!(!history.contains("x = 1\nx = 2\n", ""));
        assert!(!history.contains("x = 2\n", "x = 1\n"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_history_forces_new_children_then_exhausts() {
        let (buggy, reference) = trees("a = 1\nb = 2\nc = 3\n", "a = 5\nb = 6\nc = 7\n");
        let synth = PatchSynthesizer::new(&buggy, &reference);
        let candidates = EditCandidates {
            replace: buggy
                .statements()
                .into_iter()
                .zip(reference.statements())
                .collect(),
            ..Default::default()
        };
        let scores = Suspiciousness::from([(1, 1.0), (2, 0.5), (3, 0.3)]);
        let mut history = FixHistory::new();
        let mut rng = RepairRng::new(9);

        let mut children = BTreeSet::new();
        for _ in 0..10 {
            let patch = synth
                .synthesize(&mut rng, candidates.clone(), scores.clone(), &mut history)
                .unwrap();
            if patch.is_unchanged() {
                break;
            }
            assert!(children.insert(patch.source), "child produced twice");
        }
        // Every call terminates and never repeats a recorded pair.
        assert_eq!(children.len(), history.len());
        assert!(!children.is_empty());
    }
}
