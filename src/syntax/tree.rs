//! Arena-backed statement tree.
//!
//! Nodes are addressed by [`NodeId`]. Structural edits go through methods on
//! [`SyntaxTree`] and are followed by [`SyntaxTree::reindex`], which rebuilds
//! the parent table and the location index from the root.

use std::collections::BTreeMap;
use std::fmt;

use crate::schema::Location;

/// Stable index of a node inside one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Statement node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StmtKind {
    Module,
    FunctionDef,
    AsyncFunctionDef,
    ClassDef,
    Return,
    Delete,
    Assign,
    AugAssign,
    AnnAssign,
    For,
    AsyncFor,
    While,
    If,
    With,
    AsyncWith,
    Raise,
    Try,
    ExceptHandler,
    Match,
    MatchCase,
    Assert,
    Import,
    ImportFrom,
    Global,
    Nonlocal,
    Expr,
    Pass,
    Break,
    Continue,
}

impl StmtKind {
    /// Type label used when aligning statement sequences.
    pub fn label(self) -> &'static str {
        match self {
            StmtKind::Module => "Module",
            StmtKind::FunctionDef => "FunctionDef",
            StmtKind::AsyncFunctionDef => "AsyncFunctionDef",
            StmtKind::ClassDef => "ClassDef",
            StmtKind::Return => "Return",
            StmtKind::Delete => "Delete",
            StmtKind::Assign => "Assign",
            StmtKind::AugAssign => "AugAssign",
            StmtKind::AnnAssign => "AnnAssign",
            StmtKind::For => "For",
            StmtKind::AsyncFor => "AsyncFor",
            StmtKind::While => "While",
            StmtKind::If => "If",
            StmtKind::With => "With",
            StmtKind::AsyncWith => "AsyncWith",
            StmtKind::Raise => "Raise",
            StmtKind::Try => "Try",
            StmtKind::ExceptHandler => "ExceptHandler",
            StmtKind::Match => "Match",
            StmtKind::MatchCase => "MatchCase",
            StmtKind::Assert => "Assert",
            StmtKind::Import => "Import",
            StmtKind::ImportFrom => "ImportFrom",
            StmtKind::Global => "Global",
            StmtKind::Nonlocal => "Nonlocal",
            StmtKind::Expr => "Expr",
            StmtKind::Pass => "Pass",
            StmtKind::Break => "Break",
            StmtKind::Continue => "Continue",
        }
    }

    /// Kinds whose header ends in a colon followed by a body block.
    pub fn is_compound(self) -> bool {
        matches!(
            self,
            StmtKind::Module
                | StmtKind::FunctionDef
                | StmtKind::AsyncFunctionDef
                | StmtKind::ClassDef
                | StmtKind::For
                | StmtKind::AsyncFor
                | StmtKind::While
                | StmtKind::If
                | StmtKind::With
                | StmtKind::AsyncWith
                | StmtKind::Try
                | StmtKind::ExceptHandler
                | StmtKind::Match
                | StmtKind::MatchCase
        )
    }

    /// `except` and `case` clauses: held in their owner's handler block and
    /// never statements in their own right.
    pub fn is_clause(self) -> bool {
        matches!(self, StmtKind::ExceptHandler | StmtKind::MatchCase)
    }

    pub fn is_loop(self) -> bool {
        matches!(self, StmtKind::For | StmtKind::AsyncFor | StmtKind::While)
    }

    /// Function or method definitions.
    pub fn is_function(self) -> bool {
        matches!(self, StmtKind::FunctionDef | StmtKind::AsyncFunctionDef)
    }

    /// Kinds that introduce a name (functions and classes).
    pub fn is_definition(self) -> bool {
        self.is_function() || self == StmtKind::ClassDef
    }

    /// Kinds that can carry an `else` block.
    pub fn has_orelse(self) -> bool {
        matches!(
            self,
            StmtKind::If | StmtKind::For | StmtKind::AsyncFor | StmtKind::While | StmtKind::Try
        )
    }
}

impl fmt::Display for StmtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Block-bearing field of a compound node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    Body,
    Handlers,
    OrElse,
    FinalBody,
}

/// One statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: StmtKind,
    /// Canonical header text without the trailing colon
    /// (`x = 1`, `for i in range(n)`, `except ValueError as e`).
    pub header: String,
    /// Canonical decorator lines, including the leading `@`.
    pub decorators: Vec<String>,
    /// Starting line in the source this node was parsed from.
    pub location: Option<Location>,
    pub body: Vec<NodeId>,
    pub handlers: Vec<NodeId>,
    pub orelse: Vec<NodeId>,
    pub finalbody: Vec<NodeId>,
}

impl Node {
    pub fn new(kind: StmtKind, header: impl Into<String>) -> Self {
        Self {
            kind,
            header: header.into(),
            decorators: Vec::new(),
            location: None,
            body: Vec::new(),
            handlers: Vec::new(),
            orelse: Vec::new(),
            finalbody: Vec::new(),
        }
    }

    pub fn block(&self, block: Block) -> &[NodeId] {
        match block {
            Block::Body => &self.body,
            Block::Handlers => &self.handlers,
            Block::OrElse => &self.orelse,
            Block::FinalBody => &self.finalbody,
        }
    }

    pub fn block_mut(&mut self, block: Block) -> &mut Vec<NodeId> {
        match block {
            Block::Body => &mut self.body,
            Block::Handlers => &mut self.handlers,
            Block::OrElse => &mut self.orelse,
            Block::FinalBody => &mut self.finalbody,
        }
    }
}

const BLOCKS: [Block; 4] = [Block::Body, Block::Handlers, Block::OrElse, Block::FinalBody];

/// A parsed program: node arena, root, parent table, and location index.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    root: NodeId,
    parents: Vec<Option<(NodeId, Block)>>,
    by_location: BTreeMap<Location, NodeId>,
}

impl SyntaxTree {
    /// Tree holding only an empty module.
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: vec![Node::new(StmtKind::Module, "")],
            root: NodeId(0),
            parents: Vec::new(),
            by_location: BTreeMap::new(),
        };
        tree.reindex();
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutable node access; call [`Self::reindex`] after changing blocks.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> StmtKind {
        self.nodes[id.0].kind
    }

    /// Add a detached node to the arena.
    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Statement node starting at a source line.
    pub fn node_at(&self, location: Location) -> Option<NodeId> {
        self.by_location.get(&location).copied()
    }

    /// All indexed locations with their nodes.
    pub fn locations(&self) -> &BTreeMap<Location, NodeId> {
        &self.by_location
    }

    /// Parent node and the block holding `id`; `None` for the root and for
    /// nodes no longer attached.
    pub fn parent(&self, id: NodeId) -> Option<(NodeId, Block)> {
        self.parents.get(id.0).copied().flatten()
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.parent(id).is_some()
    }

    /// Structural children across all block fields, in source order.
    /// Handler nodes contribute their own bodies.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let mut out = node.body.clone();
        for &handler in &node.handlers {
            out.extend(self.node(handler).body.iter().copied());
        }
        out.extend(node.orelse.iter().copied());
        out.extend(node.finalbody.iter().copied());
        out
    }

    /// Preorder walk over every attached node below `id`, including `id`.
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            let node = self.node(next);
            for block in BLOCKS.iter().rev() {
                stack.extend(node.block(*block).iter().rev().copied());
            }
        }
        out
    }

    /// Attached statement nodes in preorder, excluding the module and clauses.
    pub fn statements(&self) -> Vec<NodeId> {
        self.walk(self.root)
            .into_iter()
            .filter(|&id| {
                let kind = self.kind(id);
                kind != StmtKind::Module && !kind.is_clause()
            })
            .collect()
    }

    /// Whether `node` lies strictly below `ancestor`.
    pub fn is_descendant(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = node;
        while let Some((parent, _)) = self.parent(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Rebuild the parent table and the location index from the root.
    ///
    /// When several statements share a line, the one visited last in
    /// preorder owns the location.
    pub fn reindex(&mut self) {
        self.parents = vec![None; self.nodes.len()];
        self.by_location.clear();
        for id in self.walk(self.root) {
            let node = &self.nodes[id.0];
            for block in BLOCKS {
                for &child in node.block(block) {
                    self.parents[child.0] = Some((id, block));
                }
            }
            if let Some(location) = node.location
                && node.kind != StmtKind::Module
                && !node.kind.is_clause()
            {
                self.by_location.insert(location, id);
            }
        }
    }

    /// Deep-copy the subtree rooted at `id` in `other` into this arena.
    /// The copy is detached and carries no locations.
    pub fn graft(&mut self, other: &SyntaxTree, id: NodeId) -> NodeId {
        let source = other.node(id);
        let mut node = Node {
            kind: source.kind,
            header: source.header.clone(),
            decorators: source.decorators.clone(),
            location: None,
            body: Vec::new(),
            handlers: Vec::new(),
            orelse: Vec::new(),
            finalbody: Vec::new(),
        };
        for block in BLOCKS {
            let copied: Vec<NodeId> = other
                .node(id)
                .block(block)
                .iter()
                .map(|&child| self.graft(other, child))
                .collect();
            *node.block_mut(block) = copied;
        }
        self.add(node)
    }

    /// Position of an attached node inside its parent block.
    pub fn position(&self, id: NodeId) -> Option<(NodeId, Block, usize)> {
        let (parent, block) = self.parent(id)?;
        let index = self
            .node(parent)
            .block(block)
            .iter()
            .position(|&c| c == id)?;
        Some((parent, block, index))
    }

    /// Replace an attached node by `new` in its parent block.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> bool {
        let Some((parent, block, index)) = self.position(old) else {
            return false;
        };
        self.nodes[parent.0].block_mut(block)[index] = new;
        self.reindex();
        true
    }

    /// Insert `new` into `parent`'s block at `index`.
    pub fn insert(&mut self, parent: NodeId, block: Block, index: usize, new: NodeId) {
        let children = self.nodes[parent.0].block_mut(block);
        let index = index.min(children.len());
        children.insert(index, new);
        self.reindex();
    }

    /// Replace an attached node by a sequence of nodes.
    pub fn splice(&mut self, old: NodeId, replacement: Vec<NodeId>) -> bool {
        let Some((parent, block, index)) = self.position(old) else {
            return false;
        };
        self.nodes[parent.0]
            .block_mut(block)
            .splice(index..=index, replacement);
        self.reindex();
        true
    }
}

impl Default for SyntaxTree {
    fn default() -> Self {
        Self::new()
    }
}
