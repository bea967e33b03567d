//! Syntax module - Statement trees for indentation-structured subject programs.
//!
//! Source is parsed into an arena of statement nodes keyed by their starting
//! line, printed back in a canonical layout, and analysed for the variable and
//! definition names that alignment works with.

mod lexer;
mod names;
mod parser;
mod printer;
mod tree;

pub use lexer::{Token, TokenKind, tokenize};
pub use names::{declared_name, definitions, is_builtin, is_keyword, rename, variable_names};
pub use parser::parse;
pub use printer::join_tokens;
pub use tree::{Block, Node, NodeId, StmtKind, SyntaxTree};

/// Source that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Parse error at line {line}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl SyntaxTree {
    /// Render the tree in canonical layout.
    pub fn to_source(&self) -> String {
        printer::print_tree(self)
    }

    /// Detach expression statements made only of string literals.
    pub fn strip_string_statements(&mut self) {
        let attached = self.walk(self.root());
        let mut changed = false;
        for id in attached {
            for block in [Block::Body, Block::OrElse, Block::FinalBody] {
                let keep: Vec<NodeId> = self
                    .node(id)
                    .block(block)
                    .iter()
                    .copied()
                    .filter(|&child| !self.is_string_statement(child))
                    .collect();
                if keep.len() != self.node(id).block(block).len() {
                    *self.node_mut(id).block_mut(block) = keep;
                    changed = true;
                }
            }
        }
        if changed {
            self.reindex();
        }
    }

    fn is_string_statement(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.kind == StmtKind::Expr
            && tokenize(&node.header).is_ok_and(|tokens| {
                !tokens.is_empty() && tokens.iter().all(|t| t.kind == TokenKind::Str)
            })
    }
}

/// Canonical text of a program: comments, docstrings and layout differences
/// are removed. Applying it twice gives the same result as applying it once.
pub fn normalize(source: &str) -> Result<String, ParseError> {
    let mut tree = parse(source)?;
    tree.strip_string_statements();
    Ok(tree.to_source())
}
