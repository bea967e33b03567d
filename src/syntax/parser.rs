//! Indentation-aware statement parser.

use super::ParseError;
use super::lexer::{LogicalLine, Token, TokenKind, logical_lines};
use super::names::is_augmented;
use super::printer::{join_header, join_tokens};
use super::tree::{Node, NodeId, StmtKind, SyntaxTree};

struct Parser {
    lines: Vec<LogicalLine>,
    pos: usize,
    tree: SyntaxTree,
}

/// Index of the colon ending a compound header; lambda colons are skipped.
fn header_colon(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    let mut lambdas = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_open() {
            depth += 1;
        } else if token.is_close() {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_name("lambda") {
            lambdas += 1;
        } else if depth == 0 && token.is_op(":") {
            if lambdas == 0 {
                return Some(i);
            }
            lambdas -= 1;
        }
    }
    None
}

/// `match` is a keyword only in front of a header that ends the line with
/// its colon: `match = 1` and `match(x)` stay expressions. Inside a match
/// block every line is a `case` clause.
fn soft_keyword_header(tokens: &[Token]) -> bool {
    tokens.len() >= 3
        && header_colon(tokens) == Some(tokens.len() - 1)
        && !tokens[1].is_op("=")
        && !tokens[1].is_op(".")
        && !is_augmented(&tokens[1])
}

fn compound_kind(tokens: &[Token]) -> Option<StmtKind> {
    let first = tokens.first()?;
    if first.kind != TokenKind::Name {
        return None;
    }
    let kind = match first.text.as_str() {
        "if" => StmtKind::If,
        "while" => StmtKind::While,
        "for" => StmtKind::For,
        "try" => StmtKind::Try,
        "with" => StmtKind::With,
        "def" => StmtKind::FunctionDef,
        "class" => StmtKind::ClassDef,
        "match" if soft_keyword_header(tokens) => StmtKind::Match,
        "async" => match tokens.get(1).map(|t| t.text.as_str()) {
            Some("def") => StmtKind::AsyncFunctionDef,
            Some("for") => StmtKind::AsyncFor,
            Some("with") => StmtKind::AsyncWith,
            _ => return None,
        },
        _ => return None,
    };
    Some(kind)
}

fn simple_kind(tokens: &[Token]) -> StmtKind {
    if let Some(first) = tokens.first()
        && first.kind == TokenKind::Name
    {
        let kind = match first.text.as_str() {
            "return" => Some(StmtKind::Return),
            "del" => Some(StmtKind::Delete),
            "pass" => Some(StmtKind::Pass),
            "break" => Some(StmtKind::Break),
            "continue" => Some(StmtKind::Continue),
            "raise" => Some(StmtKind::Raise),
            "assert" => Some(StmtKind::Assert),
            "import" => Some(StmtKind::Import),
            "from" => Some(StmtKind::ImportFrom),
            "global" => Some(StmtKind::Global),
            "nonlocal" => Some(StmtKind::Nonlocal),
            _ => None,
        };
        if let Some(kind) = kind {
            return kind;
        }
    }

    let mut depth = 0usize;
    let mut lambdas = 0usize;
    for token in tokens {
        if token.is_open() {
            depth += 1;
        } else if token.is_close() {
            depth = depth.saturating_sub(1);
        } else if depth > 0 {
            continue;
        } else if token.is_name("lambda") {
            lambdas += 1;
        } else if token.is_op(":") {
            if lambdas == 0 {
                return StmtKind::AnnAssign;
            }
            lambdas -= 1;
        } else if token.is_op("=") {
            return StmtKind::Assign;
        } else if is_augmented(token) {
            return StmtKind::AugAssign;
        }
    }
    StmtKind::Expr
}

fn is_clause(tokens: &[Token]) -> bool {
    tokens.first().is_some_and(|t| {
        t.kind == TokenKind::Name && matches!(t.text.as_str(), "elif" | "else" | "except" | "finally")
    })
}

impl Parser {
    fn peek(&self) -> Option<&LogicalLine> {
        self.lines.get(self.pos)
    }

    fn next_line(&mut self) -> Option<LogicalLine> {
        let line = self.lines.get(self.pos).cloned();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    /// Consume the next line if it is a `keyword` clause at `indent`.
    fn clause(&mut self, indent: usize, keyword: &str) -> Option<LogicalLine> {
        let line = self.peek()?;
        if line.indent == indent && line.tokens.first().is_some_and(|t| t.is_name(keyword)) {
            self.next_line()
        } else {
            None
        }
    }

    fn block(&mut self, indent: usize) -> Result<Vec<NodeId>, ParseError> {
        let mut ids = Vec::new();
        while let Some(line) = self.peek() {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(ParseError::new(line.line, "unexpected indent"));
            }
            ids.extend(self.statement()?);
        }
        Ok(ids)
    }

    fn statement(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let Some(line) = self.next_line() else {
            return Ok(Vec::new());
        };

        if line.tokens.first().is_some_and(|t| t.is_op("@")) {
            let mut decorators = vec![join_tokens(&line.tokens)];
            while let Some(next) = self.peek()
                && next.indent == line.indent
                && next.tokens.first().is_some_and(|t| t.is_op("@"))
            {
                decorators.push(join_tokens(&next.tokens));
                self.pos += 1;
            }
            let target = self
                .next_line()
                .filter(|l| l.indent == line.indent)
                .ok_or_else(|| ParseError::new(line.line, "decorator without a definition"))?;
            return match compound_kind(&target.tokens) {
                Some(kind) if kind.is_definition() => {
                    let id = self.compound(kind, &target)?;
                    self.tree.node_mut(id).decorators = decorators;
                    Ok(vec![id])
                }
                _ => Err(ParseError::new(target.line, "decorator without a definition")),
            };
        }

        if let Some(kind) = compound_kind(&line.tokens) {
            return Ok(vec![self.compound(kind, &line)?]);
        }
        if is_clause(&line.tokens) {
            return Err(ParseError::new(
                line.line,
                format!("dangling `{}`", line.tokens[0].text),
            ));
        }
        self.simple(&line.tokens, line.line)
    }

    fn simple(&mut self, tokens: &[Token], line: u32) -> Result<Vec<NodeId>, ParseError> {
        let mut ids = Vec::new();
        let mut depth = 0usize;
        let mut start = 0;
        for i in 0..=tokens.len() {
            let at_end = i == tokens.len();
            if !at_end {
                let token = &tokens[i];
                if token.is_open() {
                    depth += 1;
                } else if token.is_close() {
                    depth = depth.saturating_sub(1);
                }
                if !(depth == 0 && token.is_op(";")) {
                    continue;
                }
            }
            let group = &tokens[start..i];
            start = i + 1;
            if group.is_empty() {
                continue;
            }
            if compound_kind(group).is_some() || is_clause(group) {
                return Err(ParseError::new(line, "compound statement in a simple suite"));
            }
            let mut node = Node::new(simple_kind(group), join_tokens(group));
            node.location = Some(line);
            ids.push(self.tree.add(node));
        }
        Ok(ids)
    }

    /// Body after a header colon: inline statements or an indented block.
    fn suite(&mut self, line: &LogicalLine, colon: usize) -> Result<Vec<NodeId>, ParseError> {
        let rest = &line.tokens[colon + 1..];
        if !rest.is_empty() {
            return self.simple(rest, line.line);
        }
        match self.peek() {
            Some(next) if next.indent > line.indent => {
                let indent = next.indent;
                self.block(indent)
            }
            _ => Err(ParseError::new(line.line, "expected an indented block")),
        }
    }

    fn header(line: &LogicalLine) -> Result<usize, ParseError> {
        header_colon(&line.tokens).ok_or_else(|| ParseError::new(line.line, "expected `:`"))
    }

    fn else_clause(&mut self, indent: usize) -> Result<Vec<NodeId>, ParseError> {
        match self.clause(indent, "else") {
            Some(line) => {
                let colon = Self::header(&line)?;
                self.suite(&line, colon)
            }
            None => Ok(Vec::new()),
        }
    }

    fn if_tail(&mut self, indent: usize) -> Result<Vec<NodeId>, ParseError> {
        let Some(line) = self.clause(indent, "elif") else {
            return self.else_clause(indent);
        };
        let colon = Self::header(&line)?;
        let mut header = vec![Token::new(TokenKind::Name, "if")];
        header.extend(line.tokens[1..colon].iter().cloned());
        let mut node = Node::new(StmtKind::If, join_tokens(&header));
        node.location = Some(line.line);
        node.body = self.suite(&line, colon)?;
        node.orelse = self.if_tail(indent)?;
        Ok(vec![self.tree.add(node)])
    }

    /// `match` subject followed by an indented run of `case` clauses.
    fn match_cases(&mut self, line: &LogicalLine) -> Result<Vec<NodeId>, ParseError> {
        let indent = match self.peek() {
            Some(next) if next.indent > line.indent => next.indent,
            _ => return Err(ParseError::new(line.line, "expected an indented block")),
        };
        let mut cases = Vec::new();
        while let Some(next) = self.peek()
            && next.indent >= indent
        {
            if next.indent > indent {
                return Err(ParseError::new(next.line, "unexpected indent"));
            }
            if !(next.tokens.first().is_some_and(|t| t.is_name("case")) && next.tokens.len() >= 3) {
                return Err(ParseError::new(next.line, "expected `case`"));
            }
            let Some(clause) = self.next_line() else {
                break;
            };
            let colon = Self::header(&clause)?;
            let mut case = Node::new(
                StmtKind::MatchCase,
                join_header(StmtKind::MatchCase, &clause.tokens[..colon]),
            );
            case.location = Some(clause.line);
            case.body = self.suite(&clause, colon)?;
            cases.push(self.tree.add(case));
        }
        Ok(cases)
    }

    fn compound(&mut self, kind: StmtKind, line: &LogicalLine) -> Result<NodeId, ParseError> {
        let colon = Self::header(line)?;
        let mut node = Node::new(kind, join_header(kind, &line.tokens[..colon]));
        node.location = Some(line.line);
        if kind == StmtKind::Match {
            node.handlers = self.match_cases(line)?;
            return Ok(self.tree.add(node));
        }
        node.body = self.suite(line, colon)?;
        match kind {
            StmtKind::If => node.orelse = self.if_tail(line.indent)?,
            StmtKind::For | StmtKind::AsyncFor | StmtKind::While => {
                node.orelse = self.else_clause(line.indent)?
            }
            StmtKind::Try => {
                while let Some(clause) = self.clause(line.indent, "except") {
                    let colon = Self::header(&clause)?;
                    let mut handler =
                        Node::new(StmtKind::ExceptHandler, join_tokens(&clause.tokens[..colon]));
                    handler.location = Some(clause.line);
                    handler.body = self.suite(&clause, colon)?;
                    node.handlers.push(self.tree.add(handler));
                }
                node.orelse = self.else_clause(line.indent)?;
                if let Some(clause) = self.clause(line.indent, "finally") {
                    let colon = Self::header(&clause)?;
                    node.finalbody = self.suite(&clause, colon)?;
                }
                if node.handlers.is_empty() && node.finalbody.is_empty() {
                    return Err(ParseError::new(
                        line.line,
                        "`try` without `except` or `finally`",
                    ));
                }
            }
            _ => {}
        }
        Ok(self.tree.add(node))
    }
}

/// Parse source text into a statement tree.
pub fn parse(source: &str) -> Result<SyntaxTree, ParseError> {
    let lines = logical_lines(source)?;
    if let Some(first) = lines.first()
        && first.indent != 0
    {
        return Err(ParseError::new(first.line, "unexpected indent"));
    }
    let mut parser = Parser {
        lines,
        pos: 0,
        tree: SyntaxTree::new(),
    };
    let body = parser.block(0)?;
    let root = parser.tree.root();
    parser.tree.node_mut(root).body = body;
    parser.tree.reindex();
    Ok(parser.tree)
}
