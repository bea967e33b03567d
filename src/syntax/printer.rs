//! Canonical rendering of tokens and trees.

use super::lexer::{Token, TokenKind};
use super::names::is_statement_keyword;
use super::tree::{NodeId, StmtKind, SyntaxTree};

const INDENT: &str = "    ";

/// Whether the token at `index` is a prefix operator rather than a binary one.
fn is_unary(tokens: &[Token], index: usize) -> bool {
    let token = &tokens[index];
    if token.kind != TokenKind::Op {
        return false;
    }
    let prev = index.checked_sub(1).map(|i| &tokens[i]);
    match token.text.as_str() {
        "-" | "+" | "~" => match prev {
            None => true,
            Some(p) if p.kind == TokenKind::Op => !p.is_close(),
            Some(p) => is_statement_keyword(p),
        },
        "*" | "**" => match prev {
            None => true,
            Some(p) if p.kind == TokenKind::Op => {
                p.is_open() || matches!(p.text.as_str(), "," | "=" | ":")
            }
            Some(p) => p.is_name("lambda") || p.is_name("return") || p.is_name("in"),
        },
        "@" => prev.is_none(),
        _ => false,
    }
}

fn needs_space(tokens: &[Token], index: usize, innermost: Option<&str>) -> bool {
    let prev = &tokens[index - 1];
    let token = &tokens[index];

    if is_statement_keyword(token) {
        if prev.is_op(".") {
            return token.is_name("import");
        }
        let keyword_argument = innermost == Some("(") && prev.is_op("=");
        return !prev.is_open() && !keyword_argument;
    }
    if token.kind == TokenKind::Op
        && matches!(token.text.as_str(), "," | ")" | "]" | "}" | ";" | ":")
    {
        return false;
    }
    if token.is_op(".") {
        return is_statement_keyword(prev);
    }
    if prev.is_op(".") || prev.is_open() {
        return false;
    }
    if token.is_op("(") || token.is_op("[") {
        let keyword_before = is_statement_keyword(prev);
        let atom_before = matches!(prev.kind, TokenKind::Name | TokenKind::Str) || prev.is_close();
        if atom_before && !keyword_before {
            return false;
        }
    }
    if is_unary(tokens, index - 1) {
        return false;
    }
    if innermost == Some("(") && (token.is_op("=") || prev.is_op("=")) {
        return false;
    }
    if prev.is_op(":") && innermost == Some("[") {
        return false;
    }
    true
}

/// Join tokens with canonical spacing.
pub fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut brackets: Vec<&str> = Vec::new();
    for (index, token) in tokens.iter().enumerate() {
        if index > 0 && needs_space(tokens, index, brackets.last().copied()) {
            out.push(' ');
        }
        out.push_str(&token.text);
        if token.is_open() {
            brackets.push(token.text.as_str());
        } else if token.is_close() {
            brackets.pop();
        }
    }
    out
}

/// Join a header's tokens. A leading `match` or `case` is a keyword there,
/// so it stays apart from a bracketed subject or a signed pattern.
pub fn join_header(kind: StmtKind, tokens: &[Token]) -> String {
    match tokens {
        [head, rest @ ..] if matches!(kind, StmtKind::Match | StmtKind::MatchCase) && !rest.is_empty() => {
            format!("{} {}", head.text, join_tokens(rest))
        }
        _ => join_tokens(tokens),
    }
}

fn write_line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn write_block(tree: &SyntaxTree, ids: &[NodeId], depth: usize, out: &mut String) {
    if ids.is_empty() {
        write_line(out, depth, "pass");
        return;
    }
    for &id in ids {
        write_node(tree, id, depth, out);
    }
}

fn write_else(tree: &SyntaxTree, orelse: &[NodeId], depth: usize, out: &mut String) {
    if let [only] = orelse
        && tree.kind(*only) == StmtKind::If
        && tree.node(*only).decorators.is_empty()
    {
        let node = tree.node(*only);
        let condition = node.header.strip_prefix("if").unwrap_or(&node.header);
        write_line(out, depth, &format!("elif{condition}:"));
        write_block(tree, &node.body, depth + 1, out);
        write_else(tree, &node.orelse, depth, out);
        return;
    }
    if !orelse.is_empty() {
        write_line(out, depth, "else:");
        write_block(tree, orelse, depth + 1, out);
    }
}

fn write_node(tree: &SyntaxTree, id: NodeId, depth: usize, out: &mut String) {
    let node = tree.node(id);
    for decorator in &node.decorators {
        write_line(out, depth, decorator);
    }
    if !node.kind.is_compound() {
        write_line(out, depth, &node.header);
        return;
    }
    write_line(out, depth, &format!("{}:", node.header));
    if node.kind == StmtKind::Match {
        for &case in &node.handlers {
            write_node(tree, case, depth + 1, out);
        }
        // Statements left directly under the subject get a wildcard case.
        if !node.body.is_empty() || node.handlers.is_empty() {
            write_line(out, depth + 1, "case _:");
            write_block(tree, &node.body, depth + 2, out);
        }
        return;
    }
    write_block(tree, &node.body, depth + 1, out);
    match node.kind {
        StmtKind::Try => {
            for &handler in &node.handlers {
                write_node(tree, handler, depth, out);
            }
            if !node.orelse.is_empty() {
                write_line(out, depth, "else:");
                write_block(tree, &node.orelse, depth + 1, out);
            }
            if !node.finalbody.is_empty() || node.handlers.is_empty() {
                write_line(out, depth, "finally:");
                write_block(tree, &node.finalbody, depth + 1, out);
            }
        }
        kind if kind.has_orelse() => write_else(tree, &node.orelse, depth, out),
        _ => {}
    }
}

/// Render a tree as source text, one statement per line.
pub fn print_tree(tree: &SyntaxTree) -> String {
    let mut out = String::new();
    for &id in &tree.node(tree.root()).body {
        write_node(tree, id, 0, &mut out);
    }
    out
}
