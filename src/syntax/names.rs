//! Name analysis: declared variables, function/class names, and renaming.

use std::collections::BTreeMap;

use super::lexer::{Token, TokenKind, tokenize};
use super::printer::join_header;
use super::tree::{NodeId, StmtKind, SyntaxTree};

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const BUILTINS: &[&str] = &[
    "__import__", "__name__", "__file__", "__doc__", "abs", "all", "any", "ascii", "bin", "bool",
    "breakpoint", "bytearray", "bytes", "callable", "chr", "classmethod", "compile", "complex",
    "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec", "exit", "filter", "float",
    "format", "frozenset", "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input",
    "int", "isinstance", "issubclass", "iter", "len", "list", "locals", "map", "max",
    "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print", "property",
    "quit", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip", "self",
    "ArithmeticError", "AssertionError", "AttributeError", "BaseException", "EOFError",
    "Exception", "IndexError", "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError",
    "NameError", "NotImplemented", "NotImplementedError", "OSError", "OverflowError",
    "RecursionError", "RuntimeError", "StopIteration", "SystemExit", "TypeError",
    "ValueError", "ZeroDivisionError",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

pub fn is_builtin(word: &str) -> bool {
    BUILTINS.contains(&word)
}

/// Keyword tokens other than the literal constants `True`, `False`, `None`.
pub(crate) fn is_statement_keyword(token: &Token) -> bool {
    token.kind == TokenKind::Name
        && is_keyword(&token.text)
        && !matches!(token.text.as_str(), "True" | "False" | "None")
}

/// Whether an opening bracket at `index` subscripts or calls the preceding atom.
fn is_access(tokens: &[Token], index: usize) -> bool {
    let Some(prev) = index.checked_sub(1).map(|i| &tokens[i]) else {
        return false;
    };
    tokens[index].text != "{"
        && (prev.is_close()
            || (matches!(prev.kind, TokenKind::Name | TokenKind::Str)
                && !is_statement_keyword(prev)))
}

/// Names bound by a target expression (`a`, `a, *b`, `(x, y)`); attribute,
/// subscript and call bases are loads and are skipped.
fn target_names(tokens: &[Token]) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack: Vec<bool> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_open() {
            stack.push(is_access(tokens, i));
            continue;
        }
        if token.is_close() {
            stack.pop();
            continue;
        }
        if token.kind != TokenKind::Name || is_keyword(&token.text) || stack.iter().any(|&a| a) {
            continue;
        }
        if i > 0 && tokens[i - 1].is_op(".") {
            continue;
        }
        if tokens
            .get(i + 1)
            .is_some_and(|n| n.is_op(".") || n.is_op("(") || n.is_op("["))
        {
            continue;
        }
        out.push(token.text.clone());
    }
    out
}

/// Split at depth-0 occurrences of `separator`.
fn split_top(tokens: &[Token], separator: impl Fn(&Token) -> bool) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_open() {
            depth += 1;
        } else if token.is_close() {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && separator(token) {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

pub(crate) fn is_augmented(token: &Token) -> bool {
    token.kind == TokenKind::Op
        && matches!(
            token.text.as_str(),
            "+=" | "-=" | "*=" | "/=" | "//=" | "%=" | "**=" | "@=" | "&=" | "|=" | "^=" | ">>="
                | "<<="
        )
}

/// Targets of every `for ... in` clause, statement or comprehension.
fn loop_targets(tokens: &[Token]) -> Vec<String> {
    let mut out = Vec::new();
    for (start, token) in tokens.iter().enumerate() {
        if !token.is_name("for") {
            continue;
        }
        let mut depth = 0usize;
        let mut end = tokens.len();
        for (offset, t) in tokens[start + 1..].iter().enumerate() {
            if t.is_open() {
                depth += 1;
            } else if t.is_close() {
                if depth == 0 {
                    end = start + 1 + offset;
                    break;
                }
                depth -= 1;
            } else if depth == 0 && t.is_name("in") {
                end = start + 1 + offset;
                break;
            }
        }
        out.extend(target_names(&tokens[start + 1..end]));
    }
    out
}

fn as_targets(tokens: &[Token]) -> Vec<String> {
    let mut out = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_name("as")
            && let Some(next) = tokens.get(i + 1)
            && next.kind == TokenKind::Name
        {
            out.push(next.text.clone());
        }
    }
    out
}

fn parameters(tokens: &[Token]) -> Vec<String> {
    let Some(open) = tokens.iter().position(|t| t.is_op("(")) else {
        return Vec::new();
    };
    let mut depth = 0usize;
    let mut close = tokens.len();
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.is_open() {
            depth += 1;
        } else if token.is_close() {
            depth -= 1;
            if depth == 0 {
                close = i;
                break;
            }
        }
    }
    split_top(&tokens[open + 1..close], |t| t.is_op(","))
        .into_iter()
        .filter_map(|param| {
            param
                .iter()
                .find(|t| !(t.is_op("*") || t.is_op("**") || t.is_op("/")))
                .filter(|t| t.kind == TokenKind::Name && !is_keyword(&t.text))
                .map(|t| t.text.clone())
        })
        .collect()
}

/// Names a `case` pattern captures. Class names, dotted constants, keyword
/// pattern names and the guard after `if` bind nothing.
fn case_captures(tokens: &[Token]) -> Vec<String> {
    let end = tokens
        .iter()
        .position(|t| t.is_name("if"))
        .unwrap_or(tokens.len());
    let pattern = &tokens[..end];
    (1..pattern.len())
        .filter(|&i| {
            let token = &pattern[i];
            token.kind == TokenKind::Name
                && token.text != "_"
                && !is_keyword(&token.text)
                && !pattern[i - 1].is_op(".")
                && !pattern
                    .get(i + 1)
                    .is_some_and(|next| next.is_op("(") || next.is_op(".") || next.is_op("="))
        })
        .map(|i| pattern[i].text.clone())
        .collect()
}

fn node_targets(kind: StmtKind, tokens: &[Token]) -> Vec<String> {
    let mut out = match kind {
        StmtKind::FunctionDef | StmtKind::AsyncFunctionDef => parameters(tokens),
        StmtKind::Assign => {
            let parts = split_top(tokens, |t| t.is_op("="));
            parts[..parts.len() - 1]
                .iter()
                .flat_map(|part| target_names(part))
                .collect()
        }
        StmtKind::AugAssign => split_top(tokens, is_augmented)
            .first()
            .map(|part| target_names(part))
            .unwrap_or_default(),
        StmtKind::AnnAssign => split_top(tokens, |t| t.is_op(":"))
            .first()
            .map(|part| target_names(part))
            .unwrap_or_default(),
        StmtKind::With | StmtKind::AsyncWith | StmtKind::ExceptHandler => as_targets(tokens),
        StmtKind::MatchCase => case_captures(tokens),
        _ => Vec::new(),
    };
    out.extend(loop_targets(tokens));
    for (i, token) in tokens.iter().enumerate() {
        if token.is_op(":=")
            && let Some(prev) = i.checked_sub(1).map(|p| &tokens[p])
            && prev.kind == TokenKind::Name
        {
            out.push(prev.text.clone());
        }
    }
    out
}

/// Variable names bound anywhere in the program, in first-seen order,
/// excluding keywords and builtins.
pub fn variable_names(tree: &SyntaxTree) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for id in tree.walk(tree.root()) {
        let node = tree.node(id);
        let Ok(tokens) = tokenize(&node.header) else {
            continue;
        };
        for name in node_targets(node.kind, &tokens) {
            if !is_keyword(&name) && !is_builtin(&name) && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Name introduced by a function or class definition node.
pub fn declared_name(tree: &SyntaxTree, id: NodeId) -> Option<String> {
    let node = tree.node(id);
    if !node.kind.is_definition() {
        return None;
    }
    let tokens = tokenize(&node.header).ok()?;
    tokens
        .iter()
        .skip_while(|t| t.is_name("async"))
        .nth(1)
        .filter(|t| t.kind == TokenKind::Name)
        .map(|t| t.text.clone())
}

/// Names of all function and class definitions, in preorder.
pub fn definitions(tree: &SyntaxTree) -> Vec<String> {
    tree.statements()
        .into_iter()
        .filter_map(|id| declared_name(tree, id))
        .collect()
}

fn rename_text(text: &str, map: &BTreeMap<String, String>, kind: StmtKind) -> String {
    let in_definition = kind.is_function();
    let Ok(mut tokens) = tokenize(text) else {
        return text.to_string();
    };
    let mut stack: Vec<bool> = Vec::new();
    for i in 0..tokens.len() {
        if tokens[i].is_open() {
            stack.push(is_access(&tokens, i));
            continue;
        }
        if tokens[i].is_close() {
            stack.pop();
            continue;
        }
        match tokens[i].kind {
            TokenKind::Name => {
                let Some(target) = map.get(&tokens[i].text) else {
                    continue;
                };
                let attribute = i > 0 && tokens[i - 1].is_op(".");
                let soft_keyword = i == 0 && matches!(kind, StmtKind::Match | StmtKind::MatchCase);
                let keyword_argument = !in_definition
                    && stack.last() == Some(&true)
                    && tokens.get(i + 1).is_some_and(|t| t.is_op("="));
                if !attribute && !keyword_argument && !soft_keyword {
                    tokens[i].text = target.clone();
                }
            }
            TokenKind::Str => {
                let text = &tokens[i].text;
                let Some(quote) = text.chars().next().filter(|c| matches!(c, '\'' | '"')) else {
                    continue;
                };
                if text.len() < 2 || text.starts_with("'''") || text.starts_with("\"\"\"") {
                    continue;
                }
                let inner = &text[1..text.len() - 1];
                if inner.contains('\\') {
                    continue;
                }
                if let Some(target) = map.get(inner) {
                    tokens[i].text = format!("{quote}{target}{quote}");
                }
            }
            _ => {}
        }
    }
    join_header(kind, &tokens)
}

/// Copy of the tree with identifiers renamed through `map`.
///
/// Attribute names, call keyword-argument names and import statements are
/// left alone; plain string constants equal to a mapped name are renamed.
pub fn rename(tree: &SyntaxTree, map: &BTreeMap<String, String>) -> SyntaxTree {
    let mut renamed = tree.clone();
    if map.iter().all(|(from, to)| from == to) {
        return renamed;
    }
    for id in tree.walk(tree.root()) {
        let node = renamed.node_mut(id);
        if matches!(node.kind, StmtKind::Import | StmtKind::ImportFrom | StmtKind::Module) {
            continue;
        }
        node.header = rename_text(&node.header, map, node.kind);
        for decorator in &mut node.decorators {
            *decorator = rename_text(decorator, map, StmtKind::Expr);
        }
    }
    renamed
}
