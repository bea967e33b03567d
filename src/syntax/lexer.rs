//! Tokenizer producing logical lines from indentation-structured source.

use super::ParseError;

/// Token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Name,
    Number,
    Str,
    Op,
}

/// A lexical token with its verbatim text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }

    pub fn is_open(&self) -> bool {
        self.kind == TokenKind::Op && matches!(self.text.as_str(), "(" | "[" | "{")
    }

    pub fn is_close(&self) -> bool {
        self.kind == TokenKind::Op && matches!(self.text.as_str(), ")" | "]" | "}")
    }
}

/// A logical line: tokens joined across bracket and backslash continuations.
#[derive(Debug, Clone)]
pub struct LogicalLine {
    /// 1-based line where the logical line starts.
    pub line: u32,
    /// Indentation width in columns (tabs advance to the next multiple of 8).
    pub indent: usize,
    pub tokens: Vec<Token>,
}

const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "->", ":=", "**", "//", "==", "!=", "<=", ">=", "<<", ">>",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=", "!",
];

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    source: &'a str,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    fn skip_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    fn string(&mut self, prefix: &str) -> Result<Token, ParseError> {
        let quote = self.peek().ok_or_else(|| self.error("unterminated string"))?;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let start = self.pos;
        self.pos += if triple { 3 } else { 1 };
        loop {
            let c = self
                .peek()
                .ok_or_else(|| self.error("unterminated string literal"))?;
            match c {
                '\\' => {
                    if self.peek_at(1) == Some('\n') {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                '\n' if !triple => return Err(self.error("unterminated string literal")),
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                c if c == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        let body: String = self.chars[start..self.pos].iter().collect();
        Ok(Token::new(TokenKind::Str, format!("{prefix}{body}")))
    }

    fn number(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let exponent_sign = matches!(c, '+' | '-')
                && matches!(self.chars.get(self.pos - 1), Some('e') | Some('E'))
                && !self.chars[start..self.pos]
                    .iter()
                    .any(|&d| matches!(d, 'x' | 'X'));
            if c.is_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        Token::new(
            TokenKind::Number,
            self.chars[start..self.pos].iter().collect::<String>(),
        )
    }

    fn operator(&mut self) -> Result<Token, ParseError> {
        for op in OPERATORS {
            let len = op.chars().count();
            if self.chars.len() >= self.pos + len
                && self.chars[self.pos..self.pos + len]
                    .iter()
                    .copied()
                    .eq(op.chars())
            {
                self.pos += len;
                return Ok(Token::new(TokenKind::Op, *op));
            }
        }
        Err(self.error(format!(
            "unexpected character `{}`",
            self.peek().unwrap_or(' ')
        )))
    }

    fn is_string_prefix(word: &str) -> bool {
        word.len() <= 2
            && word
                .chars()
                .all(|c| matches!(c.to_ascii_lowercase(), 'r' | 'b' | 'u' | 'f'))
    }

    fn lines(mut self) -> Result<Vec<LogicalLine>, ParseError> {
        let mut lines = Vec::new();
        let mut tokens: Vec<Token> = Vec::new();
        let mut brackets: Vec<char> = Vec::new();
        let mut at_line_start = true;
        let mut start_line = 1;
        let mut indent = 0;

        loop {
            if at_line_start {
                let mut width = 0;
                while let Some(c) = self.peek() {
                    match c {
                        ' ' => width += 1,
                        '\t' => width = (width / 8 + 1) * 8,
                        '\x0c' | '\r' => {}
                        _ => break,
                    }
                    self.pos += 1;
                }
                match self.peek() {
                    None => break,
                    Some('\n') => {
                        self.pos += 1;
                        self.line += 1;
                        continue;
                    }
                    Some('#') => {
                        self.skip_comment();
                        continue;
                    }
                    _ => {}
                }
                at_line_start = false;
                indent = width;
                start_line = self.line;
            }

            let Some(c) = self.peek() else { break };
            match c {
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '\\' if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') => {
                    self.pos += 3;
                    self.line += 1;
                }
                '\n' => {
                    self.pos += 1;
                    self.line += 1;
                    if brackets.is_empty() {
                        if !tokens.is_empty() {
                            lines.push(LogicalLine {
                                line: start_line,
                                indent,
                                tokens: std::mem::take(&mut tokens),
                            });
                        }
                        at_line_start = true;
                    }
                }
                c if c.is_whitespace() => self.pos += 1,
                '\'' | '"' => tokens.push(self.string("")?),
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) =>
                {
                    tokens.push(self.number())
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = self.pos;
                    while self
                        .peek()
                        .is_some_and(|c| c.is_alphanumeric() || c == '_')
                    {
                        self.pos += 1;
                    }
                    let word: String = self.chars[start..self.pos].iter().collect();
                    if Self::is_string_prefix(&word) && matches!(self.peek(), Some('\'' | '"')) {
                        tokens.push(self.string(&word)?);
                    } else {
                        tokens.push(Token::new(TokenKind::Name, word));
                    }
                }
                _ => {
                    let token = self.operator()?;
                    match token.text.as_str() {
                        "(" | "[" | "{" => brackets.push(token.text.chars().next().unwrap_or('(')),
                        ")" | "]" | "}" => {
                            let expected = match token.text.as_str() {
                                ")" => '(',
                                "]" => '[',
                                _ => '{',
                            };
                            if brackets.pop() != Some(expected) {
                                return Err(self.error(format!("unbalanced `{}`", token.text)));
                            }
                        }
                        _ => {}
                    }
                    tokens.push(token);
                }
            }
        }

        if !brackets.is_empty() {
            return Err(self.error("unclosed bracket at end of input"));
        }
        if !tokens.is_empty() {
            lines.push(LogicalLine {
                line: start_line,
                indent,
                tokens,
            });
        }
        let _ = self.source;
        Ok(lines)
    }
}

/// Split source into logical lines.
pub fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, ParseError> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        source,
    }
    .lines()
}

/// Tokenize a fragment, ignoring line structure.
pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    Ok(logical_lines(text)?
        .into_iter()
        .flat_map(|l| l.tokens)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_tokens_and_comments() {
        let lines = logical_lines("x = a**2 + b  # note\n\n  # only comment\ny=f'{x}'\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(texts(&lines[0].tokens), vec!["x", "=", "a", "**", "2", "+", "b"]);
        assert_eq!(lines[1].line, 4);
        assert_eq!(texts(&lines[1].tokens), vec!["y", "=", "f'{x}'"]);
        assert_eq!(lines[1].tokens[2].kind, TokenKind::Str);
    }

    #[test]
    fn test_continuations() {
        let src = "total = (1 +\n         2)\nx = 1 + \\\n    2\ns = '''a\nb'''\nz = 3\n";
        let lines = logical_lines(src).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].line, 3);
        assert_eq!(lines[2].line, 5);
        assert_eq!(lines[3].line, 7);
    }

    #[test]
    fn test_indentation() {
        let lines = logical_lines("if x:\n    y = 1\n\ty = 2\n").unwrap();
        assert_eq!(lines[0].indent, 0);
        assert_eq!(lines[1].indent, 4);
        assert_eq!(lines[2].indent, 8);
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("x = 1e-5 + 0x1f - 3.25").unwrap();
        assert_eq!(texts(&tokens), vec!["x", "=", "1e-5", "+", "0x1f", "-", "3.25"]);
    }

    #[test]
    fn test_errors() {
        assert!(logical_lines("x = (1,\n").is_err());
        assert!(logical_lines("x = 'abc\n").is_err());
        assert!(logical_lines("x = 1)\n").is_err());
        let err = logical_lines("a = 1\nb = $\n").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
