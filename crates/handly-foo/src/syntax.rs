//! Lexer and parser for Foo source files.
//!
//! ```text
//! unit  := (var | def)*
//! var   := 'var' IDENT ';'
//! def   := 'def' IDENT '(' (IDENT (',' IDENT)*)? ')' '{' ... '}'
//! ```
//!
//! `def` bodies are skipped as balanced braces. `//` starts a line comment.
//! Parsing never fails: syntax errors are collected, and declarations whose
//! name was read are kept even when the rest of them is malformed.

use text_size::{TextRange, TextSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationKind {
    Var,
    Def { parameters: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    /// From the keyword to the closing `;` or `}`.
    pub range: TextRange,
    pub name_range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub range: TextRange,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceUnit {
    pub declarations: Vec<Declaration>,
    pub errors: Vec<SyntaxError>,
}

pub fn parse(text: &str) -> SourceUnit {
    let mut parser = Parser {
        text,
        tokens: tokenize(text),
        pos: 0,
        errors: Vec::new(),
    };
    let mut declarations = Vec::new();
    while let Some(token) = parser.peek() {
        let declaration = match token.kind {
            TokenKind::Var => parser.parse_var(),
            TokenKind::Def => parser.parse_def(),
            _ => {
                parser.error(token.range, "expected `var` or `def`");
                parser.bump();
                parser.recover();
                None
            }
        };
        declarations.extend(declaration);
    }
    SourceUnit {
        declarations,
        errors: parser.errors,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Var,
    Def,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    range: TextRange,
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
                continue;
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            c if is_ident_start(c) => {
                while chars.next_if(|&(_, c)| is_ident_continue(c)).is_some() {}
                TokenKind::Ident
            }
            _ => TokenKind::Unknown,
        };
        let end = chars.peek().map_or(text.len(), |&(index, _)| index);
        let kind = match (kind, &text[start..end]) {
            (TokenKind::Ident, "var") => TokenKind::Var,
            (TokenKind::Ident, "def") => TokenKind::Def,
            (kind, _) => kind,
        };
        tokens.push(Token {
            kind,
            range: TextRange::new(offset(start), offset(end)),
        });
    }
    tokens
}

fn offset(index: usize) -> TextSize {
    TextSize::try_from(index).unwrap_or(TextSize::from(u32::MAX))
}

struct Parser<'t> {
    text: &'t str,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        match self.peek() {
            Some(token) if token.kind == kind => self.bump(),
            _ => None,
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if let Some(token) = self.eat(kind) {
            return Some(token);
        }
        let range = match self.peek() {
            Some(token) => token.range,
            None => TextRange::empty(TextSize::of(self.text)),
        };
        self.error(range, format!("expected {what}"));
        None
    }

    fn error(&mut self, range: TextRange, message: impl Into<String>) {
        self.errors.push(SyntaxError {
            range,
            message: message.into(),
        });
    }

    /// Skips to the next declaration keyword.
    fn recover(&mut self) {
        while let Some(token) = self.peek() {
            if matches!(token.kind, TokenKind::Var | TokenKind::Def) {
                return;
            }
            self.pos += 1;
        }
    }

    fn slice(&self, token: Token) -> &str {
        &self.text[token.range]
    }

    fn parse_var(&mut self) -> Option<Declaration> {
        let keyword = self.bump()?;
        let Some(name) = self.expect(TokenKind::Ident, "a variable name") else {
            self.recover();
            return None;
        };
        let end = match self.expect(TokenKind::Semi, "`;`") {
            Some(semi) => semi.range.end(),
            None => {
                self.recover();
                name.range.end()
            }
        };
        Some(Declaration {
            kind: DeclarationKind::Var,
            name: self.slice(name).to_string(),
            range: TextRange::new(keyword.range.start(), end),
            name_range: name.range,
        })
    }

    fn parse_def(&mut self) -> Option<Declaration> {
        let keyword = self.bump()?;
        let Some(name) = self.expect(TokenKind::Ident, "a function name") else {
            self.recover();
            return None;
        };
        let mut parameters = Vec::new();
        let mut end = name.range.end();
        let complete = self.parse_parameters(&mut parameters, &mut end) && self.skip_block(&mut end);
        if !complete {
            self.recover();
        }
        Some(Declaration {
            kind: DeclarationKind::Def { parameters },
            name: self.slice(name).to_string(),
            range: TextRange::new(keyword.range.start(), end),
            name_range: name.range,
        })
    }

    fn parse_parameters(&mut self, parameters: &mut Vec<String>, end: &mut TextSize) -> bool {
        let Some(open) = self.expect(TokenKind::LParen, "`(`") else {
            return false;
        };
        *end = open.range.end();
        if let Some(close) = self.eat(TokenKind::RParen) {
            *end = close.range.end();
            return true;
        }
        loop {
            let Some(parameter) = self.expect(TokenKind::Ident, "a parameter name") else {
                return false;
            };
            parameters.push(self.slice(parameter).to_string());
            *end = parameter.range.end();
            if self.eat(TokenKind::Comma).is_some() {
                continue;
            }
            let Some(close) = self.expect(TokenKind::RParen, "`,` or `)`") else {
                return false;
            };
            *end = close.range.end();
            return true;
        }
    }

    fn skip_block(&mut self, end: &mut TextSize) -> bool {
        let Some(open) = self.expect(TokenKind::LBrace, "`{`") else {
            return false;
        };
        *end = open.range.end();
        let mut depth = 1usize;
        while let Some(token) = self.bump() {
            *end = token.range.end();
            match token.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                _ => {}
            }
        }
        self.error(TextRange::empty(*end), "unclosed `{`");
        false
    }
}
