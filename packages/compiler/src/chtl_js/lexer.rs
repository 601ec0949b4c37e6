//! CHTL-JS tokenizer.
//!
//! Splits a script body into a token stream where plain JavaScript survives
//! byte-for-byte: every token carries its exact source text, and whitespace,
//! strings and comments come through as pass-through tokens.

use serde::{Deserialize, Serialize};

use crate::chars;
use crate::diagnostics::{DiagnosticKind, DiagnosticsSink};
use crate::parse_util::{ParseError, ParseLocation, ParseSourceFile, ParseSourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsTokenKind {
    /// Contents of a `{{ ... }}` enhanced selector (text excludes the braces).
    Selector,
    /// `->`
    Arrow,
    /// `=>`
    FatArrow,
    Ident,
    Number,
    StringLit,
    /// Single punctuation character.
    Punct,
    Whitespace,
    Comment,
    Eof,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsToken {
    pub kind: JsTokenKind,
    /// Exact source text; concatenating all token texts reconstructs the
    /// script body. For `Selector` this is the inner selector text and
    /// `source_text` keeps the braces.
    pub text: String,
    pub source_text: String,
    pub span: ParseSourceSpan,
}

impl JsToken {
    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == JsTokenKind::Ident && self.text == name
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == JsTokenKind::Punct && self.text.len() == 1 && self.text.starts_with(c)
    }

    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, JsTokenKind::Whitespace | JsTokenKind::Comment)
    }
}

pub struct JsLexer<'a> {
    file: ParseSourceFile,
    sink: &'a DiagnosticsSink,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> JsLexer<'a> {
    pub fn new(file: ParseSourceFile, sink: &'a DiagnosticsSink) -> Self {
        JsLexer { file, sink, pos: 0, line: 0, col: 0 }
    }

    pub fn with_start(file: ParseSourceFile, sink: &'a DiagnosticsSink, offset: usize, line: usize, col: usize) -> Self {
        JsLexer { file, sink, pos: offset, line, col }
    }

    pub fn tokenize(mut self) -> Vec<JsToken> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == JsTokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn peek(&self) -> char {
        self.file.content[self.pos..].chars().next().unwrap_or(chars::EOF)
    }

    fn peek_at(&self, n: usize) -> char {
        self.file.content[self.pos..].chars().nth(n).unwrap_or(chars::EOF)
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        if c == chars::EOF {
            return c;
        }
        self.pos += c.len_utf8();
        if c == chars::NEWLINE {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        c
    }

    fn at_end(&self) -> bool {
        self.pos >= self.file.content.len()
    }

    fn location(&self) -> ParseLocation {
        ParseLocation::new(self.file.clone(), self.pos, self.line, self.col)
    }

    fn token_from(&self, kind: JsTokenKind, start: ParseLocation, begin: usize) -> JsToken {
        let source_text = self.file.content[begin..self.pos].to_string();
        JsToken {
            kind,
            text: source_text.clone(),
            source_text,
            span: ParseSourceSpan::new(start, self.location()),
        }
    }

    fn next_token(&mut self) -> JsToken {
        let start = self.location();
        let begin = self.pos;
        let c = self.peek();

        if c == chars::EOF {
            return self.token_from(JsTokenKind::Eof, start, begin);
        }

        if chars::is_whitespace(c) {
            while chars::is_whitespace(self.peek()) {
                self.advance();
            }
            return self.token_from(JsTokenKind::Whitespace, start, begin);
        }

        // Enhanced selector `{{ ... }}`.
        if c == chars::LBRACE && self.peek_at(1) == chars::LBRACE {
            self.advance();
            self.advance();
            let inner_begin = self.pos;
            let mut inner_end = self.pos;
            let mut closed = false;
            while !self.at_end() {
                if self.peek() == chars::RBRACE && self.peek_at(1) == chars::RBRACE {
                    inner_end = self.pos;
                    self.advance();
                    self.advance();
                    closed = true;
                    break;
                }
                self.advance();
            }
            if !closed {
                inner_end = self.pos;
                let span = ParseSourceSpan::new(start.clone(), self.location());
                self.sink.report_parse_error(
                    DiagnosticKind::Lexical,
                    ParseError::new(span, "unterminated enhanced selector".to_string()),
                );
            }
            let inner = self.file.content[inner_begin..inner_end].trim().to_string();
            let source_text = self.file.content[begin..self.pos].to_string();
            return JsToken {
                kind: JsTokenKind::Selector,
                text: inner,
                source_text,
                span: ParseSourceSpan::new(start, self.location()),
            };
        }

        if c == chars::MINUS && self.peek_at(1) == chars::GT {
            self.advance();
            self.advance();
            return self.token_from(JsTokenKind::Arrow, start, begin);
        }

        if c == chars::EQ && self.peek_at(1) == chars::GT {
            self.advance();
            self.advance();
            return self.token_from(JsTokenKind::FatArrow, start, begin);
        }

        if c == chars::SLASH && self.peek_at(1) == chars::SLASH {
            while self.peek() != chars::NEWLINE && !self.at_end() {
                self.advance();
            }
            return self.token_from(JsTokenKind::Comment, start, begin);
        }

        if c == chars::SLASH && self.peek_at(1) == chars::STAR {
            self.advance();
            self.advance();
            while !self.at_end() {
                if self.peek() == chars::STAR && self.peek_at(1) == chars::SLASH {
                    self.advance();
                    self.advance();
                    break;
                }
                self.advance();
            }
            return self.token_from(JsTokenKind::Comment, start, begin);
        }

        if chars::is_quote(c) || c == '`' {
            let quote = self.advance();
            while !self.at_end() {
                let n = self.peek();
                if n == chars::BACKSLASH {
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance();
                if n == quote {
                    break;
                }
            }
            return self.token_from(JsTokenKind::StringLit, start, begin);
        }

        if c.is_ascii_digit() {
            while self.peek().is_ascii_digit() || self.peek() == chars::PERIOD {
                self.advance();
            }
            return self.token_from(JsTokenKind::Number, start, begin);
        }

        if c.is_alphabetic() || c == chars::UNDERSCORE || c == '$' {
            while self.peek().is_alphanumeric() || self.peek() == chars::UNDERSCORE || self.peek() == '$' {
                self.advance();
            }
            return self.token_from(JsTokenKind::Ident, start, begin);
        }

        self.advance();
        self.token_from(JsTokenKind::Punct, start, begin)
    }
}
