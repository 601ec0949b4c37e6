//! CHTL tokenizer.
//!
//! Pull-based: the parser requests tokens one at a time, and asks for
//! [`Lexer::raw_block_body`] when it reaches a construct whose body is
//! captured verbatim (`script { ... }`, `[Origin] ... { ... }`).

use crate::chars;
use crate::diagnostics::{DiagnosticKind, DiagnosticsSink};
use crate::parse_util::{ParseError, ParseLocation, ParseSourceFile, ParseSourceSpan};

use super::tokens::{Token, TokenKind};

pub struct Lexer<'a> {
    file: ParseSourceFile,
    sink: &'a DiagnosticsSink,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(file: ParseSourceFile, sink: &'a DiagnosticsSink) -> Self {
        Lexer { file, sink, pos: 0, line: 0, col: 0 }
    }

    /// Tokenize from an offset within a larger file, so fragment contents keep
    /// their original positions.
    pub fn with_start(file: ParseSourceFile, sink: &'a DiagnosticsSink, offset: usize, line: usize, col: usize) -> Self {
        Lexer { file, sink, pos: offset, line, col }
    }

    fn peek(&self) -> char {
        self.file.content[self.pos..].chars().next().unwrap_or(chars::EOF)
    }

    fn peek_at(&self, lookahead: usize) -> char {
        self.file.content[self.pos..].chars().nth(lookahead).unwrap_or(chars::EOF)
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

    fn location(&self) -> ParseLocation {
        ParseLocation::new(self.file.clone(), self.pos, self.line, self.col)
    }

    fn span_from(&self, start: &ParseLocation) -> ParseSourceSpan {
        ParseSourceSpan::new(start.clone(), self.location())
    }

    fn error(&self, span: ParseSourceSpan, msg: String) {
        self.sink.report_parse_error(DiagnosticKind::Lexical, ParseError::new(span, msg));
    }

    fn at_end(&self) -> bool {
        self.pos >= self.file.content.len()
    }

    /// Skip whitespace and non-generator comments.
    fn skip_trivia(&mut self) {
        loop {
            while chars::is_whitespace(self.peek()) {
                self.advance();
            }
            if self.peek() == chars::SLASH && self.peek_at(1) == chars::SLASH {
                while self.peek() != chars::NEWLINE && !self.at_end() {
                    self.advance();
                }
                continue;
            }
            if self.peek() == chars::SLASH && self.peek_at(1) == chars::STAR {
                let start = self.location();
                self.advance();
                self.advance();
                let mut closed = false;
                while !self.at_end() {
                    if self.peek() == chars::STAR && self.peek_at(1) == chars::SLASH {
                        self.advance();
                        self.advance();
                        closed = true;
                        break;
                    }
                    self.advance();
                }
                if !closed {
                    self.error(self.span_from(&start), "unterminated block comment".to_string());
                }
                continue;
            }
            break;
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let start = self.location();
        let c = self.peek();

        if c == chars::EOF {
            return Token::new(TokenKind::Eof, String::new(), self.span_from(&start));
        }

        // Generator comment: `-- text` to end of line.
        if c == chars::MINUS && self.peek_at(1) == chars::MINUS {
            self.advance();
            self.advance();
            let text_start = self.pos;
            while self.peek() != chars::NEWLINE && !self.at_end() {
                self.advance();
            }
            let text = self.file.content[text_start..self.pos].trim().to_string();
            return Token::new(TokenKind::GeneratorComment, text, self.span_from(&start));
        }

        if chars::is_quote(c) {
            return self.string_literal(start);
        }

        if chars::is_digit(c) || (c == chars::MINUS && chars::is_digit(self.peek_at(1))) {
            return self.number(start);
        }

        if chars::is_ident_start(c) || (c == chars::MINUS && chars::is_ident_start(self.peek_at(1))) {
            return self.identifier(start);
        }

        if c == chars::LBRACKET {
            return self.bracket_block(start);
        }

        if c == chars::AT {
            return self.at_marker(start);
        }

        self.advance();
        let kind = match c {
            chars::LBRACE => TokenKind::LBrace,
            chars::RBRACE => TokenKind::RBrace,
            chars::RBRACKET => TokenKind::RBracket,
            chars::LPAREN => TokenKind::LParen,
            chars::RPAREN => TokenKind::RParen,
            chars::COLON => TokenKind::Colon,
            chars::SEMICOLON => TokenKind::Semicolon,
            chars::COMMA => TokenKind::Comma,
            chars::EQ => TokenKind::Equals,
            chars::PERIOD => TokenKind::Dot,
            chars::HASH => TokenKind::Hash,
            chars::AMPERSAND => TokenKind::Ampersand,
            chars::PERCENT => TokenKind::Percent,
            chars::MINUS => TokenKind::Minus,
            _ => {
                let span = self.span_from(&start);
                self.error(span.clone(), format!("unexpected character '{}'", c));
                return Token::new(TokenKind::UnquotedLiteral, c.to_string(), span);
            }
        };
        Token::new(kind, c.to_string(), self.span_from(&start))
    }

    fn string_literal(&mut self, start: ParseLocation) -> Token {
        let quote = self.advance();
        let mut value = String::new();
        loop {
            let c = self.peek();
            if c == chars::EOF || c == chars::NEWLINE {
                let span = self.span_from(&start);
                self.error(span.clone(), "unterminated string literal".to_string());
                return Token::new(TokenKind::StringLiteral, value, span);
            }
            if c == quote {
                self.advance();
                break;
            }
            if c == chars::BACKSLASH {
                self.advance();
                let escaped = self.advance();
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                continue;
            }
            value.push(self.advance());
        }
        Token::new(TokenKind::StringLiteral, value, self.span_from(&start))
    }

    fn number(&mut self, start: ParseLocation) -> Token {
        let begin = self.pos;
        if self.peek() == chars::MINUS {
            self.advance();
        }
        while chars::is_digit(self.peek()) {
            self.advance();
        }
        if self.peek() == chars::PERIOD && chars::is_digit(self.peek_at(1)) {
            self.advance();
            while chars::is_digit(self.peek()) {
                self.advance();
            }
        }
        let lexeme = self.file.content[begin..self.pos].to_string();
        Token::new(TokenKind::Number, lexeme, self.span_from(&start))
    }

    fn identifier(&mut self, start: ParseLocation) -> Token {
        let begin = self.pos;
        if self.peek() == chars::MINUS {
            self.advance();
        }
        while chars::is_ident_part(self.peek()) {
            self.advance();
        }
        let lexeme = self.file.content[begin..self.pos].to_string();
        Token::new(TokenKind::Identifier, lexeme, self.span_from(&start))
    }

    /// `[Template]`, `[Custom]`, ... — otherwise a plain `[` for index access.
    fn bracket_block(&mut self, start: ParseLocation) -> Token {
        let mut probe = self.pos + 1;
        let content = &self.file.content;
        let word_start = probe;
        while probe < content.len() {
            let c = content[probe..].chars().next().unwrap_or(chars::EOF);
            if !c.is_alphabetic() {
                break;
            }
            probe += c.len_utf8();
        }
        let word = &content[word_start..probe];
        let closes = content[probe..].chars().next() == Some(chars::RBRACKET);
        let kind = match word {
            "Template" if closes => Some(TokenKind::KwTemplate),
            "Custom" if closes => Some(TokenKind::KwCustom),
            "Origin" if closes => Some(TokenKind::KwOrigin),
            "Configuration" if closes => Some(TokenKind::KwConfiguration),
            "Namespace" if closes => Some(TokenKind::KwNamespace),
            "Import" if closes => Some(TokenKind::KwImport),
            "Info" if closes => Some(TokenKind::KwInfo),
            "Export" if closes => Some(TokenKind::KwExport),
            _ => None,
        };
        match kind {
            Some(kind) => {
                let lexeme = format!("[{}]", word);
                for _ in 0..lexeme.chars().count() {
                    self.advance();
                }
                Token::new(kind, lexeme, self.span_from(&start))
            }
            None => {
                self.advance();
                Token::new(TokenKind::LBracket, "[".to_string(), self.span_from(&start))
            }
        }
    }

    fn at_marker(&mut self, start: ParseLocation) -> Token {
        self.advance();
        let name_start = self.pos;
        while chars::is_ident_part(self.peek()) {
            self.advance();
        }
        let name = &self.file.content[name_start..self.pos];
        let kind = match name {
            "Style" => TokenKind::AtStyle,
            "Element" => TokenKind::AtElement,
            "Var" => TokenKind::AtVar,
            "Html" => TokenKind::AtHtml,
            "JavaScript" => TokenKind::AtJavaScript,
            "Chtl" => TokenKind::AtChtl,
            "CJmod" => TokenKind::AtCJmod,
            "" => {
                let span = self.span_from(&start);
                self.error(span.clone(), "expected a name after '@'".to_string());
                return Token::new(TokenKind::AtIdentifier, "@".to_string(), span);
            }
            _ => TokenKind::AtIdentifier,
        };
        Token::new(kind, format!("@{}", name), self.span_from(&start))
    }

    /// Capture everything up to (and consuming) the `}` matching an already
    /// consumed `{`. Braces inside strings and comments do not count.
    pub fn raw_block_body(&mut self) -> (String, ParseSourceSpan) {
        let start = self.location();
        let begin = self.pos;
        let mut depth = 0usize;
        let mut end = self.pos;
        loop {
            let c = self.peek();
            if c == chars::EOF {
                let span = self.span_from(&start);
                self.error(span.clone(), "unterminated raw block".to_string());
                return (self.file.content[begin..self.pos].to_string(), span);
            }
            if chars::is_quote(c) {
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
                continue;
            }
            if c == chars::SLASH && self.peek_at(1) == chars::SLASH {
                while self.peek() != chars::NEWLINE && !self.at_end() {
                    self.advance();
                }
                continue;
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
                continue;
            }
            if c == chars::LBRACE {
                depth += 1;
            } else if c == chars::RBRACE {
                if depth == 0 {
                    end = self.pos;
                    self.advance();
                    break;
                }
                depth -= 1;
            }
            self.advance();
        }
        let span = ParseSourceSpan::new(start, ParseLocation::new(self.file.clone(), end, self.line, self.col));
        (self.file.content[begin..end].to_string(), span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<(TokenKind, String)> {
        let sink = DiagnosticsSink::new();
        let file = ParseSourceFile::new(source.to_string(), "test.chtl".to_string());
        let mut lexer = Lexer::new(file, &sink);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.kind == TokenKind::Eof;
            out.push((token.kind, token.lexeme));
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn lexes_element_shell() {
        let tokens = lex("div { }");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Identifier, "div".to_string()),
                (TokenKind::LBrace, "{".to_string()),
                (TokenKind::RBrace, "}".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn lexes_keyword_blocks_and_markers() {
        let tokens = lex("[Template] @Style Theme");
        assert_eq!(tokens[0].0, TokenKind::KwTemplate);
        assert_eq!(tokens[1], (TokenKind::AtStyle, "@Style".to_string()));
        assert_eq!(tokens[2], (TokenKind::Identifier, "Theme".to_string()));
    }

    #[test]
    fn unknown_at_marker_is_identifier_kind() {
        let tokens = lex("@Vue");
        assert_eq!(tokens[0], (TokenKind::AtIdentifier, "@Vue".to_string()));
    }

    #[test]
    fn plain_bracket_is_index_access() {
        let tokens = lex("div[0]");
        assert_eq!(tokens[1].0, TokenKind::LBracket);
        assert_eq!(tokens[2], (TokenKind::Number, "0".to_string()));
        assert_eq!(tokens[3].0, TokenKind::RBracket);
    }

    #[test]
    fn skips_comments_keeps_generator_comment() {
        let tokens = lex("// skip\n/* skip */ -- keep me\ndiv");
        assert_eq!(tokens[0], (TokenKind::GeneratorComment, "keep me".to_string()));
        assert_eq!(tokens[1], (TokenKind::Identifier, "div".to_string()));
    }

    #[test]
    fn string_escapes() {
        let tokens = lex(r#""a\"b""#);
        assert_eq!(tokens[0], (TokenKind::StringLiteral, "a\"b".to_string()));
    }

    #[test]
    fn negative_number_and_compound_identifier() {
        let tokens = lex("margin-top : -5");
        assert_eq!(tokens[0], (TokenKind::Identifier, "margin-top".to_string()));
        assert_eq!(tokens[1].0, TokenKind::Colon);
        assert_eq!(tokens[2], (TokenKind::Number, "-5".to_string()));
    }

    #[test]
    fn raw_block_body_balances_braces() {
        let sink = DiagnosticsSink::new();
        let file = ParseSourceFile::new("{ if (x) { y(); } } tail".to_string(), "t".to_string());
        let mut lexer = Lexer::new(file, &sink);
        assert_eq!(lexer.next_token().kind, TokenKind::LBrace);
        let (body, _) = lexer.raw_block_body();
        assert_eq!(body, " if (x) { y(); } ");
        assert_eq!(lexer.next_token().lexeme, "tail");
    }

    #[test]
    fn raw_block_ignores_braces_in_strings() {
        let sink = DiagnosticsSink::new();
        let file = ParseSourceFile::new("{ var s = \"}\"; }".to_string(), "t".to_string());
        let mut lexer = Lexer::new(file, &sink);
        lexer.next_token();
        let (body, _) = lexer.raw_block_body();
        assert_eq!(body, " var s = \"}\"; ");
        assert!(sink.is_empty());
    }
}
