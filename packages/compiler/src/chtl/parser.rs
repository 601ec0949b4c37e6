//! Recursive-descent parser for CHTL fragments.
//!
//! Parse errors are non-fatal: each mismatch is reported to the sink and the
//! parser resynchronizes at the next `;` or matching `}` and keeps going, so
//! a single run surfaces as many errors as possible. Declarations
//! self-register into the global symbol map as they are parsed.

use std::collections::VecDeque;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::config::{ConfigurationSet, Deadline, SettingValue};
use crate::diagnostics::{DiagnosticKind, DiagnosticsSink, Phase};
use crate::parse_util::{ParseError, ParseSourceFile, ParseSourceSpan};
use crate::symbols::{qualify, GlobalKind, GlobalObject, GlobalSymbolMap};

use super::ast::*;
use super::lexer::Lexer;
use super::style_value;
use super::tokens::{Token, TokenKind};

/// Whether a `delete` statement appears among properties or among children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpContext {
    Style,
    Element,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    sink: &'a DiagnosticsSink,
    map: Option<&'a GlobalSymbolMap>,
    file: ParseSourceFile,
    lookahead: VecDeque<Token>,
    namespace_stack: Vec<String>,
    deadline: Option<Deadline>,
    timed_out: bool,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, url: &str, sink: &'a DiagnosticsSink) -> Self {
        let file = ParseSourceFile::new(source.to_string(), url.to_string());
        Parser {
            lexer: Lexer::new(file.clone(), sink),
            sink,
            map: None,
            file,
            lookahead: VecDeque::new(),
            namespace_stack: Vec::new(),
            deadline: None,
            timed_out: false,
        }
    }

    /// Parse a fragment that starts at a known offset of a larger file, so
    /// every span refers to the original source position.
    pub fn for_fragment(
        file: ParseSourceFile,
        offset: usize,
        line: usize,
        col: usize,
        sink: &'a DiagnosticsSink,
    ) -> Self {
        Parser {
            lexer: Lexer::with_start(file.clone(), sink, offset, line, col),
            sink,
            map: None,
            file,
            lookahead: VecDeque::new(),
            namespace_stack: Vec::new(),
            deadline: None,
            timed_out: false,
        }
    }

    pub fn with_symbol_map(mut self, map: &'a GlobalSymbolMap) -> Self {
        self.map = Some(map);
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Qualify every declaration in this file under a namespace prefix;
    /// used when an import splices a module into the tree.
    pub fn with_initial_namespace(mut self, namespace: Vec<String>) -> Self {
        self.namespace_stack = namespace;
        self
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn parse(mut self) -> Root {
        let start = self.peek().span.start.clone();
        let children = self.parse_top_level(false);
        let end = self.peek().span.end.clone();
        Root { children, span: ParseSourceSpan::new(start, end) }
    }

    /// Entry point for style-only content (global `style { ... }` fragments).
    pub fn parse_style_content(mut self) -> Vec<Node> {
        self.parse_style_children(TokenKind::Eof)
    }

    // ---- token plumbing -------------------------------------------------

    fn fill(&mut self, n: usize) {
        while self.lookahead.len() <= n {
            let token = self.lexer.next_token();
            self.lookahead.push_back(token);
        }
    }

    fn peek(&mut self) -> &Token {
        self.fill(0);
        &self.lookahead[0]
    }

    fn peek_at(&mut self, n: usize) -> &Token {
        self.fill(n);
        &self.lookahead[n]
    }

    fn bump(&mut self) -> Token {
        self.fill(0);
        self.lookahead.pop_front().unwrap()
    }

    fn at(&mut self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            let token = self.peek().clone();
            self.error(
                token.span.clone(),
                format!("expected {} but found '{}'", what, printable(&token)),
            );
            None
        }
    }

    fn error(&self, span: ParseSourceSpan, msg: String) {
        self.sink
            .report_parse_error(DiagnosticKind::Parse, ParseError::new(span, msg));
    }

    /// Capture a raw `{ ... }` body straight from the lexer. Callers must not
    /// have peeked past the opening brace.
    fn raw_body(&mut self) -> (String, ParseSourceSpan) {
        debug_assert!(self.lookahead.is_empty());
        self.lexer.raw_block_body()
    }

    /// Skip to the next `;` (consumed) or `}` / EOF (left in place),
    /// stepping over balanced blocks.
    fn resync_statement(&mut self) {
        loop {
            match self.peek().kind {
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                TokenKind::RBrace | TokenKind::Eof => return,
                TokenKind::LBrace => self.skip_balanced_block(),
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_balanced_block(&mut self) {
        self.bump();
        let mut depth = 1usize;
        loop {
            match self.peek().kind {
                TokenKind::LBrace => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RBrace => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn deadline_expired(&mut self) -> bool {
        if self.timed_out {
            return true;
        }
        if let Some(deadline) = &self.deadline {
            if deadline.check(Phase::Dispatch).is_err() {
                self.timed_out = true;
                return true;
            }
        }
        false
    }

    // ---- top level ------------------------------------------------------

    fn parse_top_level(&mut self, stop_at_rbrace: bool) -> Vec<Node> {
        let mut nodes = Vec::new();
        loop {
            if self.deadline_expired() {
                break;
            }
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::RBrace if stop_at_rbrace => break,
                TokenKind::RBrace => {
                    let token = self.bump();
                    self.error(token.span, "unmatched '}'".to_string());
                }
                TokenKind::GeneratorComment => nodes.push(self.parse_generator_comment()),
                TokenKind::KwTemplate => {
                    if let Some(node) = self.parse_template_decl(false) {
                        nodes.push(node);
                    }
                }
                TokenKind::KwCustom => {
                    if let Some(node) = self.parse_template_decl(true) {
                        nodes.push(node);
                    }
                }
                TokenKind::KwOrigin => {
                    if let Some(node) = self.parse_origin() {
                        nodes.push(node);
                    }
                }
                TokenKind::KwConfiguration => {
                    if let Some(node) = self.parse_configuration() {
                        nodes.push(node);
                    }
                }
                TokenKind::KwNamespace => {
                    if let Some(node) = self.parse_namespace() {
                        nodes.push(node);
                    }
                }
                TokenKind::KwImport => {
                    if let Some(node) = self.parse_import() {
                        nodes.push(node);
                    }
                }
                kind if kind.is_at_marker() => {
                    if let Some(node) = self.parse_reference(None) {
                        nodes.push(node);
                    }
                }
                TokenKind::Identifier => {
                    if self.peek().is_ident("use") && self.peek_at(1).kind == TokenKind::Identifier {
                        nodes.push(self.parse_use());
                    } else if self.peek().is_ident("style") && self.peek_at(1).kind == TokenKind::LBrace {
                        nodes.push(self.parse_style_block(false));
                    } else if self.peek().is_ident("script") && self.peek_at(1).kind == TokenKind::LBrace {
                        nodes.push(self.parse_script_block(false));
                    } else if self.peek().is_ident("except") {
                        nodes.push(self.parse_constraint());
                    } else if self.peek_at(1).kind == TokenKind::LBrace {
                        nodes.push(self.parse_element());
                    } else {
                        let token = self.bump();
                        self.error(
                            token.span,
                            format!("unexpected '{}' at top level", token.lexeme),
                        );
                        self.resync_statement();
                    }
                }
                _ => {
                    let token = self.bump();
                    let msg = format!("unexpected '{}' at top level", printable(&token));
                    self.error(token.span, msg);
                    self.resync_statement();
                }
            }
        }
        nodes
    }

    fn parse_generator_comment(&mut self) -> Node {
        let token = self.bump();
        Node::Comment(Comment {
            kind: CommentKind::Generator,
            text: token.lexeme,
            span: token.span,
        })
    }

    fn parse_use(&mut self) -> Node {
        let kw = self.bump();
        let target = self.bump();
        let span = ParseSourceSpan::new(kw.span.start, target.span.end.clone());
        self.expect(TokenKind::Semicolon, "';' after use statement");
        Node::Use(UseStatement { target: target.lexeme, span })
    }

    // ---- elements -------------------------------------------------------

    fn parse_element(&mut self) -> Node {
        let tag = self.bump();
        self.expect(TokenKind::LBrace, "'{' after element name");
        let mut attributes = Vec::new();
        let children = self.parse_element_content(&mut attributes);
        let end = self.peek().span.start.clone();
        Node::Element(Element {
            tag: tag.lexeme,
            attributes,
            children,
            span: ParseSourceSpan::new(tag.span.start, end),
        })
    }

    /// Body of an element (also used for `[Template] @Element` bodies and
    /// insertion bodies). Consumes the closing `}`.
    fn parse_element_content(&mut self, attributes: &mut Vec<Attribute>) -> Vec<Node> {
        let mut children = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::RBrace => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => {
                    let span = self.peek().span.clone();
                    self.error(span, "unclosed element body".to_string());
                    break;
                }
                TokenKind::Semicolon => {
                    self.bump();
                }
                TokenKind::GeneratorComment => children.push(self.parse_generator_comment()),
                TokenKind::KwTemplate | TokenKind::KwCustom => {
                    let is_custom = self.peek().kind == TokenKind::KwCustom;
                    self.bump();
                    if let Some(node) = self.parse_reference(Some(is_custom)) {
                        children.push(node);
                    }
                }
                TokenKind::KwOrigin => {
                    if let Some(node) = self.parse_origin() {
                        children.push(node);
                    }
                }
                kind if kind.is_at_marker() => {
                    if let Some(node) = self.parse_reference(None) {
                        children.push(node);
                    }
                }
                TokenKind::Identifier => {
                    if self.peek().is_ident("text") && self.peek_at(1).kind == TokenKind::LBrace {
                        children.push(self.parse_text_block());
                    } else if self.peek().is_ident("style") && self.peek_at(1).kind == TokenKind::LBrace {
                        children.push(self.parse_style_block(true));
                    } else if self.peek().is_ident("script") && self.peek_at(1).kind == TokenKind::LBrace {
                        children.push(self.parse_script_block(true));
                    } else if self.peek().is_ident("delete") {
                        children.push(self.parse_deletion(OpContext::Element));
                    } else if self.peek().is_ident("insert") {
                        children.push(self.parse_insertion());
                    } else if self.peek().is_ident("inherit") {
                        if let Some(node) = self.parse_inheritance() {
                            children.push(node);
                        }
                    } else if self.peek().is_ident("except") {
                        children.push(self.parse_constraint());
                    } else {
                        match self.peek_at(1).kind {
                            TokenKind::Colon | TokenKind::Equals => {
                                if let Some(attr) = self.parse_attribute() {
                                    attributes.push(attr);
                                }
                            }
                            TokenKind::LBrace => children.push(self.parse_element()),
                            _ => {
                                let token = self.bump();
                                self.error(
                                    token.span,
                                    format!("unexpected '{}' in element body", token.lexeme),
                                );
                                self.resync_statement();
                            }
                        }
                    }
                }
                _ => {
                    let token = self.bump();
                    let msg = format!("unexpected '{}' in element body", printable(&token));
                    self.error(token.span, msg);
                    self.resync_statement();
                }
            }
        }
        children
    }

    fn parse_attribute(&mut self) -> Option<Attribute> {
        let name = self.bump();
        let sep = self.bump();
        let assigned_with_equals = sep.kind == TokenKind::Equals;
        let mut value_tokens = Vec::new();
        while !matches!(
            self.peek().kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            value_tokens.push(self.bump());
        }
        self.eat(TokenKind::Semicolon);
        let value = if value_tokens.len() == 1 && value_tokens[0].kind == TokenKind::StringLiteral {
            value_tokens[0].lexeme.clone()
        } else {
            style_value::join_tokens(&value_tokens)
        };
        let end = value_tokens
            .last()
            .map(|t| t.span.end.clone())
            .unwrap_or_else(|| name.span.end.clone());
        Some(Attribute {
            name: name.lexeme,
            value,
            assigned_with_equals,
            span: ParseSourceSpan::new(name.span.start, end),
        })
    }

    fn parse_text_block(&mut self) -> Node {
        let kw = self.bump();
        self.expect(TokenKind::LBrace, "'{' after text");
        let mut pieces = Vec::new();
        let mut all_literal = true;
        while !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Eof) {
            let token = self.bump();
            if token.kind != TokenKind::StringLiteral {
                all_literal = false;
            }
            pieces.push(token.lexeme);
        }
        let end = self.peek().span.start.clone();
        self.expect(TokenKind::RBrace, "'}' closing text block");
        Node::Text(Text {
            content: pieces.join(" "),
            literal: all_literal && !pieces.is_empty(),
            span: ParseSourceSpan::new(kw.span.start, end),
        })
    }

    fn parse_script_block(&mut self, local: bool) -> Node {
        let kw = self.bump();
        if self.expect(TokenKind::LBrace, "'{' after script").is_none() {
            return Node::ScriptBlock(ScriptBlock {
                local,
                raw: String::new(),
                span: kw.span,
            });
        }
        let (raw, span) = self.raw_body();
        Node::ScriptBlock(ScriptBlock {
            local,
            raw,
            span: ParseSourceSpan::new(kw.span.start, span.end),
        })
    }

    // ---- style blocks ---------------------------------------------------

    fn parse_style_block(&mut self, local: bool) -> Node {
        let kw = self.bump();
        self.expect(TokenKind::LBrace, "'{' after style");
        let children = self.parse_style_children(TokenKind::RBrace);
        let end = self.peek().span.start.clone();
        self.eat(TokenKind::RBrace);
        Node::StyleBlock(StyleBlock {
            local,
            children,
            span: ParseSourceSpan::new(kw.span.start, end),
        })
    }

    /// Children of a style block, terminated by `stop` (not consumed).
    fn parse_style_children(&mut self, stop: TokenKind) -> Vec<Node> {
        let mut children = Vec::new();
        loop {
            let kind = self.peek().kind;
            if kind == stop || kind == TokenKind::Eof {
                break;
            }
            match kind {
                TokenKind::Semicolon => {
                    self.bump();
                }
                TokenKind::GeneratorComment => children.push(self.parse_generator_comment()),
                TokenKind::Dot | TokenKind::Hash | TokenKind::Ampersand | TokenKind::Colon => {
                    children.push(Node::Selector(self.parse_selector()));
                }
                kind if kind.is_at_marker() => {
                    if let Some(node) = self.parse_reference(None) {
                        children.push(node);
                    }
                }
                TokenKind::KwTemplate | TokenKind::KwCustom => {
                    let is_custom = kind == TokenKind::KwCustom;
                    self.bump();
                    if let Some(node) = self.parse_reference(Some(is_custom)) {
                        children.push(node);
                    }
                }
                TokenKind::Identifier => {
                    if self.peek().is_ident("delete") {
                        children.push(self.parse_deletion(OpContext::Style));
                    } else if self.peek().is_ident("inherit") {
                        if let Some(node) = self.parse_inheritance() {
                            children.push(node);
                        }
                    } else if self.peek_at(1).kind == TokenKind::LBrace {
                        children.push(Node::Selector(self.parse_selector()));
                    } else if matches!(self.peek_at(1).kind, TokenKind::Colon | TokenKind::Equals) {
                        if let Some(property) = self.parse_property() {
                            children.push(Node::Property(property));
                        }
                    } else {
                        let token = self.bump();
                        self.error(
                            token.span,
                            format!("unexpected '{}' in style block", token.lexeme),
                        );
                        self.resync_statement();
                    }
                }
                _ => {
                    let token = self.bump();
                    let msg = format!("unexpected '{}' in style block", printable(&token));
                    self.error(token.span, msg);
                    self.resync_statement();
                }
            }
        }
        children
    }

    fn parse_selector(&mut self) -> Selector {
        let start_token = self.peek().clone();
        let (kind, text) = self.parse_selector_text();
        let mut properties = Vec::new();
        let mut nested = Vec::new();
        self.expect(TokenKind::LBrace, "'{' after selector");
        loop {
            match self.peek().kind {
                TokenKind::RBrace => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => {
                    let span = self.peek().span.clone();
                    self.error(span, "unclosed selector body".to_string());
                    break;
                }
                TokenKind::Semicolon => {
                    self.bump();
                }
                TokenKind::Dot | TokenKind::Hash | TokenKind::Ampersand | TokenKind::Colon => {
                    nested.push(self.parse_selector());
                }
                TokenKind::Identifier => {
                    if self.peek_at(1).kind == TokenKind::LBrace {
                        nested.push(self.parse_selector());
                    } else if let Some(property) = self.parse_property() {
                        properties.push(property);
                    }
                }
                _ => {
                    let token = self.bump();
                    let msg = format!("unexpected '{}' in selector body", printable(&token));
                    self.error(token.span, msg);
                    self.resync_statement();
                }
            }
        }
        let end = self.peek().span.start.clone();
        Selector {
            kind,
            text,
            properties,
            nested,
            span: ParseSourceSpan::new(start_token.span.start, end),
        }
    }

    fn parse_selector_text(&mut self) -> (SelectorKind, String) {
        match self.peek().kind {
            TokenKind::Dot => {
                self.bump();
                let name = self
                    .expect(TokenKind::Identifier, "class name after '.'")
                    .map(|t| t.lexeme)
                    .unwrap_or_default();
                (SelectorKind::Class, format!(".{}", name))
            }
            TokenKind::Hash => {
                self.bump();
                let name = match self.peek().kind {
                    TokenKind::Identifier | TokenKind::Number => self.bump().lexeme,
                    _ => {
                        let span = self.peek().span.clone();
                        self.error(span, "expected id after '#'".to_string());
                        String::new()
                    }
                };
                (SelectorKind::Id, format!("#{}", name))
            }
            TokenKind::Ampersand => {
                self.bump();
                let mut text = String::from("&");
                while self.at(TokenKind::Colon) {
                    text.push(':');
                    self.bump();
                    if self.at(TokenKind::Colon) {
                        text.push(':');
                        self.bump();
                    }
                    if let Some(token) = self.eat(TokenKind::Identifier) {
                        text.push_str(&token.lexeme);
                    }
                }
                (SelectorKind::Ampersand, text)
            }
            TokenKind::Colon => {
                self.bump();
                let double = self.eat(TokenKind::Colon).is_some();
                let name = self
                    .expect(TokenKind::Identifier, "pseudo selector name")
                    .map(|t| t.lexeme)
                    .unwrap_or_default();
                if double {
                    (SelectorKind::PseudoElement, format!("::{}", name))
                } else {
                    (SelectorKind::PseudoClass, format!(":{}", name))
                }
            }
            _ => {
                let token = self.bump();
                (SelectorKind::Element, token.lexeme)
            }
        }
    }

    fn parse_property(&mut self) -> Option<Property> {
        let name = self.bump();
        let sep = self.bump();
        let assigned_with_equals = sep.kind == TokenKind::Equals;
        let segments = self.parse_value_segments();
        let end = self.peek().span.start.clone();
        self.eat(TokenKind::Semicolon);
        Some(Property {
            name: name.lexeme,
            segments,
            assigned_with_equals,
            span: ParseSourceSpan::new(name.span.start, end),
        })
    }

    fn parse_value_segments(&mut self) -> Vec<ValueSegment> {
        let mut segments = Vec::new();
        let mut run: Vec<Token> = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => break,
                TokenKind::Identifier => {
                    if let Some(name) = self.try_call_name() {
                        if !run.is_empty() {
                            segments.push(ValueSegment::Text(style_value::join_tokens(&run)));
                            run.clear();
                        }
                        segments.push(self.parse_call_segment(name));
                    } else {
                        run.push(self.bump());
                    }
                }
                _ => run.push(self.bump()),
            }
        }
        if !run.is_empty() {
            segments.push(ValueSegment::Text(style_value::join_tokens(&run)));
        }
        segments
    }

    /// Match `name(.name)* (` without consuming anything unless the whole
    /// pattern is present; returns the dotted name.
    fn try_call_name(&mut self) -> Option<String> {
        let mut n = 1;
        loop {
            let kind = self.peek_at(n).kind;
            if kind == TokenKind::Dot && self.peek_at(n + 1).kind == TokenKind::Identifier {
                n += 2;
                continue;
            }
            if kind == TokenKind::LParen {
                break;
            }
            return None;
        }
        let mut name = String::new();
        for _ in 0..n {
            name.push_str(&self.bump().lexeme);
        }
        Some(name)
    }

    fn parse_call_segment(&mut self, name: String) -> ValueSegment {
        self.expect(TokenKind::LParen, "'('");
        let mut args = Vec::new();
        let mut arg_run: Vec<Token> = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::RParen => {
                    self.bump();
                    break;
                }
                TokenKind::Comma => {
                    self.bump();
                    args.push(style_value::join_tokens(&arg_run));
                    arg_run.clear();
                }
                TokenKind::Eof => {
                    let span = self.peek().span.clone();
                    self.error(span, "unterminated call in property value".to_string());
                    break;
                }
                _ => arg_run.push(self.bump()),
            }
        }
        if !arg_run.is_empty() {
            args.push(style_value::join_tokens(&arg_run));
        }
        ValueSegment::Call { name, args }
    }

    // ---- references and operators --------------------------------------

    /// `@Style Name;`, `@Element Box from space { ...specialization... };`
    /// `explicit` carries the `[Template]`/`[Custom]` prefix when present.
    fn parse_reference(&mut self, explicit: Option<bool>) -> Option<Node> {
        let marker = self.bump();
        let kind = match marker.kind {
            TokenKind::AtStyle => RefKind::Style,
            TokenKind::AtElement => RefKind::Element,
            TokenKind::AtVar => RefKind::Var,
            _ => {
                self.error(
                    marker.span,
                    format!("'{}' cannot be used as a reference here", marker.lexeme),
                );
                self.resync_statement();
                return None;
            }
        };
        let name = self.parse_dotted_name()?;
        let mut namespace = None;
        if self.peek().is_ident("from") {
            self.bump();
            namespace = self.parse_dotted_name();
        }
        let mut specializations = Vec::new();
        if self.at(TokenKind::LBrace) {
            self.bump();
            match kind {
                RefKind::Element => {
                    let mut ignored_attrs = Vec::new();
                    specializations = self.parse_element_content(&mut ignored_attrs);
                }
                _ => {
                    specializations = self.parse_style_children(TokenKind::RBrace);
                    self.eat(TokenKind::RBrace);
                }
            }
        }
        let end = self.peek().span.start.clone();
        self.eat(TokenKind::Semicolon);
        let reference = Reference {
            kind,
            name,
            namespace,
            fully_qualified: explicit.is_some(),
            specializations,
            span: ParseSourceSpan::new(marker.span.start, end),
        };
        Some(match explicit {
            Some(true) => Node::CustomRef(reference),
            Some(false) => Node::TemplateRef(reference),
            None => Node::TemplateRef(reference),
        })
    }

    fn parse_dotted_name(&mut self) -> Option<String> {
        let first = self.expect(TokenKind::Identifier, "a name")?;
        let mut name = first.lexeme;
        while self.at(TokenKind::Dot) && self.peek_at(1).kind == TokenKind::Identifier {
            self.bump();
            name.push('.');
            name.push_str(&self.bump().lexeme);
        }
        Some(name)
    }

    fn parse_op_target(&mut self) -> Option<OpTarget> {
        if self.peek().kind.is_at_marker() {
            let marker = self.bump();
            let ref_kind = match marker.kind {
                TokenKind::AtStyle => Some(RefKind::Style),
                TokenKind::AtElement => Some(RefKind::Element),
                TokenKind::AtVar => Some(RefKind::Var),
                _ => None,
            };
            let name = self.parse_dotted_name()?;
            return Some(OpTarget { name, index: None, ref_kind });
        }
        let name = self.expect(TokenKind::Identifier, "a deletion/insertion target")?;
        let mut index = None;
        if self.at(TokenKind::LBracket) {
            self.bump();
            if let Some(number) = self.expect(TokenKind::Number, "an index") {
                index = number.lexeme.parse::<usize>().ok();
            }
            self.expect(TokenKind::RBracket, "']'");
        }
        Some(OpTarget { name: name.lexeme, index, ref_kind: None })
    }

    fn parse_deletion(&mut self, context: OpContext) -> Node {
        let kw = self.bump();
        let mut targets = Vec::new();
        loop {
            if let Some(target) = self.parse_op_target() {
                targets.push(target);
            } else {
                self.resync_statement();
                break;
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        let end = self.peek().span.start.clone();
        self.eat(TokenKind::Semicolon);
        let has_ref = targets.iter().any(|t| t.ref_kind.is_some());
        let kind = match (context, has_ref) {
            (OpContext::Style, false) => DeletionKind::Property,
            (OpContext::Style, true) => DeletionKind::Inheritance,
            (OpContext::Element, false) => DeletionKind::Element,
            (OpContext::Element, true) => DeletionKind::ElementInheritance,
        };
        Node::Deletion(Deletion {
            kind,
            targets,
            span: ParseSourceSpan::new(kw.span.start, end),
        })
    }

    fn parse_insertion(&mut self) -> Node {
        let kw = self.bump();
        let position_token = self.bump();
        let (position, target) = match position_token.lexeme.as_str() {
            "after" => (InsertPosition::After, self.parse_op_target()),
            "before" => (InsertPosition::Before, self.parse_op_target()),
            "replace" => (InsertPosition::Replace, self.parse_op_target()),
            "at" => {
                let place = self.bump();
                let position = match place.lexeme.as_str() {
                    "top" => InsertPosition::AtTop,
                    "bottom" => InsertPosition::AtBottom,
                    other => {
                        self.error(
                            place.span.clone(),
                            format!("expected 'top' or 'bottom' after 'insert at', found '{}'", other),
                        );
                        InsertPosition::AtBottom
                    }
                };
                (position, None)
            }
            other => {
                self.error(
                    position_token.span.clone(),
                    format!("unknown insertion position '{}'", other),
                );
                (InsertPosition::AtBottom, None)
            }
        };
        self.expect(TokenKind::LBrace, "'{' starting insertion body");
        let mut ignored_attrs = Vec::new();
        let body = self.parse_element_content(&mut ignored_attrs);
        let end = self.peek().span.start.clone();
        self.eat(TokenKind::Semicolon);
        Node::Insertion(Insertion {
            position,
            target,
            body,
            span: ParseSourceSpan::new(kw.span.start, end),
        })
    }

    fn parse_inheritance(&mut self) -> Option<Node> {
        let kw = self.bump();
        let marker = self.bump();
        let target_kind = match marker.kind {
            TokenKind::AtStyle => RefKind::Style,
            TokenKind::AtElement => RefKind::Element,
            TokenKind::AtVar => RefKind::Var,
            _ => {
                self.error(
                    marker.span,
                    "inherit expects @Style, @Element or @Var".to_string(),
                );
                self.resync_statement();
                return None;
            }
        };
        let target_name = self.parse_dotted_name()?;
        let mut namespace = None;
        if self.peek().is_ident("from") {
            self.bump();
            namespace = self.parse_dotted_name();
        }
        let end = self.peek().span.start.clone();
        self.expect(TokenKind::Semicolon, "';' after inherit");
        Some(Node::Inheritance(Inheritance {
            target_kind,
            target_name,
            namespace,
            explicit: true,
            span: ParseSourceSpan::new(kw.span.start, end),
        }))
    }

    fn parse_constraint(&mut self) -> Node {
        let kw = self.bump();
        let mut targets = Vec::new();
        loop {
            match self.peek().kind {
                kind if kind.is_at_marker() => targets.push(self.bump().lexeme),
                TokenKind::Identifier => targets.push(self.bump().lexeme),
                _ => break,
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        let end = self.peek().span.start.clone();
        self.expect(TokenKind::Semicolon, "';' after except");
        Node::Constraint(Constraint {
            kind: ConstraintKind::Except,
            targets,
            span: ParseSourceSpan::new(kw.span.start, end),
        })
    }

    // ---- declarations ---------------------------------------------------

    fn parse_template_decl(&mut self, is_custom: bool) -> Option<Node> {
        let kw = self.bump();
        let marker = self.bump();
        let kind = match marker.kind {
            TokenKind::AtStyle => DeclKind::Style,
            TokenKind::AtElement => DeclKind::Element,
            TokenKind::AtVar => DeclKind::Var,
            _ => {
                self.error(
                    marker.span,
                    format!("'{}' is not a template kind", marker.lexeme),
                );
                self.resync_statement();
                return None;
            }
        };
        let name = self.expect(TokenKind::Identifier, "template name")?.lexeme;

        // `[Custom] @Element Box;` (or `... from ns`) at top level is an
        // explicitly qualified reference, not a declaration. A declaration
        // always opens its body brace directly after the name.
        if !self.at(TokenKind::LBrace) {
            let mut namespace = None;
            if self.peek().is_ident("from") {
                self.bump();
                namespace = self.parse_dotted_name();
            }
            let mut specializations = Vec::new();
            if self.at(TokenKind::LBrace) {
                self.bump();
                match kind {
                    DeclKind::Element => {
                        let mut ignored_attrs = Vec::new();
                        specializations = self.parse_element_content(&mut ignored_attrs);
                    }
                    _ => {
                        specializations = self.parse_style_children(TokenKind::RBrace);
                        self.eat(TokenKind::RBrace);
                    }
                }
            }
            let end = self.peek().span.start.clone();
            self.eat(TokenKind::Semicolon);
            let reference = Reference {
                kind: match kind {
                    DeclKind::Style => RefKind::Style,
                    DeclKind::Element => RefKind::Element,
                    DeclKind::Var => RefKind::Var,
                },
                name,
                namespace,
                fully_qualified: true,
                specializations,
                span: ParseSourceSpan::new(kw.span.start, end),
            };
            return Some(if is_custom {
                Node::CustomRef(reference)
            } else {
                Node::TemplateRef(reference)
            });
        }

        self.expect(TokenKind::LBrace, "'{' starting template body");
        let mut body = match kind {
            DeclKind::Element => {
                let mut ignored_attrs = Vec::new();
                self.parse_element_content(&mut ignored_attrs)
            }
            DeclKind::Style | DeclKind::Var => {
                let children = self.parse_style_children(TokenKind::RBrace);
                self.eat(TokenKind::RBrace);
                children
            }
        };
        let end = self.peek().span.start.clone();
        let span = ParseSourceSpan::new(kw.span.start, end);

        // Hoist explicit inherit statements into the declaration header.
        let mut inherits: SmallVec<[Reference; 2]> = SmallVec::new();
        body.retain(|node| match node {
            Node::Inheritance(inh) if inh.explicit => {
                inherits.push(Reference {
                    kind: inh.target_kind,
                    name: inh.target_name.clone(),
                    namespace: inh.namespace.clone(),
                    fully_qualified: false,
                    specializations: Vec::new(),
                    span: inh.span.clone(),
                });
                false
            }
            _ => true,
        });

        let node = if is_custom {
            Node::Custom(CustomDecl { kind, name: name.clone(), inherits, body, span: span.clone() })
        } else {
            Node::Template(TemplateDecl { kind, name: name.clone(), inherits, body, span: span.clone() })
        };
        let global_kind = if is_custom {
            GlobalKind::custom(kind)
        } else {
            GlobalKind::template(kind)
        };
        self.register(global_kind, &name, &node, &span);
        Some(node)
    }

    fn parse_origin(&mut self) -> Option<Node> {
        let kw = self.bump();
        let marker = self.bump();
        let kind = match marker.kind {
            TokenKind::AtHtml => OriginKind::Html,
            TokenKind::AtStyle => OriginKind::Style,
            TokenKind::AtJavaScript => OriginKind::JavaScript,
            TokenKind::AtIdentifier => OriginKind::Custom(marker.at_name().to_string()),
            _ => {
                self.error(
                    marker.span,
                    format!("'{}' is not an origin kind", marker.lexeme),
                );
                self.resync_statement();
                return None;
            }
        };
        let name = self.eat(TokenKind::Identifier).map(|t| t.lexeme);
        match self.peek().kind {
            TokenKind::LBrace => {
                self.bump();
                let (raw, raw_span) = self.raw_body();
                let span = ParseSourceSpan::new(kw.span.start, raw_span.end);
                let node = Node::Origin(OriginDecl { kind, name: name.clone(), raw, span: span.clone() });
                if let Some(origin_name) = &name {
                    self.register(GlobalKind::Origin, origin_name, &node, &span);
                }
                Some(node)
            }
            TokenKind::Semicolon => {
                let end = self.bump().span.end;
                let span = ParseSourceSpan::new(kw.span.start, end);
                match name {
                    Some(name) => Some(Node::OriginUse(OriginUse { kind, name, span })),
                    None => {
                        self.error(span, "origin usage requires a name".to_string());
                        None
                    }
                }
            }
            _ => {
                let span = self.peek().span.clone();
                self.error(span, "expected '{' or ';' after [Origin] header".to_string());
                self.resync_statement();
                None
            }
        }
    }

    fn parse_configuration(&mut self) -> Option<Node> {
        let kw = self.bump();
        let name = self.eat(TokenKind::Identifier).map(|t| t.lexeme);
        self.expect(TokenKind::LBrace, "'{' starting configuration body")?;
        let mut set = ConfigurationSet { name: name.clone(), ..Default::default() };
        loop {
            match self.peek().kind {
                TokenKind::RBrace => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => {
                    let span = self.peek().span.clone();
                    self.error(span, "unclosed configuration block".to_string());
                    break;
                }
                TokenKind::Semicolon => {
                    self.bump();
                }
                TokenKind::LBracket => {
                    self.bump();
                    let group_name = self
                        .expect(TokenKind::Identifier, "group name")
                        .map(|t| t.lexeme)
                        .unwrap_or_default();
                    self.expect(TokenKind::RBracket, "']'");
                    self.expect(TokenKind::LBrace, "'{' starting group body");
                    let mut entries = Vec::new();
                    loop {
                        match self.peek().kind {
                            TokenKind::RBrace => {
                                self.bump();
                                break;
                            }
                            TokenKind::Eof => break,
                            TokenKind::Comma | TokenKind::Semicolon => {
                                self.bump();
                            }
                            _ => entries.push(self.bump().lexeme),
                        }
                    }
                    set.groups.insert(group_name, entries);
                }
                TokenKind::Identifier => {
                    let key = self.bump().lexeme;
                    if self.eat(TokenKind::Equals).is_none() {
                        self.expect(TokenKind::Colon, "'=' in configuration setting");
                    }
                    let mut value_tokens = Vec::new();
                    while !matches!(
                        self.peek().kind,
                        TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                    ) {
                        value_tokens.push(self.bump());
                    }
                    self.eat(TokenKind::Semicolon);
                    let value =
                        if value_tokens.len() == 1 && value_tokens[0].kind == TokenKind::StringLiteral {
                            SettingValue::Str(value_tokens[0].lexeme.clone())
                        } else {
                            SettingValue::parse(&style_value::join_tokens(&value_tokens))
                        };
                    set.settings.insert(key, value);
                }
                _ => {
                    let token = self.bump();
                    let msg = format!("unexpected '{}' in configuration", printable(&token));
                    self.error(token.span, msg);
                    self.resync_statement();
                }
            }
        }
        let end = self.peek().span.start.clone();
        let span = ParseSourceSpan::new(kw.span.start, end);
        let node = Node::Configuration(ConfigurationDecl { set, span: span.clone() });
        let register_name = name.unwrap_or_else(|| "default".to_string());
        self.register(GlobalKind::Configuration, &register_name, &node, &span);
        Some(node)
    }

    fn parse_namespace(&mut self) -> Option<Node> {
        let kw = self.bump();
        let name = self.expect(TokenKind::Identifier, "namespace name")?.lexeme;
        self.expect(TokenKind::LBrace, "'{' starting namespace body")?;
        self.namespace_stack.push(name.clone());
        let body = self.parse_top_level(true);
        self.namespace_stack.pop();
        let end = self.peek().span.start.clone();
        self.expect(TokenKind::RBrace, "'}' closing namespace");
        Some(Node::Namespace(NamespaceDecl {
            name,
            body,
            span: ParseSourceSpan::new(kw.span.start, end),
        }))
    }

    fn parse_import(&mut self) -> Option<Node> {
        let kw = self.bump();
        let marker = self.bump();
        let kind = match marker.kind {
            TokenKind::AtHtml => ImportKind::Html,
            TokenKind::AtStyle => ImportKind::Style,
            TokenKind::AtJavaScript => ImportKind::JavaScript,
            TokenKind::AtChtl => ImportKind::Chtl,
            TokenKind::AtCJmod => ImportKind::CJmod,
            _ => {
                self.error(
                    marker.span,
                    format!("'{}' is not an import kind", marker.lexeme),
                );
                self.resync_statement();
                return None;
            }
        };
        let mut symbol = None;
        if self.at(TokenKind::Identifier) && !self.peek().is_ident("from") {
            symbol = Some(self.bump().lexeme);
        }
        if !self.peek().is_ident("from") {
            let span = self.peek().span.clone();
            self.error(span, "expected 'from' in import".to_string());
            self.resync_statement();
            return None;
        }
        self.bump();
        let path = if self.at(TokenKind::StringLiteral) {
            self.bump().lexeme
        } else {
            // Unquoted path: glue tokens together until `as`, `;` or `}`.
            let mut path = String::new();
            while !matches!(
                self.peek().kind,
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            ) && !self.peek().is_ident("as")
            {
                path.push_str(&self.bump().lexeme);
            }
            path
        };
        let mut alias = None;
        if self.peek().is_ident("as") {
            self.bump();
            alias = self.eat(TokenKind::Identifier).map(|t| t.lexeme);
        }
        let end = self.peek().span.start.clone();
        self.expect(TokenKind::Semicolon, "';' after import");
        Some(Node::Import(ImportDecl {
            kind,
            path,
            symbol,
            alias,
            span: ParseSourceSpan::new(kw.span.start, end),
        }))
    }

    fn register(&mut self, kind: GlobalKind, name: &str, node: &Node, span: &ParseSourceSpan) {
        let Some(map) = self.map else { return };
        let obj = GlobalObject {
            kind,
            qualified_name: qualify(&self.namespace_stack, name),
            namespace_path: self.namespace_stack.clone(),
            defining_file: self.file.url.clone(),
            span: span.clone(),
            body: Rc::new(node.clone()),
        };
        if let Err(err) = map.register(obj) {
            self.sink.error(
                DiagnosticKind::Resolution,
                format!(
                    "duplicate declaration of {} '{}' (first declared at {})",
                    kind,
                    err.qualified_name,
                    err.existing_span.start.display()
                ),
                Some(span.clone()),
            );
        }
    }
}

fn printable(token: &Token) -> String {
    if token.kind == TokenKind::Eof {
        "end of file".to_string()
    } else {
        token.lexeme.clone()
    }
}
