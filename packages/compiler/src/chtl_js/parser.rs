//! CHTL-JS parser.
//!
//! Walks the token stream produced by [`JsLexer`], passing plain JavaScript
//! through as raw chunks and lifting the dialect's constructs into structured
//! nodes. The [`StateMachine`] validates construct boundaries; an invalid
//! transition records an error and parsing continues from `Initial`.

use std::collections::HashSet;

use crate::diagnostics::{DiagnosticKind, DiagnosticsSink};
use crate::parse_util::{ParseError, ParseSourceFile, ParseSourceSpan};
use crate::scanner::keywords::KeywordRegistry;
use crate::tags;

use super::ast::*;
use super::lexer::{JsLexer, JsToken, JsTokenKind};
use super::state::{JsTrigger, StateMachine};

pub struct JsParser<'a> {
    tokens: Vec<JsToken>,
    pos: usize,
    sink: &'a DiagnosticsSink,
    machine: StateMachine,
    registry: Option<&'a KeywordRegistry>,
    vir_names: HashSet<String>,
}

/// Parse a whole script body into CHTL-JS nodes.
pub fn parse_script(
    file: ParseSourceFile,
    sink: &DiagnosticsSink,
    registry: Option<&KeywordRegistry>,
) -> Vec<JsNode> {
    let tokens = JsLexer::new(file, sink).tokenize();
    JsParser::new(tokens, sink, registry).parse()
}

/// Parse script content that begins at an offset of a larger source file.
pub fn parse_script_at(
    file: ParseSourceFile,
    offset: usize,
    line: usize,
    col: usize,
    sink: &DiagnosticsSink,
    registry: Option<&KeywordRegistry>,
) -> Vec<JsNode> {
    let tokens = JsLexer::with_start(file, sink, offset, line, col).tokenize();
    JsParser::new(tokens, sink, registry).parse()
}

impl<'a> JsParser<'a> {
    pub fn new(
        tokens: Vec<JsToken>,
        sink: &'a DiagnosticsSink,
        registry: Option<&'a KeywordRegistry>,
    ) -> Self {
        JsParser {
            tokens,
            pos: 0,
            sink,
            machine: StateMachine::new(),
            registry,
            vir_names: HashSet::new(),
        }
    }

    pub fn parse(mut self) -> Vec<JsNode> {
        let mut nodes = Vec::new();
        let mut raw = String::new();

        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            match token.kind {
                JsTokenKind::Eof => break,
                JsTokenKind::Selector => {
                    self.drive(JsTrigger::SelectorOpen, &token.span);
                    self.drive(JsTrigger::SelectorClose, &token.span);
                    let selector = classify_selector(&token);
                    self.pos += 1;
                    self.parse_after_target(JsNode::EnhancedSelector(selector), &mut nodes, &mut raw);
                }
                JsTokenKind::Ident => {
                    if token.text == "vir" && !self.follows_member_access() {
                        flush(&mut raw, &mut nodes);
                        self.pos += 1;
                        self.parse_vir(&token, &mut nodes);
                    } else if token.text == "animate"
                        && !self.follows_member_access()
                        && self.peek_is_punct_after(self.pos + 1, '(')
                    {
                        flush(&mut raw, &mut nodes);
                        self.pos += 1;
                        self.drive(JsTrigger::AnimateOpen, &token.span);
                        if let Some(block) = self.parse_config_call(&token.span) {
                            nodes.push(JsNode::Animate(AnimateBlock {
                                config: block,
                                span: token.span.clone(),
                            }));
                        }
                        self.drive(JsTrigger::CloseParen, &token.span);
                    } else if (token.text == "listen" || token.text == "delegate")
                        && !self.follows_member_access()
                        && self.peek_is_punct_after(self.pos + 1, '(')
                    {
                        // A bare listen/delegate has no target; the rule table
                        // rejects the transition and we recover as raw JS.
                        let trigger = if token.text == "listen" {
                            JsTrigger::ListenOpen
                        } else {
                            JsTrigger::DelegateOpen
                        };
                        self.drive(trigger, &token.span);
                        raw.push_str(&token.source_text);
                        self.pos += 1;
                    } else if self.is_extension_keyword(&token) {
                        flush(&mut raw, &mut nodes);
                        self.parse_foreign(&token, &mut nodes);
                    } else if self.vir_names.contains(&token.text) && self.arrow_call_follows(self.pos + 1) {
                        flush(&mut raw, &mut nodes);
                        self.parse_vir_call(&token, &mut nodes);
                    } else {
                        raw.push_str(&token.source_text);
                        self.pos += 1;
                    }
                }
                _ => {
                    raw.push_str(&token.source_text);
                    self.pos += 1;
                }
            }
        }
        flush(&mut raw, &mut nodes);
        nodes
    }

    // ---- helpers --------------------------------------------------------

    fn drive(&mut self, trigger: JsTrigger, span: &ParseSourceSpan) {
        if let Err(err) = self.machine.transition(trigger) {
            self.sink.report_parse_error(
                DiagnosticKind::Parse,
                ParseError::new(
                    span.clone(),
                    format!("invalid CHTL-JS construct: {:?} while in {:?}", err.trigger, err.from),
                ),
            );
        }
    }

    fn next_non_trivia(&self, mut from: usize) -> usize {
        while from < self.tokens.len() && self.tokens[from].is_trivia() {
            from += 1;
        }
        from.min(self.tokens.len().saturating_sub(1))
    }

    fn token_at(&self, index: usize) -> &JsToken {
        &self.tokens[index.min(self.tokens.len() - 1)]
    }

    fn peek_is_punct_after(&self, from: usize, c: char) -> bool {
        self.token_at(self.next_non_trivia(from)).is_punct(c)
    }

    /// True when the previous non-trivia token is `.` or `?.`'s dot, meaning
    /// this identifier is an ordinary member access, not a keyword.
    fn follows_member_access(&self) -> bool {
        let mut i = self.pos;
        while i > 0 {
            i -= 1;
            if self.tokens[i].is_trivia() {
                continue;
            }
            return self.tokens[i].is_punct('.');
        }
        false
    }

    fn is_extension_keyword(&self, token: &JsToken) -> bool {
        !self.follows_member_access()
            && self
                .registry
                .map(|r| r.is_extension_keyword(&token.text))
                .unwrap_or(false)
    }

    fn arrow_call_follows(&self, from: usize) -> bool {
        let arrow = self.next_non_trivia(from);
        if self.token_at(arrow).kind != JsTokenKind::Arrow {
            return false;
        }
        let method = self.next_non_trivia(arrow + 1);
        if self.token_at(method).kind != JsTokenKind::Ident {
            return false;
        }
        self.peek_is_punct_after(method + 1, '(')
    }

    /// After a selector (or other target) we may see `->listen`,
    /// `->delegate`, `->method` or nothing special at all.
    fn parse_after_target(&mut self, target: JsNode, nodes: &mut Vec<JsNode>, raw: &mut String) {
        let arrow = self.next_non_trivia(self.pos);
        if self.token_at(arrow).kind != JsTokenKind::Arrow {
            flush(raw, nodes);
            nodes.push(target);
            return;
        }
        let method_index = self.next_non_trivia(arrow + 1);
        let method = self.token_at(method_index).clone();
        if method.kind != JsTokenKind::Ident {
            flush(raw, nodes);
            nodes.push(target);
            return;
        }
        let span = method.span.clone();
        self.drive(JsTrigger::ArrowOperator, &span);

        match method.text.as_str() {
            "listen" if self.peek_is_punct_after(method_index + 1, '(') => {
                flush(raw, nodes);
                self.drive(JsTrigger::ListenOpen, &span);
                self.pos = self.next_non_trivia(method_index + 1);
                let bindings = self.parse_config_call(&span).unwrap_or_default();
                self.drive(JsTrigger::CloseParen, &span);
                self.eat_semicolon();
                nodes.push(JsNode::Listen(ListenBlock {
                    target: Box::new(target),
                    bindings: bindings
                        .into_iter()
                        .map(|(event, handler)| ListenBinding { event, handler })
                        .collect(),
                    span,
                }));
            }
            "delegate" if self.peek_is_punct_after(method_index + 1, '(') => {
                flush(raw, nodes);
                self.drive(JsTrigger::DelegateOpen, &span);
                self.pos = self.next_non_trivia(method_index + 1);
                let block = self.parse_delegate_body(Box::new(target), &span);
                self.drive(JsTrigger::CloseParen, &span);
                self.eat_semicolon();
                if let Some(block) = block {
                    nodes.push(JsNode::Delegate(block));
                }
            }
            _ => {
                flush(raw, nodes);
                self.drive(JsTrigger::ChainEnd, &span);
                nodes.push(JsNode::Arrow(ArrowAccess {
                    target: Box::new(target),
                    method: method.text.clone(),
                    span,
                }));
                self.pos = method_index + 1;
            }
        }
    }

    /// Parse `({ key: value, ... })` starting at the `(`. Returns the pairs
    /// and leaves `self.pos` after the closing `)`.
    fn parse_config_call(&mut self, span: &ParseSourceSpan) -> Option<Vec<(String, String)>> {
        // `self.pos` sits on the keyword's `(` or the keyword itself.
        let open = self.next_non_trivia(self.pos);
        if !self.token_at(open).is_punct('(') {
            self.error(span, "expected '('".to_string());
            return None;
        }
        let brace = self.next_non_trivia(open + 1);
        if !self.token_at(brace).is_punct('{') {
            self.error(span, "expected '{' with configuration entries".to_string());
            self.pos = open + 1;
            return None;
        }
        let mut pairs = Vec::new();
        let mut i = self.next_non_trivia(brace + 1);
        loop {
            let token = self.token_at(i).clone();
            if token.is_punct('}') {
                i += 1;
                break;
            }
            if token.kind == JsTokenKind::Eof {
                self.error(span, "unterminated configuration block".to_string());
                self.pos = i;
                return Some(pairs);
            }
            // Key.
            let key = match token.kind {
                JsTokenKind::Ident | JsTokenKind::Number => token.text.clone(),
                JsTokenKind::StringLit => trim_quotes(&token.text),
                _ => {
                    self.error(&token.span, format!("unexpected '{}' in configuration", token.source_text));
                    i = self.next_non_trivia(i + 1);
                    continue;
                }
            };
            i = self.next_non_trivia(i + 1);
            if !self.token_at(i).is_punct(':') {
                self.error(span, format!("expected ':' after '{}'", key));
            } else {
                i = self.next_non_trivia(i + 1);
            }
            // Value: balanced run up to `,` or `}` at depth zero.
            let (value, after) = self.read_balanced_text(i);
            pairs.push((key, value.trim().to_string()));
            i = self.next_non_trivia(after);
            if self.token_at(i).is_punct(',') {
                i = self.next_non_trivia(i + 1);
            }
        }
        let close = self.next_non_trivia(i);
        if self.token_at(close).is_punct(')') {
            self.pos = close + 1;
        } else {
            self.error(span, "expected ')' closing configuration call".to_string());
            self.pos = close;
        }
        Some(pairs)
    }

    fn parse_delegate_body(
        &mut self,
        parent: Box<JsNode>,
        span: &ParseSourceSpan,
    ) -> Option<DelegateBlock> {
        let pairs = self.parse_config_call(span)?;
        let mut targets = Vec::new();
        let mut bindings = Vec::new();
        for (key, value) in pairs {
            if key == "target" {
                let selectors = extract_selectors(&value, span, self.sink);
                targets.extend(selectors);
            } else {
                bindings.push(ListenBinding { event: key, handler: value });
            }
        }
        if targets.is_empty() {
            self.error(span, "delegate requires a 'target' enhanced selector".to_string());
        }
        Some(DelegateBlock { parent, targets, bindings, span: span.clone() })
    }

    /// Concatenated source text of a balanced token run; stops before a `,`
    /// or `}` at depth zero. Returns the text and the index of the stop.
    fn read_balanced_text(&self, mut i: usize) -> (String, usize) {
        let mut out = String::new();
        let mut depth = 0i32;
        loop {
            let token = self.token_at(i);
            match token.kind {
                JsTokenKind::Eof => break,
                JsTokenKind::Punct => {
                    let c = token.text.chars().next().unwrap_or('\0');
                    match c {
                        '(' | '[' | '{' => depth += 1,
                        ')' | ']' | '}' => {
                            if depth == 0 {
                                break;
                            }
                            depth -= 1;
                        }
                        ',' if depth == 0 => break,
                        _ => {}
                    }
                    out.push_str(&token.source_text);
                }
                _ => out.push_str(&token.source_text),
            }
            i += 1;
        }
        (out, i)
    }

    fn eat_semicolon(&mut self) {
        let i = self.next_non_trivia(self.pos);
        if self.token_at(i).is_punct(';') {
            self.pos = i + 1;
        }
    }

    fn parse_vir(&mut self, kw: &JsToken, nodes: &mut Vec<JsNode>) {
        self.drive(JsTrigger::VirKeyword, &kw.span);
        let name_index = self.next_non_trivia(self.pos);
        let name_token = self.token_at(name_index).clone();
        if name_token.kind != JsTokenKind::Ident {
            self.error(&kw.span, "expected a name after 'vir'".to_string());
            self.pos = name_index;
            self.drive(JsTrigger::StatementEnd, &kw.span);
            return;
        }
        let name = name_token.text.clone();
        let eq = self.next_non_trivia(name_index + 1);
        if !self.token_at(eq).is_punct('=') {
            self.error(&name_token.span, format!("expected '=' after 'vir {}'", name));
            self.pos = eq;
            self.drive(JsTrigger::StatementEnd, &kw.span);
            return;
        }
        let expr_start = self.next_non_trivia(eq + 1);
        let expr_token = self.token_at(expr_start).clone();

        let mut methods = Vec::new();
        let mut extra = None;
        let mut source_call = String::new();

        if expr_token.kind == JsTokenKind::Selector && self.arrow_call_follows(expr_start + 1) {
            // vir Name = {{sel}}->listen({ ... });
            let selector = classify_selector(&expr_token);
            let arrow = self.next_non_trivia(expr_start + 1);
            let method_index = self.next_non_trivia(arrow + 1);
            let method = self.token_at(method_index).clone();
            source_call = format!("{}->{}(...)", expr_token.source_text, method.text);
            if method.text == "listen" {
                self.drive(JsTrigger::ListenOpen, &method.span);
                self.pos = self.next_non_trivia(method_index + 1);
                if let Some(pairs) = self.parse_config_call(&method.span) {
                    methods = pairs.clone();
                    extra = Some(JsNode::Listen(ListenBlock {
                        target: Box::new(JsNode::EnhancedSelector(selector)),
                        bindings: pairs
                            .into_iter()
                            .map(|(event, handler)| ListenBinding { event, handler })
                            .collect(),
                        span: method.span.clone(),
                    }));
                }
                self.drive(JsTrigger::CloseParen, &method.span);
            } else {
                self.error(&method.span, format!("cannot bind 'vir' to '->{}'", method.text));
                self.pos = method_index + 1;
            }
        } else if expr_token.is_ident("listen") && self.peek_is_punct_after(expr_start + 1, '(') {
            self.drive(JsTrigger::ListenOpen, &expr_token.span);
            source_call = "listen(...)".to_string();
            self.pos = self.next_non_trivia(expr_start + 1);
            if let Some(pairs) = self.parse_config_call(&expr_token.span) {
                methods = pairs;
            }
            self.drive(JsTrigger::CloseParen, &expr_token.span);
        } else if expr_token.is_ident("animate") && self.peek_is_punct_after(expr_start + 1, '(') {
            self.drive(JsTrigger::AnimateOpen, &expr_token.span);
            source_call = "animate(...)".to_string();
            self.pos = self.next_non_trivia(expr_start + 1);
            if let Some(config) = self.parse_config_call(&expr_token.span) {
                extra = Some(JsNode::Animate(AnimateBlock {
                    config,
                    span: expr_token.span.clone(),
                }));
            }
            self.drive(JsTrigger::CloseParen, &expr_token.span);
        } else {
            // Arbitrary expression: keep it verbatim, no methods to expose.
            let (text, after) = self.read_statement_text(expr_start);
            source_call = text.trim().to_string();
            self.pos = after;
        }

        self.eat_semicolon();
        self.drive(JsTrigger::StatementEnd, &kw.span);
        self.vir_names.insert(name.clone());
        nodes.push(JsNode::VirDecl(VirtualObject {
            name,
            source_call,
            methods,
            span: kw.span.clone(),
        }));
        if let Some(node) = extra {
            nodes.push(node);
        }
    }

    /// Raw text until a `;` at depth zero (not consumed).
    fn read_statement_text(&self, mut i: usize) -> (String, usize) {
        let mut out = String::new();
        let mut depth = 0i32;
        loop {
            let token = self.token_at(i);
            match token.kind {
                JsTokenKind::Eof => break,
                JsTokenKind::Punct => {
                    let c = token.text.chars().next().unwrap_or('\0');
                    match c {
                        '(' | '[' | '{' => depth += 1,
                        ')' | ']' | '}' => depth -= 1,
                        ';' if depth <= 0 => return (out, i),
                        _ => {}
                    }
                    out.push_str(&token.source_text);
                }
                _ => out.push_str(&token.source_text),
            }
            i += 1;
        }
        (out, i)
    }

    fn parse_vir_call(&mut self, name_token: &JsToken, nodes: &mut Vec<JsNode>) {
        let arrow = self.next_non_trivia(self.pos + 1);
        self.drive(JsTrigger::ArrowOperator, &name_token.span);
        let method_index = self.next_non_trivia(arrow + 1);
        let method = self.token_at(method_index).clone();
        let open = self.next_non_trivia(method_index + 1);
        let (args, after) = self.read_call_args(open);
        self.drive(JsTrigger::ChainEnd, &method.span);
        self.pos = after;
        nodes.push(JsNode::VirCall(VirtualCall {
            name: name_token.text.clone(),
            method: method.text,
            args,
            span: name_token.span.clone(),
        }));
    }

    /// Arguments of `( ... )` starting at the opening paren; returns the raw
    /// argument text and the index just past the closing paren.
    fn read_call_args(&self, open: usize) -> (String, usize) {
        let mut out = String::new();
        let mut depth = 0i32;
        let mut i = open;
        loop {
            let token = self.token_at(i);
            match token.kind {
                JsTokenKind::Eof => break,
                JsTokenKind::Punct => {
                    let c = token.text.chars().next().unwrap_or('\0');
                    if c == '(' {
                        depth += 1;
                        if depth > 1 {
                            out.push_str(&token.source_text);
                        }
                    } else if c == ')' {
                        depth -= 1;
                        if depth == 0 {
                            return (out, i + 1);
                        }
                        out.push_str(&token.source_text);
                    } else {
                        out.push_str(&token.source_text);
                    }
                }
                _ => out.push_str(&token.source_text),
            }
            i += 1;
        }
        (out, i)
    }

    fn parse_foreign(&mut self, keyword: &JsToken, nodes: &mut Vec<JsNode>) {
        let registry = self.registry.expect("foreign parse without registry");
        let extension = registry
            .extension_for(&keyword.text)
            .expect("keyword checked before dispatch");

        let mut input = keyword.source_text.clone();
        let mut i = self.pos + 1;
        loop {
            let next = self.next_non_trivia(i);
            let token = self.token_at(next);
            if token.is_punct('(') || token.is_punct('{') {
                let (text, after) = self.read_group_inclusive(next);
                input.push_str(&text);
                i = after;
            } else {
                break;
            }
        }
        let close = self.next_non_trivia(i);
        if self.token_at(close).is_punct(';') {
            input.push(';');
            i = close + 1;
        }
        self.pos = i;

        if !extension.matches_syntax(&input, "script") {
            self.error(&keyword.span, format!("'{}' does not match the syntax of its extension", keyword.text));
            nodes.push(JsNode::Raw(input));
            return;
        }
        match extension.parse_syntax(&input, "script") {
            Ok(payload) => nodes.push(JsNode::Foreign {
                keyword: keyword.text.clone(),
                payload,
                span: keyword.span.clone(),
            }),
            Err(message) => {
                self.error(&keyword.span, format!("extension '{}' rejected input: {}", extension.name(), message));
            }
        }
    }

    /// Text of one balanced `(...)` or `{...}` group, braces included.
    fn read_group_inclusive(&self, open: usize) -> (String, usize) {
        let open_char = self.token_at(open).text.chars().next().unwrap_or('(');
        let close_char = match open_char {
            '(' => ')',
            '{' => '}',
            _ => ')',
        };
        let mut out = String::new();
        let mut depth = 0i32;
        let mut i = open;
        loop {
            let token = self.token_at(i);
            match token.kind {
                JsTokenKind::Eof => break,
                JsTokenKind::Punct => {
                    let c = token.text.chars().next().unwrap_or('\0');
                    out.push_str(&token.source_text);
                    if c == open_char {
                        depth += 1;
                    } else if c == close_char {
                        depth -= 1;
                        if depth == 0 {
                            return (out, i + 1);
                        }
                    }
                }
                _ => out.push_str(&token.source_text),
            }
            i += 1;
        }
        (out, i)
    }

    fn error(&self, span: &ParseSourceSpan, msg: String) {
        self.sink
            .report_parse_error(DiagnosticKind::Parse, ParseError::new(span.clone(), msg));
    }
}

fn flush(raw: &mut String, nodes: &mut Vec<JsNode>) {
    if !raw.is_empty() {
        nodes.push(JsNode::Raw(std::mem::take(raw)));
    }
}

fn trim_quotes(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// Pull every `{{...}}` selector out of a raw value, e.g. the `target` entry
/// of a delegate block (`{{.item}}` or `[{{.a}}, {{.b}}]`).
fn extract_selectors(
    value: &str,
    span: &ParseSourceSpan,
    _sink: &DiagnosticsSink,
) -> Vec<EnhancedSelector> {
    let mut selectors = Vec::new();
    let mut rest = value;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else { break };
        let inner = rest[open + 2..open + 2 + close].trim();
        selectors.push(classify_selector_text(inner, span));
        rest = &rest[open + 2 + close + 2..];
    }
    selectors
}

/// Decide what a `{{...}}` selector denotes. A bare name that is a known
/// HTML tag is a tag selector; an unknown bare name stays ambiguous and the
/// generator emits the id-then-class shim.
pub fn classify_selector(token: &JsToken) -> EnhancedSelector {
    classify_selector_text(&token.text, &token.span)
}

pub fn classify_selector_text(selector: &str, span: &ParseSourceSpan) -> EnhancedSelector {
    let mut text = selector.to_string();
    let mut index = None;

    if text.ends_with(']') {
        if let Some(open) = text.rfind('[') {
            if let Ok(n) = text[open + 1..text.len() - 1].trim().parse::<usize>() {
                index = Some(n);
                text = text[..open].trim_end().to_string();
            }
        }
    }

    let kind = if index.is_some() {
        SelectorFlavor::Indexed
    } else if text.contains(' ') || text.contains('>') || text.contains('+') || text.contains('~') || text.contains(':') {
        SelectorFlavor::Complex
    } else if text.starts_with('.') {
        SelectorFlavor::Class
    } else if text.starts_with('#') {
        SelectorFlavor::Id
    } else if tags::is_known_tag(&text) {
        SelectorFlavor::Tag
    } else {
        SelectorFlavor::Mixed
    };

    EnhancedSelector { text, kind, index, span: span.clone() }
}
