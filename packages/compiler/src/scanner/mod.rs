//! Unified fragment scanner.
//!
//! Single pass, character indexed, with a stack of active regions implied by
//! brace depth. Concatenating the emitted fragments in source order
//! reconstructs the input byte-for-byte; each fragment is assignable to
//! exactly one sub-compiler. Brace counting ignores braces inside strings,
//! comments and `[Origin]` raw bodies.

pub mod fragment;
pub mod keywords;

use crate::chars;
use crate::diagnostics::{DiagnosticKind, DiagnosticsSink};
use crate::parse_util::{ParseLocation, ParseSourceFile, ParseSourceSpan};

use self::fragment::{
    CodeFragment, FragmentIntegrity, FragmentKind, FragmentPosition, ScanContext,
};
use self::keywords::KeywordRegistry;

pub struct UnifiedScanner<'a> {
    registry: &'a KeywordRegistry,
    sink: &'a DiagnosticsSink,
}

impl<'a> UnifiedScanner<'a> {
    pub fn new(registry: &'a KeywordRegistry, sink: &'a DiagnosticsSink) -> Self {
        UnifiedScanner { registry, sink }
    }

    pub fn scan(&self, source: &str, url: &str) -> Vec<CodeFragment> {
        let mut run = ScanRun {
            file: ParseSourceFile::new(source.to_string(), url.to_string()),
            registry: self.registry,
            sink: self.sink,
            pos: 0,
            line: 0,
            col: 0,
            frag_start: FragmentPosition::default(),
            pending_integrity: FragmentIntegrity::Complete,
            resume_context: None,
            brace_depth: 0,
            fragments: Vec::new(),
        };
        run.scan_chtl();
        run.validate_pairs();
        run.fragments
    }
}

struct ScanRun<'a> {
    file: ParseSourceFile,
    registry: &'a KeywordRegistry,
    sink: &'a DiagnosticsSink,
    pos: usize,
    line: usize,
    col: usize,
    frag_start: FragmentPosition,
    /// Integrity for the next emitted fragment of the interrupted kind.
    pending_integrity: FragmentIntegrity,
    /// Context of a CHTL fragment resumed after a local script cut.
    resume_context: Option<ScanContext>,
    /// Open element-body braces in CHTL mode.
    brace_depth: usize,
    fragments: Vec<CodeFragment>,
}

impl<'a> ScanRun<'a> {
    // ---- cursor ---------------------------------------------------------

    fn src(&self) -> &str {
        &self.file.content
    }

    fn peek(&self) -> char {
        self.file.content[self.pos..].chars().next().unwrap_or(chars::EOF)
    }

    fn peek_at(&self, n: usize) -> char {
        self.file.content[self.pos..].chars().nth(n).unwrap_or(chars::EOF)
    }

    fn bump(&mut self) -> char {
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

    fn position(&self) -> FragmentPosition {
        FragmentPosition { offset: self.pos, line: self.line, col: self.col }
    }

    fn error_at(&self, position: FragmentPosition, msg: String) {
        let loc = ParseLocation::new(self.file.clone(), position.offset, position.line, position.col);
        let span = ParseSourceSpan::new(loc.clone(), loc);
        self.sink.error(DiagnosticKind::Scan, msg, Some(span));
    }

    // ---- fragment emission ----------------------------------------------

    fn emit(
        &mut self,
        kind: FragmentKind,
        end: FragmentPosition,
        integrity: FragmentIntegrity,
        context: ScanContext,
        keyword: Option<String>,
    ) -> bool {
        let content = self.src()[self.frag_start.offset..end.offset].to_string();
        let emitted = !content.is_empty();
        if emitted {
            let id = self.fragments.len();
            self.fragments.push(CodeFragment {
                fragment_id: id,
                sequence_index: id,
                kind,
                content,
                start: self.frag_start,
                end,
                integrity,
                context,
                keyword,
            });
        }
        self.frag_start = end;
        emitted
    }

    fn chtl_context(&self) -> ScanContext {
        if self.brace_depth > 0 {
            ScanContext::InsideElement
        } else {
            ScanContext::TopLevel
        }
    }

    // ---- trivia ---------------------------------------------------------

    /// Skip a quoted literal. CHTL strings do not span lines.
    fn skip_string(&mut self) {
        let start = self.position();
        let quote = self.bump();
        loop {
            let c = self.peek();
            if c == chars::EOF || c == chars::NEWLINE {
                self.error_at(start, "unterminated string literal".to_string());
                return;
            }
            if c == chars::BACKSLASH {
                self.bump();
                self.bump();
                continue;
            }
            self.bump();
            if c == quote {
                return;
            }
        }
    }

    /// Skip a quoted or template literal in script mode (may span lines).
    fn skip_js_string(&mut self) {
        let start = self.position();
        let quote = self.bump();
        loop {
            let c = self.peek();
            if c == chars::EOF {
                self.error_at(start, "unterminated string literal".to_string());
                return;
            }
            if c == chars::BACKSLASH {
                self.bump();
                self.bump();
                continue;
            }
            if c == chars::NEWLINE && quote != '`' {
                self.error_at(start, "unterminated string literal".to_string());
                return;
            }
            self.bump();
            if c == quote {
                return;
            }
        }
    }

    /// Skip `//`, `/* */` or `--` comments; returns true if one was skipped.
    fn skip_comment(&mut self) -> bool {
        if self.peek() == chars::SLASH && self.peek_at(1) == chars::SLASH {
            while self.peek() != chars::NEWLINE && !self.at_end() {
                self.bump();
            }
            return true;
        }
        if self.peek() == chars::SLASH && self.peek_at(1) == chars::STAR {
            let start = self.position();
            self.bump();
            self.bump();
            loop {
                if self.at_end() {
                    self.error_at(start, "unterminated block comment".to_string());
                    return true;
                }
                if self.peek() == chars::STAR && self.peek_at(1) == chars::SLASH {
                    self.bump();
                    self.bump();
                    return true;
                }
                self.bump();
            }
        }
        false
    }

    fn skip_generator_comment(&mut self) -> bool {
        if self.peek() == chars::MINUS && self.peek_at(1) == chars::MINUS {
            while self.peek() != chars::NEWLINE && !self.at_end() {
                self.bump();
            }
            return true;
        }
        false
    }

    fn read_word(&mut self) -> String {
        let begin = self.pos;
        while chars::is_ident_part(self.peek()) {
            self.bump();
        }
        self.src()[begin..self.pos].to_string()
    }

    /// The next non-whitespace character at or after the cursor, without
    /// moving it.
    fn next_meaningful(&self) -> char {
        let mut probe = self.pos;
        while probe < self.file.content.len() {
            let c = self.file.content[probe..].chars().next().unwrap_or(chars::EOF);
            if !chars::is_whitespace(c) {
                return c;
            }
            probe += c.len_utf8();
        }
        chars::EOF
    }

    fn consume_whitespace_then(&mut self, expected: char) {
        while chars::is_whitespace(self.peek()) {
            self.bump();
        }
        if self.peek() == expected {
            self.bump();
        }
    }

    // ---- CHTL mode ------------------------------------------------------

    fn scan_chtl(&mut self) {
        loop {
            let c = self.peek();
            if c == chars::EOF {
                break;
            }
            if chars::is_quote(c) {
                self.skip_string();
                continue;
            }
            if self.skip_comment() || self.skip_generator_comment() {
                continue;
            }
            if c == chars::LBRACKET {
                self.handle_bracket_block();
                continue;
            }
            if chars::is_ident_start(c) {
                let word_start = self.position();
                let word = self.read_word();
                if self.registry.is_extension_keyword(&word) {
                    self.error_at(
                        word_start,
                        format!("CJMOD keyword '{}' used outside a script block", word),
                    );
                    continue;
                }
                if self.next_meaningful() == chars::LBRACE {
                    match word.as_str() {
                        "style" if self.brace_depth == 0 => {
                            // Global style: the CHTL fragment closes after the
                            // opening brace and a CSS fragment begins.
                            self.consume_whitespace_then(chars::LBRACE);
                            let end = self.position();
                            let integrity = std::mem::replace(
                                &mut self.pending_integrity,
                                FragmentIntegrity::Complete,
                            );
                            let context = self
                                .resume_context
                                .take()
                                .unwrap_or(ScanContext::TopLevel);
                            self.emit(FragmentKind::Chtl, end, integrity, context, None);
                            self.scan_css_until_close();
                        }
                        "style" => {
                            // Local style: stays in the CHTL fragment; its
                            // value syntax belongs to CHTL, not raw CSS.
                            self.consume_whitespace_then(chars::LBRACE);
                            self.skip_balanced_braces();
                        }
                        "script" => {
                            let local = self.brace_depth > 0;
                            self.consume_whitespace_then(chars::LBRACE);
                            let end = self.position();
                            let context = self
                                .resume_context
                                .take()
                                .unwrap_or_else(|| self.chtl_context());
                            let integrity = if local {
                                FragmentIntegrity::ContinuesNext
                            } else {
                                std::mem::replace(
                                    &mut self.pending_integrity,
                                    FragmentIntegrity::Complete,
                                )
                            };
                            self.emit(FragmentKind::Chtl, end, integrity, context, None);
                            self.scan_script_until_close();
                            if local {
                                self.pending_integrity = FragmentIntegrity::ContinuedFromPrev;
                                self.resume_context = Some(context);
                            }
                        }
                        _ => {
                            // Element body opens.
                            self.consume_whitespace_then(chars::LBRACE);
                            self.brace_depth += 1;
                        }
                    }
                }
                continue;
            }
            if c == chars::LBRACE {
                self.brace_depth += 1;
                self.bump();
                continue;
            }
            if c == chars::RBRACE {
                if self.brace_depth == 0 {
                    let at = self.position();
                    self.error_at(at, "unmatched '}'".to_string());
                } else {
                    self.brace_depth -= 1;
                }
                self.bump();
                continue;
            }
            self.bump();
        }

        let end = self.position();
        let integrity = if self.brace_depth > 0 {
            let at = self.position();
            self.error_at(at, "unclosed element body at end of file".to_string());
            FragmentIntegrity::Partial
        } else {
            std::mem::replace(&mut self.pending_integrity, FragmentIntegrity::Complete)
        };
        let context = self.resume_context.take().unwrap_or_else(|| self.chtl_context());
        self.emit(FragmentKind::Chtl, end, integrity, context, None);
    }

    /// `[Origin] ... { raw }` keeps its body un-scanned inside the CHTL
    /// fragment. Other `[...]` blocks pass through unchanged.
    fn handle_bracket_block(&mut self) {
        self.bump();
        let word = self.read_word();
        if self.peek() == chars::RBRACKET {
            self.bump();
        }
        if word != "Origin" {
            return;
        }
        // Skip the header (@Kind, optional name) up to `{` or `;`.
        loop {
            let c = self.peek();
            if c == chars::LBRACE || c == chars::SEMICOLON || c == chars::EOF {
                break;
            }
            self.bump();
        }
        if self.peek() == chars::LBRACE {
            self.bump();
            self.skip_balanced_braces();
        }
    }

    /// Consume up to and including the `}` matching an already consumed `{`.
    /// Strings and comments are opaque to the counter.
    fn skip_balanced_braces(&mut self) {
        let start = self.position();
        let mut depth = 1usize;
        loop {
            let c = self.peek();
            if c == chars::EOF {
                self.error_at(start, "unclosed block at end of file".to_string());
                return;
            }
            if chars::is_quote(c) {
                self.skip_string();
                continue;
            }
            if self.skip_comment() {
                continue;
            }
            if c == chars::LBRACE {
                depth += 1;
            } else if c == chars::RBRACE {
                depth -= 1;
                if depth == 0 {
                    self.bump();
                    return;
                }
            }
            self.bump();
        }
    }

    // ---- CSS mode -------------------------------------------------------

    fn scan_css_until_close(&mut self) {
        let start = self.position();
        let mut depth = 0usize;
        loop {
            let c = self.peek();
            if c == chars::EOF {
                self.error_at(start, "unterminated global style block".to_string());
                let end = self.position();
                self.emit(
                    FragmentKind::Css,
                    end,
                    FragmentIntegrity::Partial,
                    ScanContext::InsideStyle,
                    None,
                );
                return;
            }
            if chars::is_quote(c) {
                self.skip_string();
                continue;
            }
            if self.skip_comment() {
                continue;
            }
            if c == chars::LBRACE {
                depth += 1;
            } else if c == chars::RBRACE {
                if depth == 0 {
                    // The closing brace belongs to the resuming CHTL fragment.
                    let end = self.position();
                    self.emit(
                        FragmentKind::Css,
                        end,
                        FragmentIntegrity::Complete,
                        ScanContext::InsideStyle,
                        None,
                    );
                    self.bump();
                    return;
                }
                depth -= 1;
            }
            self.bump();
        }
    }

    // ---- script mode ----------------------------------------------------

    fn scan_script_until_close(&mut self) {
        let start = self.position();
        let mut depth = 0usize;
        let mut has_chtl_js = false;
        let mut resumed = false;
        loop {
            let c = self.peek();
            if c == chars::EOF {
                self.error_at(start, "unterminated script block".to_string());
                let end = self.position();
                let kind = if has_chtl_js { FragmentKind::ChtlJs } else { FragmentKind::Js };
                self.emit(kind, end, FragmentIntegrity::Partial, ScanContext::InsideScript, None);
                return;
            }
            if chars::is_quote(c) || c == '`' {
                self.skip_js_string();
                continue;
            }
            if self.skip_comment() {
                continue;
            }
            // Enhanced selector: opaque to brace counting.
            if c == chars::LBRACE && self.peek_at(1) == chars::LBRACE {
                has_chtl_js = true;
                let open = self.position();
                self.bump();
                self.bump();
                loop {
                    if self.at_end() {
                        self.error_at(open, "unterminated enhanced selector".to_string());
                        break;
                    }
                    if self.peek() == chars::RBRACE && self.peek_at(1) == chars::RBRACE {
                        self.bump();
                        self.bump();
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            if c == chars::MINUS && self.peek_at(1) == chars::GT {
                has_chtl_js = true;
                self.bump();
                self.bump();
                continue;
            }
            if chars::is_ident_start(c) {
                let word_start = self.position();
                let word = self.read_word();
                if self.registry.is_base_keyword(&word) {
                    has_chtl_js = true;
                } else if self.registry.is_extension_keyword(&word) {
                    // Split: JS prologue, extension-owned span, JS epilogue.
                    let kind = if has_chtl_js { FragmentKind::ChtlJs } else { FragmentKind::Js };
                    self.frag_start_rewind_emit(kind, word_start, &mut resumed);
                    self.consume_extension_span();
                    let end = self.position();
                    self.emit(
                        FragmentKind::ChtlJs,
                        end,
                        FragmentIntegrity::Complete,
                        ScanContext::InsideScript,
                        Some(word),
                    );
                    has_chtl_js = false;
                }
                continue;
            }
            if c == chars::LBRACE {
                depth += 1;
                self.bump();
                continue;
            }
            if c == chars::RBRACE {
                if depth == 0 {
                    // The closing brace belongs to the resuming CHTL fragment.
                    let end = self.position();
                    let kind = if has_chtl_js { FragmentKind::ChtlJs } else { FragmentKind::Js };
                    let integrity = if resumed {
                        FragmentIntegrity::ContinuedFromPrev
                    } else {
                        FragmentIntegrity::Complete
                    };
                    self.emit(kind, end, integrity, ScanContext::InsideScript, None);
                    self.bump();
                    return;
                }
                depth -= 1;
                self.bump();
                continue;
            }
            self.bump();
        }
    }

    /// Emit the in-progress script prologue ending at `cut`; marks it
    /// `continues_next` and arms `resumed` for the epilogue.
    fn frag_start_rewind_emit(
        &mut self,
        kind: FragmentKind,
        cut: FragmentPosition,
        resumed: &mut bool,
    ) {
        if self.frag_start.offset < cut.offset {
            // A middle piece both continues and is continued; it is marked as
            // continuing forward so pairing stays checkable.
            self.emit(
                kind,
                cut,
                FragmentIntegrity::ContinuesNext,
                ScanContext::InsideScript,
                None,
            );
            *resumed = true;
        } else {
            self.frag_start = cut;
        }
    }

    /// Keyword already consumed; take its balanced argument groups and the
    /// trailing semicolon.
    fn consume_extension_span(&mut self) {
        loop {
            while chars::is_whitespace(self.peek()) {
                self.bump();
            }
            match self.peek() {
                chars::LBRACE => {
                    self.bump();
                    self.skip_balanced_braces();
                }
                chars::LPAREN => {
                    self.bump();
                    let mut depth = 1usize;
                    loop {
                        let c = self.peek();
                        if c == chars::EOF {
                            return;
                        }
                        if chars::is_quote(c) {
                            self.skip_js_string();
                            continue;
                        }
                        if c == chars::LPAREN {
                            depth += 1;
                        } else if c == chars::RPAREN {
                            depth -= 1;
                            if depth == 0 {
                                self.bump();
                                break;
                            }
                        }
                        self.bump();
                    }
                }
                chars::SEMICOLON => {
                    self.bump();
                    return;
                }
                _ => return,
            }
        }
    }

    // ---- validation -----------------------------------------------------

    /// Every `continues_next` must be followed, among fragments of its kind,
    /// by a `continued_from_prev` with the same context.
    fn validate_pairs(&self) {
        for (i, fragment) in self.fragments.iter().enumerate() {
            if fragment.integrity != FragmentIntegrity::ContinuesNext {
                continue;
            }
            let successor = self.fragments[i + 1..]
                .iter()
                .find(|f| f.kind == fragment.kind);
            // A middle piece of a doubly-split region continues forward
            // itself; that still satisfies the chain.
            let ok = successor
                .map(|f| {
                    (f.integrity == FragmentIntegrity::ContinuedFromPrev
                        || f.integrity == FragmentIntegrity::ContinuesNext)
                        && f.context == fragment.context
                })
                .unwrap_or(false);
            if !ok {
                self.error_at(
                    fragment.start,
                    format!(
                        "fragment {} continues but no matching continuation follows",
                        fragment.fragment_id
                    ),
                );
            }
        }
    }
}
