//! JavaScript generator for the CHTL-JS AST.
//!
//! Enhanced selectors lower to `querySelector`/`getElementById` calls, `->`
//! becomes `.`, `listen` becomes one `addEventListener` per binding, and
//! `delegate` calls coalesce per `(parent, event)` into a single dispatching
//! listener. `vir` declarations register uniquely named top-level functions
//! that precede all script bodies in the final output.

use indexmap::IndexMap;

use crate::chtl_js::ast::*;
use crate::chtl_js::lexer::{JsLexer, JsTokenKind};
use crate::chtl_js::parser::classify_selector_text;
use crate::diagnostics::{DiagnosticsSink, FatalError, FatalResult};
use crate::parse_util::ParseSourceFile;
use crate::scanner::keywords::KeywordRegistry;

pub struct JsEmitter<'a> {
    registry: Option<&'a KeywordRegistry>,
    /// (vir name, method) -> generated function name.
    vir_methods: IndexMap<(String, String), String>,
    /// Generated function name -> handler expression.
    vir_functions: IndexMap<String, String>,
    /// (parent JS, event) -> dispatch branches in registration order.
    delegates: IndexMap<(String, String), Vec<(String, String)>>,
}

impl<'a> JsEmitter<'a> {
    pub fn new(registry: Option<&'a KeywordRegistry>) -> Self {
        JsEmitter {
            registry,
            vir_methods: IndexMap::new(),
            vir_functions: IndexMap::new(),
            delegates: IndexMap::new(),
        }
    }

    /// Emit one script body. Shared state (vir registry, delegate pools)
    /// accumulates across calls within a compilation unit.
    pub fn emit_script(&mut self, nodes: &[JsNode]) -> FatalResult<String> {
        let mut out = String::new();
        for node in nodes {
            match node {
                JsNode::Raw(text) => out.push_str(&rewrite_inline(text)),
                JsNode::EnhancedSelector(selector) => out.push_str(&selector_js(selector)),
                JsNode::Arrow(arrow) => {
                    out.push_str(&self.emit_target(&arrow.target)?);
                    out.push('.');
                    out.push_str(&arrow.method);
                }
                JsNode::Listen(listen) => {
                    let target = self.emit_target(&listen.target)?;
                    for binding in &listen.bindings {
                        out.push_str(&format!(
                            "{}.addEventListener('{}', {});\n",
                            target,
                            binding.event,
                            rewrite_inline(&binding.handler)
                        ));
                    }
                }
                JsNode::Delegate(delegate) => {
                    let parent = self.emit_target(&delegate.parent)?;
                    for binding in &delegate.bindings {
                        let entry = self
                            .delegates
                            .entry((parent.clone(), binding.event.clone()))
                            .or_default();
                        for target in &delegate.targets {
                            entry.push((
                                css_selector_text(target),
                                rewrite_inline(&binding.handler),
                            ));
                        }
                    }
                }
                JsNode::Animate(animate) => out.push_str(&emit_animate(animate)),
                JsNode::VirDecl(decl) => {
                    for (method, handler) in &decl.methods {
                        let function = format!("__chtl_vir_{}_{}", decl.name, method);
                        self.vir_methods
                            .insert((decl.name.clone(), method.clone()), function.clone());
                        self.vir_functions.insert(function, rewrite_inline(handler));
                    }
                }
                JsNode::VirCall(call) => {
                    let key = (call.name.clone(), call.method.clone());
                    match self.vir_methods.get(&key) {
                        Some(function) => {
                            out.push_str(&format!("{}({})", function, rewrite_inline(&call.args)));
                        }
                        None => {
                            return Err(FatalError::Generation(format!(
                                "virtual object '{}' has no method '{}'",
                                call.name, call.method
                            )));
                        }
                    }
                }
                JsNode::Foreign { keyword, payload, .. } => {
                    let extension = self
                        .registry
                        .and_then(|r| r.extension_for(keyword))
                        .ok_or_else(|| {
                            FatalError::Generation(format!(
                                "no extension owns the keyword '{}'",
                                keyword
                            ))
                        })?;
                    match extension.generate_javascript(payload, "script") {
                        Ok(code) => out.push_str(&code),
                        Err(message) => {
                            return Err(FatalError::Generation(format!(
                                "extension '{}' rejected its own node: {}",
                                extension.name(),
                                message
                            )));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn emit_target(&mut self, target: &JsNode) -> FatalResult<String> {
        match target {
            JsNode::EnhancedSelector(selector) => Ok(selector_js(selector)),
            JsNode::Raw(text) => Ok(rewrite_inline(text)),
            other => {
                let rendered = self.emit_script(std::slice::from_ref(other))?;
                Ok(rendered)
            }
        }
    }

    /// `vir`-generated top-level functions; these precede all script bodies.
    pub fn prologue(&self) -> String {
        let mut out = String::new();
        for (name, handler) in &self.vir_functions {
            out.push_str(&format!(
                "function {}() {{ return ({}).apply(this, arguments); }}\n",
                name, handler
            ));
        }
        out
    }

    /// Coalesced delegate listeners: one per `(parent, event)` with merged
    /// branches in first-registration order.
    pub fn epilogue(&self) -> String {
        let mut out = String::new();
        for ((parent, event), branches) in &self.delegates {
            out.push_str(&format!("{}.addEventListener('{}', function(event) {{\n", parent, event));
            for (i, (selector, handler)) in branches.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "else if" };
                out.push_str(&format!(
                    "  {} (event.target.matches('{}')) {{ ({})(event); }}\n",
                    keyword, selector, handler
                ));
            }
            out.push_str("});\n");
        }
        out
    }

    /// Number of generated vir functions; equals the sum of method keys over
    /// all declarations, without duplicates.
    pub fn vir_function_count(&self) -> usize {
        self.vir_functions.len()
    }
}

/// Lower one enhanced selector to element-resolution JS.
pub fn selector_js(selector: &EnhancedSelector) -> String {
    match selector.kind {
        SelectorFlavor::Id => format!(
            "document.getElementById('{}')",
            selector.text.trim_start_matches('#')
        ),
        SelectorFlavor::Class | SelectorFlavor::Tag | SelectorFlavor::Complex => {
            format!("document.querySelector('{}')", selector.text)
        }
        SelectorFlavor::Indexed => format!(
            "document.querySelectorAll('{}')[{}]",
            selector.text,
            selector.index.unwrap_or(0)
        ),
        // Ambiguous bare name: id wins, class is the fallback. The decision
        // lives in the generated code, not the AST.
        SelectorFlavor::Mixed => format!(
            "(document.getElementById('{0}') || document.getElementsByClassName('{0}')[0])",
            selector.text
        ),
    }
}

/// CSS selector text for `event.target.matches(...)` dispatch.
fn css_selector_text(selector: &EnhancedSelector) -> String {
    selector.text.clone()
}

/// Re-lex a raw chunk and lower any embedded enhanced selectors and arrow
/// operators; everything else passes through byte-for-byte.
pub fn rewrite_inline(text: &str) -> String {
    if !text.contains("{{") && !text.contains("->") {
        return text.to_string();
    }
    let scratch_sink = DiagnosticsSink::new();
    let file = ParseSourceFile::new(text.to_string(), "<inline>".to_string());
    let tokens = JsLexer::new(file, &scratch_sink).tokenize();
    let mut out = String::new();
    for token in &tokens {
        match token.kind {
            JsTokenKind::Selector => {
                let selector = classify_selector_text(&token.text, &token.span);
                out.push_str(&selector_js(&selector));
            }
            JsTokenKind::Arrow => out.push('.'),
            JsTokenKind::Eof => {}
            _ => out.push_str(&token.source_text),
        }
    }
    out
}

fn emit_animate(animate: &AnimateBlock) -> String {
    let get = |key: &str| {
        animate
            .config
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    let target = get("target")
        .map(|t| rewrite_inline(&t))
        .unwrap_or_else(|| "null".to_string());
    let duration = get("duration").unwrap_or_else(|| "400".to_string());
    let begin = get("begin").map(|t| rewrite_inline(&t)).unwrap_or_else(|| "null".to_string());
    let end = get("end").map(|t| rewrite_inline(&t)).unwrap_or_else(|| "null".to_string());

    format!(
        "(function() {{\n\
         \x20 var __target = {target};\n\
         \x20 var __duration = {duration};\n\
         \x20 var __begin = {begin};\n\
         \x20 var __end = {end};\n\
         \x20 var __start = null;\n\
         \x20 if (__target && __begin) Object.assign(__target.style, __begin);\n\
         \x20 function __step(__now) {{\n\
         \x20   if (__start === null) __start = __now;\n\
         \x20   var __progress = Math.min((__now - __start) / __duration, 1);\n\
         \x20   if (__progress >= 1) {{\n\
         \x20     if (__target && __end) Object.assign(__target.style, __end);\n\
         \x20     return;\n\
         \x20   }}\n\
         \x20   requestAnimationFrame(__step);\n\
         \x20 }}\n\
         \x20 requestAnimationFrame(__step);\n\
         }})();\n"
    )
}
