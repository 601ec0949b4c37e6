//! HTML generator.
//!
//! Walks the resolved tree through the shared visitor contract, emitting
//! open/close tags and text. Local style blocks hoist into a CSS side
//! channel (wrapped in the element's id or an auto-generated class when they
//! hold bare properties); script blocks aggregate into a script side channel
//! for the JS pipeline. Text content is emitted verbatim.

use crate::chtl::ast::*;
use crate::config::CompilerOptions;
use crate::diagnostics::{DiagnosticKind, DiagnosticsSink};
use crate::symbols::{GlobalKind, GlobalSymbolMap};
use crate::tags;

use super::css_emitter;
use super::emitter::CodeWriter;

/// A hoisted piece of CSS with the source position that orders it among
/// user-written global styles.
#[derive(Debug, Clone)]
pub struct HoistedCss {
    pub position: usize,
    pub css: String,
}

/// A collected script body awaiting the JS pipeline.
#[derive(Debug, Clone)]
pub struct ScriptChunk {
    pub position: usize,
    pub raw: String,
    pub local: bool,
}

#[derive(Debug, Default)]
pub struct HtmlOutput {
    pub html: String,
    pub hoisted_css: Vec<HoistedCss>,
    pub scripts: Vec<ScriptChunk>,
    pub top_level_tags: Vec<String>,
    pub uses_html5: bool,
}

struct ElementFrame {
    tag: String,
    void: bool,
    /// Only-text content renders on a single line in pretty mode.
    simple: bool,
}

pub struct HtmlEmitter<'a> {
    map: &'a GlobalSymbolMap,
    options: &'a CompilerOptions,
    sink: &'a DiagnosticsSink,
    writer: CodeWriter,
    hoisted: Vec<HoistedCss>,
    scripts: Vec<ScriptChunk>,
    top_level_tags: Vec<String>,
    uses_html5: bool,
    auto_class_index: usize,
    elements: Vec<ElementFrame>,
    /// Depth of subtrees excluded from HTML output (declarations, style and
    /// script bodies).
    suppress: usize,
}

pub fn emit_html(
    root: &Root,
    map: &GlobalSymbolMap,
    options: &CompilerOptions,
    sink: &DiagnosticsSink,
) -> HtmlOutput {
    let mut emitter = HtmlEmitter {
        map,
        options,
        sink,
        writer: CodeWriter::new(!options.minify),
        hoisted: Vec::new(),
        scripts: Vec::new(),
        top_level_tags: Vec::new(),
        uses_html5: false,
        auto_class_index: options.index_initial_count,
        elements: Vec::new(),
        suppress: 0,
    };
    for child in &root.children {
        visit(child, &mut emitter);
    }
    HtmlOutput {
        html: emitter.writer.into_string(),
        hoisted_css: emitter.hoisted,
        scripts: emitter.scripts,
        top_level_tags: emitter.top_level_tags,
        uses_html5: emitter.uses_html5,
    }
}

impl<'a> HtmlEmitter<'a> {
    fn is_suppressed_container(node: &Node) -> bool {
        matches!(
            node,
            Node::Template(_)
                | Node::Custom(_)
                | Node::Configuration(_)
                | Node::Import(_)
                | Node::StyleBlock(_)
                | Node::ScriptBlock(_)
                | Node::Constraint(_)
                | Node::Deletion(_)
                | Node::Insertion(_)
                | Node::Inheritance(_)
                | Node::TemplateRef(_)
                | Node::CustomRef(_)
        )
    }

    fn enter_element(&mut self, element: &Element) {
        if self.elements.is_empty() {
            self.top_level_tags.push(element.tag.clone());
        }

        let extra_class = self.hoist_local_styles(element);
        let void = tags::is_void_tag(&element.tag);
        let simple = element.children.iter().all(|child| {
            matches!(child, Node::Text(_)) || Self::is_suppressed_container(child)
        });

        let mut open = format!("<{}", element.tag);
        let mut wrote_class = false;
        for attr in &element.attributes {
            if attr.name == "class" {
                wrote_class = true;
                let value = match &extra_class {
                    Some(auto) => format!("{} {}", attr.value, auto),
                    None => attr.value.clone(),
                };
                open.push_str(&format!(" class=\"{}\"", escape_attr(&value)));
            } else {
                open.push_str(&format!(" {}=\"{}\"", attr.name, escape_attr(&attr.value)));
            }
        }
        if !wrote_class {
            if let Some(auto) = &extra_class {
                open.push_str(&format!(" class=\"{}\"", auto));
            }
        }
        open.push('>');

        if simple || tags::is_inline_tag(&element.tag) {
            self.writer.write(&open);
        } else {
            self.writer.println(&open);
            self.writer.indent();
        }
        self.elements.push(ElementFrame {
            tag: element.tag.clone(),
            void,
            simple: simple || tags::is_inline_tag(&element.tag),
        });
    }

    fn leave_element(&mut self) {
        let Some(frame) = self.elements.pop() else { return };
        if frame.void {
            self.writer.end_line();
            return;
        }
        if frame.simple {
            self.writer.write(&format!("</{}>", frame.tag));
            self.writer.end_line();
        } else {
            self.writer.dedent();
            self.writer.println(&format!("</{}>", frame.tag));
        }
    }

    /// Compute the hoisted CSS for every local style block of `element`;
    /// returns the auto-generated class to add, if one was needed.
    fn hoist_local_styles(&mut self, element: &Element) -> Option<String> {
        let style_blocks: Vec<&StyleBlock> = element
            .children
            .iter()
            .filter_map(|child| match child {
                Node::StyleBlock(style) if style.local => Some(style),
                _ => None,
            })
            .collect();
        if style_blocks.is_empty() {
            return None;
        }

        let id_attr = element.attributes.iter().find(|a| a.name == "id");
        let has_bare = style_blocks
            .iter()
            .any(|style| style.children.iter().any(|c| matches!(c, Node::Property(_))));

        let mut extra_class = None;
        let host_selector = if let Some(id) = id_attr {
            format!("#{}", id.value)
        } else if has_bare && !self.options.disable_style_auto_add_class {
            let class = format!("chtl-auto-{}", self.auto_class_index);
            self.auto_class_index += 1;
            extra_class = Some(class.clone());
            format!(".{}", class)
        } else {
            element.tag.clone()
        };

        for style in style_blocks {
            let mut writer = CodeWriter::new(!self.options.minify);
            let bare: Vec<&Property> = style
                .children
                .iter()
                .filter_map(|node| match node {
                    Node::Property(p) => Some(p),
                    _ => None,
                })
                .collect();
            if !bare.is_empty() {
                css_emitter::emit_rule(&host_selector, &bare, &mut writer);
            }
            for node in &style.children {
                if let Node::Selector(selector) = node {
                    // Class/id/element selectors hoist verbatim; `&` and
                    // pseudo forms bind to the host element's selector.
                    let parent = match selector.kind {
                        SelectorKind::Ampersand
                        | SelectorKind::PseudoClass
                        | SelectorKind::PseudoElement => Some(host_selector.as_str()),
                        _ => None,
                    };
                    css_emitter::emit_selector(selector, parent, &mut writer);
                }
            }
            if !writer.is_empty() {
                self.hoisted.push(HoistedCss {
                    position: style.span.start.offset,
                    css: writer.into_string(),
                });
            }
        }
        extra_class
    }

    fn emit_origin(&mut self, kind: &OriginKind, raw: &str, position: usize) {
        match kind {
            OriginKind::Html => {
                self.writer.println(raw.trim_matches('\n'));
            }
            OriginKind::Style => {
                self.hoisted.push(HoistedCss {
                    position,
                    css: raw.trim().to_string(),
                });
            }
            OriginKind::JavaScript => {
                self.scripts.push(ScriptChunk {
                    position,
                    raw: raw.to_string(),
                    local: false,
                });
            }
            OriginKind::Custom(_) => {
                // User-declared formats pass through as raw HTML.
                self.writer.println(raw.trim_matches('\n'));
            }
        }
    }
}

impl<'a> Visitor for HtmlEmitter<'a> {
    fn on_enter(&mut self, node: &Node) {
        if self.suppress > 0 {
            if Self::is_suppressed_container(node) {
                self.suppress += 1;
            }
            return;
        }
        match node {
            Node::Element(element) => self.enter_element(element),
            Node::Text(text) => {
                let inline = self.elements.last().map(|f| f.simple).unwrap_or(false);
                if inline {
                    self.writer.write(&text.content);
                } else {
                    self.writer.println(&text.content);
                }
            }
            Node::Comment(comment) if comment.kind == CommentKind::Generator => {
                self.writer.println(&format!("<!-- {} -->", comment.text));
            }
            Node::ScriptBlock(script) => {
                self.scripts.push(ScriptChunk {
                    position: script.span.start.offset,
                    raw: script.raw.clone(),
                    local: script.local,
                });
                self.suppress += 1;
            }
            Node::StyleBlock(style) => {
                if !style.local {
                    // Top-level style: selector rules hoist verbatim.
                    let mut writer = CodeWriter::new(!self.options.minify);
                    css_emitter::emit_style_children(&style.children, None, &mut writer);
                    if !writer.is_empty() {
                        self.hoisted.push(HoistedCss {
                            position: style.span.start.offset,
                            css: writer.into_string(),
                        });
                    }
                }
                self.suppress += 1;
            }
            Node::Use(use_stmt) => {
                if use_stmt.target == "html5" {
                    self.uses_html5 = true;
                }
            }
            Node::Origin(origin) => {
                if origin.name.is_none() {
                    self.emit_origin(&origin.kind, &origin.raw, origin.span.start.offset);
                }
            }
            Node::OriginUse(use_site) => {
                match self.map.find(GlobalKind::Origin, &use_site.name, &[]) {
                    Some(obj) => {
                        if let Node::Origin(decl) = obj.body.as_ref() {
                            self.emit_origin(&decl.kind, &decl.raw, use_site.span.start.offset);
                        }
                    }
                    None => {
                        self.sink.error(
                            DiagnosticKind::Resolution,
                            format!("unknown origin '{}'", use_site.name),
                            Some(use_site.span.clone()),
                        );
                    }
                }
            }
            node if Self::is_suppressed_container(node) => {
                self.suppress += 1;
            }
            _ => {}
        }
    }

    fn on_leave(&mut self, node: &Node) {
        if Self::is_suppressed_container(node) {
            self.suppress = self.suppress.saturating_sub(1);
            return;
        }
        if self.suppress > 0 {
            return;
        }
        if let Node::Element(_) = node {
            self.leave_element();
        }
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
