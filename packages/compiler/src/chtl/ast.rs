//! CHTL abstract syntax tree.
//!
//! A single tagged [`Node`] enum covers structural, declarative and operator
//! variants. Traversal goes through the enter/leave [`Visitor`] contract;
//! generators and the resolution engine share it. Reference nodes stay
//! unresolved until the resolution engine produces a resolved clone of the
//! tree; originals are never mutated in place.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::ConfigurationSet;
use crate::parse_util::ParseSourceSpan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Root(Root),
    Element(Element),
    Text(Text),
    Comment(Comment),
    Template(TemplateDecl),
    Custom(CustomDecl),
    Origin(OriginDecl),
    Configuration(ConfigurationDecl),
    Namespace(NamespaceDecl),
    Import(ImportDecl),
    Use(UseStatement),
    StyleBlock(StyleBlock),
    Selector(Selector),
    Property(Property),
    ScriptBlock(ScriptBlock),
    TemplateRef(Reference),
    CustomRef(Reference),
    OriginUse(OriginUse),
    Inheritance(Inheritance),
    Deletion(Deletion),
    Insertion(Insertion),
    Constraint(Constraint),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub children: Vec<Node>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    pub assigned_with_equals: bool,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub content: String,
    /// True when the source used a quoted literal.
    pub literal: bool,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentKind {
    Line,
    Block,
    /// `-- text`; survives into the generated output.
    Generator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub kind: CommentKind,
    pub text: String,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclKind {
    Style,
    Element,
    Var,
}

impl DeclKind {
    pub fn marker(&self) -> &'static str {
        match self {
            DeclKind::Style => "@Style",
            DeclKind::Element => "@Element",
            DeclKind::Var => "@Var",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDecl {
    pub kind: DeclKind,
    pub name: String,
    pub inherits: SmallVec<[Reference; 2]>,
    pub body: Vec<Node>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomDecl {
    pub kind: DeclKind,
    pub name: String,
    pub inherits: SmallVec<[Reference; 2]>,
    pub body: Vec<Node>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginKind {
    Html,
    Style,
    JavaScript,
    /// User-declared format, e.g. `[Origin] @Vue`.
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginDecl {
    pub kind: OriginKind,
    pub name: Option<String>,
    /// Captured verbatim by the scanner; never re-parsed.
    pub raw: String,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginUse {
    pub kind: OriginKind,
    pub name: String,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDecl {
    pub set: ConfigurationSet,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceDecl {
    pub name: String,
    pub body: Vec<Node>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportKind {
    Html,
    Style,
    JavaScript,
    Chtl,
    CJmod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub kind: ImportKind,
    pub path: String,
    pub symbol: Option<String>,
    pub alias: Option<String>,
    pub span: ParseSourceSpan,
}

/// `use html5;` — forces full-page mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseStatement {
    pub target: String,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleBlock {
    /// True inside an element body, false for a top-level `style { ... }`.
    pub local: bool,
    pub children: Vec<Node>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorKind {
    Class,
    Id,
    PseudoClass,
    PseudoElement,
    Ampersand,
    Element,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub kind: SelectorKind,
    pub text: String,
    pub properties: Vec<Property>,
    pub nested: Vec<Selector>,
    pub span: ParseSourceSpan,
}

/// One piece of a style property value. Plain token runs are joined at parse
/// time; calls stay structured until the resolution engine decides whether
/// they are variable-group lookups or ordinary CSS functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueSegment {
    Text(String),
    Call {
        name: String,
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub segments: Vec<ValueSegment>,
    pub assigned_with_equals: bool,
    pub span: ParseSourceSpan,
}

impl Property {
    /// Plain-text view of the value; calls render as CSS function syntax.
    pub fn value_text(&self) -> String {
        let mut parts = Vec::new();
        for segment in &self.segments {
            match segment {
                ValueSegment::Text(text) => parts.push(text.clone()),
                ValueSegment::Call { name, args } => {
                    parts.push(format!("{}({})", name, args.join(",")))
                }
            }
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptBlock {
    pub local: bool,
    pub raw: String,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefKind {
    Style,
    Element,
    Var,
}

impl RefKind {
    pub fn decl_kind(&self) -> DeclKind {
        match self {
            RefKind::Style => DeclKind::Style,
            RefKind::Element => DeclKind::Element,
            RefKind::Var => DeclKind::Var,
        }
    }
}

/// Use-site reference to a template or custom, unresolved until the
/// resolution engine expands it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: RefKind,
    pub name: String,
    pub namespace: Option<String>,
    pub fully_qualified: bool,
    /// Use-site specialization body (overrides, deletions, insertions).
    pub specializations: Vec<Node>,
    pub span: ParseSourceSpan,
}

impl Reference {
    pub fn plain(kind: RefKind, name: String, span: ParseSourceSpan) -> Self {
        Reference {
            kind,
            name,
            namespace: None,
            fully_qualified: false,
            specializations: Vec::new(),
            span,
        }
    }
}

/// `inherit @Style Base;` inside a template or custom body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inheritance {
    pub target_kind: RefKind,
    pub target_name: String,
    pub namespace: Option<String>,
    pub explicit: bool,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionKind {
    Property,
    Inheritance,
    Element,
    ElementInheritance,
}

/// Target of a deletion or insertion: `div`, `div[1]`, or `@Style Base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpTarget {
    pub name: String,
    pub index: Option<usize>,
    pub ref_kind: Option<RefKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deletion {
    pub kind: DeletionKind,
    pub targets: Vec<OpTarget>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertPosition {
    After,
    Before,
    Replace,
    AtTop,
    AtBottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insertion {
    pub position: InsertPosition,
    pub target: Option<OpTarget>,
    pub body: Vec<Node>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Except,
    Inherit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub targets: Vec<String>,
    pub span: ParseSourceSpan,
}

impl Node {
    pub fn span(&self) -> &ParseSourceSpan {
        match self {
            Node::Root(n) => &n.span,
            Node::Element(n) => &n.span,
            Node::Text(n) => &n.span,
            Node::Comment(n) => &n.span,
            Node::Template(n) => &n.span,
            Node::Custom(n) => &n.span,
            Node::Origin(n) => &n.span,
            Node::Configuration(n) => &n.span,
            Node::Namespace(n) => &n.span,
            Node::Import(n) => &n.span,
            Node::Use(n) => &n.span,
            Node::StyleBlock(n) => &n.span,
            Node::Selector(n) => &n.span,
            Node::Property(n) => &n.span,
            Node::ScriptBlock(n) => &n.span,
            Node::TemplateRef(n) => &n.span,
            Node::CustomRef(n) => &n.span,
            Node::OriginUse(n) => &n.span,
            Node::Inheritance(n) => &n.span,
            Node::Deletion(n) => &n.span,
            Node::Insertion(n) => &n.span,
            Node::Constraint(n) => &n.span,
        }
    }

    /// Ordered child nodes. Attributes and selector property lists are
    /// structural fields, not children.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Root(n) => &n.children,
            Node::Element(n) => &n.children,
            Node::Template(n) => &n.body,
            Node::Custom(n) => &n.body,
            Node::Namespace(n) => &n.body,
            Node::StyleBlock(n) => &n.children,
            Node::Insertion(n) => &n.body,
            _ => &[],
        }
    }

    /// Deep clone with every span replaced by `span`. Used when a reference
    /// is expanded so errors point at the use site, not the definition.
    pub fn respanned(&self, span: &ParseSourceSpan) -> Node {
        let mut clone = self.clone();
        clone.rebind_spans(span);
        clone
    }

    fn rebind_spans(&mut self, span: &ParseSourceSpan) {
        macro_rules! rebind {
            ($node:expr) => {{
                $node.span = span.clone();
            }};
        }
        match self {
            Node::Root(n) => {
                rebind!(n);
                for child in &mut n.children {
                    child.rebind_spans(span);
                }
            }
            Node::Element(n) => {
                rebind!(n);
                for attr in &mut n.attributes {
                    attr.span = span.clone();
                }
                for child in &mut n.children {
                    child.rebind_spans(span);
                }
            }
            Node::Text(n) => rebind!(n),
            Node::Comment(n) => rebind!(n),
            Node::Template(n) => {
                rebind!(n);
                for child in &mut n.body {
                    child.rebind_spans(span);
                }
            }
            Node::Custom(n) => {
                rebind!(n);
                for child in &mut n.body {
                    child.rebind_spans(span);
                }
            }
            Node::Origin(n) => rebind!(n),
            Node::Configuration(n) => rebind!(n),
            Node::Namespace(n) => {
                rebind!(n);
                for child in &mut n.body {
                    child.rebind_spans(span);
                }
            }
            Node::Import(n) => rebind!(n),
            Node::Use(n) => rebind!(n),
            Node::StyleBlock(n) => {
                rebind!(n);
                for child in &mut n.children {
                    child.rebind_spans(span);
                }
            }
            Node::Selector(n) => rebind_selector(n, span),
            Node::Property(n) => rebind!(n),
            Node::ScriptBlock(n) => rebind!(n),
            Node::TemplateRef(n) => rebind!(n),
            Node::CustomRef(n) => rebind!(n),
            Node::OriginUse(n) => rebind!(n),
            Node::Inheritance(n) => rebind!(n),
            Node::Deletion(n) => rebind!(n),
            Node::Insertion(n) => {
                rebind!(n);
                for child in &mut n.body {
                    child.rebind_spans(span);
                }
            }
            Node::Constraint(n) => rebind!(n),
        }
    }
}

fn rebind_selector(selector: &mut Selector, span: &ParseSourceSpan) {
    selector.span = span.clone();
    for property in &mut selector.properties {
        property.span = span.clone();
    }
    for nested in &mut selector.nested {
        rebind_selector(nested, span);
    }
}

/// Uniform traversal: `on_enter`, children in order, `on_leave`. Visitors may
/// accumulate text (generators), collect facts (validators) or build rewritten
/// clones (resolution); the tree itself is read-only here.
pub trait Visitor {
    fn on_enter(&mut self, _node: &Node) {}
    fn on_leave(&mut self, _node: &Node) {}
}

pub fn visit(node: &Node, visitor: &mut dyn Visitor) {
    visitor.on_enter(node);
    for child in node.children() {
        visit(child, visitor);
    }
    visitor.on_leave(node);
}

pub fn visit_all(nodes: &[Node], visitor: &mut dyn Visitor) {
    for node in nodes {
        visit(node, visitor);
    }
}
