//! CHTL-JS abstract syntax tree.
//!
//! Plain JavaScript flows through as [`JsNode::Raw`] chunks; only the
//! constructs this dialect adds get structure. CJMOD-contributed syntax
//! arrives as [`JsNode::Foreign`] and stays opaque until its owning extension
//! generates code for it.

use serde::{Deserialize, Serialize};

use crate::parse_util::ParseSourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorFlavor {
    Tag,
    Class,
    Id,
    /// Bare name that is neither a known tag nor explicitly marked; the
    /// generated JS tries id first, then class.
    Mixed,
    Indexed,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSelector {
    pub text: String,
    pub kind: SelectorFlavor,
    pub index: Option<usize>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenBinding {
    pub event: String,
    /// Raw JS expression for the handler.
    pub handler: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenBlock {
    pub target: Box<JsNode>,
    pub bindings: Vec<ListenBinding>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateBlock {
    pub parent: Box<JsNode>,
    pub targets: Vec<EnhancedSelector>,
    pub bindings: Vec<ListenBinding>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimateBlock {
    pub config: Vec<(String, String)>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualObject {
    pub name: String,
    /// The expression after `=`, kept verbatim for diagnostics.
    pub source_call: String,
    /// Method key -> raw handler expression, in declaration order.
    pub methods: Vec<(String, String)>,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualCall {
    pub name: String,
    pub method: String,
    pub args: String,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrowAccess {
    pub target: Box<JsNode>,
    pub method: String,
    pub span: ParseSourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsNode {
    /// Verbatim JavaScript.
    Raw(String),
    EnhancedSelector(EnhancedSelector),
    Arrow(ArrowAccess),
    Listen(ListenBlock),
    Delegate(DelegateBlock),
    Animate(AnimateBlock),
    VirDecl(VirtualObject),
    VirCall(VirtualCall),
    /// CJMOD-owned span; `payload` is whatever the extension's parser
    /// returned and only that extension can generate code for it.
    Foreign {
        keyword: String,
        payload: String,
        span: ParseSourceSpan,
    },
}
