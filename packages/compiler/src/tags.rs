//! HTML tag tables shared by the generators and the enhanced-selector
//! classifier.

use std::collections::HashSet;

lazy_static::lazy_static! {
    /// Tags that never take a closing tag.
    pub static ref VOID_TAGS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link",
        "meta", "param", "source", "track", "wbr",
    ]
    .into_iter()
    .collect();

    /// Tags rendered inline in pretty mode (no surrounding line breaks).
    pub static ref INLINE_TAGS: HashSet<&'static str> = [
        "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "data", "dfn",
        "em", "i", "kbd", "mark", "q", "rp", "rt", "ruby", "s", "samp",
        "small", "span", "strong", "sub", "sup", "time", "u", "var", "wbr",
    ]
    .into_iter()
    .collect();

    /// Every standard HTML tag name; used to disambiguate `{{name}}`.
    pub static ref KNOWN_TAGS: HashSet<&'static str> = [
        "a", "abbr", "address", "area", "article", "aside", "audio", "b",
        "base", "bdi", "bdo", "blockquote", "body", "br", "button", "canvas",
        "caption", "cite", "code", "col", "colgroup", "data", "datalist",
        "dd", "del", "details", "dfn", "dialog", "div", "dl", "dt", "em",
        "embed", "fieldset", "figcaption", "figure", "footer", "form", "h1",
        "h2", "h3", "h4", "h5", "h6", "head", "header", "hgroup", "hr",
        "html", "i", "iframe", "img", "input", "ins", "kbd", "label",
        "legend", "li", "link", "main", "map", "mark", "menu", "meta",
        "meter", "nav", "noscript", "object", "ol", "optgroup", "option",
        "output", "p", "param", "picture", "pre", "progress", "q", "rp",
        "rt", "ruby", "s", "samp", "script", "section", "select", "slot",
        "small", "source", "span", "strong", "style", "sub", "summary",
        "sup", "table", "tbody", "td", "template", "textarea", "tfoot",
        "th", "thead", "time", "title", "tr", "track", "u", "ul", "var",
        "video", "wbr",
    ]
    .into_iter()
    .collect();
}

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(tag)
}

pub fn is_inline_tag(tag: &str) -> bool {
    INLINE_TAGS.contains(tag)
}

pub fn is_known_tag(tag: &str) -> bool {
    KNOWN_TAGS.contains(tag)
}
