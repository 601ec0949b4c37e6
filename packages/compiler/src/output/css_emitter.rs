//! CSS generator: turns resolved style children into rule text.
//!
//! Selector nesting is flattened the CSS-preprocessor way: nested selectors
//! join their parents with a space, `&` splices the parent selector in
//! directly.

use crate::chtl::ast::{Node, Property, Selector, SelectorKind};

use super::emitter::CodeWriter;

/// Emit rules for a style block whose children are selectors and bare
/// properties. Bare properties are wrapped in `wrap_selector` when given;
/// without one they are dropped (a top-level style block has no host
/// element to attach them to).
pub fn emit_style_children(
    children: &[Node],
    wrap_selector: Option<&str>,
    writer: &mut CodeWriter,
) {
    let bare: Vec<&Property> = children
        .iter()
        .filter_map(|node| match node {
            Node::Property(p) => Some(p),
            _ => None,
        })
        .collect();
    if let Some(selector) = wrap_selector {
        if !bare.is_empty() {
            emit_rule(selector, &bare, writer);
        }
    }
    for node in children {
        if let Node::Selector(selector) = node {
            emit_selector(selector, wrap_selector, writer);
        }
    }
}

/// One selector with its properties, then its nested selectors flattened.
pub fn emit_selector(selector: &Selector, parent: Option<&str>, writer: &mut CodeWriter) {
    let effective = effective_selector(selector, parent);
    if !selector.properties.is_empty() {
        let props: Vec<&Property> = selector.properties.iter().collect();
        emit_rule(&effective, &props, writer);
    }
    for nested in &selector.nested {
        emit_selector(nested, Some(&effective), writer);
    }
}

fn effective_selector(selector: &Selector, parent: Option<&str>) -> String {
    match (selector.kind, parent) {
        (SelectorKind::Ampersand, Some(parent)) => selector.text.replacen('&', parent, 1),
        (SelectorKind::Ampersand, None) => selector.text.trim_start_matches('&').to_string(),
        (SelectorKind::PseudoClass | SelectorKind::PseudoElement, Some(parent)) => {
            format!("{}{}", parent, selector.text)
        }
        (_, Some(parent)) => format!("{} {}", parent, selector.text),
        (_, None) => selector.text.clone(),
    }
}

pub fn emit_rule(selector: &str, properties: &[&Property], writer: &mut CodeWriter) {
    if writer.pretty() {
        writer.println(&format!("{} {{", selector));
        writer.indent();
        for property in properties {
            writer.println(&format!("{}: {};", property.name, property.value_text()));
        }
        writer.dedent();
        writer.println("}");
    } else {
        writer.write(selector);
        writer.write("{");
        for property in properties {
            writer.write(&format!("{}:{};", property.name, property.value_text()));
        }
        writer.write("}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chtl::ast::ValueSegment;
    use crate::parse_util::{ParseSourceFile, ParseSourceSpan};

    fn span() -> ParseSourceSpan {
        ParseSourceSpan::empty(&ParseSourceFile::new(String::new(), "t".to_string()))
    }

    fn prop(name: &str, value: &str) -> Property {
        Property {
            name: name.to_string(),
            segments: vec![ValueSegment::Text(value.to_string())],
            assigned_with_equals: false,
            span: span(),
        }
    }

    #[test]
    fn emits_wrapped_bare_properties() {
        let children = vec![Node::Property(prop("color", "red"))];
        let mut writer = CodeWriter::new(true);
        emit_style_children(&children, Some(".box"), &mut writer);
        assert_eq!(writer.into_string(), ".box {\n  color: red;\n}\n");
    }

    #[test]
    fn ampersand_splices_parent() {
        let selector = Selector {
            kind: SelectorKind::Ampersand,
            text: "&:hover".to_string(),
            properties: vec![prop("color", "blue")],
            nested: vec![],
            span: span(),
        };
        let mut writer = CodeWriter::new(true);
        emit_selector(&selector, Some("#main"), &mut writer);
        assert!(writer.into_string().starts_with("#main:hover {"));
    }

    #[test]
    fn nested_selectors_flatten_with_space() {
        let selector = Selector {
            kind: SelectorKind::Element,
            text: "ul".to_string(),
            properties: vec![],
            nested: vec![Selector {
                kind: SelectorKind::Class,
                text: ".item".to_string(),
                properties: vec![prop("margin", "0")],
                nested: vec![],
                span: span(),
            }],
            span: span(),
        };
        let mut writer = CodeWriter::new(true);
        emit_selector(&selector, None, &mut writer);
        assert!(writer.into_string().contains("ul .item {"));
    }

    #[test]
    fn minified_rule_is_tight() {
        let mut writer = CodeWriter::new(false);
        emit_rule("body", &[&prop("margin", "0")], &mut writer);
        assert_eq!(writer.into_string(), "body{margin:0;}");
    }
}
