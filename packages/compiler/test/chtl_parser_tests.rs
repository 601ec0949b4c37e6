//! CHTL parser integration tests.

use chtl_compiler::chtl::ast::*;
use chtl_compiler::chtl::parser::Parser;
use chtl_compiler::config::SettingValue;
use chtl_compiler::diagnostics::DiagnosticsSink;
use chtl_compiler::symbols::{GlobalKind, GlobalSymbolMap};

fn parse(source: &str) -> (Root, DiagnosticsSink) {
    let sink = DiagnosticsSink::new();
    let root = Parser::new(source, "test.chtl", &sink).parse();
    (root, sink)
}

fn parse_with_map(source: &str) -> (Root, GlobalSymbolMap, DiagnosticsSink) {
    let sink = DiagnosticsSink::new();
    let map = GlobalSymbolMap::new();
    let root = Parser::new(source, "test.chtl", &sink)
        .with_symbol_map(&map)
        .parse();
    (root, map, sink)
}

fn only_element(root: &Root) -> &Element {
    let mut elements = root.children.iter().filter_map(|node| match node {
        Node::Element(e) => Some(e),
        _ => None,
    });
    let element = elements.next().expect("expected an element");
    assert!(elements.next().is_none(), "expected exactly one element");
    element
}

#[test]
fn parses_empty_element() {
    let (root, sink) = parse("div { }");
    assert!(sink.is_empty());
    let element = only_element(&root);
    assert_eq!(element.tag, "div");
    assert!(element.attributes.is_empty());
    assert!(element.children.is_empty());
}

#[test]
fn parses_attributes_with_both_separators() {
    let (root, sink) = parse("div { class: \"container\"; id = main; }");
    assert!(sink.is_empty());
    let element = only_element(&root);
    assert_eq!(element.attributes.len(), 2);
    assert_eq!(element.attributes[0].name, "class");
    assert_eq!(element.attributes[0].value, "container");
    assert!(!element.attributes[0].assigned_with_equals);
    assert_eq!(element.attributes[1].name, "id");
    assert_eq!(element.attributes[1].value, "main");
    assert!(element.attributes[1].assigned_with_equals);
}

#[test]
fn parses_text_forms() {
    let (root, _) = parse("p { text { \"quoted\" } } q { text { bare words } }");
    let texts: Vec<&Text> = root
        .children
        .iter()
        .flat_map(|n| n.children())
        .filter_map(|n| match n {
            Node::Text(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0].content, "quoted");
    assert!(texts[0].literal);
    assert_eq!(texts[1].content, "bare words");
    assert!(!texts[1].literal);
}

#[test]
fn nested_elements_preserve_order() {
    let (root, _) = parse("div { a { } b { } c { } }");
    let tags: Vec<&str> = only_element(&root)
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Element(e) => Some(e.tag.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tags, vec!["a", "b", "c"]);
}

#[test]
fn generator_comment_becomes_a_node_others_are_skipped() {
    let (root, _) = parse("-- keep\n// drop\n/* drop */ div { }");
    assert!(matches!(
        &root.children[0],
        Node::Comment(c) if c.kind == CommentKind::Generator && c.text == "keep"
    ));
    assert_eq!(root.children.len(), 2);
}

#[test]
fn template_declaration_registers_in_the_map() {
    let (root, map, sink) = parse_with_map("[Template] @Style Theme { color: red; }");
    assert!(sink.is_empty());
    assert!(matches!(&root.children[0], Node::Template(t) if t.name == "Theme"));
    assert!(map.find(GlobalKind::TemplateStyle, "Theme", &[]).is_some());
}

#[test]
fn duplicate_declaration_is_reported() {
    let (_, _, sink) =
        parse_with_map("[Template] @Var A { x: 1; } [Template] @Var A { x: 2; }");
    assert_eq!(sink.error_count(), 1);
    assert!(sink.format_all(false).contains("duplicate"));
}

#[test]
fn inherit_statements_hoist_into_the_header() {
    let (root, _) = parse("[Template] @Style Leaf { inherit @Style Base; color: red; }");
    let Node::Template(template) = &root.children[0] else {
        panic!("expected template");
    };
    assert_eq!(template.inherits.len(), 1);
    assert_eq!(template.inherits[0].name, "Base");
    // The inherit statement left the body; only the property remains.
    assert_eq!(template.body.len(), 1);
}

#[test]
fn custom_with_specialization_ops() {
    let (root, _) = parse(
        "[Custom] @Element Card { div { } delete span; insert at bottom { p { } } }",
    );
    let Node::Custom(custom) = &root.children[0] else {
        panic!("expected custom");
    };
    assert_eq!(custom.kind, DeclKind::Element);
    assert!(custom.body.iter().any(|n| matches!(n, Node::Deletion(_))));
    assert!(custom.body.iter().any(|n| matches!(
        n,
        Node::Insertion(i) if i.position == InsertPosition::AtBottom
    )));
}

#[test]
fn origin_declaration_and_use() {
    let (root, map, sink) = parse_with_map(
        "[Origin] @Html banner { <b>raw { }</b> } div { [Origin] @Html banner; }",
    );
    assert!(sink.is_empty(), "{:?}", sink.entries());
    assert!(matches!(
        &root.children[0],
        Node::Origin(o) if o.kind == OriginKind::Html && o.raw.contains("<b>raw { }</b>")
    ));
    assert!(map.find(GlobalKind::Origin, "banner", &[]).is_some());
    let element = only_element(&root);
    assert!(matches!(
        &element.children[0],
        Node::OriginUse(u) if u.name == "banner"
    ));
}

#[test]
fn custom_origin_kind_is_preserved() {
    let (root, _) = parse("[Origin] @Vue widget { <template></template> }");
    assert!(matches!(
        &root.children[0],
        Node::Origin(o) if o.kind == OriginKind::Custom("Vue".to_string())
    ));
}

#[test]
fn configuration_settings_and_groups() {
    let (root, _, _) = parse_with_map(
        "[Configuration] { DEBUG_MODE = true; INDEX_INITIAL_COUNT = 5; [Names] { a, b, c } }",
    );
    let Node::Configuration(config) = &root.children[0] else {
        panic!("expected configuration");
    };
    assert_eq!(config.set.settings["DEBUG_MODE"], SettingValue::Bool(true));
    assert_eq!(config.set.settings["INDEX_INITIAL_COUNT"], SettingValue::Int(5));
    assert_eq!(config.set.groups["Names"], vec!["a", "b", "c"]);
}

#[test]
fn namespaces_nest_and_qualify() {
    let (_, map, sink) = parse_with_map(
        "[Namespace] outer { [Namespace] inner { [Template] @Var V { k: 1; } } }",
    );
    assert!(sink.is_empty());
    assert!(map
        .find(GlobalKind::TemplateVar, "outer.inner.V", &[])
        .is_some());
}

#[test]
fn imports_parse_all_shapes() {
    let (root, _) = parse(
        "[Import] @Chtl from module.Theme;\n\
         [Import] @Style Base from \"styles.chtl\" as S;\n\
         [Import] @CJmod from printMylove;",
    );
    let imports: Vec<&ImportDecl> = root
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Import(i) => Some(i),
            _ => None,
        })
        .collect();
    assert_eq!(imports.len(), 3);
    assert_eq!(imports[0].kind, ImportKind::Chtl);
    assert_eq!(imports[0].path, "module.Theme");
    assert_eq!(imports[1].symbol.as_deref(), Some("Base"));
    assert_eq!(imports[1].alias.as_deref(), Some("S"));
    assert_eq!(imports[2].kind, ImportKind::CJmod);
}

#[test]
fn style_block_selectors_and_properties() {
    let (root, sink) = parse(
        "div { style { width: 100%; .box { color: red; } #top { margin: 0; } &:hover { color: blue; } } }",
    );
    assert!(sink.is_empty(), "{:?}", sink.entries());
    let element = only_element(&root);
    let Node::StyleBlock(style) = &element.children[0] else {
        panic!("expected style block");
    };
    assert!(style.local);
    let kinds: Vec<&Node> = style.children.iter().collect();
    assert!(matches!(kinds[0], Node::Property(p) if p.name == "width"));
    assert!(matches!(kinds[1], Node::Selector(s) if s.kind == SelectorKind::Class && s.text == ".box"));
    assert!(matches!(kinds[2], Node::Selector(s) if s.kind == SelectorKind::Id && s.text == "#top"));
    assert!(matches!(kinds[3], Node::Selector(s) if s.kind == SelectorKind::Ampersand && s.text == "&:hover"));
}

#[test]
fn property_value_spacing_follows_css_rules() {
    let (root, _) = parse("div { style { margin: 0 auto; border: 1px solid red; color: #aabbcc; } }");
    let element = only_element(&root);
    let Node::StyleBlock(style) = &element.children[0] else {
        panic!("expected style block");
    };
    let values: Vec<String> = style
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Property(p) => Some(p.value_text()),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec!["0 auto", "1px solid red", "#aabbcc"]);
}

#[test]
fn variable_calls_stay_structured() {
    let (root, _) = parse("div { style { color: Theme(primary); background: rgb(1,2,3); } }");
    let element = only_element(&root);
    let Node::StyleBlock(style) = &element.children[0] else {
        panic!("expected style block");
    };
    let Node::Property(color) = &style.children[0] else {
        panic!("expected property");
    };
    assert_eq!(
        color.segments,
        vec![ValueSegment::Call { name: "Theme".to_string(), args: vec!["primary".to_string()] }]
    );
}

#[test]
fn script_block_captures_raw_body() {
    let (root, _) = parse("div { script { if (a) { b(); } } }");
    let element = only_element(&root);
    let Node::ScriptBlock(script) = &element.children[0] else {
        panic!("expected script block");
    };
    assert!(script.local);
    assert_eq!(script.raw.trim(), "if (a) { b(); }");
}

#[test]
fn reference_with_namespace_and_specialization() {
    let (root, _) = parse("body { @Element Card from ui { delete span; }; }");
    let body = only_element(&root);
    let Node::TemplateRef(reference) = &body.children[0] else {
        panic!("expected reference");
    };
    assert_eq!(reference.name, "Card");
    assert_eq!(reference.namespace.as_deref(), Some("ui"));
    assert!(!reference.fully_qualified);
    assert_eq!(reference.specializations.len(), 1);
}

#[test]
fn explicit_custom_reference_at_top_level() {
    let (root, _) = parse("[Custom] @Element Card;");
    assert!(matches!(
        &root.children[0],
        Node::CustomRef(r) if r.name == "Card" && r.fully_qualified
    ));
}

#[test]
fn use_html5_statement() {
    let (root, _) = parse("use html5; div { }");
    assert!(matches!(&root.children[0], Node::Use(u) if u.target == "html5"));
}

#[test]
fn parser_recovers_after_errors() {
    let (root, sink) = parse("div { : ; } p { text { ok } }");
    assert!(sink.error_count() >= 1);
    // The second element still parses.
    assert!(root.children.iter().any(|n| matches!(
        n,
        Node::Element(e) if e.tag == "p"
    )));
}

#[test]
fn deletion_kinds_follow_context() {
    let (root, _) = parse(
        "[Custom] @Style S { delete margin; } [Custom] @Element E { delete div[1]; delete @Element Base; }",
    );
    let Node::Custom(style_custom) = &root.children[0] else { panic!() };
    assert!(matches!(
        &style_custom.body[0],
        Node::Deletion(d) if d.kind == DeletionKind::Property
    ));
    let Node::Custom(element_custom) = &root.children[1] else { panic!() };
    assert!(matches!(
        &element_custom.body[0],
        Node::Deletion(d) if d.kind == DeletionKind::Element && d.targets[0].index == Some(1)
    ));
    assert!(matches!(
        &element_custom.body[1],
        Node::Deletion(d) if d.kind == DeletionKind::ElementInheritance
    ));
}
