//! CHTL-JS parser integration tests: enhanced selectors, listen/delegate,
//! virtual objects and plain-JS passthrough.

use chtl_compiler::chtl_js::ast::*;
use chtl_compiler::chtl_js::parser::parse_script;
use chtl_compiler::diagnostics::DiagnosticsSink;
use chtl_compiler::parse_util::ParseSourceFile;

fn parse(source: &str) -> (Vec<JsNode>, DiagnosticsSink) {
    let sink = DiagnosticsSink::new();
    let file = ParseSourceFile::new(source.to_string(), "script.js".to_string());
    let nodes = parse_script(file, &sink, None);
    (nodes, sink)
}

fn selectors(nodes: &[JsNode]) -> Vec<&EnhancedSelector> {
    nodes
        .iter()
        .filter_map(|n| match n {
            JsNode::EnhancedSelector(s) => Some(s),
            _ => None,
        })
        .collect()
}

#[test]
fn plain_js_passes_through_untouched() {
    let source = "const x = 1;\nfunction f() { return x; }\n";
    let (nodes, sink) = parse(source);
    assert!(sink.is_empty());
    assert_eq!(nodes.len(), 1);
    assert!(matches!(&nodes[0], JsNode::Raw(text) if text == source));
}

#[test]
fn selector_flavors() {
    let (nodes, _) = parse("{{.box}}; {{#app}}; {{button}}; {{mystery}}; {{li[2]}}; {{ul li}};");
    let found = selectors(&nodes);
    assert_eq!(found.len(), 6);
    assert_eq!(found[0].kind, SelectorFlavor::Class);
    assert_eq!(found[1].kind, SelectorFlavor::Id);
    assert_eq!(found[2].kind, SelectorFlavor::Tag);
    assert_eq!(found[3].kind, SelectorFlavor::Mixed);
    assert_eq!(found[4].kind, SelectorFlavor::Indexed);
    assert_eq!(found[4].index, Some(2));
    assert_eq!(found[4].text, "li");
    assert_eq!(found[5].kind, SelectorFlavor::Complex);
}

#[test]
fn listen_parses_bindings_in_order() {
    let (nodes, sink) = parse(
        "{{.btn}}->listen({ click: () => go(), mouseenter: onEnter });",
    );
    assert!(sink.is_empty(), "{:?}", sink.entries());
    let listen = nodes
        .iter()
        .find_map(|n| match n {
            JsNode::Listen(l) => Some(l),
            _ => None,
        })
        .expect("listen block");
    assert_eq!(listen.bindings.len(), 2);
    assert_eq!(listen.bindings[0].event, "click");
    assert_eq!(listen.bindings[0].handler, "() => go()");
    assert_eq!(listen.bindings[1].event, "mouseenter");
    assert_eq!(listen.bindings[1].handler, "onEnter");
    assert!(matches!(
        listen.target.as_ref(),
        JsNode::EnhancedSelector(s) if s.kind == SelectorFlavor::Class
    ));
}

#[test]
fn delegate_collects_targets_and_events() {
    let (nodes, sink) = parse(
        "{{#list}}->delegate({ target: {{.item}}, click: onClick, mouseleave: onLeave });",
    );
    assert!(sink.is_empty(), "{:?}", sink.entries());
    let delegate = nodes
        .iter()
        .find_map(|n| match n {
            JsNode::Delegate(d) => Some(d),
            _ => None,
        })
        .expect("delegate block");
    assert_eq!(delegate.targets.len(), 1);
    assert_eq!(delegate.targets[0].text, ".item");
    assert_eq!(delegate.bindings.len(), 2);
}

#[test]
fn delegate_without_target_is_an_error() {
    let (_, sink) = parse("{{#list}}->delegate({ click: onClick });");
    assert!(sink.error_count() >= 1);
}

#[test]
fn bare_listen_is_rejected_by_the_state_machine() {
    let (_, sink) = parse("listen({ click: f });");
    assert!(sink.error_count() >= 1);
}

#[test]
fn member_access_listen_is_plain_js() {
    let (nodes, sink) = parse("emitter.listen(x);");
    assert!(sink.is_empty());
    assert_eq!(nodes.len(), 1);
    assert!(matches!(&nodes[0], JsNode::Raw(_)));
}

#[test]
fn vir_declares_methods_and_enables_calls() {
    let (nodes, sink) = parse(
        "vir Actions = listen({ save: () => doSave(), load: doLoad });\nActions->save(1, 2);",
    );
    assert!(sink.is_empty(), "{:?}", sink.entries());
    let decl = nodes
        .iter()
        .find_map(|n| match n {
            JsNode::VirDecl(v) => Some(v),
            _ => None,
        })
        .expect("vir declaration");
    assert_eq!(decl.name, "Actions");
    assert_eq!(decl.methods.len(), 2);
    assert_eq!(decl.methods[0].0, "save");
    let call = nodes
        .iter()
        .find_map(|n| match n {
            JsNode::VirCall(c) => Some(c),
            _ => None,
        })
        .expect("vir call");
    assert_eq!(call.name, "Actions");
    assert_eq!(call.method, "save");
    assert_eq!(call.args, "1, 2");
}

#[test]
fn vir_bound_to_selector_listen_also_registers_the_listener() {
    let (nodes, sink) = parse("vir Box = {{#box}}->listen({ click: onClick });");
    assert!(sink.is_empty(), "{:?}", sink.entries());
    assert!(nodes.iter().any(|n| matches!(n, JsNode::VirDecl(_))));
    assert!(nodes.iter().any(|n| matches!(n, JsNode::Listen(_))));
}

#[test]
fn animate_config_pairs() {
    let (nodes, sink) = parse("animate({ duration: 500, easing: 'ease-in' });");
    assert!(sink.is_empty(), "{:?}", sink.entries());
    let animate = nodes
        .iter()
        .find_map(|n| match n {
            JsNode::Animate(a) => Some(a),
            _ => None,
        })
        .expect("animate block");
    assert_eq!(animate.config[0], ("duration".to_string(), "500".to_string()));
    assert_eq!(animate.config[1], ("easing".to_string(), "'ease-in'".to_string()));
}

#[test]
fn arrow_access_on_selector() {
    let (nodes, sink) = parse("{{#app}}->appendChild(node);");
    assert!(sink.is_empty(), "{:?}", sink.entries());
    let arrow = nodes
        .iter()
        .find_map(|n| match n {
            JsNode::Arrow(a) => Some(a),
            _ => None,
        })
        .expect("arrow access");
    assert_eq!(arrow.method, "appendChild");
    assert!(matches!(
        arrow.target.as_ref(),
        JsNode::EnhancedSelector(s) if s.kind == SelectorFlavor::Id
    ));
    // The argument list stays raw.
    assert!(nodes.iter().any(|n| matches!(
        n,
        JsNode::Raw(text) if text.contains("(node);")
    )));
}

#[test]
fn selectors_inside_strings_are_untouched() {
    let (nodes, sink) = parse("var s = \"{{.not-real}}\";");
    assert!(sink.is_empty());
    assert_eq!(nodes.len(), 1);
    assert!(matches!(&nodes[0], JsNode::Raw(text) if text.contains("{{.not-real}}")));
}
