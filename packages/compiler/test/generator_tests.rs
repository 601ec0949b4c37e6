//! Generator integration tests: HTML emission, CSS hoisting and the JS
//! emitter's lowering rules.

use chtl_compiler::chtl::parser::Parser;
use chtl_compiler::chtl_js::parser::parse_script;
use chtl_compiler::config::CompilerOptions;
use chtl_compiler::diagnostics::DiagnosticsSink;
use chtl_compiler::output::html_emitter::{emit_html, HtmlOutput};
use chtl_compiler::output::js_emitter::{rewrite_inline, JsEmitter};
use chtl_compiler::parse_util::ParseSourceFile;
use chtl_compiler::resolve::Resolver;
use chtl_compiler::symbols::GlobalSymbolMap;

fn generate(source: &str) -> (HtmlOutput, DiagnosticsSink) {
    generate_with(source, CompilerOptions::default())
}

fn generate_with(source: &str, options: CompilerOptions) -> (HtmlOutput, DiagnosticsSink) {
    let sink = DiagnosticsSink::new();
    let map = GlobalSymbolMap::new();
    let root = Parser::new(source, "test.chtl", &sink)
        .with_symbol_map(&map)
        .parse();
    let resolved = Resolver::new(&map, &sink).resolve(&root);
    let output = emit_html(&resolved, &map, &options, &sink);
    (output, sink)
}

fn emit_js(source: &str) -> (String, String, String) {
    let sink = DiagnosticsSink::new();
    let file = ParseSourceFile::new(source.to_string(), "script.js".to_string());
    let nodes = parse_script(file, &sink, None);
    let mut emitter = JsEmitter::new(None);
    let body = emitter.emit_script(&nodes).expect("emit");
    (emitter.prologue(), body, emitter.epilogue())
}

// ---- HTML ---------------------------------------------------------------

#[test]
fn simple_element_with_text() {
    let (output, sink) = generate("p { text { Hello } }");
    assert!(sink.is_empty());
    assert_eq!(output.html, "<p>Hello</p>\n");
}

#[test]
fn attributes_render_in_order() {
    let (output, _) = generate("div { class: \"container\"; id: \"main\"; }");
    assert!(output.html.contains("<div class=\"container\" id=\"main\">"));
    assert!(output.html.contains("</div>"));
}

#[test]
fn void_tags_have_no_close_tag() {
    let (output, _) = generate("div { br { } img { src: \"x.png\"; } }");
    assert!(output.html.contains("<br>"));
    assert!(!output.html.contains("</br>"));
    assert!(output.html.contains("<img src=\"x.png\">"));
    assert!(!output.html.contains("</img>"));
}

#[test]
fn nested_blocks_indent_in_pretty_mode() {
    let (output, _) = generate("div { section { p { text { x } } } }");
    assert!(output.html.contains("<div>\n"));
    assert!(output.html.contains("  <section>\n"));
    assert!(output.html.contains("    <p>x</p>\n"));
}

#[test]
fn minify_drops_layout_whitespace() {
    let options = CompilerOptions { minify: true, ..CompilerOptions::default() };
    let (output, _) = generate_with("div { section { p { text { x } } } }", options);
    assert_eq!(output.html, "<div><section><p>x</p></section></div>");
}

#[test]
fn generator_comment_survives_as_html_comment() {
    let (output, _) = generate("-- header\ndiv { }");
    assert!(output.html.contains("<!-- header -->"));
}

#[test]
fn top_level_tags_are_recorded_for_spa_detection() {
    let (output, _) = generate("html { body { } }");
    assert_eq!(output.top_level_tags, vec!["html"]);
    let (spa, _) = generate("div { } p { }");
    assert_eq!(spa.top_level_tags, vec!["div", "p"]);
}

#[test]
fn use_html5_is_detected() {
    let (output, _) = generate("use html5; div { }");
    assert!(output.uses_html5);
}

// ---- CSS hoisting -------------------------------------------------------

#[test]
fn bare_local_style_hoists_under_auto_class() {
    let (output, _) = generate("div { style { color: red; } }");
    assert!(output.html.contains("class=\"chtl-auto-0\""));
    assert_eq!(output.hoisted_css.len(), 1);
    assert!(output.hoisted_css[0].css.contains(".chtl-auto-0 {"));
    assert!(output.hoisted_css[0].css.contains("color: red;"));
}

#[test]
fn element_id_wins_over_auto_class() {
    let (output, _) = generate("div { id: box; style { color: red; } }");
    assert!(!output.html.contains("chtl-auto"));
    assert!(output.hoisted_css[0].css.contains("#box {"));
}

#[test]
fn auto_class_merges_into_existing_class_attribute() {
    let (output, _) = generate("div { class: card; style { color: red; } }");
    assert!(output.html.contains("class=\"card chtl-auto-0\""));
}

#[test]
fn disable_auto_class_falls_back_to_tag_selector() {
    let options = CompilerOptions {
        disable_style_auto_add_class: true,
        ..CompilerOptions::default()
    };
    let (output, _) = generate_with("div { style { color: red; } }", options);
    assert!(!output.html.contains("chtl-auto"));
    assert!(output.hoisted_css[0].css.contains("div {"));
}

#[test]
fn ampersand_binds_to_host_selector() {
    let (output, _) = generate("div { id: host; style { color: red; &:hover { color: blue; } } }");
    let css = &output.hoisted_css[0].css;
    assert!(css.contains("#host {"));
    assert!(css.contains("#host:hover {"));
}

#[test]
fn selector_rules_in_local_style_hoist_verbatim() {
    let (output, _) = generate("div { style { .item { margin: 0; } } }");
    assert!(output.hoisted_css[0].css.contains(".item {"));
    // No bare properties, so no auto class was invented.
    assert!(!output.html.contains("chtl-auto"));
}

#[test]
fn global_style_rules_hoist_from_top_level() {
    let (output, _) = generate("style { body { margin: 0; } } div { }");
    assert_eq!(output.hoisted_css.len(), 1);
    assert!(output.hoisted_css[0].css.contains("body {"));
}

#[test]
fn named_origin_embeds_only_at_use_sites() {
    let (output, _) = generate(
        "[Origin] @Html banner { <header>X</header> }\ndiv { [Origin] @Html banner; }",
    );
    assert_eq!(output.html.matches("<header>X</header>").count(), 1);
}

#[test]
fn script_blocks_collect_for_aggregation() {
    let (output, _) = generate("div { script { var a = 1; } } script { var b = 2; }");
    assert_eq!(output.scripts.len(), 2);
    assert!(output.scripts[0].local);
    assert!(!output.scripts[1].local);
    assert!(output.html.contains("<div>"));
    assert!(!output.html.contains("var a"));
}

// ---- JS -----------------------------------------------------------------

#[test]
fn selector_lowering_by_flavor() {
    let (_, body, _) = emit_js("{{.box}}; {{#app}}; {{button}}; {{li[2]}};");
    assert!(body.contains("document.querySelector('.box')"));
    assert!(body.contains("document.getElementById('app')"));
    assert!(body.contains("document.querySelector('button')"));
    assert!(body.contains("document.querySelectorAll('li')[2]"));
}

#[test]
fn ambiguous_selector_emits_id_then_class_shim() {
    let (_, body, _) = emit_js("{{mystery}};");
    assert!(body.contains("document.getElementById('mystery')"));
    assert!(body.contains("document.getElementsByClassName('mystery')[0]"));
    let id_pos = body.find("getElementById").unwrap();
    let class_pos = body.find("getElementsByClassName").unwrap();
    assert!(id_pos < class_pos, "id resolution has priority");
}

#[test]
fn listen_becomes_one_add_event_listener_per_binding() {
    let (_, body, _) = emit_js("{{.btn}}->listen({ click: onClick, focus: onFocus });");
    assert_eq!(body.matches("addEventListener").count(), 2);
    assert!(body.contains("document.querySelector('.btn').addEventListener('click', onClick);"));
    assert!(body.contains("document.querySelector('.btn').addEventListener('focus', onFocus);"));
}

#[test]
fn arrow_operator_lowers_to_dot() {
    let (_, body, _) = emit_js("{{#app}}->appendChild(node);");
    assert!(body.contains("document.getElementById('app').appendChild(node);"));
}

#[test]
fn inline_rewrite_handles_selectors_in_raw_js() {
    let rewritten = rewrite_inline("const el = {{.box}}; el->focus();");
    assert_eq!(rewritten, "const el = document.querySelector('.box'); el.focus();");
}

#[test]
fn delegates_coalesce_per_parent_and_event() {
    let source = "{{#list}}->delegate({ target: {{.item}}, click: h1 });\n\
                  {{#list}}->delegate({ target: {{.other}}, click: h2 });";
    let sink = DiagnosticsSink::new();
    let file = ParseSourceFile::new(source.to_string(), "script.js".to_string());
    let nodes = parse_script(file, &sink, None);
    let mut emitter = JsEmitter::new(None);
    emitter.emit_script(&nodes).unwrap();
    let epilogue = emitter.epilogue();
    assert_eq!(epilogue.matches("addEventListener").count(), 1);
    assert!(epilogue.contains("event.target.matches('.item')"));
    assert!(epilogue.contains("else if (event.target.matches('.other'))"));
}

#[test]
fn vir_functions_precede_bodies_and_count_methods() {
    let source = "vir Actions = listen({ save: () => 1, load: () => 2 });\nActions->save();";
    let sink = DiagnosticsSink::new();
    let file = ParseSourceFile::new(source.to_string(), "script.js".to_string());
    let nodes = parse_script(file, &sink, None);
    let mut emitter = JsEmitter::new(None);
    let body = emitter.emit_script(&nodes).unwrap();
    assert_eq!(emitter.vir_function_count(), 2);
    let prologue = emitter.prologue();
    assert!(prologue.contains("function __chtl_vir_Actions_save()"));
    assert!(prologue.contains("function __chtl_vir_Actions_load()"));
    assert!(body.contains("__chtl_vir_Actions_save();"));
}

#[test]
fn unknown_vir_method_is_a_generation_error() {
    let source = "vir Actions = listen({ save: f });\nActions->save();";
    let sink = DiagnosticsSink::new();
    let file = ParseSourceFile::new(source.to_string(), "script.js".to_string());
    let mut nodes = parse_script(file, &sink, None);
    // Rewrite the call to a method that was never declared.
    for node in &mut nodes {
        if let chtl_compiler::chtl_js::ast::JsNode::VirCall(call) = node {
            call.method = "missing".to_string();
        }
    }
    let mut emitter = JsEmitter::new(None);
    let err = emitter.emit_script(&nodes).unwrap_err();
    assert!(err.to_string().contains("no method 'missing'"));
}

#[test]
fn animate_emits_a_raf_loop() {
    let (_, body, _) = emit_js("animate({ target: {{#box}}, duration: 250 });");
    assert!(body.contains("requestAnimationFrame(__step)"));
    assert!(body.contains("var __duration = 250;"));
    assert!(body.contains("document.getElementById('box')"));
}
