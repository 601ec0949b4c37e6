//! Unified scanner integration tests: fragment segmentation, integrity
//! tagging, merge ordering and CJMOD keyword splitting.

use std::sync::Arc;

use chtl_compiler::diagnostics::DiagnosticsSink;
use chtl_compiler::scanner::fragment::{
    find_incomplete_fragments, optimal_merge_order, CodeFragment, FragmentIntegrity, FragmentKind,
    ScanContext,
};
use chtl_compiler::scanner::keywords::{KeywordRegistry, SyntaxExtension};
use chtl_compiler::scanner::UnifiedScanner;

struct TestExtension {
    kw: Vec<String>,
}

impl SyntaxExtension for TestExtension {
    fn name(&self) -> String {
        "test-ext".to_string()
    }
    fn version(&self) -> String {
        "1.0.0".to_string()
    }
    fn keywords(&self) -> Vec<String> {
        self.kw.clone()
    }
    fn matches_syntax(&self, _pattern: &str, _context: &str) -> bool {
        true
    }
    fn parse_syntax(&self, input: &str, _context: &str) -> Result<String, String> {
        Ok(input.to_string())
    }
    fn generate_javascript(&self, payload: &str, _context: &str) -> Result<String, String> {
        Ok(format!("/* {} */", payload))
    }
    fn initialize(&self) -> Result<(), String> {
        Ok(())
    }
    fn cleanup(&self) {}
}

fn scan(source: &str) -> (Vec<CodeFragment>, DiagnosticsSink) {
    let registry = KeywordRegistry::new();
    let sink = DiagnosticsSink::new();
    let fragments = UnifiedScanner::new(&registry, &sink).scan(source, "test.chtl");
    (fragments, sink)
}

fn scan_with_extension(source: &str, keyword: &str) -> (Vec<CodeFragment>, DiagnosticsSink) {
    let mut registry = KeywordRegistry::new();
    registry
        .register_extension(Arc::new(TestExtension { kw: vec![keyword.to_string()] }))
        .unwrap();
    let sink = DiagnosticsSink::new();
    let fragments = UnifiedScanner::new(&registry, &sink).scan(source, "test.chtl");
    (fragments, sink)
}

fn reassemble(fragments: &[CodeFragment]) -> String {
    fragments.iter().map(|f| f.content.as_str()).collect()
}

#[test]
fn concatenation_reconstructs_source() {
    let sources = [
        "div { }",
        "style { body { margin: 0; } } div { text { Hi } }",
        "div { script { console.log(1); } p { text { x } } }",
        "div { class: \"a{b}\"; /* } */ }",
        "[Origin] @Html raw { <b>{not chtl}</b> } div { }",
        "",
    ];
    for source in sources {
        let (fragments, _) = scan(source);
        assert_eq!(reassemble(&fragments), source, "source: {:?}", source);
    }
}

#[test]
fn empty_source_yields_no_fragments() {
    let (fragments, sink) = scan("");
    assert!(fragments.is_empty());
    assert!(sink.is_empty());
}

#[test]
fn plain_chtl_is_one_fragment() {
    let (fragments, sink) = scan("div { p { text { hi } } }");
    assert!(sink.is_empty());
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].kind, FragmentKind::Chtl);
    assert_eq!(fragments[0].integrity, FragmentIntegrity::Complete);
    assert_eq!(fragments[0].context, ScanContext::TopLevel);
}

#[test]
fn global_style_is_cut_into_a_css_fragment() {
    let (fragments, sink) = scan("style { body { margin: 0; } } div { }");
    assert!(sink.is_empty());
    let kinds: Vec<FragmentKind> = fragments.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![FragmentKind::Chtl, FragmentKind::Css, FragmentKind::Chtl]
    );
    assert!(fragments[1].content.contains("margin: 0"));
    assert_eq!(fragments[1].context, ScanContext::InsideStyle);
    // The closing brace of the style block belongs to the resuming fragment.
    assert!(fragments[2].content.starts_with('}'));
}

#[test]
fn local_script_splits_the_chtl_fragment() {
    let (fragments, sink) = scan("div { script { var x = 1; } }");
    assert!(sink.is_empty());
    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[0].kind, FragmentKind::Chtl);
    assert_eq!(fragments[0].integrity, FragmentIntegrity::ContinuesNext);
    assert_eq!(fragments[0].context, ScanContext::InsideElement);
    assert_eq!(fragments[1].kind, FragmentKind::Js);
    assert_eq!(fragments[1].context, ScanContext::InsideScript);
    assert_eq!(fragments[2].integrity, FragmentIntegrity::ContinuedFromPrev);
    assert_eq!(fragments[2].context, ScanContext::InsideElement);
    assert!(find_incomplete_fragments(&fragments).is_empty());
}

#[test]
fn script_with_enhanced_selector_is_chtl_js() {
    let (fragments, _) = scan("div { script { {{.box}}->listen({}); } }");
    let script = fragments.iter().find(|f| f.is_script()).unwrap();
    assert_eq!(script.kind, FragmentKind::ChtlJs);
}

#[test]
fn script_without_triggers_is_plain_js() {
    let (fragments, _) = scan("script { let a = 1 + 2; }");
    let script = fragments.iter().find(|f| f.is_script()).unwrap();
    assert_eq!(script.kind, FragmentKind::Js);
}

#[test]
fn local_style_stays_inside_the_chtl_fragment() {
    let (fragments, sink) = scan("div { style { color: red; } }");
    assert!(sink.is_empty());
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].kind, FragmentKind::Chtl);
    assert!(fragments[0].content.contains("color: red"));
}

#[test]
fn origin_body_is_opaque_to_brace_counting() {
    let (fragments, sink) = scan("[Origin] @Html x { <div> } </div> } div { }");
    assert!(sink.is_empty());
    assert_eq!(fragments.len(), 1);
}

#[test]
fn braces_in_strings_and_comments_do_not_count() {
    let (fragments, sink) = scan("div { id: \"}\"; /* } */ // }\n }");
    assert!(sink.is_empty());
    assert_eq!(fragments.len(), 1);
}

#[test]
fn unmatched_close_brace_is_a_scan_error() {
    let (_, sink) = scan("div { } }");
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn unclosed_element_is_partial() {
    let (fragments, sink) = scan("div { p {");
    assert!(sink.error_count() >= 1);
    assert_eq!(fragments.last().unwrap().integrity, FragmentIntegrity::Partial);
    assert!(!find_incomplete_fragments(&fragments).is_empty());
}

#[test]
fn merge_order_groups_css_and_scripts() {
    let (fragments, _) = scan(
        "style { a { color: red; } } div { script { var x; } } style { b { color: blue; } }",
    );
    let order = optimal_merge_order(&fragments);
    let kinds: Vec<FragmentKind> = order
        .iter()
        .map(|id| fragments.iter().find(|f| f.fragment_id == *id).unwrap().kind)
        .collect();
    let first_css = kinds.iter().position(|k| *k == FragmentKind::Css).unwrap();
    let last_chtl = kinds.iter().rposition(|k| *k == FragmentKind::Chtl).unwrap();
    assert!(last_chtl < first_css, "CHTL fragments precede grouped CSS");
    let first_js = kinds.iter().position(|k| *k == FragmentKind::Js).unwrap();
    assert!(first_css < first_js, "CSS group precedes the script group");
}

#[test]
fn cjmod_keyword_splits_the_script_fragment() {
    let source = "script { var a = 1; printMylove({ x: 1 }); var b = 2; }";
    let (fragments, sink) = scan_with_extension(source, "printMylove");
    assert!(sink.is_empty(), "{:?}", sink.entries());
    assert_eq!(reassemble(&fragments), source);

    let scripts: Vec<&CodeFragment> = fragments.iter().filter(|f| f.is_script()).collect();
    assert_eq!(scripts.len(), 3);
    assert_eq!(scripts[0].kind, FragmentKind::Js);
    assert_eq!(scripts[0].integrity, FragmentIntegrity::ContinuesNext);
    assert_eq!(scripts[1].kind, FragmentKind::ChtlJs);
    assert_eq!(scripts[1].keyword.as_deref(), Some("printMylove"));
    assert!(scripts[1].content.contains("printMylove({ x: 1 });"));
    assert_eq!(scripts[2].kind, FragmentKind::Js);
    assert_eq!(scripts[2].integrity, FragmentIntegrity::ContinuedFromPrev);
}

#[test]
fn cjmod_keyword_outside_script_is_an_error() {
    let (_, sink) = scan_with_extension("div { printMylove { } }", "printMylove");
    assert!(sink.error_count() >= 1);
    let formatted = sink.format_all(false);
    assert!(formatted.contains("printMylove"));
}

#[test]
fn fragment_ids_are_monotonic_and_sequence_is_zero_based() {
    let (fragments, _) = scan("style { a { x: y; } } div { script { var x; } }");
    for (i, fragment) in fragments.iter().enumerate() {
        assert_eq!(fragment.fragment_id, i);
        assert_eq!(fragment.sequence_index, i);
    }
}
