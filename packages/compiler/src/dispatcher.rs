//! Dispatching compiler core: orchestrates the pipeline and merges the
//! sub-compilers' outputs into one document.
//!
//! Phases: import pre-scan -> module load -> scanner -> fragment dispatch in
//! optimal merge order -> merge. The deadline is checked between phases;
//! exceeding it reports a timeout naming the phase.

use bitflags::bitflags;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::chtl::ast::Node;
use crate::chtl::parser::Parser;
use crate::chtl_js;
use crate::config::{CompilerOptions, Deadline};
use crate::diagnostics::{
    Diagnostic, DiagnosticKind, DiagnosticsSink, FatalResult, Phase,
};
use crate::module::{ModuleLoader, ModuleRegistry};
use crate::output::css_emitter;
use crate::output::emitter::CodeWriter;
use crate::output::html_emitter::{self, HoistedCss};
use crate::output::js_emitter::JsEmitter;
use crate::parse_util::ParseSourceFile;
use crate::resolve::imports::{FsImportSource, ImportExpander};
use crate::resolve::Resolver;
use crate::scanner::fragment::{
    find_incomplete_fragments, optimal_merge_order, CodeFragment, FragmentKind,
};
use crate::scanner::keywords::KeywordRegistry;
use crate::scanner::UnifiedScanner;
use crate::symbols::GlobalSymbolMap;

bitflags! {
    /// Which artifacts a compilation emits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EmitFlags: u8 {
        const HTML = 1 << 0;
        const CSS = 1 << 1;
        const JS = 1 << 2;
        const DEFAULT = Self::HTML.bits() | Self::CSS.bits() | Self::JS.bits();
    }
}

/// One fragment after its sub-compiler ran.
#[derive(Debug, Clone)]
pub struct ProcessedFragment {
    pub generated_code: String,
    pub kind: FragmentKind,
    pub sequence_index: usize,
    pub is_open_tag: bool,
    pub is_close_tag: bool,
    pub is_content: bool,
    pub is_self_closing: bool,
    pub element_type: Option<String>,
    pub attributes: Option<Vec<(String, String)>>,
}

#[derive(Debug, Default)]
pub struct CompileOutput {
    /// The merged document (full page or SPA fragment).
    pub document: String,
    pub html: String,
    pub css: String,
    pub js: String,
    pub is_spa: bool,
    pub processed: Vec<ProcessedFragment>,
}

#[derive(Debug)]
pub struct CompilationResult {
    pub output: Option<CompileOutput>,
    pub diagnostics: Vec<Diagnostic>,
    /// False when any error-level diagnostic (or a fatal error) occurred.
    pub success: bool,
}

/// Restricted, documented shape for the import pre-scan. A real parse of the
/// same statements happens later; this regex only needs to find module loads
/// before scanning starts.
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*\[Import\]\s*@(\w+)\s+(?:([\w.]+)\s+)?from\s+([^\s;]+?)(?:\s+as\s+(\w+))?\s*;").unwrap()
});

/// One compilation unit: owns its scanner keyword table, symbol map, module
/// registry and diagnostics. Units never share these.
pub struct Compiler {
    pub options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Compiler { options }
    }

    pub fn compile(&self, source: &str, file_name: &str) -> CompilationResult {
        self.compile_selected(source, file_name, EmitFlags::DEFAULT)
    }

    /// Compile emitting only the selected artifacts; the merged document is
    /// assembled from whatever remains.
    pub fn compile_selected(
        &self,
        source: &str,
        file_name: &str,
        flags: EmitFlags,
    ) -> CompilationResult {
        let sink = DiagnosticsSink::new();
        let map = GlobalSymbolMap::new();
        let mut keywords = KeywordRegistry::new();
        let mut registry = ModuleRegistry::default();
        let deadline = Deadline::new(self.options.timeout);

        let outcome = self.run_pipeline(
            source,
            file_name,
            flags,
            &sink,
            &map,
            &mut keywords,
            &mut registry,
            &deadline,
        );

        let mut diagnostics = sink.entries();
        match outcome {
            Ok(output) => {
                let success = sink.error_count() == 0;
                CompilationResult { output: Some(output), diagnostics, success }
            }
            Err(fatal) => {
                diagnostics.push(Diagnostic::new(fatal.kind(), fatal.to_string(), None));
                CompilationResult { output: None, diagnostics, success: false }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pipeline(
        &self,
        source: &str,
        file_name: &str,
        flags: EmitFlags,
        sink: &DiagnosticsSink,
        map: &GlobalSymbolMap,
        keywords: &mut KeywordRegistry,
        registry: &mut ModuleRegistry,
        deadline: &Deadline,
    ) -> FatalResult<CompileOutput> {
        // Phase 1: pre-scan imports and load referenced modules, so CJMOD
        // keywords are registered before the scanner runs.
        deadline.check(Phase::PreScan)?;
        let preloaded = self.pre_scan_modules(source, file_name, sink, map, keywords, registry)?;

        // Phase 2: scanner pass.
        deadline.check(Phase::Scan)?;
        let scanner = UnifiedScanner::new(keywords, sink);
        let fragments = scanner.scan(source, file_name);
        log::debug!("scanner produced {} fragment(s)", fragments.len());
        if self.options.debug {
            if let Ok(dump) = serde_json::to_string(&fragments) {
                log::debug!("fragments: {}", dump);
            }
        }

        // Incomplete fragments are recoverable for CHTL and CSS, which can
        // resynchronize; CHTL-JS cannot, so a dangling piece is fatal.
        for fragment in find_incomplete_fragments(&fragments) {
            if fragment.kind == FragmentKind::ChtlJs {
                return Err(crate::diagnostics::FatalError::Generation(format!(
                    "incomplete CHTL-JS fragment {} cannot be compiled",
                    fragment.fragment_id
                )));
            }
        }

        // Phase 3: dispatch in optimal merge order.
        deadline.check(Phase::Dispatch)?;
        self.dispatch_and_merge(&fragments, file_name, flags, &preloaded, sink, map, keywords, deadline)
    }

    /// Returns the import paths that resolved to modules, so the resolution
    /// phase does not try to read them as plain files.
    fn pre_scan_modules(
        &self,
        source: &str,
        file_name: &str,
        sink: &DiagnosticsSink,
        map: &GlobalSymbolMap,
        keywords: &mut KeywordRegistry,
        registry: &mut ModuleRegistry,
    ) -> FatalResult<std::collections::HashSet<String>> {
        let loader = ModuleLoader::new(&self.options, map, sink);
        let mut preloaded = std::collections::HashSet::new();
        for capture in IMPORT_RE.captures_iter(source) {
            let kind = &capture[1];
            let path = capture[3].trim_matches(|c| c == '"' || c == '\'');
            match kind {
                "CJmod" | "Chtl" => {
                    if let Some(found) = loader.find_module(path, file_name) {
                        loader.load(&found, registry, keywords)?;
                        preloaded.insert(path.to_string());
                    } else if kind == "CJmod" {
                        // A CJMOD reference must resolve to a module; @Chtl
                        // may still be a plain file import handled later.
                        sink.error(
                            DiagnosticKind::Module,
                            format!("module '{}' not found", path),
                            None,
                        );
                    }
                }
                _ => {}
            }
        }
        Ok(preloaded)
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_and_merge(
        &self,
        fragments: &[CodeFragment],
        file_name: &str,
        flags: EmitFlags,
        preloaded: &std::collections::HashSet<String>,
        sink: &DiagnosticsSink,
        map: &GlobalSymbolMap,
        keywords: &KeywordRegistry,
        deadline: &Deadline,
    ) -> FatalResult<CompileOutput> {
        let order = optimal_merge_order(fragments);
        let mut processed: Vec<ProcessedFragment> = Vec::new();

        // The CHTL fragments reassemble (in source order) into one structural
        // unit: cut-out style/script bodies leave empty shells behind. The
        // offset table maps positions in the reassembled view back to the
        // original source so CSS/JS pieces sort in true source order.
        let mut chtl_source = String::new();
        let mut offset_map: Vec<(usize, usize, usize)> = Vec::new();
        for fragment in fragments.iter().filter(|f| f.kind == FragmentKind::Chtl) {
            offset_map.push((chtl_source.len(), fragment.start.offset, fragment.content.len()));
            chtl_source.push_str(&fragment.content);
        }
        let to_original = |view_offset: usize| -> usize {
            for (view_start, orig_start, len) in &offset_map {
                if view_offset < view_start + len {
                    return orig_start + view_offset.saturating_sub(*view_start);
                }
            }
            offset_map
                .last()
                .map(|(view_start, orig_start, len)| {
                    orig_start + (view_offset - view_start).min(*len)
                })
                .unwrap_or(view_offset)
        };

        let parser = Parser::new(&chtl_source, file_name, sink)
            .with_symbol_map(map)
            .with_deadline(deadline.clone());
        let root = parser.parse();

        // Source-level configuration folds into this unit's options.
        let mut options = self.options.clone();
        for node in &root.children {
            if let Node::Configuration(config) = node {
                config.set.apply(&mut options);
            }
        }

        // Phase 4: resolution (imports, then the transform passes).
        deadline.check(Phase::Resolve)?;
        let fs_source = FsImportSource;
        let mut expander = ImportExpander::new(
            &fs_source,
            map,
            sink,
            !options.disable_default_namespace,
        )
        .with_preloaded(preloaded.clone());
        let expanded = expander.expand(root.children.clone(), file_name);
        let expanded_root = crate::chtl::ast::Root { children: expanded, span: root.span.clone() };
        let mut resolver = Resolver::new(map, sink);
        let resolved = resolver.resolve(&expanded_root);

        // Phase 5: generation.
        deadline.check(Phase::Generate)?;
        let html_out = html_emitter::emit_html(&resolved, map, &options, sink);

        let mut js_emitter = JsEmitter::new(Some(keywords));
        let mut css_pieces: Vec<HoistedCss> = html_out
            .hoisted_css
            .iter()
            .map(|piece| HoistedCss {
                position: to_original(piece.position),
                css: piece.css.clone(),
            })
            .collect();
        let mut js_pieces: Vec<(usize, String)> = Vec::new();

        for chunk in &html_out.scripts {
            if chunk.raw.trim().is_empty() {
                continue;
            }
            let file = ParseSourceFile::new(chunk.raw.clone(), format!("{}#script", file_name));
            let nodes = chtl_js::parser::parse_script(file, sink, Some(keywords));
            let code = js_emitter.emit_script(&nodes)?;
            js_pieces.push((to_original(chunk.position), code));
        }

        for id in &order {
            let fragment = &fragments[*id];
            let mut entry = ProcessedFragment {
                generated_code: String::new(),
                kind: fragment.kind,
                sequence_index: fragment.sequence_index,
                is_open_tag: false,
                is_close_tag: false,
                is_content: false,
                is_self_closing: false,
                element_type: None,
                attributes: None,
            };
            match fragment.kind {
                FragmentKind::Chtl | FragmentKind::Unknown => {
                    entry.is_content = true;
                    entry.element_type = html_out.top_level_tags.first().cloned();
                }
                FragmentKind::Css => {
                    let file = ParseSourceFile::new(
                        fragment.content.clone(),
                        format!("{}#style", file_name),
                    );
                    let style_parser = Parser::new(&file.content, &file.url, sink)
                        .with_symbol_map(map);
                    let children = style_parser.parse_style_content();
                    let resolved_children = resolver.resolve_style_children(&children);
                    let mut writer = CodeWriter::new(!options.minify);
                    css_emitter::emit_style_children(&resolved_children, None, &mut writer);
                    entry.generated_code = writer.into_string();
                    css_pieces.push(HoistedCss {
                        position: fragment.start.offset,
                        css: entry.generated_code.clone(),
                    });
                }
                FragmentKind::Js => {
                    entry.generated_code = fragment.content.trim().to_string();
                    js_pieces.push((fragment.start.offset, entry.generated_code.clone()));
                }
                FragmentKind::ChtlJs => {
                    let file = ParseSourceFile::new(
                        fragment.content.clone(),
                        format!("{}#script", file_name),
                    );
                    let nodes =
                        chtl_js::parser::parse_script(file, sink, Some(keywords));
                    entry.generated_code = js_emitter.emit_script(&nodes)?;
                    js_pieces.push((fragment.start.offset, entry.generated_code.clone()));
                }
            }
            processed.push(entry);
        }

        // Phase 6: merge.
        deadline.check(Phase::Merge)?;
        if !flags.contains(EmitFlags::CSS) {
            css_pieces.clear();
        }
        if !flags.contains(EmitFlags::JS) {
            js_pieces.clear();
        }
        css_pieces.sort_by_key(|piece| piece.position);
        js_pieces.sort_by_key(|piece| piece.0);

        let css: String = css_pieces
            .iter()
            .map(|piece| piece.css.as_str())
            .collect::<Vec<_>>()
            .join(if options.minify { "" } else { "\n" });

        let mut js = String::new();
        if flags.contains(EmitFlags::JS) {
            js.push_str(&js_emitter.prologue());
            for (_, piece) in &js_pieces {
                if !piece.trim().is_empty() {
                    js.push_str(piece);
                    if !piece.ends_with('\n') {
                        js.push('\n');
                    }
                }
            }
            js.push_str(&js_emitter.epilogue());
        }

        // SPA detection: no `html` element and nothing forcing a full page.
        let has_html_shell = html_out.top_level_tags.iter().any(|tag| tag == "html");
        let is_spa = options.fragment
            || (!has_html_shell && !html_out.uses_html5 && !options.full_page);

        for entry in processed.iter_mut() {
            if entry.kind == FragmentKind::Chtl && entry.generated_code.is_empty() {
                entry.generated_code = html_out.html.clone();
                break;
            }
        }

        let html = if flags.contains(EmitFlags::HTML) {
            html_out.html
        } else {
            String::new()
        };
        let document = merge_document(&html, &css, &js, is_spa, has_html_shell, &options);
        Ok(CompileOutput {
            document,
            html,
            css,
            js,
            is_spa,
            processed,
        })
    }
}

/// Assemble the final document. Full-page mode wraps the body in an
/// html/head/body shell with CSS in the head and JS at the end of the body;
/// SPA mode emits style, markup, script with no shell.
fn merge_document(
    html: &str,
    css: &str,
    js: &str,
    is_spa: bool,
    has_html_shell: bool,
    options: &CompilerOptions,
) -> String {
    let newline = if options.minify { "" } else { "\n" };
    let css = css.trim();
    let js = js.trim();
    let mut out = String::new();

    if is_spa {
        if !css.is_empty() {
            out.push_str(&format!("<style>{nl}{css}{nl}</style>{nl}", nl = newline, css = css));
        }
        out.push_str(html);
        if !html.ends_with('\n') && !options.minify {
            out.push('\n');
        }
        if !js.is_empty() {
            out.push_str(&format!("<script>{nl}{js}{nl}</script>{nl}", nl = newline, js = js));
        }
        return out;
    }

    if has_html_shell {
        // The source supplies its own shell; keep it and append the
        // aggregated assets after it.
        out.push_str("<!DOCTYPE html>");
        out.push_str(newline);
        out.push_str(html);
        if !css.is_empty() {
            out.push_str(&format!("<style>{nl}{css}{nl}</style>{nl}", nl = newline, css = css));
        }
        if !js.is_empty() {
            out.push_str(&format!("<script>{nl}{js}{nl}</script>{nl}", nl = newline, js = js));
        }
        return out;
    }

    out.push_str("<!DOCTYPE html>");
    out.push_str(newline);
    out.push_str("<html>");
    out.push_str(newline);
    out.push_str("<head>");
    out.push_str(newline);
    if !css.is_empty() {
        out.push_str(&format!("<style>{nl}{css}{nl}</style>{nl}", nl = newline, css = css));
    }
    out.push_str("</head>");
    out.push_str(newline);
    out.push_str("<body>");
    out.push_str(newline);
    out.push_str(html);
    if !html.ends_with('\n') && !options.minify && !html.is_empty() {
        out.push('\n');
    }
    if !js.is_empty() {
        out.push_str(&format!("<script>{nl}{js}{nl}</script>{nl}", nl = newline, js = js));
    }
    out.push_str("</body>");
    out.push_str(newline);
    out.push_str("</html>");
    out.push_str(newline);
    out
}
