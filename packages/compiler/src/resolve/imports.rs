//! Import expansion: the first resolution phase.
//!
//! `[Import] @Chtl` splices a parsed file into the tree as a namespace;
//! `@Html` / `@Style` / `@JavaScript` imports become named origins. CJMOD
//! imports were already consumed by the module pre-pass and are dropped here.
//! Cycles are detected on canonical paths and broken at the first re-entry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::chtl::ast::{ImportDecl, ImportKind, Node, NamespaceDecl, OriginDecl, OriginKind};
use crate::chtl::parser::Parser;
use crate::diagnostics::{DiagnosticKind, DiagnosticsSink};
use crate::symbols::{GlobalKind, GlobalObject, GlobalSymbolMap};

/// File access the expander needs; the dispatcher supplies a real
/// filesystem-backed implementation and tests substitute fixtures.
pub trait ImportSource {
    /// Resolve `path` relative to the importing file and return the canonical
    /// path plus content.
    fn read(&self, path: &str, from_file: &str) -> Result<(PathBuf, String), String>;
}

/// Default source rooted in the importing file's directory.
#[derive(Debug, Default)]
pub struct FsImportSource;

impl ImportSource for FsImportSource {
    fn read(&self, path: &str, from_file: &str) -> Result<(PathBuf, String), String> {
        let base = Path::new(from_file).parent().unwrap_or_else(|| Path::new("."));
        let joined = base.join(path);
        let canonical = joined.canonicalize().unwrap_or(joined);
        let content = std::fs::read_to_string(&canonical)
            .map_err(|err| format!("cannot read '{}': {}", canonical.display(), err))?;
        Ok((canonical, content))
    }
}

pub struct ImportExpander<'a> {
    source: &'a dyn ImportSource,
    map: &'a GlobalSymbolMap,
    sink: &'a DiagnosticsSink,
    default_namespace: bool,
    visiting: HashSet<PathBuf>,
    /// Paths the module pre-pass already satisfied; their import nodes are
    /// simply consumed here.
    preloaded: HashSet<String>,
}

impl<'a> ImportExpander<'a> {
    pub fn new(
        source: &'a dyn ImportSource,
        map: &'a GlobalSymbolMap,
        sink: &'a DiagnosticsSink,
        default_namespace: bool,
    ) -> Self {
        ImportExpander {
            source,
            map,
            sink,
            default_namespace,
            visiting: HashSet::new(),
            preloaded: HashSet::new(),
        }
    }

    pub fn with_preloaded(mut self, preloaded: HashSet<String>) -> Self {
        self.preloaded = preloaded;
        self
    }

    /// Replace every import node in `nodes`, recursing into namespaces.
    pub fn expand(&mut self, nodes: Vec<Node>, from_file: &str) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Import(import) => out.extend(self.expand_import(import, from_file)),
                Node::Namespace(mut ns) => {
                    ns.body = self.expand(ns.body, from_file);
                    out.push(Node::Namespace(ns));
                }
                other => out.push(other),
            }
        }
        out
    }

    fn expand_import(&mut self, import: ImportDecl, from_file: &str) -> Vec<Node> {
        match import.kind {
            ImportKind::CJmod => Vec::new(),
            ImportKind::Chtl if self.preloaded.contains(&import.path) => Vec::new(),
            ImportKind::Chtl => self.expand_chtl(import, from_file),
            ImportKind::Html | ImportKind::Style | ImportKind::JavaScript => {
                self.expand_asset(import, from_file)
            }
        }
    }

    fn expand_chtl(&mut self, import: ImportDecl, from_file: &str) -> Vec<Node> {
        let (path, content) = match self.source.read(&import.path, from_file) {
            Ok(loaded) => loaded,
            Err(message) => {
                self.sink.error(
                    DiagnosticKind::Resolution,
                    format!("import failed: {}", message),
                    Some(import.span.clone()),
                );
                return Vec::new();
            }
        };
        if !self.visiting.insert(path.clone()) {
            self.sink.error(
                DiagnosticKind::Resolution,
                format!("cyclic import of '{}'", import.path),
                Some(import.span.clone()),
            );
            return Vec::new();
        }

        let namespace = import.alias.clone().or_else(|| {
            if self.default_namespace {
                path.file_stem().map(|s| s.to_string_lossy().to_string())
            } else {
                None
            }
        });

        let url = path.to_string_lossy().to_string();
        let mut parser = Parser::new(&content, &url, self.sink).with_symbol_map(self.map);
        if let Some(ns) = &namespace {
            parser = parser.with_initial_namespace(vec![ns.clone()]);
        }
        let root = parser.parse();
        let children = self.expand(root.children, &url);
        self.visiting.remove(&path);

        match namespace {
            Some(name) => vec![Node::Namespace(NamespaceDecl {
                name,
                body: children,
                span: import.span,
            })],
            None => children,
        }
    }

    /// Raw asset import becomes a named origin declaration.
    fn expand_asset(&mut self, import: ImportDecl, from_file: &str) -> Vec<Node> {
        let (path, content) = match self.source.read(&import.path, from_file) {
            Ok(loaded) => loaded,
            Err(message) => {
                self.sink.error(
                    DiagnosticKind::Resolution,
                    format!("import failed: {}", message),
                    Some(import.span.clone()),
                );
                return Vec::new();
            }
        };
        let kind = match import.kind {
            ImportKind::Html => OriginKind::Html,
            ImportKind::Style => OriginKind::Style,
            _ => OriginKind::JavaScript,
        };
        let name = import
            .alias
            .clone()
            .or_else(|| import.symbol.clone())
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "imported".to_string())
            });
        let node = Node::Origin(OriginDecl {
            kind,
            name: Some(name.clone()),
            raw: content,
            span: import.span.clone(),
        });
        let obj = GlobalObject {
            kind: GlobalKind::Origin,
            qualified_name: name,
            namespace_path: Vec::new(),
            defining_file: from_file.to_string(),
            span: import.span.clone(),
            body: Rc::new(node.clone()),
        };
        if let Err(err) = self.map.register(obj) {
            self.sink.error(
                DiagnosticKind::Resolution,
                format!("duplicate declaration of [Origin] '{}'", err.qualified_name),
                Some(import.span),
            );
        }
        vec![node]
    }
}
