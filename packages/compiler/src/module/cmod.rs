//! CMOD: packaged libraries of CHTL declarations.
//!
//! Lifecycle: validate the directory layout, parse metadata, parse every
//! source file (registering declarations under the module's namespace), then
//! check the `[Export]` list against what was actually declared.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::chtl::ast::RefKind;
use crate::chtl::parser::Parser;
use crate::diagnostics::{DiagnosticsSink, FatalError, FatalResult};
use crate::symbols::{GlobalKind, GlobalSymbolMap};

use super::metadata::{parse_metadata, version_in_range, ModuleMetadata};

#[derive(Debug)]
pub struct CmodModule {
    pub metadata: ModuleMetadata,
    pub root: PathBuf,
    pub namespace: Vec<String>,
    pub submodules: Vec<CmodModule>,
}

impl CmodModule {
    /// Names this module publishes, for mixed-module conflict checks.
    pub fn exported_names(&self) -> Vec<String> {
        match &self.metadata.exports {
            Some(exports) => exports.iter().map(|e| e.name.clone()).collect(),
            None => Vec::new(),
        }
    }
}

pub fn load_cmod(
    dir: &Path,
    map: &GlobalSymbolMap,
    sink: &DiagnosticsSink,
    parent_namespace: &[String],
    default_namespace: bool,
    compiler_version: &str,
) -> FatalResult<CmodModule> {
    let module_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FatalError::Module(format!("invalid module path '{}'", dir.display())))?
        .to_string();

    let src_dir = dir.join("src");
    let info_file = dir.join("info").join(format!("{}.chtl", module_name));
    if !src_dir.is_dir() {
        return Err(FatalError::Module(format!(
            "module '{}' has no src/ directory",
            module_name
        )));
    }
    if !info_file.is_file() {
        return Err(FatalError::Module(format!(
            "module '{}' is missing info/{}.chtl",
            module_name, module_name
        )));
    }

    let info_source = std::fs::read_to_string(&info_file)
        .map_err(|err| FatalError::io(info_file.display().to_string(), err))?;
    let metadata = parse_metadata(&info_source, &info_file.to_string_lossy(), sink)?;

    if !version_in_range(
        compiler_version,
        metadata.info.min_chtl_version.as_deref(),
        metadata.info.max_chtl_version.as_deref(),
    ) {
        return Err(FatalError::Module(format!(
            "module '{}' requires CHTL {}..{}, compiler is {}",
            module_name,
            metadata.info.min_chtl_version.as_deref().unwrap_or("*"),
            metadata.info.max_chtl_version.as_deref().unwrap_or("*"),
            compiler_version
        )));
    }

    let mut namespace = parent_namespace.to_vec();
    if default_namespace {
        namespace.push(module_name.clone());
    }

    // Parse direct sources; directories with their own src/info are nested
    // submodules and load recursively.
    let mut submodules = Vec::new();
    for entry in WalkDir::new(&src_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| FatalError::Module(err.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            if path.join("src").is_dir() && path.join("info").is_dir() {
                submodules.push(load_cmod(
                    path,
                    map,
                    sink,
                    &namespace,
                    default_namespace,
                    compiler_version,
                )?);
            }
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("chtl") {
            continue;
        }
        let source = std::fs::read_to_string(path)
            .map_err(|err| FatalError::io(path.display().to_string(), err))?;
        let parser = Parser::new(&source, &path.to_string_lossy(), sink)
            .with_symbol_map(map)
            .with_initial_namespace(namespace.clone());
        let _ = parser.parse();
    }

    let module = CmodModule {
        metadata,
        root: dir.to_path_buf(),
        namespace: namespace.clone(),
        submodules,
    };
    check_exports(&module, map)?;
    Ok(module)
}

/// Every `[Export]` entry must name a declaration the sources registered.
fn check_exports(module: &CmodModule, map: &GlobalSymbolMap) -> FatalResult<()> {
    let Some(exports) = &module.metadata.exports else {
        return Ok(());
    };
    for export in exports {
        let (template_kind, custom_kind) = match export.kind {
            RefKind::Style => (GlobalKind::TemplateStyle, GlobalKind::CustomStyle),
            RefKind::Element => (GlobalKind::TemplateElement, GlobalKind::CustomElement),
            RefKind::Var => (GlobalKind::TemplateVar, GlobalKind::CustomVar),
        };
        let found = map.find(template_kind, &export.name, &module.namespace).is_some()
            || map.find(custom_kind, &export.name, &module.namespace).is_some();
        if !found {
            return Err(FatalError::Module(format!(
                "module '{}' exports '{}' but never declares it",
                module.metadata.info.name, export.name
            )));
        }
    }
    Ok(())
}
