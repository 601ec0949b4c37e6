//! Module system: discovery, loading, validation and linking of CMOD and
//! CJMOD packages.
//!
//! Search order: the official module directory next to the compiler
//! executable, then `./module/` relative to the current source file, then
//! `./` relative to it; first match wins. Packed `.cmod`/`.cjmod` archives
//! unpack into the build root before loading. Mixed modules load their CMOD
//! half first so CMOD symbols exist when CJMOD init callbacks run.

pub mod archive;
pub mod cjmod;
pub mod cmod;
pub mod loader;
pub mod metadata;

use std::path::{Path, PathBuf};

use crate::config::CompilerOptions;
use crate::diagnostics::{DiagnosticsSink, FatalError, FatalResult};
use crate::scanner::keywords::KeywordRegistry;
use crate::symbols::GlobalSymbolMap;

use self::cjmod::CjmodModule;
use self::cmod::CmodModule;

const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Loaded modules of one compilation unit. Libraries are released on drop in
/// reverse load order.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    pub cmods: Vec<CmodModule>,
    pub cjmods: Vec<CjmodModule>,
}

impl Drop for ModuleRegistry {
    fn drop(&mut self) {
        while self.cjmods.pop().is_some() {}
        while self.cmods.pop().is_some() {}
    }
}

pub struct ModuleLoader<'a> {
    options: &'a CompilerOptions,
    map: &'a GlobalSymbolMap,
    sink: &'a DiagnosticsSink,
    build_root: PathBuf,
}

impl<'a> ModuleLoader<'a> {
    pub fn new(
        options: &'a CompilerOptions,
        map: &'a GlobalSymbolMap,
        sink: &'a DiagnosticsSink,
    ) -> Self {
        let build_root = std::env::temp_dir().join("chtl-module-build");
        ModuleLoader { options, map, sink, build_root }
    }

    pub fn with_build_root(mut self, build_root: PathBuf) -> Self {
        self.build_root = build_root;
        self
    }

    /// Official directory (next to the executable), then `./module` and `./`
    /// relative to the importing file, then configured extra directories.
    pub fn search_paths(&self, current_file: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                paths.push(dir.join("module"));
            }
        }
        let base = Path::new(current_file)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        paths.push(base.join("module"));
        paths.push(base);
        paths.extend(self.options.module_dirs.iter().cloned());
        paths
    }

    /// Resolve a module reference to a directory or packed archive.
    pub fn find_module(&self, name: &str, current_file: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(name);
        if direct.is_dir() || (direct.is_file() && archive::is_module_archive(&direct)) {
            return Some(direct);
        }
        for base in self.search_paths(current_file) {
            let dir = base.join(name);
            if dir.is_dir() {
                return Some(dir);
            }
            for ext in ["cmod", "cjmod"] {
                let packed = base.join(format!("{}.{}", name, ext));
                if packed.is_file() {
                    return Some(packed);
                }
            }
        }
        None
    }

    /// Load a module (directory or archive) into the registry, registering
    /// CMOD symbols in the global map and CJMOD keywords with the scanner.
    pub fn load(
        &self,
        path: &Path,
        registry: &mut ModuleRegistry,
        keywords: &mut KeywordRegistry,
    ) -> FatalResult<()> {
        let dir = if path.is_file() && archive::is_module_archive(path) {
            archive::unpack_archive(path, &self.build_root)?
        } else {
            path.to_path_buf()
        };

        let cmod_half = dir.join("CMOD");
        let cjmod_half = dir.join("CJMOD");
        if cmod_half.is_dir() || cjmod_half.is_dir() {
            return self.load_mixed(&dir, &cmod_half, &cjmod_half, registry, keywords);
        }

        if looks_like_cjmod(&dir) {
            let module = cjmod::load_cjmod(
                &dir,
                keywords,
                self.sink,
                &self.build_root,
                COMPILER_VERSION,
            )?;
            registry.cjmods.push(module);
        } else {
            let module = cmod::load_cmod(
                &dir,
                self.map,
                self.sink,
                &[],
                !self.options.disable_default_namespace,
                COMPILER_VERSION,
            )?;
            registry.cmods.push(module);
        }
        Ok(())
    }

    /// CMOD halves first, then CJMOD; a name exported by both halves is an
    /// error rather than a silent winner.
    fn load_mixed(
        &self,
        dir: &Path,
        cmod_half: &Path,
        cjmod_half: &Path,
        registry: &mut ModuleRegistry,
        keywords: &mut KeywordRegistry,
    ) -> FatalResult<()> {
        let mut cmod_names: Vec<String> = Vec::new();
        if cmod_half.is_dir() {
            for sub in module_dirs_in(cmod_half)? {
                let module = cmod::load_cmod(
                    &sub,
                    self.map,
                    self.sink,
                    &[],
                    !self.options.disable_default_namespace,
                    COMPILER_VERSION,
                )?;
                cmod_names.extend(module.exported_names());
                registry.cmods.push(module);
            }
        }
        if cjmod_half.is_dir() {
            for sub in module_dirs_in(cjmod_half)? {
                let module = cjmod::load_cjmod(
                    &sub,
                    keywords,
                    self.sink,
                    &self.build_root,
                    COMPILER_VERSION,
                )?;
                if let Some(exports) = &module.metadata.exports {
                    for export in exports {
                        if cmod_names.contains(&export.name) {
                            return Err(FatalError::Module(format!(
                                "mixed module '{}' exports '{}' from both its CMOD and CJMOD halves",
                                dir.file_name()
                                    .and_then(|n| n.to_str())
                                    .unwrap_or("<module>"),
                                export.name
                            )));
                        }
                    }
                }
                registry.cjmods.push(module);
            }
        }
        Ok(())
    }
}

fn module_dirs_in(half: &Path) -> FatalResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let entries = std::fs::read_dir(half)
        .map_err(|err| FatalError::io(half.display().to_string(), err))?;
    for entry in entries {
        let entry = entry.map_err(|err| FatalError::io(half.display().to_string(), err))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// A module with native sources (or a shipped library) is a CJMOD.
fn looks_like_cjmod(dir: &Path) -> bool {
    let src = dir.join("src");
    if !src.is_dir() {
        return false;
    }
    walkdir::WalkDir::new(&src)
        .max_depth(2)
        .into_iter()
        .flatten()
        .any(|entry| {
            let path = entry.path();
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("cpp") | Some("cc") | Some("cxx") | Some("h") | Some("hpp")
            ) || loader::is_shared_library(path)
        })
}
