//! Module system integration tests: CMOD loading, metadata validation,
//! search order, packed archives and failure modes.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use chtl_compiler::config::CompilerOptions;
use chtl_compiler::diagnostics::DiagnosticsSink;
use chtl_compiler::module::{ModuleLoader, ModuleRegistry};
use chtl_compiler::scanner::keywords::{KeywordRegistry, SyntaxExtension};
use chtl_compiler::symbols::{GlobalKind, GlobalSymbolMap};

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Lay down a minimal CMOD directory under `root/module/<name>`.
fn write_cmod(root: &Path, name: &str, exports: &str) {
    let dir = root.join("module").join(name);
    write(
        &dir.join("src").join(format!("{}.chtl", name)),
        "[Template] @Style Accent { color: teal; }\n[Template] @Element Card { div { } }\n",
    );
    write(
        &dir.join("info").join(format!("{}.chtl", name)),
        &format!(
            "[Info] {{ name = \"{}\"; version = \"1.0.0\"; }}\n{}",
            name, exports
        ),
    );
}

struct Fixture {
    _tmp: TempDir,
    current_file: String,
    map: GlobalSymbolMap,
    sink: DiagnosticsSink,
    options: CompilerOptions,
}

impl Fixture {
    fn new() -> (Self, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let current_file = root.join("main.chtl").to_string_lossy().to_string();
        (
            Fixture {
                _tmp: tmp,
                current_file,
                map: GlobalSymbolMap::new(),
                sink: DiagnosticsSink::new(),
                options: CompilerOptions::default(),
            },
            root,
        )
    }
}

#[test]
fn cmod_loads_and_registers_under_its_namespace() {
    let (fixture, root) = Fixture::new();
    write_cmod(&root, "Theme", "[Export] { @Style Accent; @Element Card; }");

    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink);
    let found = loader.find_module("Theme", &fixture.current_file).expect("module found");
    let mut registry = ModuleRegistry::default();
    let mut keywords = KeywordRegistry::new();
    loader.load(&found, &mut registry, &mut keywords).unwrap();

    assert_eq!(registry.cmods.len(), 1);
    assert_eq!(registry.cmods[0].metadata.info.name, "Theme");
    assert!(fixture
        .map
        .find(GlobalKind::TemplateStyle, "Theme.Accent", &[])
        .is_some());
    assert!(fixture
        .map
        .find(GlobalKind::TemplateElement, "Card", &["Theme".to_string()])
        .is_some());
}

#[test]
fn search_order_prefers_module_directory() {
    let (fixture, root) = Fixture::new();
    write_cmod(&root, "Local", "");
    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink);
    let found = loader.find_module("Local", &fixture.current_file).unwrap();
    assert!(found.ends_with("module/Local"));
}

#[test]
fn missing_module_is_not_found() {
    let (fixture, _root) = Fixture::new();
    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink);
    assert!(loader.find_module("Nope", &fixture.current_file).is_none());
}

#[test]
fn export_of_undeclared_symbol_is_a_module_error() {
    let (fixture, root) = Fixture::new();
    write_cmod(&root, "Broken", "[Export] { @Style Ghost; }");
    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink);
    let found = loader.find_module("Broken", &fixture.current_file).unwrap();
    let mut registry = ModuleRegistry::default();
    let mut keywords = KeywordRegistry::new();
    let err = loader.load(&found, &mut registry, &mut keywords).unwrap_err();
    assert!(err.to_string().contains("Ghost"));
}

#[test]
fn metadata_without_version_fails_the_load() {
    let (fixture, root) = Fixture::new();
    let dir = root.join("module").join("NoVer");
    write(&dir.join("src").join("NoVer.chtl"), "[Template] @Var V { k: 1; }\n");
    write(&dir.join("info").join("NoVer.chtl"), "[Info] { name = \"NoVer\"; }\n");
    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink);
    let found = loader.find_module("NoVer", &fixture.current_file).unwrap();
    let mut registry = ModuleRegistry::default();
    let mut keywords = KeywordRegistry::new();
    let err = loader.load(&found, &mut registry, &mut keywords).unwrap_err();
    assert!(err.to_string().contains("version"));
}

#[test]
fn incompatible_version_range_fails_the_load() {
    let (fixture, root) = Fixture::new();
    let dir = root.join("module").join("Future");
    write(&dir.join("src").join("Future.chtl"), "[Template] @Var V { k: 1; }\n");
    write(
        &dir.join("info").join("Future.chtl"),
        "[Info] { name = \"Future\"; version = \"1.0\"; minCHTLVersion = \"99.0\"; }\n",
    );
    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink);
    let found = loader.find_module("Future", &fixture.current_file).unwrap();
    let mut registry = ModuleRegistry::default();
    let mut keywords = KeywordRegistry::new();
    assert!(loader.load(&found, &mut registry, &mut keywords).is_err());
}

#[test]
fn nested_submodules_load_recursively() {
    let (fixture, root) = Fixture::new();
    let dir = root.join("module").join("Outer");
    write(&dir.join("src").join("Outer.chtl"), "[Template] @Var O { k: 1; }\n");
    write(&dir.join("info").join("Outer.chtl"), "[Info] { name = \"Outer\"; version = \"1.0\"; }\n");
    let sub = dir.join("src").join("Inner");
    write(&sub.join("src").join("Inner.chtl"), "[Template] @Var I { k: 2; }\n");
    write(&sub.join("info").join("Inner.chtl"), "[Info] { name = \"Inner\"; version = \"1.0\"; }\n");

    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink);
    let found = loader.find_module("Outer", &fixture.current_file).unwrap();
    let mut registry = ModuleRegistry::default();
    let mut keywords = KeywordRegistry::new();
    loader.load(&found, &mut registry, &mut keywords).unwrap();

    assert!(fixture.map.find(GlobalKind::TemplateVar, "Outer.O", &[]).is_some());
    assert!(fixture.map.find(GlobalKind::TemplateVar, "Outer.Inner.I", &[]).is_some());
    assert_eq!(registry.cmods[0].submodules.len(), 1);
}

#[test]
fn packed_cmod_archive_unpacks_and_loads() {
    let (fixture, root) = Fixture::new();
    // Build the archive in memory from a canonical layout.
    let archive_path = root.join("module").join("Packed.cmod");
    fs::create_dir_all(archive_path.parent().unwrap()).unwrap();
    let file = fs::File::create(&archive_path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options: zip::write::SimpleFileOptions = Default::default();
    use std::io::Write as _;
    zip.start_file("src/Packed.chtl", options).unwrap();
    zip.write_all(b"[Template] @Style P { color: red; }\n").unwrap();
    zip.start_file("info/Packed.chtl", options).unwrap();
    zip.write_all(b"[Info] { name = \"Packed\"; version = \"1.0\"; }\n").unwrap();
    zip.finish().unwrap();

    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink)
        .with_build_root(root.join("build"));
    let found = loader.find_module("Packed", &fixture.current_file).unwrap();
    assert!(found.extension().is_some());
    let mut registry = ModuleRegistry::default();
    let mut keywords = KeywordRegistry::new();
    loader.load(&found, &mut registry, &mut keywords).unwrap();
    assert!(fixture.map.find(GlobalKind::TemplateStyle, "Packed.P", &[]).is_some());
}

#[test]
fn cjmod_without_sources_or_library_fails() {
    let (fixture, root) = Fixture::new();
    let dir = root.join("module").join("Empty");
    write(&dir.join("src").join("notes.h"), "// header only\n");
    write(
        &dir.join("info").join("Empty.chtl"),
        "[Info] { name = \"Empty\"; version = \"1.0\"; entryPoint = \"create_extension\"; }\n",
    );
    let loader = ModuleLoader::new(&fixture.options, &fixture.map, &fixture.sink)
        .with_build_root(root.join("build"));
    let found = loader.find_module("Empty", &fixture.current_file).unwrap();
    let mut registry = ModuleRegistry::default();
    let mut keywords = KeywordRegistry::new();
    let err = loader.load(&found, &mut registry, &mut keywords).unwrap_err();
    assert!(err.to_string().contains("module error"));
}

// ---- keyword ownership --------------------------------------------------

struct StubExtension {
    ext_name: String,
    kw: Vec<String>,
}

impl SyntaxExtension for StubExtension {
    fn name(&self) -> String {
        self.ext_name.clone()
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
        Ok(payload.to_string())
    }
    fn initialize(&self) -> Result<(), String> {
        Ok(())
    }
    fn cleanup(&self) {}
}

#[test]
fn two_modules_claiming_one_keyword_collide() {
    let mut keywords = KeywordRegistry::new();
    keywords
        .register_extension(Arc::new(StubExtension {
            ext_name: "first".to_string(),
            kw: vec!["sparkle".to_string()],
        }))
        .unwrap();
    let err = keywords
        .register_extension(Arc::new(StubExtension {
            ext_name: "second".to_string(),
            kw: vec!["sparkle".to_string()],
        }))
        .unwrap_err();
    assert_eq!(err.keyword, "sparkle");
    assert_eq!(err.owner, "first");
}
