//! CJMOD: native-code extensions that add keywords to the CHTL-JS dialect.
//!
//! Lifecycle: validate layout, parse metadata, build the native sources to a
//! shared library when no prebuilt one ships, load it, check the ABI
//! version, instantiate the extension and register its keywords. A module
//! whose extension fails to initialise is loaded in a poisoned state: its
//! keywords are known, and the first use of one aborts the compilation.

use std::ffi::{c_char, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::sync::Arc;

use walkdir::WalkDir;

use crate::diagnostics::{DiagnosticsSink, FatalError, FatalResult};
use crate::scanner::keywords::{KeywordRegistry, SyntaxExtension};

use super::loader::{is_shared_library, library_file_name, SharedLibrary};
use super::metadata::{parse_metadata, version_in_range, ModuleMetadata};

/// The compiler's side of the native contract; a library built against a
/// different revision is refused at load time.
pub const CJMOD_ABI_VERSION: &str = "1";

/// C layout shared with extension implementations: an opaque data pointer
/// plus function pointers for every operation of the contract. Strings
/// returned by the extension are released through `free_string`.
#[repr(C)]
pub struct RawExtension {
    pub data: *mut c_void,
    pub name: unsafe extern "C" fn(*mut c_void) -> *const c_char,
    pub version: unsafe extern "C" fn(*mut c_void) -> *const c_char,
    pub keyword_count: unsafe extern "C" fn(*mut c_void) -> usize,
    pub keyword_at: unsafe extern "C" fn(*mut c_void, usize) -> *const c_char,
    pub matches_syntax: unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> bool,
    pub parse_syntax: unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> *mut c_char,
    pub generate_javascript:
        unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> *mut c_char,
    pub free_string: unsafe extern "C" fn(*mut c_void, *mut c_char),
    pub initialize: unsafe extern "C" fn(*mut c_void) -> bool,
    pub cleanup: unsafe extern "C" fn(*mut c_void),
}

type CreateExtensionFn = unsafe extern "C" fn() -> *mut RawExtension;
type DestroyExtensionFn = unsafe extern "C" fn(*mut RawExtension);
type AbiVersionFn = unsafe extern "C" fn() -> *const c_char;

#[derive(Debug)]
pub struct CjmodModule {
    pub metadata: ModuleMetadata,
    pub root: PathBuf,
    pub extension: Arc<dyn SyntaxExtension>,
    /// Keeps the dynamic library mapped while the extension is alive.
    library: Option<Rc<SharedLibrary>>,
}

impl CjmodModule {
    pub fn keywords(&self) -> Vec<String> {
        self.extension.keywords()
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_deref().map(SharedLibrary::path)
    }
}

/// FFI-backed extension. All calls funnel through the raw vtable; strings
/// cross the boundary as UTF-8 C strings.
pub struct NativeExtension {
    raw: *mut RawExtension,
    destroy: DestroyExtensionFn,
    _library: Rc<SharedLibrary>,
}

impl NativeExtension {
    fn string_from(&self, ptr: *mut c_char) -> Result<String, String> {
        if ptr.is_null() {
            return Err("extension returned a null string".to_string());
        }
        let raw = unsafe { &*self.raw };
        let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        unsafe { (raw.free_string)(raw.data, ptr) };
        Ok(text)
    }

    fn const_string(&self, ptr: *const c_char) -> String {
        if ptr.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

impl SyntaxExtension for NativeExtension {
    fn name(&self) -> String {
        let raw = unsafe { &*self.raw };
        self.const_string(unsafe { (raw.name)(raw.data) })
    }

    fn version(&self) -> String {
        let raw = unsafe { &*self.raw };
        self.const_string(unsafe { (raw.version)(raw.data) })
    }

    fn keywords(&self) -> Vec<String> {
        let raw = unsafe { &*self.raw };
        let count = unsafe { (raw.keyword_count)(raw.data) };
        (0..count)
            .map(|i| self.const_string(unsafe { (raw.keyword_at)(raw.data, i) }))
            .filter(|k| !k.is_empty())
            .collect()
    }

    fn matches_syntax(&self, pattern: &str, context: &str) -> bool {
        let raw = unsafe { &*self.raw };
        let Ok(pattern) = CString::new(pattern) else { return false };
        let Ok(context) = CString::new(context) else { return false };
        unsafe { (raw.matches_syntax)(raw.data, pattern.as_ptr(), context.as_ptr()) }
    }

    fn parse_syntax(&self, input: &str, context: &str) -> Result<String, String> {
        let raw = unsafe { &*self.raw };
        let input = CString::new(input).map_err(|_| "input contains NUL".to_string())?;
        let context = CString::new(context).map_err(|_| "context contains NUL".to_string())?;
        let result = unsafe { (raw.parse_syntax)(raw.data, input.as_ptr(), context.as_ptr()) };
        self.string_from(result)
    }

    fn generate_javascript(&self, payload: &str, context: &str) -> Result<String, String> {
        let raw = unsafe { &*self.raw };
        let payload = CString::new(payload).map_err(|_| "payload contains NUL".to_string())?;
        let context = CString::new(context).map_err(|_| "context contains NUL".to_string())?;
        let result =
            unsafe { (raw.generate_javascript)(raw.data, payload.as_ptr(), context.as_ptr()) };
        self.string_from(result)
    }

    fn initialize(&self) -> Result<(), String> {
        let raw = unsafe { &*self.raw };
        if unsafe { (raw.initialize)(raw.data) } {
            Ok(())
        } else {
            Err("extension initialize() returned false".to_string())
        }
    }

    fn cleanup(&self) {
        let raw = unsafe { &*self.raw };
        unsafe { (raw.cleanup)(raw.data) };
    }
}

impl Drop for NativeExtension {
    fn drop(&mut self) {
        self.cleanup();
        unsafe { (self.destroy)(self.raw) };
    }
}

/// Stands in for an extension whose module loaded far enough to know its
/// keywords but then failed. Using one of its keywords aborts the compile.
pub struct PoisonedExtension {
    pub module_name: String,
    pub kw: Vec<String>,
    pub reason: String,
}

impl SyntaxExtension for PoisonedExtension {
    fn name(&self) -> String {
        self.module_name.clone()
    }
    fn version(&self) -> String {
        "0.0.0".to_string()
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
    fn generate_javascript(&self, _payload: &str, _context: &str) -> Result<String, String> {
        Err(format!("module '{}' failed to load: {}", self.module_name, self.reason))
    }
    fn initialize(&self) -> Result<(), String> {
        Ok(())
    }
    fn cleanup(&self) {}
}

pub fn load_cjmod(
    dir: &Path,
    keywords: &mut KeywordRegistry,
    sink: &DiagnosticsSink,
    build_root: &Path,
    compiler_version: &str,
) -> FatalResult<CjmodModule> {
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
            "module '{}' is incompatible with compiler version {}",
            module_name, compiler_version
        )));
    }

    let library_path = match find_prebuilt_library(dir) {
        Some(path) => path,
        None => build_native(dir, &module_name, &metadata, build_root)?,
    };

    let library = Rc::new(
        SharedLibrary::open(&library_path).map_err(FatalError::Module)?,
    );

    let abi: AbiVersionFn = library
        .function("extension_abi_version")
        .map_err(FatalError::Module)?;
    let abi_version = unsafe { CStr::from_ptr(abi()) }.to_string_lossy().into_owned();
    if abi_version != CJMOD_ABI_VERSION {
        return Err(FatalError::Module(format!(
            "module '{}' was built for ABI {} but the compiler expects {}",
            module_name, abi_version, CJMOD_ABI_VERSION
        )));
    }

    let create: CreateExtensionFn = library
        .function(metadata.info.entry_point.as_deref().unwrap_or("create_extension"))
        .map_err(FatalError::Module)?;
    let destroy: DestroyExtensionFn = library
        .function("destroy_extension")
        .map_err(FatalError::Module)?;

    let raw = unsafe { create() };
    if raw.is_null() {
        return Err(FatalError::Module(format!(
            "module '{}': create_extension() returned null",
            module_name
        )));
    }
    let native = NativeExtension { raw, destroy, _library: library.clone() };
    let declared_keywords = native.keywords();

    let extension: Arc<dyn SyntaxExtension> = match native.initialize() {
        Ok(()) => Arc::new(native),
        Err(reason) => {
            // Non-fatal unless the source actually uses one of its keywords.
            sink.error(
                crate::diagnostics::DiagnosticKind::Module,
                format!("module '{}' failed to initialise: {}", module_name, reason),
                None,
            );
            Arc::new(PoisonedExtension {
                module_name: module_name.clone(),
                kw: declared_keywords,
                reason,
            })
        }
    };

    keywords.register_extension(extension.clone()).map_err(|dup| {
        FatalError::Module(format!(
            "keyword '{}' is already owned by {}",
            dup.keyword, dup.owner
        ))
    })?;

    Ok(CjmodModule {
        metadata,
        root: dir.to_path_buf(),
        extension,
        library: Some(library),
    })
}

fn find_prebuilt_library(dir: &Path) -> Option<PathBuf> {
    for entry in WalkDir::new(dir).max_depth(3).into_iter().flatten() {
        let path = entry.path();
        if path.is_file() && is_shared_library(path) {
            return Some(path.to_path_buf());
        }
    }
    None
}

/// Compile the module's native sources into a shared library under the
/// build root. The toolchain comes from `$CXX`, falling back to `c++`.
fn build_native(
    dir: &Path,
    module_name: &str,
    metadata: &ModuleMetadata,
    build_root: &Path,
) -> FatalResult<PathBuf> {
    let sources: Vec<PathBuf> = WalkDir::new(dir.join("src"))
        .into_iter()
        .flatten()
        .map(|e| e.path().to_path_buf())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("cpp") | Some("cc") | Some("cxx")
            )
        })
        .collect();
    if sources.is_empty() {
        return Err(FatalError::Module(format!(
            "module '{}' has neither a prebuilt library nor native sources",
            module_name
        )));
    }

    std::fs::create_dir_all(build_root)
        .map_err(|err| FatalError::io(build_root.display().to_string(), err))?;
    let out_path = build_root.join(library_file_name(module_name));

    let compiler = std::env::var("CXX").unwrap_or_else(|_| "c++".to_string());
    let mut command = Command::new(&compiler);
    command.arg("-shared").arg("-fPIC").arg("-o").arg(&out_path);
    for flag in &metadata.info.compiler_flags {
        command.arg(flag);
    }
    for source in &sources {
        command.arg(source);
    }
    for lib in &metadata.info.link_libraries {
        command.arg(format!("-l{}", lib));
    }

    log::debug!("building CJMOD '{}' with {:?}", module_name, command);
    let output = command
        .output()
        .map_err(|err| FatalError::Module(format!("cannot run '{}': {}", compiler, err)))?;
    if !output.status.success() {
        return Err(FatalError::Module(format!(
            "native build of '{}' failed: {}",
            module_name,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(out_path)
}
