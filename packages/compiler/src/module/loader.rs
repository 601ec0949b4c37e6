//! Shared-library loading, isolated behind one type so platform handle
//! details never leak into the rest of the module system.

use std::path::{Path, PathBuf};

use libloading::Library;

pub struct SharedLibrary {
    library: Library,
    path: PathBuf,
}

impl SharedLibrary {
    pub fn open(path: &Path) -> Result<Self, String> {
        // Safety: the library is a CJMOD build artifact; loading runs its
        // initialisers, which is the documented contract for extensions.
        let library = unsafe { Library::new(path) }
            .map_err(|err| format!("cannot load '{}': {}", path.display(), err))?;
        Ok(SharedLibrary { library, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a C symbol and return its raw function pointer. The caller
    /// must keep this `SharedLibrary` alive for as long as the pointer is
    /// used; the module registry guarantees that by dropping libraries last,
    /// in reverse load order.
    pub fn function<T: Copy>(&self, name: &str) -> Result<T, String> {
        let symbol_name = format!("{}\0", name);
        unsafe {
            let symbol: libloading::Symbol<T> = self
                .library
                .get(symbol_name.as_bytes())
                .map_err(|err| {
                    format!("missing symbol '{}' in '{}': {}", name, self.path.display(), err)
                })?;
            Ok(*symbol)
        }
    }
}

impl std::fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLibrary").field("path", &self.path).finish()
    }
}

/// Platform file name for a shared library, e.g. `libfoo.so` / `foo.dll`.
pub fn library_file_name(stem: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("{}.dll", stem)
    }
    #[cfg(target_os = "macos")]
    {
        format!("lib{}.dylib", stem)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        format!("lib{}.so", stem)
    }
}

pub fn is_shared_library(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so") | Some("dylib") | Some("dll")
    )
}
