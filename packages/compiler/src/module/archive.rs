//! Packed module form: `.cmod` / `.cjmod` files are ZIP archives preserving
//! the canonical directory layout (forward-slash paths, UTF-8 text).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::diagnostics::{FatalError, FatalResult};

/// Unpack an archive under `dest_root/<archive stem>` and return the module
/// directory. An existing unpack of the same archive is reused.
pub fn unpack_archive(archive_path: &Path, dest_root: &Path) -> FatalResult<PathBuf> {
    let stem = archive_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            FatalError::Module(format!("invalid archive name '{}'", archive_path.display()))
        })?;
    let dest = dest_root.join(stem);
    if dest.is_dir() {
        return Ok(dest);
    }

    let file = fs::File::open(archive_path)
        .map_err(|err| FatalError::io(archive_path.display().to_string(), err))?;
    let mut archive = ZipArchive::new(file).map_err(|err| {
        FatalError::Module(format!("'{}' is not a module archive: {}", archive_path.display(), err))
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| {
            FatalError::Module(format!("corrupt archive '{}': {}", archive_path.display(), err))
        })?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(FatalError::Module(format!(
                "archive '{}' contains an unsafe path",
                archive_path.display()
            )));
        };
        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|err| FatalError::io(out_path.display().to_string(), err))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| FatalError::io(parent.display().to_string(), err))?;
        }
        let mut out = fs::File::create(&out_path)
            .map_err(|err| FatalError::io(out_path.display().to_string(), err))?;
        io::copy(&mut entry, &mut out)
            .map_err(|err| FatalError::io(out_path.display().to_string(), err))?;
    }
    Ok(dest)
}

pub fn is_module_archive(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("cmod") | Some("cjmod")
    )
}
