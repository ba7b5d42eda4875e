//! Module discovery: walking the module root and deriving require-names.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ScriptingError;

/// A script source file discovered under the module root.
#[derive(Debug, Clone)]
pub struct ModuleFile {
    /// Absolute path of the source file
    pub path: PathBuf,
    /// Slash-normalized name, relative to the root, final extension stripped
    pub name: String,
}

/// Collect every regular file under the module root, in deterministic
/// (per-directory sorted) order.
///
/// No extension filtering happens here: whether a file is loadable Lua
/// source is the compiler's call, and a bad script must fail loudly rather
/// than be skipped as "not a module".
pub fn collect_modules(root: &Path) -> Result<Vec<ModuleFile>, ScriptingError> {
    let mut modules = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ScriptingError::ModuleDir {
            path: root.to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let name = module_name(root, &path);
        modules.push(ModuleFile { path, name });
    }
    Ok(modules)
}

/// Derive the name scripts use to `require` a module: the path relative to
/// the root with the final extension stripped and separators normalized to
/// slashes, so `sub/helper.lua` is `require("sub/helper")`.
pub fn module_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .with_extension("")
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn name_strips_extension() {
        let root = Path::new("/data/modules");
        assert_eq!(module_name(root, Path::new("/data/modules/test.lua")), "test");
        assert_eq!(module_name(root, Path::new("/data/modules/raw")), "raw");
    }

    #[test]
    fn name_uses_slashes_for_nested_modules() {
        let root = Path::new("/data/modules");
        assert_eq!(
            module_name(root, Path::new("/data/modules/sub/helper.lua")),
            "sub/helper"
        );
        assert_eq!(
            module_name(root, Path::new("/data/modules/a/b/c.lua")),
            "a/b/c"
        );
    }

    #[test]
    fn collects_all_regular_files_recursively() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("alpha.lua"), "return {}").unwrap();
        fs::write(dir.path().join("notes.txt"), "not lua").unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/beta.lua"), "return {}").unwrap();

        let modules = collect_modules(dir.path()).unwrap();
        let names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();

        // No extension filter at this layer; the .txt file is collected too.
        assert_eq!(names, vec!["alpha", "notes", "sub/beta"]);
    }

    #[test]
    fn empty_root_collects_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(collect_modules(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = collect_modules(Path::new("/definitely/not/a/module/root"))
            .expect_err("walking a missing root should fail");
        assert!(matches!(err, ScriptingError::ModuleDir { .. }));
    }
}
