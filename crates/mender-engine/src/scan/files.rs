use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const IGNORE_DIRS: [&str; 11] = [
    ".git",
    ".mender",
    "node_modules",
    "dist",
    "build",
    "coverage",
    ".next",
    ".turbo",
    "out",
    "vendor",
    ".cache",
];

const SOURCE_EXTENSIONS: [&str; 6] = ["js", "jsx", "ts", "tsx", "mjs", "cjs"];

/// Files past this size are generated or bundled; scanning them is noise.
const MAX_SOURCE_BYTES: u64 = 512 * 1024;

fn should_ignore(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORE_DIRS.contains(&name))
}

pub fn is_source_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.ends_with(".min.js") || name.ends_with(".d.ts") {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Repo-relative paths of the JavaScript/TypeScript sources under `root`.
pub fn source_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !should_ignore(e))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() || !is_source_file(entry.path()) {
            continue;
        }
        if entry.metadata().map(|m| m.len() > MAX_SOURCE_BYTES).unwrap_or(true) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    files
}

/// Make a tool-reported path repo-relative. Paths outside the root stay as given.
pub fn relativize(root: &Path, reported: &str) -> PathBuf {
    let reported = Path::new(reported.trim());
    if reported.is_absolute() {
        if let Ok(relative) = reported.strip_prefix(root) {
            return relative.to_path_buf();
        }
        if let Ok(canonical_root) = root.canonicalize() {
            if let Ok(relative) = reported.strip_prefix(&canonical_root) {
                return relative.to_path_buf();
            }
        }
    }
    reported.strip_prefix("./").unwrap_or(reported).to_path_buf()
}
